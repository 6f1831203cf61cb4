//! Codecs for pollsync frames.
//!
//! Binary frames are length-prefixed MessagePack. Text frames are a single
//! JSON object, which is what browser-era servers and debugging tools emit.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Largest payload either codec accepts, in bytes.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Width of the big-endian length that precedes each binary payload.
pub const LENGTH_PREFIX_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// The buffer ends inside a frame; the value is the shortfall.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Text frame error: {0}")]
    Text(#[from] serde_json::Error),
}

/// Encode a binary frame: a big-endian `u32` payload length, then the
/// frame as MessagePack with named fields.
///
/// # Errors
///
/// Fails if serialization fails or the payload exceeds [`MAX_FRAME_SIZE`].
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut out = BytesMut::new();
    encode_into(frame, &mut out)?;
    Ok(out.freeze())
}

/// Append one binary frame to `out`.
///
/// # Errors
///
/// Same as [`encode`]. `out` is left unchanged on error.
pub fn encode_into(frame: &Frame, out: &mut BytesMut) -> Result<(), ProtocolError> {
    let body = rmp_serde::to_vec_named(frame)?;
    let length = u32::try_from(body.len())
        .ok()
        .filter(|&n| n as usize <= MAX_FRAME_SIZE)
        .ok_or(ProtocolError::FrameTooLarge(body.len()))?;

    out.reserve(LENGTH_PREFIX_SIZE + body.len());
    out.put_u32(length);
    out.put_slice(&body);
    Ok(())
}

enum Extent {
    /// A whole frame with this payload length is buffered.
    Complete(usize),
    /// This many more bytes are needed.
    Short(usize),
}

fn extent(data: &[u8]) -> Result<Extent, ProtocolError> {
    let Some(prefix) = data.get(..LENGTH_PREFIX_SIZE) else {
        return Ok(Extent::Short(LENGTH_PREFIX_SIZE - data.len()));
    };
    let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let needed = LENGTH_PREFIX_SIZE + length;
    Ok(if data.len() >= needed {
        Extent::Complete(length)
    } else {
        Extent::Short(needed - data.len())
    })
}

/// Decode one frame from the start of `data`. Trailing bytes are ignored.
///
/// # Errors
///
/// [`ProtocolError::Incomplete`] when `data` stops short of a whole frame.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    match extent(data)? {
        Extent::Complete(length) => Ok(rmp_serde::from_slice(
            &data[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + length],
        )?),
        Extent::Short(missing) => Err(ProtocolError::Incomplete(missing)),
    }
}

/// Take the next frame off a read buffer.
///
/// Returns `Ok(None)` and leaves the buffer untouched while the frame is
/// still partial.
///
/// # Errors
///
/// Fails on an oversized length prefix or a payload that is not a frame.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let Extent::Complete(length) = extent(&buf[..])? else {
        return Ok(None);
    };
    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);
    Ok(Some(rmp_serde::from_slice(&payload)?))
}

/// Encode a frame as one JSON object.
///
/// # Errors
///
/// Fails only if serialization fails.
pub fn encode_text(frame: &Frame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a JSON text frame.
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid frame.
pub fn decode_text(text: &str) -> Result<Frame, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_frame_layout() {
        let encoded = encode(&Frame::vote_update(2, 17, 40)).unwrap();
        let length = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(length as usize, encoded.len() - LENGTH_PREFIX_SIZE);
        assert_eq!(decode(&encoded).unwrap(), Frame::vote_update(2, 17, 40));

        let hello = encode(&Frame::connected("sid-1", 0x10)).unwrap();
        assert_eq!(decode(&hello).unwrap(), Frame::connected("sid-1", 0x10));
    }

    #[test]
    fn test_decode_reports_shortfall() {
        let encoded = encode(&Frame::join_poll("test")).unwrap();

        assert!(matches!(decode(&encoded[..2]), Err(ProtocolError::Incomplete(2))));
        assert!(matches!(
            decode(&encoded[..encoded.len() - 1]),
            Err(ProtocolError::Incomplete(1))
        ));
    }

    #[test]
    fn test_oversized_length_prefix() {
        let mut data = vec![0xFF, 0xFF, 0xFF, 0xFF];
        data.extend_from_slice(b"junk");

        assert!(matches!(
            decode(&data),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_read_buffer_yields_frames_in_order() {
        let mut buf = BytesMut::new();
        encode_into(&Frame::join_poll("a"), &mut buf).unwrap();
        encode_into(&Frame::leave_poll("a"), &mut buf).unwrap();

        // Half of the first frame is not enough.
        let mut partial = BytesMut::from(&buf[..3]);
        assert!(decode_from(&mut partial).unwrap().is_none());

        assert_eq!(decode_from(&mut buf).unwrap(), Some(Frame::join_poll("a")));
        assert_eq!(decode_from(&mut buf).unwrap(), Some(Frame::leave_poll("a")));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_text_frames() {
        let frame = decode_text(r#"{"type":"vote_update","option_id":1,"votes":4,"total_votes":9}"#)
            .unwrap();
        assert_eq!(frame, Frame::vote_update(1, 4, 9));

        let frame = decode_text(r#"{"type":"poll_expired"}"#).unwrap();
        assert_eq!(frame, Frame::PollExpired);

        let text = encode_text(&Frame::leave_poll("xyz")).unwrap();
        assert_eq!(text, r#"{"type":"leave_poll","poll_id":"xyz"}"#);

        assert!(matches!(
            decode_text(r#"{"type":"nope"}"#),
            Err(ProtocolError::Text(_))
        ));
    }
}
