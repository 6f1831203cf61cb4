//! Handshake version byte.
//!
//! `connect` and `connected` frames carry the protocol version packed into a
//! single byte, major in the high nibble and minor in the low one. Peers talk
//! when their majors agree; a newer minor only adds optional fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version spoken by this crate.
pub const PROTOCOL_VERSION: Version = Version::new(1, 0);

/// A `major.minor` protocol version. Each part fits in four bits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether a peer speaking `other` can be talked to.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }

    /// The handshake byte for this version.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        (self.major << 4) | (self.minor & 0x0F)
    }

    #[must_use]
    pub const fn from_wire(byte: u8) -> Self {
        Self::new(byte >> 4, byte & 0x0F)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_bumps_stay_compatible() {
        assert!(PROTOCOL_VERSION.is_compatible_with(&Version::new(1, 3)));
        assert!(!PROTOCOL_VERSION.is_compatible_with(&Version::new(2, 0)));
    }

    #[test]
    fn test_handshake_byte() {
        assert_eq!(PROTOCOL_VERSION.to_wire(), 0x10);
        assert_eq!(Version::from_wire(0x23), Version::new(2, 3));
        assert_eq!(Version::from_wire(0x23).to_string(), "2.3");
    }
}
