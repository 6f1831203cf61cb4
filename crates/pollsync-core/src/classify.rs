//! Server error classification.
//!
//! The poll server has answered failures in two generations of payload:
//! free-form strings, and structured objects carrying a `code`. Both end up
//! in the same closed [`ErrorCategory`] set. Structured codes are looked up
//! in a fixed table; strings go through an ordered list of legacy phrase
//! matchers. Classification never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Where a category sits in the failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transport unreachable or dropped. Retried, shown as "reconnecting".
    Connectivity,
    /// The server rejected a request for a semantic reason. Not retried.
    Domain,
    /// Unrecognized payload shape. Shown as a generic failure.
    Protocol,
}

/// User-facing error category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Error)]
pub enum ErrorCategory {
    #[error("poll not found")]
    PollNotFound,
    #[error("you have already voted in this poll")]
    AlreadyVoted,
    #[error("invalid option")]
    InvalidOption,
    #[error("this poll has expired")]
    PollExpired,
    #[error("this poll accepts only one choice")]
    MultipleNotAllowed,
    #[error("{}", bound_message("at least", .count))]
    MinSelection { count: Option<u32> },
    #[error("{}", bound_message("at most", .count))]
    MaxSelection { count: Option<u32> },
    #[error("no option selected")]
    MissingOption,
    #[error("failed to create poll")]
    CreateFailed,
    #[error("failed to record vote")]
    VoteFailed,
    #[error("network error")]
    Network,
    #[error("unknown error")]
    Unknown,
    /// Server text passed through verbatim.
    #[error("{0}")]
    Opaque(String),
}

fn bound_message(qualifier: &str, count: &Option<u32>) -> String {
    match count {
        Some(n) => format!("select {qualifier} {n} options"),
        None => format!("select {qualifier} the allowed number of options"),
    }
}

impl ErrorCategory {
    /// Taxonomy bucket for this category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCategory::Network => ErrorKind::Connectivity,
            ErrorCategory::Unknown | ErrorCategory::Opaque(_) => ErrorKind::Protocol,
            _ => ErrorKind::Domain,
        }
    }

    /// Whether the failure may go away on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::PollNotFound => "POLL_NOT_FOUND",
            ErrorCategory::AlreadyVoted => "ALREADY_VOTED",
            ErrorCategory::InvalidOption => "INVALID_OPTION",
            ErrorCategory::PollExpired => "POLL_EXPIRED",
            ErrorCategory::MultipleNotAllowed => "MULTIPLE_NOT_ALLOWED",
            ErrorCategory::MinSelection { .. } => "MIN_SELECTION",
            ErrorCategory::MaxSelection { .. } => "MAX_SELECTION",
            ErrorCategory::MissingOption => "MISSING_OPTION",
            ErrorCategory::CreateFailed => "CREATE_FAILED",
            ErrorCategory::VoteFailed => "VOTE_FAILED",
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Unknown => "UNKNOWN",
            ErrorCategory::Opaque(_) => "OPAQUE",
        }
    }

    /// Selection bound carried by the category, if any.
    #[must_use]
    pub fn bound(&self) -> Option<u32> {
        match self {
            ErrorCategory::MinSelection { count } | ErrorCategory::MaxSelection { count } => *count,
            _ => None,
        }
    }

    /// Map a structured error code. Unknown codes yield `None`.
    #[must_use]
    pub fn from_code(code: &str, bound: Option<u32>) -> Option<Self> {
        let category = match code {
            "POLL_NOT_FOUND" => ErrorCategory::PollNotFound,
            "ALREADY_VOTED" => ErrorCategory::AlreadyVoted,
            "INVALID_OPTION" => ErrorCategory::InvalidOption,
            "POLL_EXPIRED" => ErrorCategory::PollExpired,
            "MULTIPLE_NOT_ALLOWED" => ErrorCategory::MultipleNotAllowed,
            "MIN_SELECTION" => ErrorCategory::MinSelection { count: bound },
            "MAX_SELECTION" => ErrorCategory::MaxSelection { count: bound },
            "MISSING_OPTION" => ErrorCategory::MissingOption,
            "CREATE_FAILED" => ErrorCategory::CreateFailed,
            "VOTE_FAILED" => ErrorCategory::VoteFailed,
            _ => return None,
        };
        Some(category)
    }
}

/// Structured error body: `{"code": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructuredDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub min: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
}

impl StructuredDetail {
    /// Pick out the fields the classifier reads. A field of an unexpected
    /// type counts as absent; every other field is ignored.
    #[must_use]
    pub fn from_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let text = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let number = |key: &str| {
            map.get(key)
                .and_then(serde_json::Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
        };
        Self {
            code: text("code"),
            message: text("message"),
            count: number("count"),
            min: number("min"),
            max: number("max"),
        }
    }

    /// Selection bound, preferring `count` over `min` over `max`.
    #[must_use]
    pub fn bound(&self) -> Option<u32> {
        self.count.or(self.min).or(self.max)
    }
}

/// Raw `detail` payload from an error response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Structured(StructuredDetail),
    /// Any other JSON shape, e.g. a validation error list.
    Other(serde_json::Value),
}

impl ErrorDetail {
    /// Interpret an arbitrary JSON value. `null` counts as absent.
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(ErrorDetail::Text(text)),
            serde_json::Value::Object(map) => {
                Some(ErrorDetail::Structured(StructuredDetail::from_map(&map)))
            }
            other => Some(ErrorDetail::Other(other)),
        }
    }
}

impl From<&str> for ErrorDetail {
    fn from(text: &str) -> Self {
        ErrorDetail::Text(text.to_string())
    }
}

impl From<StructuredDetail> for ErrorDetail {
    fn from(detail: StructuredDetail) -> Self {
        ErrorDetail::Structured(detail)
    }
}

/// Classify an error payload. An absent payload means the request never got
/// a response.
#[must_use]
pub fn classify(detail: Option<&ErrorDetail>) -> ErrorCategory {
    match detail {
        None => ErrorCategory::Network,
        Some(ErrorDetail::Structured(detail)) => classify_structured(detail),
        Some(ErrorDetail::Text(text)) => classify_text(text),
        Some(ErrorDetail::Other(_)) => ErrorCategory::Unknown,
    }
}

fn classify_structured(detail: &StructuredDetail) -> ErrorCategory {
    if let Some(category) = detail
        .code
        .as_deref()
        .and_then(|code| ErrorCategory::from_code(code, detail.bound()))
    {
        return category;
    }
    match &detail.message {
        Some(message) => ErrorCategory::Opaque(message.clone()),
        None => ErrorCategory::Unknown,
    }
}

struct LegacyMatcher {
    pattern: Regex,
    category: fn(Option<u32>) -> ErrorCategory,
}

impl LegacyMatcher {
    fn new(pattern: &str, category: fn(Option<u32>) -> ErrorCategory) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("legacy error pattern must compile"),
            category,
        }
    }
}

// Order matters: the first match wins.
static LEGACY_MATCHERS: LazyLock<Vec<LegacyMatcher>> = LazyLock::new(|| {
    vec![
        LegacyMatcher::new(r"(?i)poll\s+not\s+found|投票不存在|找不到投票", |_| {
            ErrorCategory::PollNotFound
        }),
        LegacyMatcher::new(r"(?i)already\s+voted|已经投过票|已投过票|已经投票", |_| {
            ErrorCategory::AlreadyVoted
        }),
        LegacyMatcher::new(r"(?i)poll\s+(?:has\s+)?expired|投票已过期|投票已结束", |_| {
            ErrorCategory::PollExpired
        }),
        LegacyMatcher::new(
            r"(?i)multiple\s+(?:selections?\s+|choices?\s+)?(?:are\s+|is\s+)?not\s+allowed|不允许多选|不支持多选",
            |_| ErrorCategory::MultipleNotAllowed,
        ),
        LegacyMatcher::new(
            r"(?i)at\s+least\s+(\d+)|至少(?:需要)?(?:选择)?\s*(\d+)\s*(?:个|项)",
            |count| ErrorCategory::MinSelection { count },
        ),
        LegacyMatcher::new(
            r"(?i)at\s+most\s+(\d+)|最多(?:只能)?(?:选择)?\s*(\d+)\s*(?:个|项)",
            |count| ErrorCategory::MaxSelection { count },
        ),
        LegacyMatcher::new(r"(?i)invalid\s+option|option\s+not\s+found|无效的?选项|选项不存在", |_| {
            ErrorCategory::InvalidOption
        }),
        LegacyMatcher::new(
            r"(?i)missing\s+option|option_ids?\s+(?:is\s+)?required|请选择(?:一个)?选项|缺少选项",
            |_| ErrorCategory::MissingOption,
        ),
    ]
});

fn classify_text(text: &str) -> ErrorCategory {
    for matcher in LEGACY_MATCHERS.iter() {
        if let Some(captures) = matcher.pattern.captures(text) {
            let number = captures
                .iter()
                .skip(1)
                .flatten()
                .next()
                .and_then(|m| m.as_str().parse().ok());
            return (matcher.category)(number);
        }
    }
    ErrorCategory::Opaque(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn structured(value: serde_json::Value) -> ErrorCategory {
        classify(ErrorDetail::from_value(value).as_ref())
    }

    fn text(s: &str) -> ErrorCategory {
        classify(Some(&ErrorDetail::from(s)))
    }

    #[test]
    fn test_absent_detail_is_network() {
        assert_eq!(classify(None), ErrorCategory::Network);
        assert_eq!(structured(serde_json::Value::Null), ErrorCategory::Network);
    }

    #[test]
    fn test_structured_codes() {
        assert_eq!(structured(json!({"code": "POLL_NOT_FOUND"})), ErrorCategory::PollNotFound);
        assert_eq!(
            structured(json!({"code": "INVALID_OPTION", "option_id": 7})),
            ErrorCategory::InvalidOption
        );
        assert_eq!(
            structured(json!({"code": "VOTE_FAILED", "message": "redis down"})),
            ErrorCategory::VoteFailed
        );
    }

    #[test]
    fn test_structured_bound_preference() {
        assert_eq!(
            structured(json!({"code": "MIN_SELECTION", "min": 2})),
            ErrorCategory::MinSelection { count: Some(2) }
        );
        assert_eq!(
            structured(json!({"code": "MAX_SELECTION", "count": 3, "max": 5})),
            ErrorCategory::MaxSelection { count: Some(3) }
        );
        assert_eq!(
            structured(json!({"code": "MIN_SELECTION"})),
            ErrorCategory::MinSelection { count: None }
        );
    }

    #[test]
    fn test_unknown_code_passes_message_through() {
        assert_eq!(
            structured(json!({"code": "RATE_LIMITED", "message": "custom server text"})),
            ErrorCategory::Opaque("custom server text".to_string())
        );
        assert_eq!(
            structured(json!({"message": "custom server text"})),
            ErrorCategory::Opaque("custom server text".to_string())
        );
        assert_eq!(structured(json!({"code": "RATE_LIMITED"})), ErrorCategory::Unknown);
        assert_eq!(structured(json!({})), ErrorCategory::Unknown);
    }

    #[test]
    fn test_ill_typed_fields_do_not_hide_code_or_message() {
        assert_eq!(
            structured(json!({"code": "INVALID_OPTION", "option_id": -1})),
            ErrorCategory::InvalidOption
        );
        assert_eq!(
            structured(json!({"code": 7, "message": "custom server text"})),
            ErrorCategory::Opaque("custom server text".to_string())
        );
        assert_eq!(
            structured(json!({"code": "MAX_SELECTION", "count": "three", "max": 4})),
            ErrorCategory::MaxSelection { count: Some(4) }
        );
        assert_eq!(
            structured(json!({"code": "MIN_SELECTION", "min": 5_000_000_000u64})),
            ErrorCategory::MinSelection { count: None }
        );
    }

    #[test]
    fn test_other_shapes_are_unknown() {
        assert_eq!(
            structured(json!([{"loc": ["body", "title"], "msg": "field required"}])),
            ErrorCategory::Unknown
        );
        assert_eq!(structured(json!(42)), ErrorCategory::Unknown);
    }

    #[test]
    fn test_legacy_strings() {
        assert_eq!(text("Poll not found"), ErrorCategory::PollNotFound);
        assert_eq!(text("投票不存在"), ErrorCategory::PollNotFound);
        assert_eq!(text("You have already voted"), ErrorCategory::AlreadyVoted);
        assert_eq!(text("投票已过期"), ErrorCategory::PollExpired);
        assert_eq!(
            text("Multiple selections not allowed"),
            ErrorCategory::MultipleNotAllowed
        );
        assert_eq!(
            text("最多只能选择 3 个选项"),
            ErrorCategory::MaxSelection { count: Some(3) }
        );
        assert_eq!(text("Invalid option"), ErrorCategory::InvalidOption);
        assert_eq!(text("option_id is required"), ErrorCategory::MissingOption);
    }

    #[test]
    fn test_structured_and_legacy_agree() {
        let from_code = structured(json!({"code": "MIN_SELECTION", "min": 2}));
        assert_eq!(text("至少需要选择 2 个选项"), from_code);
        assert_eq!(text("Please select at least 2 options"), from_code);
        assert_eq!(from_code.bound(), Some(2));
    }

    #[test]
    fn test_priority_order() {
        // Both "poll not found" and "invalid option" phrasing; the earlier matcher wins.
        assert_eq!(
            text("poll not found (invalid option 3)"),
            ErrorCategory::PollNotFound
        );
    }

    #[test]
    fn test_unmatched_string_is_kept() {
        assert_eq!(
            text("服务器开小差了"),
            ErrorCategory::Opaque("服务器开小差了".to_string())
        );
    }

    #[test]
    fn test_kinds_and_codes() {
        assert_eq!(ErrorCategory::Network.kind(), ErrorKind::Connectivity);
        assert!(ErrorCategory::Network.is_retryable());
        assert_eq!(ErrorCategory::AlreadyVoted.kind(), ErrorKind::Domain);
        assert_eq!(ErrorCategory::Opaque("x".into()).kind(), ErrorKind::Protocol);
        assert_eq!(
            ErrorCategory::MinSelection { count: Some(2) }.code(),
            "MIN_SELECTION"
        );
        assert_eq!(
            ErrorCategory::from_code("POLL_EXPIRED", None),
            Some(ErrorCategory::PollExpired)
        );
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ErrorCategory::MinSelection { count: Some(2) }.to_string(),
            "select at least 2 options"
        );
        assert_eq!(ErrorCategory::Opaque("boom".into()).to_string(), "boom");
    }
}
