use std::fmt;

use crate::retry::IsRetryable;

/// Pipeline stage an article was in when something happened to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Extracting,
    Translating,
    Rendering,
    Publishing,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Translating => "translating",
            Stage::Rendering => "rendering",
            Stage::Publishing => "publishing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self.kind {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => code == 429 || (500..600).contains(&code),
            FailureKind::InvalidUrl
            | FailureKind::RedirectLimitExceeded
            | FailureKind::TooLarge { .. }
            | FailureKind::UnsupportedContentType { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_fetch_failures_are_retryable() {
        let retryable = |kind| FetchError::new(kind, "x").is_retryable();
        assert!(retryable(FailureKind::Timeout));
        assert!(retryable(FailureKind::Network));
        assert!(retryable(FailureKind::HttpStatus(429)));
        assert!(retryable(FailureKind::HttpStatus(503)));
        assert!(!retryable(FailureKind::HttpStatus(404)));
        assert!(!retryable(FailureKind::InvalidUrl));
        assert!(!retryable(FailureKind::UnsupportedContentType {
            content_type: "application/pdf".into()
        }));
    }
}
