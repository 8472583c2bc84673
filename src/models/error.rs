//! Individual crawl error records collected into reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum stored length of an error message. Longer messages are truncated
/// with a trailing ellipsis.
const MAX_MESSAGE_LEN: usize = 500;

/// Classification of a crawl failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Parse,
    Timeout,
    Permission,
    RateLimit,
    Validation,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Parse => "PARSE",
            Self::Timeout => "TIMEOUT",
            Self::Permission => "PERMISSION",
            Self::RateLimit => "RATE_LIMIT",
            Self::Validation => "VALIDATION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level derived from the error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    High,
    Medium,
    Low,
}

/// One recorded crawl failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub error_id: String,
    pub url: String,
    pub error_kind: ErrorKind,
    pub error_message: String,
    /// HTTP status code when the failure came from a response (100-599).
    pub error_code: Option<u16>,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub stacktrace: Option<String>,
}

impl ErrorEntry {
    pub fn new(url: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_id: Uuid::new_v4().to_string(),
            url: url.into(),
            error_kind: kind,
            error_message: truncate_message(message.into()),
            error_code: None,
            timestamp: Utc::now(),
            retry_count: 0,
            stacktrace: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: Option<u16>) -> Self {
        self.error_code = code.filter(|c| (100..=599).contains(c));
        self
    }

    #[must_use]
    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    /// Whether a retry has any chance of succeeding for this kind of error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimit
        )
    }

    /// Whether a retry should actually be attempted given the budget.
    pub fn should_retry(&self, max_retries: u32) -> bool {
        self.is_retryable() && self.retry_count < max_retries
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.error_kind {
            ErrorKind::Permission | ErrorKind::Validation => ErrorSeverity::High,
            ErrorKind::Parse | ErrorKind::RateLimit => ErrorSeverity::Medium,
            _ => ErrorSeverity::Low,
        }
    }

    /// One-line representation used in logs and the text report.
    pub fn to_log_format(&self) -> String {
        let mut parts = vec![
            format!("[{}]", self.error_kind),
            format!("URL: {}", self.url),
            format!("Error: {}", self.error_message),
        ];
        if let Some(code) = self.error_code {
            parts.push(format!("Code: {code}"));
        }
        if self.retry_count > 0 {
            parts.push(format!("Retries: {}", self.retry_count));
        }
        parts.join(" | ")
    }
}

fn truncate_message(message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN - 3;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &message[..cut])
    } else {
        message
    }
}
