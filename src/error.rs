//! Centralized error types for sheetmail.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the sheetmail library.
#[derive(Error, Debug)]
pub enum SheetmailError {
    /// The mail store rejected the credentials. The message is the store's own response.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A message, MIME part or working file does not exist (any more).
    #[error("Not found: {0}")]
    NotFound(String),

    /// A caller-supplied field is missing or malformed.
    #[error("Invalid value for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// The mail store or SMTP relay is unreachable or misbehaved.
    #[error("Mail transport error: {0}")]
    Transport(String),

    /// A message from the store could not be parsed.
    #[error("Malformed message: {0}")]
    Mime(String),

    /// The spreadsheet could not be read or written.
    #[error("Spreadsheet error: {0}")]
    Document(String),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, SheetmailError>`.
pub type Result<T> = std::result::Result<T, SheetmailError>;

/// Coarse error classification exposed to callers (and mapped to HTTP statuses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    NotFound,
    Validation,
    Transport,
    Document,
}

impl ErrorKind {
    /// Stable lowercase name used in API responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Document => "document",
        }
    }
}

impl SheetmailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Validation` variant for a named field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error. Working-storage I/O failures and unparseable
    /// messages count as transport failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transport(_) | Self::Mime(_) | Self::Io { .. } => ErrorKind::Transport,
            Self::Document(_) => ErrorKind::Document,
        }
    }
}

impl From<zip::result::ZipError> for SheetmailError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Document(format!("invalid spreadsheet package: {e}"))
    }
}

impl From<quick_xml::Error> for SheetmailError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Document(format!("malformed worksheet XML: {e}"))
    }
}

impl From<async_imap::error::Error> for SheetmailError {
    fn from(e: async_imap::error::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(SheetmailError::Auth("no".into()).kind(), ErrorKind::Auth);
        assert_eq!(
            SheetmailError::validation("sinoffCode", "out of range").kind(),
            ErrorKind::Validation
        );
        let io = SheetmailError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk"),
        );
        assert_eq!(io.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_validation_message_names_field() {
        let e = SheetmailError::validation("startHour", "not a number: 'ab'");
        assert_eq!(
            e.to_string(),
            "Invalid value for 'startHour': not a number: 'ab'"
        );
    }
}
