//! Matcher Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. The human-readable diagnostic of the most recent
//! failure is also kept on the [`Magic`](crate::Magic) handle, mirroring the
//! "last error" channel of classic magic libraries.

use crate::MagicFlags;
use derive_more::{Display, Error};

/// A matcher error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for matcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The flag combination contains bits the matcher cannot honour.
    #[display("unsupported flags: {_0:?}")]
    InvalidFlags(#[error(not(source))] MagicFlags),
    /// Classification was requested before a database was loaded.
    #[display("no signature database loaded")]
    NoDatabase,
    /// The database file could not be read or parsed.
    #[display("{_0}")]
    Load(#[error(not(source))] String),
    /// The content could not be classified.
    #[display("{_0}")]
    Classify(#[error(not(source))] String),
    /// An operating system error while inspecting a path.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Matching is deterministic for the same bytes and flags.
        matches!(self, Self::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::NoDatabase.to_string(), "no signature database loaded");
        assert_eq!(ErrorKind::Load("line 3: unknown type `word'".to_string()).to_string(), "line 3: unknown type `word'");
        let message = ErrorKind::InvalidFlags(MagicFlags::COMPRESS).to_string();
        assert!(message.starts_with("unsupported flags: "));
        assert!(message.contains("COMPRESS"));
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::Classify("no data to classify".to_string()).is_retryable());
        assert!(!ErrorKind::NoDatabase.is_retryable());
        assert!(ErrorKind::Io.is_retryable());
    }
}
