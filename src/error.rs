//! Sniffing Error Types
//!
//! Structured errors using `exn`. Failures inside the matcher are raised as
//! children of these kinds, so the full error tree keeps the matcher's own
//! diagnostic and location.

use derive_more::{Display, Error};
use sniff_magic::MagicFlags;
use std::path::PathBuf;

/// A sniffing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sniffing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The database path does not reference an existing file.
    #[display("signature database not found at `{}'", _0.display())]
    DatabaseNotFound(#[error(not(source))] PathBuf),
    /// The database exists but could not be loaded.
    #[display("{_0}")]
    LoadFailed(#[error(not(source))] String),
    /// The matcher rejected a mode; the previous mode is still active.
    #[display("could not change mode to {_0:?}")]
    ModeChangeFailed(#[error(not(source))] MagicFlags),
    /// The matcher failed while classifying content.
    #[display("{_0}")]
    ClassifyFailed(#[error(not(source))] String),
    /// The source cannot be read and restored; nothing was consumed.
    #[display("unsupported source: {_0}")]
    UnsupportedSource(#[error(not(source))] String),
    /// A content type string that is not in `type; extension=ext` form.
    #[display("invalid content type `{_0}'")]
    InvalidContentType(#[error(not(source))] String),
    /// Reading the source failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Classification is deterministic for the same bytes and mode; only
        // reading the source can fail transiently.
        matches!(self, Self::Io)
    }
}
