//! Content sniffing: identify the media type and canonical extension of
//! content from its leading bytes, without trusting file names.
//!
//! The free functions use a process-wide [`EngineCache`] configured from
//! [`sniff_config::Config::load`]. Each thread gets its own [`SniffEngine`],
//! opened on first use.
//!
//! ```
//! # fn main() -> sniff::error::Result<()> {
//! let jpeg = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00\x01";
//! assert_eq!(sniff::guess_media_type(jpeg)?, "image/jpeg");
//! assert_eq!(sniff::guess_extension(jpeg)?, "jpeg");
//! assert_eq!(sniff::guess_content_type(jpeg)?.to_string(), "image/jpeg; extension=jpeg");
//! # Ok(())
//! # }
//! ```
//!
//! Any [`Source`] works: a path, a buffer, or a seekable stream, whose
//! position is left where it was.

mod cache;
mod content_type;
pub mod engine;
pub mod error;
mod source;

pub use crate::cache::EngineCache;
pub use crate::content_type::ContentType;
pub use crate::engine::{DEFAULT_MODE, SniffEngine};
pub use crate::source::Source;
pub use sniff_magic::{MagicFlags, UNKNOWN_EXTENSION};

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Media type of `source`, e.g. `image/jpeg`.
pub fn guess_media_type<'a>(source: impl Into<Source<'a>>) -> Result<String> {
    EngineCache::global().guess_media_type(source)
}

/// Canonical extension of `source` without a leading dot, e.g. `jpeg`, or
/// [`UNKNOWN_EXTENSION`].
pub fn guess_extension<'a>(source: impl Into<Source<'a>>) -> Result<String> {
    EngineCache::global().guess_extension(source)
}

pub fn guess_content_type<'a>(source: impl Into<Source<'a>>) -> Result<ContentType> {
    EngineCache::global().guess_content_type(source)
}

/// Use the database at `path` from now on, in every thread.
pub fn set_database_path(path: impl AsRef<Path>) {
    EngineCache::global().reconfigure(path);
}

pub fn database_path() -> PathBuf {
    EngineCache::global().database_path()
}
