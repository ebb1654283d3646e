//! Sniff Engine
//!
//! A [`SniffEngine`] wraps one matcher handle with one loaded signature
//! database. It is deliberately not [`Sync`]: an engine serves one
//! classification at a time, and [`EngineCache`](crate::EngineCache) hands
//! each thread its own.

use crate::ContentType;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sniff_magic::{Magic, MagicFlags};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Mode an engine is opened with: report MIME types, fail on OS errors, and
/// skip the compression, ELF, and application-type checks.
pub const DEFAULT_MODE: MagicFlags = MagicFlags::ERROR
    .union(MagicFlags::MIME_TYPE)
    .union(MagicFlags::NO_CHECK_COMPRESS)
    .union(MagicFlags::NO_CHECK_ELF)
    .union(MagicFlags::NO_CHECK_APPTYPE);

const LOAD_FAILED: &str = "Could not load signature database";
const CLASSIFY_FAILED: &str = "Could not classify content";
const CLOSED: &str = "Engine has been closed";

#[derive(Debug)]
pub struct SniffEngine {
    magic: Option<Magic>,
    mode: MagicFlags,
    database: PathBuf,
}
impl SniffEngine {
    /// Open an engine over the database at `database`.
    ///
    /// # Errors
    ///
    /// - [`DatabaseNotFound`](ErrorKind::DatabaseNotFound) if `database` is
    ///   not an existing file. Nothing is allocated in that case.
    /// - [`LoadFailed`](ErrorKind::LoadFailed) if the matcher rejects `mode`
    ///   or cannot load the database.
    #[instrument(level = "debug", skip_all, fields(database = %database.as_ref().display(), mode = ?mode))]
    pub fn open(mode: MagicFlags, database: impl AsRef<Path>) -> Result<Self> {
        let database = database.as_ref();
        if !database.is_file() {
            exn::bail!(ErrorKind::DatabaseNotFound(database.to_path_buf()));
        }
        let mut magic = match Magic::open(mode) {
            Ok(magic) => magic,
            Err(err) => {
                let message = diagnostic(Some((*err).to_string()), LOAD_FAILED);
                return Err(err).or_raise(|| ErrorKind::LoadFailed(message));
            },
        };
        if let Err(err) = magic.load(database) {
            let message = diagnostic(magic.error(), LOAD_FAILED);
            return Err(err).or_raise(|| ErrorKind::LoadFailed(message));
        }
        tracing::debug!(rules = magic.database().map_or(0, |db| db.len()), "Engine opened");
        Ok(Self { magic: Some(magic), mode, database: database.to_path_buf() })
    }

    /// Replace the active mode. On failure the previous mode stays active.
    pub fn set_mode(&mut self, mode: MagicFlags) -> Result<()> {
        let Some(magic) = self.magic.as_mut() else {
            exn::bail!(ErrorKind::ModeChangeFailed(mode));
        };
        magic.set_flags(mode).or_raise(|| ErrorKind::ModeChangeFailed(mode))?;
        self.mode = mode;
        Ok(())
    }

    pub fn mode(&self) -> MagicFlags {
        self.mode
    }

    /// Path of the loaded database.
    pub fn database(&self) -> &Path {
        &self.database
    }

    pub fn is_closed(&self) -> bool {
        self.magic.is_none()
    }

    /// Classify `data` under the current mode; with the default mode this is
    /// the media type, e.g. `image/jpeg`.
    pub fn classify_mime(&self, data: &[u8]) -> Result<String> {
        let Some(magic) = self.magic.as_ref() else {
            exn::bail!(ErrorKind::ClassifyFailed(CLOSED.to_string()));
        };
        magic.buffer(data).or_raise(|| ErrorKind::ClassifyFailed(diagnostic(magic.error(), CLASSIFY_FAILED)))
    }

    /// Canonical extension of `data`, e.g. `jpeg`.
    ///
    /// The mode is switched to extension output for the duration of the call
    /// and restored afterwards, whether classification succeeded or not. When
    /// several extensions are known only the first is returned.
    pub fn classify_extension(&mut self, data: &[u8]) -> Result<String> {
        let mode = self.mode.difference(MagicFlags::MIME_TYPE) | MagicFlags::EXTENSION;
        let engine = ModeGuard::swap(self, mode)?;
        let extensions = engine.classify_mime(data)?;
        Ok(match extensions.split_once('/') {
            Some((first, _)) => first.to_string(),
            None => extensions,
        })
    }

    /// Media type and extension of the same bytes.
    pub fn classify_content_type(&mut self, data: &[u8]) -> Result<ContentType> {
        let media_type = self.classify_mime(data)?;
        let extension = self.classify_extension(data)?;
        Ok(ContentType::new(media_type, extension))
    }

    /// Release the matcher and its database. Further classification fails;
    /// closing again does nothing.
    pub fn close(&mut self) {
        if self.magic.take().is_some() {
            tracing::trace!(database = %self.database.display(), "Engine released");
        }
    }
}

impl Drop for SniffEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Restores the engine's previous mode when dropped.
struct ModeGuard<'e> {
    engine: &'e mut SniffEngine,
    previous: MagicFlags,
}
impl<'e> ModeGuard<'e> {
    fn swap(engine: &'e mut SniffEngine, mode: MagicFlags) -> Result<Self> {
        let previous = engine.mode;
        engine.set_mode(mode)?;
        Ok(Self { engine, previous })
    }
}

impl Deref for ModeGuard<'_> {
    type Target = SniffEngine;

    fn deref(&self) -> &SniffEngine {
        self.engine
    }
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.engine.set_mode(self.previous) {
            tracing::error!(mode = ?self.previous, error = ?err, "Could not restore engine mode");
        }
    }
}

/// Matcher diagnostic with its first character uppercased, or `fallback`.
fn diagnostic(message: Option<String>, fallback: &str) -> String {
    let Some(message) = message.filter(|m| !m.is_empty()) else {
        return fallback.to_string();
    };
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => fallback.to_string(),
    }
}
