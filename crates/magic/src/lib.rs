//! Magic-number matching against a text signature database.
//!
//! This crate provides the low-level matcher behind content sniffing:
//!
//! - **[`Database`]**: an immutable rule set parsed from a signature file and
//!   ranked by strength, so overlapping signatures resolve deterministically
//! - **[`Magic`]**: a matcher handle that owns one loaded database and a set of
//!   [`MagicFlags`] selecting what a classification reports (description, MIME
//!   type, charset, or extension list)
//!
//! A [`Magic`] handle is [`Send`] but not [`Sync`]; use one per thread.
//!
//! # Example
//!
//! ```
//! use sniff_magic::{BUNDLED_DATABASE, Magic, MagicFlags};
//!
//! let mut magic = Magic::open(MagicFlags::MIME_TYPE).unwrap();
//! magic.load(BUNDLED_DATABASE).unwrap();
//! assert_eq!(magic.buffer(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").unwrap(), "image/png");
//! ```

pub mod database;
pub mod error;
mod flags;
mod matcher;
mod text;

pub use crate::database::Database;
pub use crate::flags::MagicFlags;
pub use crate::matcher::UNKNOWN_EXTENSION;
pub use crate::text::Encoding;

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::cell::RefCell;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Signature database shipped with this crate.
pub const BUNDLED_DATABASE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/magic.db");

/// Version of the matcher.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on how much of a file [`Magic::file`] inspects.
const FILE_READ_LIMIT: u64 = 64 * 1024;

/// A matcher handle.
///
/// Owns at most one loaded [`Database`] and the active [`MagicFlags`]. The
/// diagnostic of the most recent failed operation is available from
/// [`error`](Self::error).
#[derive(Debug)]
pub struct Magic {
    flags: MagicFlags,
    database: Option<Database>,
    last_error: RefCell<Option<String>>,
}
impl Magic {
    /// Create a matcher with `flags` and no database.
    ///
    /// # Errors
    ///
    /// [`InvalidFlags`](ErrorKind::InvalidFlags) if `flags` contains any of
    /// [`MagicFlags::UNSUPPORTED`].
    pub fn open(flags: MagicFlags) -> Result<Self> {
        let unsupported = flags.unsupported();
        if !unsupported.is_empty() {
            exn::bail!(ErrorKind::InvalidFlags(unsupported));
        }
        Ok(Self { flags, database: None, last_error: RefCell::new(None) })
    }

    /// Load the database at `path`, replacing any previously loaded one.
    ///
    /// On failure no database remains loaded.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.clear_error();
        self.database = None;
        let database = Database::load(path).inspect_err(|e| self.record(&**e))?;
        if self.flags.contains(MagicFlags::CHECK) {
            for warning in database.check() {
                tracing::warn!(path = ?database.path(), "{warning}");
            }
        }
        self.database = Some(database);
        Ok(())
    }

    /// Replace the active flags. Either all of `flags` applies or nothing
    /// changes.
    pub fn set_flags(&mut self, flags: MagicFlags) -> Result<()> {
        self.clear_error();
        let unsupported = flags.unsupported();
        if !unsupported.is_empty() {
            return self.fail(ErrorKind::InvalidFlags(unsupported));
        }
        self.flags = flags;
        Ok(())
    }

    pub fn flags(&self) -> MagicFlags {
        self.flags
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    /// Diagnostic text of the last failed operation, if the most recent
    /// operation failed.
    pub fn error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    /// Classify an in-memory buffer.
    pub fn buffer(&self, data: &[u8]) -> Result<String> {
        self.clear_error();
        let database = self.require_database()?;
        match matcher::classify(database, self.flags, data) {
            Ok(result) => Ok(result),
            Err(message) => self.fail(ErrorKind::Classify(message)),
        }
    }

    /// Classify the file at `path`.
    ///
    /// Symlinks, directories, empty files, and other special files are
    /// reported by kind without reading them. When [`MagicFlags::ERROR`] is
    /// not set, operating system errors are reported in-band as
    /// ``cannot open `PATH' (REASON)`` instead of failing.
    pub fn file(&self, path: impl AsRef<Path>) -> Result<String> {
        self.clear_error();
        let path = path.as_ref();
        self.require_database()?;
        let metadata = match self.flags.contains(MagicFlags::SYMLINK) {
            true => fs::metadata(path),
            false => fs::symlink_metadata(path),
        };
        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(e) => return self.os_error(path, e),
        };
        let kind = metadata.file_type();
        if kind.is_symlink() {
            let target = fs::read_link(path).map(|t| t.display().to_string()).unwrap_or_default();
            return Ok(self.special(Special::Symlink(target)));
        }
        if kind.is_dir() {
            return Ok(self.special(Special::Directory));
        }
        if !kind.is_file() {
            return Ok(self.special(Special::from_file_type(&kind)));
        }
        if metadata.len() == 0 {
            return Ok(self.special(Special::Empty));
        }
        let mut data = Vec::new();
        let read = fs::File::open(path).and_then(|file| file.take(FILE_READ_LIMIT).read_to_end(&mut data));
        if let Err(e) = read {
            return self.os_error(path, e);
        }
        self.buffer(&data)
    }

    fn require_database(&self) -> Result<&Database> {
        self.database.as_ref().ok_or_raise(|| {
            self.record(&ErrorKind::NoDatabase);
            ErrorKind::NoDatabase
        })
    }

    fn os_error(&self, path: &Path, e: std::io::Error) -> Result<String> {
        let message = format!("cannot open `{}' ({e})", path.display());
        if self.flags.contains(MagicFlags::ERROR) {
            self.record(&message);
            return Err(e).or_raise(|| ErrorKind::Io);
        }
        Ok(message)
    }

    fn special(&self, special: Special) -> String {
        let output = self.flags.output();
        let value = match output {
            flags::Output::Description => special.description(),
            flags::Output::Mime => special.mime().to_string(),
            flags::Output::Extension => UNKNOWN_EXTENSION.to_string(),
        };
        match output {
            flags::Output::Mime if self.flags.contains(MagicFlags::MIME_TYPE | MagicFlags::MIME_ENCODING) => {
                format!("{value}; charset=binary")
            },
            flags::Output::Mime if self.flags.contains(MagicFlags::MIME_ENCODING) => "binary".to_string(),
            _ => value,
        }
    }

    fn fail<T>(&self, kind: ErrorKind) -> Result<T> {
        self.record(&kind);
        exn::bail!(kind)
    }

    fn record(&self, message: &impl ToString) {
        *self.last_error.borrow_mut() = Some(message.to_string());
    }

    fn clear_error(&self) {
        self.last_error.borrow_mut().take();
    }
}

/// Things a path can be that are reported without reading content.
enum Special {
    Symlink(String),
    Directory,
    Empty,
    Fifo,
    Socket,
    CharDevice,
    BlockDevice,
    Unknown,
}
impl Special {
    #[cfg(unix)]
    fn from_file_type(kind: &fs::FileType) -> Self {
        use std::os::unix::fs::FileTypeExt;
        match kind {
            k if k.is_fifo() => Special::Fifo,
            k if k.is_socket() => Special::Socket,
            k if k.is_char_device() => Special::CharDevice,
            k if k.is_block_device() => Special::BlockDevice,
            _ => Special::Unknown,
        }
    }

    #[cfg(not(unix))]
    fn from_file_type(_kind: &fs::FileType) -> Self {
        Special::Unknown
    }

    fn mime(&self) -> &'static str {
        match self {
            Special::Symlink(_) => "inode/symlink",
            Special::Directory => "inode/directory",
            Special::Empty => "inode/x-empty",
            Special::Fifo => "inode/fifo",
            Special::Socket => "inode/socket",
            Special::CharDevice => "inode/chardevice",
            Special::BlockDevice => "inode/blockdevice",
            Special::Unknown => "inode/x-special",
        }
    }

    fn description(&self) -> String {
        match self {
            Special::Symlink(target) => format!("symbolic link to {target}"),
            Special::Directory => "directory".to_string(),
            Special::Empty => "empty".to_string(),
            Special::Fifo => "fifo (named pipe)".to_string(),
            Special::Socket => "socket".to_string(),
            Special::CharDevice => "character special".to_string(),
            Special::BlockDevice => "block special".to_string(),
            Special::Unknown => "special file".to_string(),
        }
    }
}
