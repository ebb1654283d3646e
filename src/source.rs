//! Byte-prefix normalization.
//!
//! A [`Source`] is anything content can be sniffed from: a file path, an
//! in-memory buffer, or a seekable stream. Classification only ever looks at
//! the first few bytes, so each source is reduced to a prefix of at most
//! `limit` bytes before it reaches an engine.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Anything that can be read from and repositioned.
trait ReadSeek: Read + Seek {}
impl<T: Read + Seek + ?Sized> ReadSeek for T {}

enum Kind<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
    Stream(&'a mut dyn ReadSeek),
}

/// Content to classify, with an optional prefix size.
///
/// ```
/// use sniff::Source;
///
/// let data = vec![0xff, 0xd8, 0xff, 0xe0];
/// let source = Source::bytes(&data).limit(2);
/// # let _ = source;
/// ```
pub struct Source<'a> {
    kind: Kind<'a>,
    limit: Option<usize>,
}
impl<'a> Source<'a> {
    pub fn path(path: &'a Path) -> Self {
        Self { kind: Kind::Path(path), limit: None }
    }

    pub fn bytes(bytes: &'a [u8]) -> Self {
        Self { kind: Kind::Bytes(bytes), limit: None }
    }

    /// A stream whose position is restored after the prefix is read.
    ///
    /// The position is queried before anything is read; a stream that cannot
    /// report it is rejected with
    /// [`UnsupportedSource`](ErrorKind::UnsupportedSource) and left untouched.
    pub fn stream(stream: &'a mut (impl Read + Seek)) -> Self {
        Self { kind: Kind::Stream(stream), limit: None }
    }

    /// Inspect at most `limit` bytes instead of the cache's configured size.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reduce to the first `min(limit, available)` bytes.
    ///
    /// Buffers are borrowed, never copied.
    pub(crate) fn prefix(self, default_limit: usize) -> Result<Cow<'a, [u8]>> {
        let limit = self.limit.unwrap_or(default_limit);
        match self.kind {
            Kind::Bytes(bytes) => Ok(Cow::Borrowed(&bytes[..limit.min(bytes.len())])),
            Kind::Path(path) => {
                let file = File::open(path).or_raise(|| ErrorKind::Io)?;
                read_prefix(file, limit).map(Cow::Owned)
            },
            Kind::Stream(stream) => {
                let position = stream
                    .stream_position()
                    .or_raise(|| ErrorKind::UnsupportedSource("stream position cannot be determined".to_string()))?;
                let prefix = read_prefix(&mut *stream, limit);
                // Restore even when the read failed.
                stream.seek(SeekFrom::Start(position)).or_raise(|| ErrorKind::Io)?;
                prefix.map(Cow::Owned)
            },
        }
    }
}

fn read_prefix(reader: impl Read, limit: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(limit.min(64 * 1024));
    reader.take(u64::try_from(limit).unwrap_or(u64::MAX)).read_to_end(&mut buffer).or_raise(|| ErrorKind::Io)?;
    Ok(buffer)
}

impl<'a> From<&'a Path> for Source<'a> {
    fn from(path: &'a Path) -> Self {
        Self::path(path)
    }
}

impl<'a> From<&'a PathBuf> for Source<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Self::path(path)
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Source<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Source<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Self::bytes(bytes)
    }
}
