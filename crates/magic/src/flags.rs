use bitflags::bitflags;

bitflags! {
    /// Matcher behaviour flags.
    ///
    /// Bit values are compatible with libmagic so flag sets can be shared
    /// with tooling that speaks its vocabulary.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MagicFlags: u32 {
        /// No special handling.
        const NONE = 0x0000000;
        /// Emit debugging events for every rule that is tested.
        const DEBUG = 0x0000001;
        /// Follow symlinks when classifying a path.
        const SYMLINK = 0x0000002;
        /// Look inside compressed content (unsupported).
        const COMPRESS = 0x0000004;
        /// Open block and character devices (unsupported).
        const DEVICES = 0x0000008;
        /// Report a MIME type instead of a description.
        const MIME_TYPE = 0x0000010;
        /// Report every match, not just the best one.
        const CONTINUE = 0x0000020;
        /// Check the database for consistency while loading.
        const CHECK = 0x0000040;
        /// Preserve access times of inspected files (unsupported).
        const PRESERVE_ATIME = 0x0000080;
        /// Don't escape unprintable characters in descriptions.
        const RAW = 0x0000100;
        /// Treat OS errors as failures instead of reporting them in-band.
        const ERROR = 0x0000200;
        /// Report the character encoding.
        const MIME_ENCODING = 0x0000400;
        /// Shorthand for `MIME_TYPE | MIME_ENCODING`.
        const MIME = Self::MIME_TYPE.bits() | Self::MIME_ENCODING.bits();
        /// Report the Apple creator and type (unsupported).
        const APPLE = 0x0000800;
        /// Report a slash-separated list of extensions.
        const EXTENSION = 0x1000000;
        /// Report on the uncompressed data only (unsupported).
        const COMPRESS_TRANSP = 0x2000000;
        /// Shorthand for every output mode that isn't a description.
        const NODESC = Self::EXTENSION.bits() | Self::MIME.bits() | Self::APPLE.bits();
        /// Accepted for libmagic compatibility. Compressed content is never
        /// decompressed, so this has no effect.
        const NO_CHECK_COMPRESS = 0x0001000;
        /// Accepted for libmagic compatibility. Tar archives are only matched by
        /// signature rules, so this has no effect.
        const NO_CHECK_TAR = 0x0002000;
        /// Don't consult the signature database.
        const NO_CHECK_SOFT = 0x0004000;
        /// Accepted for libmagic compatibility. There is no EMX check, so this
        /// has no effect.
        const NO_CHECK_APPTYPE = 0x0008000;
        /// Accepted for libmagic compatibility. ELF files are only matched by
        /// signature rules, so this has no effect.
        const NO_CHECK_ELF = 0x0010000;
        /// Don't fall back to text detection.
        const NO_CHECK_TEXT = 0x0020000;
        /// Accepted for libmagic compatibility. Composite Document Files are only
        /// matched by signature rules, so this has no effect.
        const NO_CHECK_CDF = 0x0040000;
        /// Accepted for libmagic compatibility. Text is never scanned for
        /// language tokens, so this has no effect.
        const NO_CHECK_TOKENS = 0x0100000;
        /// Don't check text encodings beyond ASCII.
        const NO_CHECK_ENCODING = 0x0200000;
    }
}

impl MagicFlags {
    /// Flags the matcher refuses. It implements neither decompression nor
    /// device access.
    pub const UNSUPPORTED: Self = Self::COMPRESS
        .union(Self::COMPRESS_TRANSP)
        .union(Self::DEVICES)
        .union(Self::PRESERVE_ATIME)
        .union(Self::APPLE);

    /// Returns the subset of `self` that the matcher cannot honour.
    #[inline]
    #[must_use]
    pub fn unsupported(&self) -> Self {
        self.intersection(Self::UNSUPPORTED)
    }

    /// Which kind of string a classification produces under these flags.
    pub(crate) fn output(&self) -> Output {
        if self.contains(Self::EXTENSION) {
            Output::Extension
        } else if self.intersects(Self::MIME) {
            Output::Mime
        } else {
            Output::Description
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Output {
    Description,
    Mime,
    Extension,
}
