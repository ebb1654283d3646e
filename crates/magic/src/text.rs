//! Text and character-encoding fallback for content no signature claims.

/// Character encoding of a byte prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Binary,
    Ascii,
    Utf8,
}
impl Encoding {
    /// Detect the encoding of `data`.
    ///
    /// `data` is usually a prefix, so a multibyte UTF-8 sequence cut off at
    /// the very end does not disqualify it, as long as a complete non-ASCII
    /// character precedes it.
    pub fn detect(data: &[u8], check_utf8: bool) -> Self {
        if data.iter().copied().all(is_text_byte) {
            return Encoding::Ascii;
        }
        if check_utf8 {
            let valid = match std::str::from_utf8(data) {
                Ok(text) => Some(text),
                Err(e) if e.error_len().is_none() => std::str::from_utf8(&data[..e.valid_up_to()]).ok(),
                Err(_) => None,
            };
            if valid.is_some_and(|text| !text.is_ascii() && text.chars().all(is_text_char)) {
                return Encoding::Utf8;
            }
        }
        Encoding::Binary
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, Encoding::Binary)
    }

    /// Charset name as reported in a `charset=` parameter.
    pub fn charset(&self) -> &'static str {
        match self {
            Encoding::Binary => "binary",
            Encoding::Ascii => "us-ascii",
            Encoding::Utf8 => "utf-8",
        }
    }

    pub(crate) fn description(&self) -> &'static str {
        match self {
            Encoding::Binary => "data",
            Encoding::Ascii => "ASCII text",
            Encoding::Utf8 => "UTF-8 Unicode text",
        }
    }
}

/// Printable ASCII plus the control characters common in text files
/// (BEL, BS, TAB, LF, VT, FF, CR, ESC).
fn is_text_byte(b: u8) -> bool {
    matches!(b, 0x07..=0x0d | 0x1b | 0x20..=0x7e)
}

fn is_text_char(c: char) -> bool {
    match u8::try_from(c) {
        Ok(b) if b.is_ascii() => is_text_byte(b),
        _ => !c.is_control(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"plain old text\r\n", true, Encoding::Ascii)]
    #[case("naïve café".as_bytes(), true, Encoding::Utf8)]
    #[case("naïve café".as_bytes(), false, Encoding::Binary)]
    // "é" cut in half by the prefix boundary
    #[case(&"naïve café".as_bytes()[..11], true, Encoding::Utf8)]
    #[case(&"café".as_bytes()[..4], true, Encoding::Binary)]
    #[case(b"\xc3", true, Encoding::Binary)]
    #[case(b"\xf0\x9f\x98", true, Encoding::Binary)]
    #[case(b"\xff\xd8\xff\xe0", true, Encoding::Binary)]
    #[case(b"text\x00with nul", true, Encoding::Binary)]
    #[case("ctrl\u{0085}".as_bytes(), true, Encoding::Binary)]
    fn detect(#[case] data: &[u8], #[case] check_utf8: bool, #[case] expected: Encoding) {
        assert_eq!(Encoding::detect(data, check_utf8), expected);
    }

    #[test]
    fn charset_names() {
        assert_eq!(Encoding::Binary.charset(), "binary");
        assert_eq!(Encoding::Ascii.charset(), "us-ascii");
        assert_eq!(Encoding::Utf8.charset(), "utf-8");
        assert!(Encoding::Utf8.is_text());
        assert!(!Encoding::Binary.is_text());
    }
}
