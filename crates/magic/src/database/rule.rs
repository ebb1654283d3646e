//! Signature rules and the byte tests they run.

use memchr::memmem;

/// Strength multiplier, one unit per byte of pattern.
pub(crate) const MULT: i32 = 10;

/// Byte order of a numeric test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Width of a numeric test in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte = 1,
    Short = 2,
    Long = 4,
    Quad = 8,
}
impl Width {
    #[inline]
    pub(crate) fn bytes(self) -> usize {
        self as usize
    }

    /// Mask covering every bit of a value of this width.
    #[inline]
    pub(crate) fn mask(self) -> u64 {
        match self {
            Width::Quad => u64::MAX,
            _ => (1u64 << (self.bytes() * 8)) - 1,
        }
    }
}

/// How a numeric value read from the content is compared to the rule value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    Greater,
    /// Every bit of the rule value is set in the content value.
    AllSet,
    /// Matches any value, as long as enough bytes are present.
    Any,
}

/// The byte test a rule performs at its offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Test {
    Numeric {
        width: Width,
        endian: Endian,
        mask: Option<u64>,
        comparison: Comparison,
        value: u64,
    },
    String {
        pattern: Vec<u8>,
        case_insensitive: bool,
    },
    Search {
        pattern: Vec<u8>,
        /// Number of starting positions scanned after the offset.
        range: usize,
        case_insensitive: bool,
    },
}
impl Test {
    /// Does this test match `data` at `offset`?
    ///
    /// Content shorter than the test needs never matches.
    pub(crate) fn matches(&self, data: &[u8], offset: usize) -> bool {
        match self {
            Test::String { pattern, case_insensitive } => {
                let Some(window) = offset.checked_add(pattern.len()).and_then(|end| data.get(offset..end)) else {
                    return false;
                };
                match case_insensitive {
                    true => window.eq_ignore_ascii_case(pattern),
                    false => window == pattern.as_slice(),
                }
            },
            Test::Search { pattern, range, case_insensitive } => {
                let Some(tail) = data.get(offset..) else {
                    return false;
                };
                let end = tail.len().min(range.saturating_add(pattern.len()));
                let haystack = &tail[..end];
                match case_insensitive {
                    true => haystack.windows(pattern.len()).any(|w| w.eq_ignore_ascii_case(pattern)),
                    false => memmem::find(haystack, pattern).is_some(),
                }
            },
            Test::Numeric { width, endian, mask, comparison, value } => {
                let Some(raw) = read(data, offset, *width, *endian) else {
                    return false;
                };
                let actual = mask.map_or(raw, |m| raw & m);
                match comparison {
                    Comparison::Equal => actual == *value,
                    Comparison::NotEqual => actual != *value,
                    Comparison::Less => actual < *value,
                    Comparison::Greater => actual > *value,
                    Comparison::AllSet => actual & value == *value,
                    Comparison::Any => true,
                }
            },
        }
    }
}

fn read(data: &[u8], offset: usize, width: Width, endian: Endian) -> Option<u64> {
    let n = width.bytes();
    let bytes = data.get(offset..offset.checked_add(n)?)?;
    let mut buf = [0u8; 8];
    Some(match endian {
        Endian::Big => {
            buf[8 - n..].copy_from_slice(bytes);
            u64::from_be_bytes(buf)
        },
        Endian::Little => {
            buf[..n].copy_from_slice(bytes);
            u64::from_le_bytes(buf)
        },
    })
}

/// Manual strength adjustment from a `!:strength` directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adjustment {
    Add(i32),
    Subtract(i32),
    Multiply(i32),
    /// Divisor is never zero; the parser rejects it.
    Divide(i32),
}
impl Adjustment {
    fn apply(self, value: i32) -> i32 {
        match self {
            Adjustment::Add(n) => value.saturating_add(n),
            Adjustment::Subtract(n) => value.saturating_sub(n),
            Adjustment::Multiply(n) => value.saturating_mul(n),
            Adjustment::Divide(n) => value / n,
        }
    }
}

/// One signature: a test at an offset, what it means, and optional
/// continuation rules refining it.
#[derive(Clone, Debug)]
pub struct Rule {
    pub(crate) line: usize,
    pub(crate) offset: usize,
    pub(crate) test: Test,
    pub(crate) description: String,
    pub(crate) mime: Option<String>,
    pub(crate) extensions: Option<String>,
    pub(crate) adjustment: Option<Adjustment>,
    pub(crate) children: Vec<Rule>,
}
impl Rule {
    pub(crate) fn new(line: usize, offset: usize, test: Test, description: String) -> Self {
        Self { line, offset, test, description, mime: None, extensions: None, adjustment: None, children: Vec::new() }
    }

    /// Line of the database file this rule was declared on.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    /// Slash-separated extension list, preferred extension first.
    pub fn extensions(&self) -> Option<&str> {
        self.extensions.as_deref()
    }

    pub fn children(&self) -> &[Rule] {
        &self.children
    }

    /// Ranking weight of this rule; higher strength rules are tried first.
    ///
    /// Longer and more exact patterns are stronger. Always at least `1`.
    pub fn strength(&self) -> i32 {
        let mut value = 2 * MULT;
        let comparison = match &self.test {
            Test::String { pattern, .. } => {
                value += len_i32(pattern.len()).saturating_mul(MULT);
                Comparison::Equal
            },
            Test::Search { pattern, .. } => {
                let len = len_i32(pattern.len()).max(1);
                value += len.saturating_mul((MULT / len).max(1));
                Comparison::Equal
            },
            Test::Numeric { width, comparison, .. } => {
                value += len_i32(width.bytes()) * MULT;
                *comparison
            },
        };
        match comparison {
            Comparison::Equal => value += MULT,
            Comparison::Less | Comparison::Greater => value -= 2 * MULT,
            Comparison::NotEqual | Comparison::AllSet => value -= MULT,
            Comparison::Any => value = 0,
        }
        if let Some(adjustment) = self.adjustment {
            value = adjustment.apply(value);
        }
        value.max(1)
    }

    /// Evaluate this rule and its continuations against `data`.
    pub(crate) fn evaluate(&self, data: &[u8]) -> Option<Evaluation<'_>> {
        if !self.test.matches(data, self.offset) {
            return None;
        }
        let mut evaluation = Evaluation {
            description: self.description.strip_prefix(NO_SPACE).unwrap_or(&self.description).to_string(),
            mime: self.mime.as_deref(),
            extensions: self.extensions.as_deref(),
        };
        self.descend(data, &mut evaluation);
        Some(evaluation)
    }

    fn descend<'r>(&'r self, data: &[u8], evaluation: &mut Evaluation<'r>) {
        for child in &self.children {
            if !child.test.matches(data, child.offset) {
                continue;
            }
            append_description(&mut evaluation.description, &child.description);
            // Later (and therefore more specific) declarations win.
            if let Some(mime) = child.mime.as_deref() {
                evaluation.mime = Some(mime);
            }
            if let Some(extensions) = child.extensions.as_deref() {
                evaluation.extensions = Some(extensions);
            }
            child.descend(data, evaluation);
        }
    }
}

/// Description prefix that suppresses the separating space.
const NO_SPACE: &str = "\\b";

fn append_description(description: &mut String, addition: &str) {
    match addition.strip_prefix(NO_SPACE) {
        Some(rest) => description.push_str(rest),
        None if addition.is_empty() => {},
        None => {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(addition);
        },
    }
}

fn len_i32(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

/// Outcome of a matching rule, after continuations were applied.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Evaluation<'r> {
    pub(crate) description: String,
    pub(crate) mime: Option<&'r str>,
    pub(crate) extensions: Option<&'r str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn string(pattern: &[u8]) -> Test {
        Test::String { pattern: pattern.to_vec(), case_insensitive: false }
    }

    fn numeric(width: Width, endian: Endian, comparison: Comparison, value: u64) -> Test {
        Test::Numeric { width, endian, mask: None, comparison, value }
    }

    #[rstest]
    #[case(b"\xff\xd8\xff\xe0", 0, true)]
    #[case(b"xx\xff\xd8\xff", 2, true)]
    #[case(b"\xff\xd8", 0, false)]
    #[case(b"\xff\xd8\xff", 1, false)]
    #[case(b"", usize::MAX, false)]
    fn string_test(#[case] data: &[u8], #[case] offset: usize, #[case] expected: bool) {
        assert_eq!(string(b"\xff\xd8\xff").matches(data, offset), expected);
    }

    #[test]
    fn string_test_case_insensitive() {
        let test = Test::String { pattern: b"<html".to_vec(), case_insensitive: true };
        assert!(test.matches(b"<HTML lang=en>", 0));
        assert!(!string(b"<html").matches(b"<HTML lang=en>", 0));
    }

    #[rstest]
    #[case(b"<!DOCTYPE html>", 0, true)]
    #[case(b"   \n\n<!DOCTYPE html>", 0, true)]
    #[case(b"0123456789<!DOCTYPE html>", 0, false)]
    #[case(b"<!DOCTYPE", 0, false)]
    fn search_test(#[case] data: &[u8], #[case] offset: usize, #[case] expected: bool) {
        let test = Test::Search { pattern: b"<!DOCTYPE html".to_vec(), range: 8, case_insensitive: false };
        assert_eq!(test.matches(data, offset), expected);
    }

    #[rstest]
    #[case(numeric(Width::Short, Endian::Big, Comparison::Equal, 0x4d5a), b"MZ\x90\x00", true)]
    #[case(numeric(Width::Short, Endian::Little, Comparison::Equal, 0x5a4d), b"MZ\x90\x00", true)]
    #[case(numeric(Width::Long, Endian::Big, Comparison::Equal, 0x4d5a), b"MZ", false)]
    #[case(numeric(Width::Byte, Endian::Big, Comparison::Greater, 0x10), b"\x11", true)]
    #[case(numeric(Width::Byte, Endian::Big, Comparison::Less, 0x10), b"\x11", false)]
    #[case(numeric(Width::Byte, Endian::Big, Comparison::NotEqual, 0x10), b"\x11", true)]
    #[case(numeric(Width::Byte, Endian::Big, Comparison::AllSet, 0x03), b"\x07", true)]
    #[case(numeric(Width::Byte, Endian::Big, Comparison::AllSet, 0x09), b"\x07", false)]
    #[case(numeric(Width::Quad, Endian::Little, Comparison::Any, 0), b"\x00\x00\x00\x00\x00\x00\x00", false)]
    fn numeric_test(#[case] test: Test, #[case] data: &[u8], #[case] expected: bool) {
        assert_eq!(test.matches(data, 0), expected);
    }

    #[test]
    fn numeric_test_mask() {
        let test = Test::Numeric {
            width: Width::Long,
            endian: Endian::Big,
            mask: Some(0xffff_ff00),
            comparison: Comparison::Equal,
            value: 0xcafe_ba00,
        };
        assert!(test.matches(&[0xca, 0xfe, 0xba, 0xbe], 0));
        assert!(!test.matches(&[0xca, 0xfe, 0xbb, 0xbe], 0));
    }

    #[test]
    fn width_mask() {
        assert_eq!(Width::Byte.mask(), 0xff);
        assert_eq!(Width::Long.mask(), 0xffff_ffff);
        assert_eq!(Width::Quad.mask(), u64::MAX);
    }

    #[rstest]
    // 2*MULT base + 3 bytes + equality
    #[case(string(b"\xff\xd8\xff"), None, 60)]
    #[case(string(b"\xff\xd8\xff"), Some(Adjustment::Add(5)), 65)]
    #[case(string(b"\xff\xd8\xff"), Some(Adjustment::Divide(2)), 30)]
    #[case(numeric(Width::Long, Endian::Big, Comparison::Equal, 0), None, 70)]
    #[case(numeric(Width::Long, Endian::Big, Comparison::Greater, 0), None, 40)]
    #[case(numeric(Width::Byte, Endian::Big, Comparison::Any, 0), None, 1)]
    #[case(numeric(Width::Byte, Endian::Big, Comparison::Any, 0), Some(Adjustment::Subtract(50)), 1)]
    fn rule_strength(#[case] test: Test, #[case] adjustment: Option<Adjustment>, #[case] expected: i32) {
        let mut rule = Rule::new(1, 0, test, String::new());
        rule.adjustment = adjustment;
        assert_eq!(rule.strength(), expected);
    }

    #[test]
    fn evaluation_applies_matching_children_in_order() {
        let mut riff = Rule::new(1, 0, string(b"RIFF"), "RIFF data".to_string());
        let mut webp = Rule::new(2, 8, string(b"WEBP"), "\\b, Web/P image".to_string());
        webp.mime = Some("image/webp".to_string());
        webp.extensions = Some("webp".to_string());
        let mut wave = Rule::new(3, 8, string(b"WAVE"), "WAVE audio".to_string());
        wave.mime = Some("audio/x-wav".to_string());
        riff.children = vec![webp, wave];

        let webp_data = b"RIFF\x24\x00\x00\x00WEBPVP8 ";
        let evaluation = riff.evaluate(webp_data).unwrap();
        assert_eq!(evaluation.description, "RIFF data, Web/P image");
        assert_eq!(evaluation.mime, Some("image/webp"));
        assert_eq!(evaluation.extensions, Some("webp"));

        let bare = riff.evaluate(b"RIFF\x24\x00\x00\x00AVI LIST").unwrap();
        assert_eq!(bare.description, "RIFF data");
        assert_eq!(bare.mime, None);

        assert!(riff.evaluate(b"RIFX").is_none());
    }
}
