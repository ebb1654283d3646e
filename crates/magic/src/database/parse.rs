//! Line parser for the text signature database format.
//!
//! ```text
//! # offset  type        value           description
//! 0         string      \xff\xd8\xff    JPEG image data
//! !:mime    image/jpeg
//! !:ext     jpeg/jpg/jpe/jfif
//! >6        string      JFIF            \b, JFIF standard
//! ```

use super::rule::{Adjustment, Comparison, Endian, Rule, Test, Width};
use derive_more::{Display, Error};

/// Syntax error with the line it was found on.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
#[display("line {line}: {message}")]
pub(crate) struct ParseError {
    line: usize,
    message: String,
}

type ParseResult<T> = std::result::Result<T, String>;

/// Parse database text into top-level rules, in declaration order.
pub(crate) fn parse(source: &str) -> Result<Vec<Rule>, ParseError> {
    let mut rules = Vec::new();
    let mut stack: Vec<Rule> = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let result = match text.strip_prefix("!:") {
            Some(directive) => match stack.last_mut() {
                Some(rule) => apply_directive(rule, directive),
                None => Err("directive without a preceding rule".to_string()),
            },
            None => parse_rule(line, text).and_then(|(level, rule)| {
                if level > stack.len() {
                    return Err(format!("continuation level {level} has no parent rule"));
                }
                unwind(&mut stack, &mut rules, level);
                stack.push(rule);
                Ok(())
            }),
        };
        result.map_err(|message| ParseError { line, message })?;
    }
    unwind(&mut stack, &mut rules, 0);
    Ok(rules)
}

/// Pop rules deeper than `depth` off the stack, attaching each to its parent.
fn unwind(stack: &mut Vec<Rule>, rules: &mut Vec<Rule>, depth: usize) {
    while stack.len() > depth {
        let Some(rule) = stack.pop() else {
            break;
        };
        match stack.last_mut() {
            Some(parent) => parent.children.push(rule),
            None => rules.push(rule),
        }
    }
}

fn apply_directive(rule: &mut Rule, directive: &str) -> ParseResult<()> {
    let (name, value) = split_field(directive);
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("directive `{name}' requires a value"));
    }
    match name {
        "mime" => {
            if !value.contains('/') {
                return Err(format!("invalid MIME type `{value}'"));
            }
            replace_once(&mut rule.mime, value, "mime")
        },
        "ext" => replace_once(&mut rule.extensions, value, "ext"),
        "strength" => {
            if rule.adjustment.is_some() {
                return Err("duplicate `strength' directive".to_string());
            }
            rule.adjustment = Some(parse_adjustment(value)?);
            Ok(())
        },
        _ => Err(format!("unknown directive `{name}'")),
    }
}

fn replace_once(slot: &mut Option<String>, value: &str, name: &str) -> ParseResult<()> {
    if slot.is_some() {
        return Err(format!("duplicate `{name}' directive"));
    }
    *slot = Some(value.to_string());
    Ok(())
}

fn parse_adjustment(value: &str) -> ParseResult<Adjustment> {
    let value: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let mut chars = value.chars();
    let op = chars.next().ok_or_else(|| "empty strength".to_string())?;
    let amount: i32 = chars.as_str().parse().map_err(|_| format!("invalid strength `{value}'"))?;
    match op {
        '+' => Ok(Adjustment::Add(amount)),
        '-' => Ok(Adjustment::Subtract(amount)),
        '*' => Ok(Adjustment::Multiply(amount)),
        '/' if amount == 0 => Err("strength divisor cannot be zero".to_string()),
        '/' => Ok(Adjustment::Divide(amount)),
        _ => Err(format!("invalid strength operator `{op}'")),
    }
}

fn parse_rule(line: usize, text: &str) -> ParseResult<(usize, Rule)> {
    let level = text.bytes().take_while(|&b| b == b'>').count();
    let (offset, rest) = split_field(&text[level..]);
    let offset = parse_number(offset)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| format!("invalid offset `{offset}'"))?;
    let (kind, rest) = split_field(rest);
    if kind.is_empty() {
        return Err("missing type".to_string());
    }
    let (value, description) = split_field(rest);
    if value.is_empty() {
        return Err("missing test value".to_string());
    }
    let test = parse_test(kind, value)?;
    Ok((level, Rule::new(line, offset, test, description.trim().to_string())))
}

fn parse_test(kind: &str, value: &str) -> ParseResult<Test> {
    let (name, modifiers) = kind.split_once('/').unwrap_or((kind, ""));
    match name {
        "string" => {
            let case_insensitive = parse_string_modifiers(modifiers)?;
            Ok(Test::String { pattern: unescape(value)?, case_insensitive })
        },
        "search" => {
            let (range, modifiers) = modifiers.split_once('/').unwrap_or((modifiers, ""));
            let range = parse_number(range)
                .and_then(|n| usize::try_from(n).ok())
                .filter(|&n| n > 0)
                .ok_or_else(|| format!("search requires a positive range, found `{kind}'"))?;
            let case_insensitive = parse_string_modifiers(modifiers)?;
            Ok(Test::Search { pattern: unescape(value)?, range, case_insensitive })
        },
        _ => parse_numeric(kind, value),
    }
}

fn parse_string_modifiers(modifiers: &str) -> ParseResult<bool> {
    match modifiers {
        "" => Ok(false),
        "c" => Ok(true),
        other => Err(format!("unknown string modifier `{other}'")),
    }
}

fn parse_numeric(kind: &str, value: &str) -> ParseResult<Test> {
    let (name, mask) = match kind.split_once('&') {
        Some((name, mask)) => {
            let mask = parse_number(mask).ok_or_else(|| format!("invalid mask `{mask}'"))?;
            (name, Some(mask))
        },
        None => (kind, None),
    };
    let (width, endian) = match name {
        "byte" => (Width::Byte, Endian::Big),
        "beshort" => (Width::Short, Endian::Big),
        "leshort" => (Width::Short, Endian::Little),
        "belong" => (Width::Long, Endian::Big),
        "lelong" => (Width::Long, Endian::Little),
        "bequad" => (Width::Quad, Endian::Big),
        "lequad" => (Width::Quad, Endian::Little),
        _ => return Err(format!("unknown type `{kind}'")),
    };
    if value == "x" {
        return Ok(Test::Numeric { width, endian, mask, comparison: Comparison::Any, value: 0 });
    }
    let (comparison, number) = match value.as_bytes()[0] {
        b'=' => (Comparison::Equal, &value[1..]),
        b'!' => (Comparison::NotEqual, &value[1..]),
        b'<' => (Comparison::Less, &value[1..]),
        b'>' => (Comparison::Greater, &value[1..]),
        b'&' => (Comparison::AllSet, &value[1..]),
        _ => (Comparison::Equal, value),
    };
    let number = parse_number(number).ok_or_else(|| format!("invalid numeric value `{value}'"))?;
    let mask = mask.map(|m| m & width.mask());
    Ok(Test::Numeric { width, endian, mask, comparison, value: number & width.mask() })
}

/// Parse a decimal, `0x` hexadecimal, or negative decimal number.
///
/// Negative values wrap to their two's complement representation.
fn parse_number(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if text.starts_with('-') {
        return text.parse::<i64>().ok().map(|n| n as u64);
    }
    text.parse::<u64>().ok()
}

/// Split off the first whitespace-delimited field. A backslash escapes the
/// following character, so `\ ` keeps a space inside a string value.
fn split_field(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c.is_whitespace() => return (&text[..i], &text[i..]),
            _ => {},
        }
    }
    (text, "")
}

fn unescape(raw: &str) -> ParseResult<Vec<u8>> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let escape = *bytes.get(i).ok_or_else(|| "trailing backslash in string".to_string())?;
        i += 1;
        match escape {
            b'x' => {
                let digits = bytes[i..].iter().take(2).take_while(|b| b.is_ascii_hexdigit()).count();
                if digits == 0 {
                    return Err(format!("invalid hex escape in `{raw}'"));
                }
                // Hex digits are ASCII, so the slice is valid UTF-8.
                let hex = std::str::from_utf8(&bytes[i..i + digits]).map_err(|e| e.to_string())?;
                out.push(u8::from_str_radix(hex, 16).map_err(|e| e.to_string())?);
                i += digits;
            },
            b'0'..=b'7' => {
                let digits = 1 + bytes[i..].iter().take(2).take_while(|b| (b'0'..=b'7').contains(b)).count();
                let octal = std::str::from_utf8(&bytes[i - 1..i - 1 + digits]).map_err(|e| e.to_string())?;
                let value = u16::from_str_radix(octal, 8).map_err(|e| e.to_string())?;
                out.push(u8::try_from(value).map_err(|_| format!("octal escape out of range in `{raw}'"))?);
                i += digits - 1;
            },
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return Err("empty string pattern".to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r"\xff\xd8\xff", b"\xff\xd8\xff".as_slice())]
    #[case(r"PK\003\004", b"PK\x03\x04".as_slice())]
    #[case(r"\0", b"\x00".as_slice())]
    #[case(r"\x1", b"\x01".as_slice())]
    #[case(r"\x1fG", b"\x1fG".as_slice())]
    #[case(r"a\ b", b"a b".as_slice())]
    #[case(r"\r\n\t\\", b"\r\n\t\\".as_slice())]
    #[case(r"\377", b"\xff".as_slice())]
    fn unescape_valid(#[case] raw: &str, #[case] expected: &[u8]) {
        assert_eq!(unescape(raw).unwrap(), expected);
    }

    #[rstest]
    #[case(r"abc\")]
    #[case(r"\xZZ")]
    #[case(r"\777")]
    fn unescape_invalid(#[case] raw: &str) {
        assert!(unescape(raw).is_err());
    }

    #[rstest]
    #[case("0", Some(0))]
    #[case("257", Some(257))]
    #[case("0x1F", Some(0x1f))]
    #[case("-1", Some(u64::MAX))]
    #[case("ten", None)]
    #[case("", None)]
    fn number(#[case] text: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_number(text), expected);
    }

    #[rstest]
    #[case("0 string abc rest of line", ("0", " string abc rest of line"))]
    #[case(r"a\ b\tc d", (r"a\ b\tc", " d"))]
    #[case("   lonely", ("lonely", ""))]
    fn split(#[case] text: &str, #[case] expected: (&str, &str)) {
        assert_eq!(split_field(text), expected);
    }

    #[test]
    fn parse_nested_rules_and_directives() {
        let source = "\
# comment
0\tstring\tRIFF\tRIFF data
>8\tstring\tWEBP\tWeb/P image
!:mime\timage/webp
!:ext\twebp
>8\tstring\tWAVE\tWAVE audio
>>20\tleshort\t1\tMicrosoft PCM
0\tbelong\t0xcafebabe\tcompiled Java class data
!:strength +20
";
        let rules = parse(source).unwrap();
        assert_eq!(rules.len(), 2);
        let riff = &rules[0];
        assert_eq!(riff.line(), 2);
        assert_eq!(riff.description(), "RIFF data");
        assert_eq!(riff.children().len(), 2);
        assert_eq!(riff.children()[0].mime(), Some("image/webp"));
        assert_eq!(riff.children()[0].extensions(), Some("webp"));
        assert_eq!(riff.children()[1].children().len(), 1);
        assert_eq!(rules[1].adjustment, Some(Adjustment::Add(20)));
        assert_eq!(
            rules[1].test,
            Test::Numeric {
                width: Width::Long,
                endian: Endian::Big,
                mask: None,
                comparison: Comparison::Equal,
                value: 0xcafe_babe
            }
        );
    }

    #[test]
    fn parse_numeric_operators_and_masks() {
        let rules = parse("0 belong&0xffffff00 >0x100 masked\n4 byte x any\n").unwrap();
        assert_eq!(
            rules[0].test,
            Test::Numeric {
                width: Width::Long,
                endian: Endian::Big,
                mask: Some(0xffff_ff00),
                comparison: Comparison::Greater,
                value: 0x100
            }
        );
        assert!(matches!(rules[1].test, Test::Numeric { comparison: Comparison::Any, .. }));
    }

    #[test]
    fn parse_search_with_modifiers() {
        let rules = parse("0 search/256/c <html HTML document\n").unwrap();
        assert_eq!(rules[0].test, Test::Search { pattern: b"<html".to_vec(), range: 256, case_insensitive: true });
    }

    #[rstest]
    #[case("!:mime image/png\n", "line 1: directive without a preceding rule")]
    #[case("0 string abc x\n>>4 byte 1 y\n", "line 2: continuation level 2 has no parent rule")]
    #[case("0 word 1 unknown\n", "line 1: unknown type `word'")]
    #[case("zero string abc\n", "line 1: invalid offset `zero'")]
    #[case("0 string\n", "line 1: missing test value")]
    #[case("0 search/0 abc\n", "line 1: search requires a positive range, found `search/0'")]
    #[case("0 string abc\n!:mime png\n", "line 2: invalid MIME type `png'")]
    #[case("0 string abc\n!:ext a\n!:ext b\n", "line 3: duplicate `ext' directive")]
    #[case("0 string abc\n!:strength /0\n", "line 2: strength divisor cannot be zero")]
    #[case("0 string abc\n!:apple ????\n", "line 2: unknown directive `apple'")]
    #[case("0 string/x abc\n", "line 1: unknown string modifier `x'")]
    fn parse_errors(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(parse(source).unwrap_err().to_string(), expected);
    }
}
