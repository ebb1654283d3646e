//! Classification of a byte buffer against a loaded database.

use crate::database::Database;
use crate::flags::{MagicFlags, Output};
use crate::text::Encoding;

/// Reported when no rule declares an extension for the content.
pub const UNKNOWN_EXTENSION: &str = "???";
const BINARY_MIME: &str = "application/octet-stream";
const TEXT_MIME: &str = "text/plain";
const CONTINUE_SEPARATOR: &str = "\n- ";

/// Classify `data` under `flags`, returning the matcher's output string or a
/// diagnostic.
pub(crate) fn classify(database: &Database, flags: MagicFlags, data: &[u8]) -> Result<String, String> {
    if data.is_empty() {
        return Err("no data to classify".to_string());
    }
    let output = flags.output();
    let encoding = Encoding::detect(data, !flags.contains(MagicFlags::NO_CHECK_ENCODING));
    let mut found: Vec<String> = Vec::new();

    if !flags.contains(MagicFlags::NO_CHECK_SOFT) {
        for rule in database.rules() {
            let Some(evaluation) = rule.evaluate(data) else {
                continue;
            };
            if flags.contains(MagicFlags::DEBUG) {
                tracing::debug!(line = rule.line(), strength = rule.strength(), "Signature matched");
            }
            let value = match output {
                Output::Description => Some(evaluation.description).filter(|d| !d.is_empty()),
                Output::Mime => evaluation.mime.map(str::to_owned),
                Output::Extension => evaluation.extensions.map(str::to_owned),
            };
            // A rule that says nothing about the requested output doesn't
            // count as the best match for it.
            let Some(value) = value else {
                continue;
            };
            found.push(value);
            if !flags.contains(MagicFlags::CONTINUE) {
                break;
            }
        }
    }

    if found.is_empty() {
        let text = encoding.is_text() && !flags.contains(MagicFlags::NO_CHECK_TEXT);
        found.push(
            match output {
                Output::Description if text => encoding.description(),
                Output::Description => Encoding::Binary.description(),
                Output::Mime if text => TEXT_MIME,
                Output::Mime => BINARY_MIME,
                Output::Extension => UNKNOWN_EXTENSION,
            }
            .to_string(),
        );
    }

    Ok(match output {
        Output::Extension => join_extensions(&found),
        Output::Mime => {
            let found: Vec<String> = match flags.contains(MagicFlags::MIME_ENCODING) {
                true if flags.contains(MagicFlags::MIME_TYPE) => {
                    found.iter().map(|mime| format!("{mime}; charset={}", encoding.charset())).collect()
                },
                true => vec![encoding.charset().to_string()],
                false => found,
            };
            found.join(CONTINUE_SEPARATOR)
        },
        Output::Description if flags.contains(MagicFlags::RAW) => found.join(CONTINUE_SEPARATOR),
        Output::Description => found.iter().map(|d| escape_unprintable(d)).collect::<Vec<_>>().join(CONTINUE_SEPARATOR),
    })
}

/// Merge extension lists, keeping first-seen order and dropping repeats.
fn join_extensions(lists: &[String]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for extension in lists.iter().flat_map(|list| list.split('/')) {
        if !extension.is_empty() && !seen.contains(&extension) {
            seen.push(extension);
        }
    }
    match seen.is_empty() {
        true => UNKNOWN_EXTENSION.to_string(),
        false => seen.join("/"),
    }
}

/// Render control characters as `\ooo` octal escapes.
fn escape_unprintable(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match u8::try_from(c) {
            Ok(b) if c.is_control() => escaped.push_str(&format!("\\{b:03o}")),
            _ => escaped.push(c),
        }
    }
    escaped
}
