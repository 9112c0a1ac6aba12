//! Line-level service message decoding.
//!
//! [`parse_line`] classifies one stdout line: `None` for ordinary output,
//! `Some(Ok(..))` for a decoded message and `Some(Err(..))` for a line that
//! starts like a message but cannot be decoded. Callers treat the error
//! case as ordinary output so log capture never stalls on a bad line.
//!
//! Values may be delimited by `'` or `"`; older emitters used the latter.

use std::sync::LazyLock;

use regex::Regex;

use super::{DecodeError, RawServiceMessage, ServiceMessage, MESSAGE_PREFIX};
use crate::encoding::decode_value;

static MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^##octopus\[(?P<tag>[A-Za-z0-9_.\-]+)(?P<fields>(?:\s+[A-Za-z0-9_]+\s*=\s*(?:'[^']*'|"[^"]*"))*)\s*\]$"#,
    )
    .expect("valid regex")
});

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<key>[A-Za-z0-9_]+)\s*=\s*(?:'(?P<single>[^']*)'|"(?P<double>[^"]*)")"#)
        .expect("valid regex")
});

/// Decode `line` if it is a service message.
pub fn parse_line(line: &str) -> Option<Result<ServiceMessage, DecodeError>> {
    parse_raw_line(line).map(|raw| raw.and_then(ServiceMessage::from_raw))
}

/// Decode `line` into its wire shape without interpreting the tag.
pub fn parse_raw_line(line: &str) -> Option<Result<RawServiceMessage, DecodeError>> {
    let line = line.trim();
    if !line.starts_with(MESSAGE_PREFIX) {
        return None;
    }
    Some(decode_raw(line))
}

fn decode_raw(line: &str) -> Result<RawServiceMessage, DecodeError> {
    let caps = MESSAGE_RE.captures(line).ok_or(DecodeError::Malformed)?;
    let mut message = RawServiceMessage::new(&caps["tag"]);

    let fields = caps.name("fields").map_or("", |m| m.as_str());
    for field in FIELD_RE.captures_iter(fields) {
        let key = &field["key"];
        let encoded = field
            .name("single")
            .or_else(|| field.name("double"))
            .map_or("", |m| m.as_str());
        let value = decode_value(encoded).map_err(|source| DecodeError::Field {
            field: key.to_string(),
            source,
        })?;
        message.fields.push((key.to_string(), value));
    }
    Ok(message)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
