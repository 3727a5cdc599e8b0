//! RFC 5322 header decoding: encoded-words (RFC 2047) and date parsing.
//!
//! Decoding never panics and never returns an error to the caller: a header
//! that defeats the decoder yields the [`DECODE_ERROR`] sentinel plus a
//! diagnostic note on the owning message, and processing continues.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::model::NoteLog;

/// Sentinel stored in place of a header value that could not be decoded.
pub const DECODE_ERROR: &str = "<decode-error>";

/// Decode a MIME-encoded header value.
///
/// All encoded-word segments are decoded and concatenated, NUL bytes are
/// replaced with U+FFFD (the store rejects NULs in text), and the result is
/// truncated to `max_bytes` on a character boundary, with a note. Any
/// decode failure returns [`DECODE_ERROR`] and appends a note instead.
pub fn decode_header(raw: &str, max_bytes: Option<usize>, notes: &mut NoteLog) -> String {
    let decoded = match decode_encoded_words(raw) {
        Ok(s) => s,
        Err(e) => {
            warn!(header = raw, error = %e, "Failed to decode header");
            notes.add(format!("Failed to decode header \"{raw}\": {e}"));
            return DECODE_ERROR.to_string();
        }
    };

    let mut value = replace_nul(&decoded);

    if let Some(max) = max_bytes {
        if value.len() > max {
            value = truncate_to_boundary(&value, max).to_string();
            notes.add(format!("Truncated header value to {max} bytes"));
        }
    }

    value
}

/// Collapse RFC 5322 folded continuation lines into single spaces.
pub fn unfold(raw: &str) -> String {
    if !raw.contains('\n') {
        return raw.trim().to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
    }
    out
}

/// Replace NUL bytes with the Unicode replacement character.
pub fn replace_nul(s: &str) -> String {
    if s.contains('\0') {
        s.replace('\0', "\u{FFFD}")
    } else {
        s.to_string()
    }
}

/// Truncate to at most `max` bytes without splitting a character.
pub fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// An unrecoverable problem inside one encoded word.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown charset '{0}'")]
    UnknownCharset(String),
    #[error("invalid base64 data")]
    InvalidBase64,
    #[error("unsupported encoding '{0}'")]
    UnsupportedEncoding(String),
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Stray `=?` sequences that do not form a structurally complete encoded
/// word are kept as literal text; a structurally complete word with an
/// unknown charset or corrupt payload is an error.
pub fn decode_encoded_words(input: &str) -> Result<String, DecodeError> {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is transparent (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        match split_encoded_word(after_start) {
            Some(word) => {
                result.push_str(&decode_one_word(&word)?);
                remaining = &remaining[start + 2 + word.consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    Ok(result)
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    payload: &'a str,
    /// Bytes consumed from the string *after* the initial `=?`.
    consumed: usize,
}

/// Split `charset?encoding?payload?=` off the front of `s`, if present.
fn split_encoded_word(s: &str) -> Option<EncodedWord<'_>> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let payload = &rest2[..end];

    Some(EncodedWord {
        charset,
        encoding,
        payload,
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

fn decode_one_word(word: &EncodedWord<'_>) -> Result<String, DecodeError> {
    let bytes = match word.encoding.to_uppercase().as_str() {
        "B" => decode_base64(word.payload).ok_or(DecodeError::InvalidBase64)?,
        "Q" => decode_q_encoding(word.payload),
        other => return Err(DecodeError::UnsupportedEncoding(other.to_string())),
    };

    decode_charset(word.charset, &bytes)
}

/// Minimal strict base64 decoder. Whitespace is tolerated; any other
/// non-alphabet byte is a failure.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    fn val(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut quad = [0u8; 4];
    let mut qi = 0;
    let mut pad = 0;

    for &b in input.as_bytes() {
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => continue,
            b'=' => {
                quad[qi] = 0;
                qi += 1;
                pad += 1;
            }
            _ => {
                if pad > 0 {
                    return None; // data after padding
                }
                quad[qi] = val(b)?;
                qi += 1;
            }
        }
        if qi == 4 {
            out.push((quad[0] << 2) | (quad[1] >> 4));
            out.push((quad[1] << 4) | (quad[2] >> 2));
            out.push((quad[2] << 6) | quad[3]);
            qi = 0;
        }
    }

    if qi != 0 || pad > 2 {
        return None;
    }
    out.truncate(out.len() - pad);
    Some(out)
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
///
/// Malformed escapes fall through as literal bytes; Q-decoding itself is
/// never a hard failure.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(
                    std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("00"),
                    16,
                ) {
                    result.push(byte);
                    i += 3;
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> Result<String, DecodeError> {
    let charset_lower = charset.to_lowercase();
    match charset_lower.as_str() {
        "utf-8" | "utf8" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        _ => match encoding_rs::Encoding::for_label(charset.as_bytes()) {
            Some(encoding) => {
                let (decoded, _, _) = encoding.decode(bytes);
                Ok(decoded.into_owned())
            }
            None => Err(DecodeError::UnknownCharset(charset.to_string())),
        },
    }
}

/// Parse a `Date:` header value, cascading from strict to permissive.
///
/// RFC 2822 first; then RFC 3339; then a set of real-world broken formats
/// with the day-of-week stripped and named timezones replaced. Total
/// failure leaves the date `None` and records a note, never an error.
pub fn decode_date(raw: Option<&str>, notes: &mut NoteLog) -> Option<DateTime<Utc>> {
    let raw = match raw {
        Some(r) => r,
        None => {
            notes.add("Missing date");
            return None;
        }
    };

    let value = decode_header(raw, None, notes);
    if value == DECODE_ERROR {
        return None;
    }

    match parse_date(&value) {
        Some(date) => Some(date),
        None => {
            warn!(date = value.as_str(), "Could not parse date");
            notes.add(format!("Failed to parse date \"{value}\""));
            None
        }
    }
}

/// Parse an email date string in various common formats.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let no_dow = strip_day_of_week(trimmed);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = DateTime::parse_from_str(&no_dow, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&no_dow, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    // Replace named timezones with offsets and try again
    let replaced = replace_named_tz(&no_dow);
    for fmt in &formats {
        if let Ok(dt) = DateTime::parse_from_str(&replaced, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    None
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = [
        "Mon,", "Tue,", "Wed,", "Thu,", "Fri,", "Sat,", "Sun,", "Mon ", "Tue ", "Wed ", "Thu ",
        "Fri ", "Sat ", "Sun ",
    ];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim().to_string();
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
        ("CEST", "+0200"),
        ("JST", "+0900"),
    ];
    let mut result = s.to_string();
    for (name, offset) in &tzs {
        if result.ends_with(name) {
            let pos = result.len() - name.len();
            result.replace_range(pos.., offset);
            return result;
        }
    }
    result
}
