//! MIME part classification: body candidates and attachment extraction.
//!
//! Parts are visited in document order, descending into nested
//! `message/rfc822` parts. When a message carries several parts of the
//! same body type, the last one seen wins. Structural containers are
//! passed over silently; a part that fits no category leaves a note on
//! the message instead of failing the ingest.

use mail_parser::{Message, MessagePart, MimeHeaders, PartType};
use rusqlite::Connection;
use tracing::debug;

use crate::config::Limits;
use crate::error::Result;
use crate::model::NoteLog;
use crate::parser::header::{replace_nul, truncate_to_boundary};
use crate::parser::html::sniff_and_convert;
use crate::store;

/// Body candidates collected from a message's parts.
#[derive(Debug, Default)]
pub struct BodyContent {
    pub text: Option<String>,
    pub html: Option<String>,
}

/// Classify every part of `parsed`: persist attachments under
/// `db_message_id` and return the surviving body candidates.
pub fn classify(
    conn: &Connection,
    parsed: &Message<'_>,
    db_message_id: i64,
    source_path: &str,
    limits: &Limits,
    notes: &mut NoteLog,
) -> Result<BodyContent> {
    let mut body = BodyContent::default();
    walk_parts(
        conn,
        &parsed.parts,
        db_message_id,
        source_path,
        limits,
        notes,
        &mut body,
    )?;
    Ok(body)
}

fn walk_parts(
    conn: &Connection,
    parts: &[MessagePart<'_>],
    db_message_id: i64,
    source_path: &str,
    limits: &Limits,
    notes: &mut NoteLog,
    body: &mut BodyContent,
) -> Result<()> {
    for part in parts {
        match &part.body {
            // Structural container; its children appear in the same list.
            PartType::Multipart(_) => {}

            // Forwarded message: its parts classify as if inline.
            PartType::Message(nested) => {
                walk_parts(
                    conn,
                    &nested.parts,
                    db_message_id,
                    source_path,
                    limits,
                    notes,
                    body,
                )?;
            }

            PartType::Text(text) => {
                if is_attachment(part) {
                    save_attachment(conn, part, db_message_id, limits, notes)?;
                } else if subtype_is(part, "calendar") {
                    // Calendar invites carry no searchable prose.
                } else if subtype_contains(part, "html") {
                    // Some agents label an HTML body text/plain-adjacent;
                    // the declared type wins over the parser's guess.
                    body.html = Some(cap(&replace_nul(text), limits.max_html_bytes));
                } else if is_plain(part) {
                    let converted = sniff_and_convert(&replace_nul(text));
                    body.text = Some(cap(&converted, limits.max_text_bytes));
                } else {
                    // text/enriched, text/x-diff and the like are not body text
                    notes.add(unknown_part_note(part, source_path));
                }
            }

            PartType::Html(html) => {
                if is_attachment(part) {
                    save_attachment(conn, part, db_message_id, limits, notes)?;
                } else {
                    body.html = Some(cap(&replace_nul(html), limits.max_html_bytes));
                }
            }

            PartType::Binary(_) => {
                if is_attachment(part) {
                    save_attachment(conn, part, db_message_id, limits, notes)?;
                } else if is_structural(part) {
                    // delivery-status and friends carry no indexable content
                } else {
                    notes.add(unknown_part_note(part, source_path));
                }
            }

            // Inline images and similar decorations are not indexed.
            PartType::InlineBinary(_) => {}
        }
    }
    Ok(())
}

fn save_attachment(
    conn: &Connection,
    part: &MessagePart<'_>,
    db_message_id: i64,
    limits: &Limits,
    notes: &mut NoteLog,
) -> Result<()> {
    let file_name = part.attachment_name().map(|raw| {
        let cleaned = replace_nul(raw);
        if cleaned.len() > limits.max_header_bytes {
            notes.add(format!(
                "Truncated attachment file name to {} bytes",
                limits.max_header_bytes
            ));
            truncate_to_boundary(&cleaned, limits.max_header_bytes).to_string()
        } else {
            cleaned
        }
    });
    let content_type = part_content_type(part);

    let id = store::insert_attachment(
        conn,
        db_message_id,
        file_name.as_deref(),
        content_type.as_deref(),
        part.contents(),
    )?;
    debug!(
        id,
        file_name = file_name.as_deref().unwrap_or("<unnamed>"),
        bytes = part.contents().len(),
        "Stored attachment"
    );
    Ok(())
}

fn unknown_part_note(part: &MessagePart<'_>, source_path: &str) -> String {
    format!(
        "Unknown part content type while reading {source_path}. \
         Content-Type={}, disposition={}",
        part_content_type(part).unwrap_or_else(|| "<none>".to_string()),
        disposition_name(part),
    )
}

/// Whether a text part is body material: `text/plain` or no declared
/// subtype at all (the MIME default).
fn is_plain(part: &MessagePart<'_>) -> bool {
    match part.content_type().and_then(|ct| ct.subtype()) {
        None => true,
        Some(sub) => sub.eq_ignore_ascii_case("plain"),
    }
}

fn is_structural(part: &MessagePart<'_>) -> bool {
    part_content_type(part)
        .map(|t| t.starts_with("multipart/") || t.starts_with("message/"))
        .unwrap_or(false)
}

fn is_attachment(part: &MessagePart<'_>) -> bool {
    part.content_disposition()
        .map(|d| d.ctype().eq_ignore_ascii_case("attachment"))
        .unwrap_or(false)
}

fn disposition_name(part: &MessagePart<'_>) -> String {
    part.content_disposition()
        .map(|d| d.ctype().to_lowercase())
        .unwrap_or_else(|| "<none>".to_string())
}

fn part_content_type(part: &MessagePart<'_>) -> Option<String> {
    part.content_type().map(|ct| match ct.subtype() {
        Some(sub) => format!("{}/{}", ct.ctype(), sub).to_lowercase(),
        None => ct.ctype().to_lowercase(),
    })
}

fn subtype_is(part: &MessagePart<'_>, subtype: &str) -> bool {
    part.content_type()
        .and_then(|ct| ct.subtype())
        .map(|s| s.eq_ignore_ascii_case(subtype))
        .unwrap_or(false)
}

fn subtype_contains(part: &MessagePart<'_>, needle: &str) -> bool {
    part.content_type()
        .and_then(|ct| ct.subtype())
        .map(|s| s.to_lowercase().contains(needle))
        .unwrap_or(false)
}

/// Apply a byte cap on a character boundary. Caps are silent; truncated
/// body text is expected on oversized messages.
fn cap(s: &str, max: usize) -> String {
    truncate_to_boundary(s, max).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MailStore;
    use mail_parser::MessageParser;

    fn setup() -> (MailStore, i64) {
        let store = MailStore::open_in_memory().unwrap();
        let id = store::insert_message(
            store.conn(),
            "<t@example>",
            "/mail/t",
            None,
            None,
            None,
            None,
        )
        .unwrap();
        (store, id)
    }

    fn run(raw: &str) -> (MailStore, BodyContent, NoteLog) {
        let (store, id) = setup();
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let mut notes = NoteLog::new();
        let body = classify(
            store.conn(),
            &parsed,
            id,
            "/mail/t",
            &Limits::default(),
            &mut notes,
        )
        .unwrap();
        (store, body, notes)
    }

    #[test]
    fn test_plain_body() {
        let raw = "From: a@b.c\r\nSubject: hi\r\n\r\nJust the body.\r\n";
        let (_, body, notes) = run(raw);
        assert_eq!(body.text.as_deref().map(str::trim), Some("Just the body."));
        assert!(body.html.is_none());
        assert!(notes.is_empty());
    }

    #[test]
    fn test_multipart_alternative_keeps_both_bodies() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: multipart/alternative; boundary=\"XX\"\r\n",
            "\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain body\r\n",
            "--XX\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html body</p>\r\n",
            "--XX--\r\n",
        );
        let (_, body, notes) = run(raw);
        assert!(body.text.as_deref().unwrap().contains("plain body"));
        assert!(body.html.as_deref().unwrap().contains("html body"));
        assert!(notes.is_empty());
    }

    #[test]
    fn test_last_same_type_part_wins() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
            "\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first part\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "second part\r\n",
            "--XX--\r\n",
        );
        let (_, body, _) = run(raw);
        assert!(body.text.as_deref().unwrap().contains("second part"));
        assert!(!body.text.as_deref().unwrap().contains("first part"));
    }

    #[test]
    fn test_attachment_extraction() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
            "\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "see attached\r\n",
            "--XX\r\n",
            "Content-Type: application/pdf; name=\"report.pdf\"\r\n",
            "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERg==\r\n",
            "--XX--\r\n",
        );
        let (store, body, _) = run(raw);
        assert!(body.text.is_some());

        let (name, bytes): (String, Vec<u8>) = store
            .conn()
            .query_row(
                "SELECT file_name, content FROM attachments",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "report.pdf");
        assert_eq!(bytes, b"%PDF");
    }

    #[test]
    fn test_disguised_html_body_is_converted() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "<html><body><p>hidden markup</p></body></html>\r\n",
        );
        let (_, body, _) = run(raw);
        let text = body.text.unwrap();
        assert!(text.contains("hidden markup"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_calendar_part_is_skipped_silently() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
            "\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "meeting below\r\n",
            "--XX\r\n",
            "Content-Type: text/calendar\r\n",
            "\r\n",
            "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n",
            "--XX--\r\n",
        );
        let (_, body, notes) = run(raw);
        assert!(body.text.as_deref().unwrap().contains("meeting below"));
        assert!(notes.is_empty());
    }

    #[test]
    fn test_unclassifiable_part_leaves_note() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
            "\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
            "--XX\r\n",
            "Content-Type: application/x-mystery\r\n",
            "\r\n",
            "????\r\n",
            "--XX--\r\n",
        );
        let (_, _, notes) = run(raw);
        let rendered = notes.render().unwrap();
        assert!(rendered.contains("Unknown part content type"));
        assert!(rendered.contains("application/x-mystery"));
        assert!(rendered.contains("/mail/t"));
    }

    #[test]
    fn test_named_binary_without_disposition_is_not_an_attachment() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
            "\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
            "--XX\r\n",
            "Content-Type: application/pdf; name=\"report.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERg==\r\n",
            "--XX--\r\n",
        );
        let (store, _, notes) = run(raw);
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM attachments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
        let rendered = notes.render().unwrap();
        assert!(rendered.contains("Unknown part content type"));
        assert!(rendered.contains("application/pdf"));
    }

    #[test]
    fn test_exotic_text_subtype_is_not_body_text() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: text/x-diff\r\n",
            "\r\n",
            "--- a/f\r\n",
            "+++ b/f\r\n",
        );
        let (_, body, notes) = run(raw);
        assert!(body.text.is_none());
        assert!(body.html.is_none());
        let rendered = notes.render().unwrap();
        assert!(rendered.contains("Unknown part content type"));
        assert!(rendered.contains("text/x-diff"));
    }

    #[test]
    fn test_nested_message_parts_are_visited() {
        let raw = concat!(
            "From: a@b.c\r\n",
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
            "\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "outer body\r\n",
            "--XX\r\n",
            "Content-Type: message/rfc822\r\n",
            "\r\n",
            "From: inner@b.c\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "inner body\r\n",
            "--XX--\r\n",
        );
        let (_, body, _) = run(raw);
        // Document order: the forwarded body is seen last and wins.
        assert!(body.text.as_deref().unwrap().contains("inner body"));
    }

    #[test]
    fn test_body_cap_is_silent() {
        let long = "x".repeat(4096);
        let raw = format!("From: a@b.c\r\nContent-Type: text/plain\r\n\r\n{long}\r\n");
        let (store, id) = setup();
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let mut notes = NoteLog::new();
        let limits = Limits {
            max_text_bytes: 100,
            ..Limits::default()
        };
        let body = classify(store.conn(), &parsed, id, "/mail/t", &limits, &mut notes).unwrap();
        assert_eq!(body.text.as_deref().map(|t| t.len()), Some(100));
        assert!(notes.is_empty());
    }
}
