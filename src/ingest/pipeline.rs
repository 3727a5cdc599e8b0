//! Per-message ingestion: dedup checks, header decoding, classification,
//! and the adaptive save that shrinks oversized bodies instead of failing.
//!
//! Each message runs in one transaction. Any error rolls the whole
//! message back, so a file is either fully indexed or absent.

use std::path::{Path, PathBuf};

use mail_parser::MessageParser;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::Limits;
use crate::error::{IndexError, Result};
use crate::ingest::address;
use crate::ingest::content::{self, BodyContent};
use crate::model::{NoteLog, RecipientKind};
use crate::parser::header::{decode_date, decode_header, truncate_to_boundary, unfold, DECODE_ERROR};
use crate::parser::html::{html_to_text, strip_links};
use crate::store::{self, MailStore};

/// Headers promoted to message columns; not duplicated as header rows.
const PROMOTED_HEADERS: [&str; 7] = [
    "date",
    "subject",
    "in-reply-to",
    "from",
    "to",
    "cc",
    "message-id",
];

/// Bytes removed per shrink step when a body exceeds the record limit.
const SHRINK_STEP: usize = 100;

/// Ingest one raw message read from `path`.
///
/// Returns `true` when a new record set was created, `false` when the
/// path or Message-ID was already indexed.
pub fn ingest_message(
    store: &mut MailStore,
    raw: &[u8],
    path: &str,
    limits: &Limits,
) -> Result<bool> {
    let tx = store.transaction()?;
    let created = ingest_in_tx(&tx, raw, path, limits)?;
    tx.commit()?;
    Ok(created)
}

fn ingest_in_tx(conn: &Connection, raw: &[u8], path: &str, limits: &Limits) -> Result<bool> {
    if store::message_exists_by_path(conn, path)? {
        debug!(path, "Path already indexed");
        return Ok(false);
    }

    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| IndexError::Mime(format!("unparseable message at {path}")))?;

    let message_id = match parsed.header_raw("Message-ID").map(unfold) {
        Some(id) if !id.is_empty() => id,
        _ => synthesize_message_id(path),
    };
    if store::message_exists_by_message_id(conn, &message_id)? {
        debug!(path, message_id, "Message-ID already indexed");
        return Ok(false);
    }

    let mut notes = NoteLog::new();
    let cap = Some(limits.max_header_bytes);

    let subject = parsed
        .header_raw("Subject")
        .map(|raw| decode_header(&unfold(raw), cap, &mut notes));
    let in_reply_to = parsed
        .header_raw("In-Reply-To")
        .map(|raw| decode_header(&unfold(raw), cap, &mut notes));
    let date = decode_date(
        parsed.header_raw("Date").map(unfold).as_deref(),
        &mut notes,
    );

    let author_id = match parsed.header_raw("From") {
        Some(raw) => {
            let decoded = decode_header(&unfold(raw), cap, &mut notes);
            if decoded == DECODE_ERROR {
                None
            } else {
                address::resolve_one(conn, &decoded, limits.max_name_list_bytes)?
            }
        }
        None => None,
    };

    let id = store::insert_message(
        conn,
        &message_id,
        path,
        subject.as_deref(),
        in_reply_to.as_deref(),
        date,
        author_id,
    )?;

    let mut body = content::classify(conn, &parsed, id, path, limits, &mut notes)?;

    // HTML-only messages still get searchable plain text.
    if body.text.is_none() {
        if let Some(ref html) = body.html {
            let converted = html_to_text(html);
            body.text = Some(truncate_to_boundary(&converted, limits.max_text_bytes).to_string());
        }
    }

    for kind in [RecipientKind::To, RecipientKind::Cc] {
        if let Some(raw) = parsed.header_raw(kind.header_name()) {
            let decoded = decode_header(&unfold(raw), None, &mut notes);
            if decoded == DECODE_ERROR {
                continue;
            }
            let mut seen = Vec::new();
            for address_id in address::resolve(conn, &decoded, limits.max_name_list_bytes)? {
                if seen.contains(&address_id) {
                    continue;
                }
                store::insert_recipient(conn, id, address_id, kind, seen.len())?;
                seen.push(address_id);
            }
        }
    }

    for header in parsed.headers() {
        let name = header.name.as_str();
        if PROMOTED_HEADERS.iter().any(|p| name.eq_ignore_ascii_case(p)) {
            continue;
        }
        let raw_value = String::from_utf8_lossy(
            &parsed.raw_message[header.offset_start..header.offset_end],
        );
        let value = decode_header(&unfold(&raw_value), cap, &mut notes);
        store::insert_header(conn, id, name, Some(&value))?;
    }

    // Last write in the transaction: bodies and note log land together,
    // so a size-limit rejection from either re-enters the shrink loop.
    adaptive_save(conn, id, body, path, &mut notes)?;

    info!(path, message_id, id, "Indexed message");
    Ok(true)
}

/// Write the bodies and the rendered note log, shedding bytes on
/// size-limit rejection.
///
/// The engine limit bounds the whole message row, so the log is part of
/// the retried statement: notes taken by the shrink itself ride along on
/// the next attempt. First rejection strips link tokens from the plain
/// text; subsequent rejections drop trailing chunks until the write
/// lands or the text is too small to shrink further, which is fatal for
/// this message.
fn adaptive_save(
    conn: &Connection,
    id: i64,
    body: BodyContent,
    path: &str,
    notes: &mut NoteLog,
) -> Result<()> {
    let BodyContent { mut text, html } = body;
    let mut stripped = false;
    let mut truncated = false;

    loop {
        let outcome = store::update_message_content(
            conn,
            id,
            text.as_deref(),
            html.as_deref(),
            notes.render().as_deref(),
        );
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if e.is_record_size_limit() => {
                if !stripped {
                    stripped = true;
                    warn!(path, "Body exceeds record size limit, stripping links");
                    if let Some(t) = text.take() {
                        text = Some(strip_links(&t));
                    }
                    notes.add("Stripped links from body to fit record size limit");
                    continue;
                }
                let current = text.take().unwrap_or_default();
                if current.len() <= SHRINK_STEP {
                    return Err(IndexError::RecordTooLarge {
                        path: PathBuf::from(path),
                    });
                }
                let target = current.len() - SHRINK_STEP;
                text = Some(truncate_to_boundary(&current, target).to_string());
                if !truncated {
                    truncated = true;
                    notes.add("Truncated body to fit record size limit");
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Deterministic stand-in Message-ID for messages that carry none, unique
/// per source path.
fn synthesize_message_id(path: &str) -> String {
    let basename = Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    format!("<none>:{basename}")
}
