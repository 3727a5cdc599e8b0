//! Address normalization: canonical address records, merged display names.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::Mailbox;
use crate::store;

/// Resolve a raw address header value into address record ids, creating
/// records on first sighting and merging new display names into existing
/// ones. Ids are returned in encounter order.
///
/// Splitting uses the comma heuristic from [`Mailbox::parse_list`]: a raw
/// value with no comma is a single address even if its display name embeds
/// one. Bad input never fails; storage errors propagate.
pub fn resolve(conn: &Connection, raw: &str, max_name_list_bytes: usize) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    for mailbox in Mailbox::parse_list(raw) {
        ids.push(resolve_mailbox(conn, &mailbox, max_name_list_bytes)?);
    }
    Ok(ids)
}

/// Resolve a single-mailbox header value (the `From` header). Returns
/// `None` when nothing address-like was found.
pub fn resolve_one(
    conn: &Connection,
    raw: &str,
    max_name_list_bytes: usize,
) -> Result<Option<i64>> {
    let mailbox = Mailbox::parse(raw);
    if mailbox.address.is_empty() {
        return Ok(None);
    }
    Ok(Some(resolve_mailbox(conn, &mailbox, max_name_list_bytes)?))
}

fn resolve_mailbox(
    conn: &Connection,
    mailbox: &Mailbox,
    max_name_list_bytes: usize,
) -> Result<i64> {
    // The name list is comma-joined in storage, so a comma inside one name
    // would corrupt the list on read-back.
    let name = if mailbox.name.contains(',') {
        warn!(
            name = mailbox.name.as_str(),
            address = mailbox.address.as_str(),
            "Found comma in display name"
        );
        mailbox.name.replace(',', "")
    } else {
        mailbox.name.clone()
    };
    let name = name.trim();

    let existing = match store::find_address(conn, &mailbox.address)? {
        Some(record) => record,
        None => {
            let id = store::insert_address(
                conn,
                &mailbox.address,
                if name.is_empty() { None } else { Some(name) },
            )?;
            debug!(address = mailbox.address.as_str(), id, "Created address record");
            return Ok(id);
        }
    };

    if !name.is_empty() && !existing.names().contains(&name) {
        let joined = match existing.display_names.as_deref() {
            None | Some("") => name.to_string(),
            Some(current) => format!("{current},{name}"),
        };
        if joined.len() <= max_name_list_bytes {
            debug!(
                name,
                address = existing.email.as_str(),
                "Added display name to address"
            );
            store::update_address_names(conn, existing.id, &joined)?;
        } else {
            let note = format!(
                "Skipped display name \"{name}\": name list would exceed {max_name_list_bytes} bytes"
            );
            warn!(address = existing.email.as_str(), "{note}");
            store::append_address_note(conn, existing.id, &note)?;
        }
    }

    Ok(existing.id)
}
