//! Email address records and mailbox parsing (RFC 5322 §3.4).

use chrono::{DateTime, Utc};

/// A raw `(display name, address)` pair parsed from a header value.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Mailbox {
    /// Human-readable display name (may be empty).
    pub name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl Mailbox {
    /// Parse a single mailbox from a header value.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    ///
    /// If nothing address-like is found, the raw string is stored as
    /// `address` so the sighting is never lost.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self {
                name: String::new(),
                address: String::new(),
            };
        }

        // Try "Display Name <address>" or "<address>"
        if let Some(angle_start) = trimmed.rfind('<') {
            if let Some(angle_end) = trimmed.rfind('>') {
                if angle_end > angle_start {
                    let address = trimmed[angle_start + 1..angle_end].trim().to_string();
                    let name = strip_quotes(trimmed[..angle_start].trim());
                    return Self { name, address };
                }
            }
        }

        // Bare address or fallback
        Self {
            name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Split a comma-separated address list into mailboxes.
    ///
    /// If the raw string contains no comma it is treated as a single
    /// mailbox even when its display name embeds one. Otherwise commas
    /// inside quotes or angle brackets do not split.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        if !raw.contains(',') {
            let single = Self::parse(raw);
            return if single.address.is_empty() {
                Vec::new()
            } else {
                vec![single]
            };
        }

        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for ch in raw.chars() {
            match ch {
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                ',' if !in_quotes && !in_angle => {
                    let mailbox = Self::parse(&current);
                    if !mailbox.address.is_empty() {
                        results.push(mailbox);
                    }
                    current.clear();
                }
                _ => current.push(ch),
            }
        }

        let mailbox = Self::parse(&current);
        if !mailbox.address.is_empty() {
            results.push(mailbox);
        }

        results
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} <{}>", self.name, self.address)
        }
    }
}

/// A persisted address record.
///
/// One row per unique email (case-insensitive). Display names accumulate
/// across sightings, first-seen order, comma-joined in storage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AddressRecord {
    pub id: i64,
    /// The unique email, stored as first seen (lookups case-fold).
    pub email: String,
    /// Comma-joined known display names; `None` when never seen with one.
    pub display_names: Option<String>,
    pub created_at: DateTime<Utc>,
    pub indexing_log: Option<String>,
}

impl AddressRecord {
    /// Known display names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        match self.display_names.as_deref() {
            None | Some("") => Vec::new(),
            Some(joined) => joined.split(',').collect(),
        }
    }
}
