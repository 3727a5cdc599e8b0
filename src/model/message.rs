//! Message, header and attachment records.

use chrono::{DateTime, Utc};

/// A persisted message record.
///
/// `original_path` and `message_id` are both unique; either one matching
/// an existing row makes a later ingestion of the same message a no-op.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageRecord {
    pub id: i64,

    /// The `Message-ID` header value, or `<none>:<basename>` when absent.
    pub message_id: String,

    /// Path of the source file this message was ingested from.
    pub original_path: String,

    /// Decoded subject line (RFC 2047 encoded-words resolved).
    pub subject: Option<String>,

    /// The `In-Reply-To` header value, if present.
    pub in_reply_to: Option<String>,

    /// Best-effort parsed date. `None` when the header was missing or
    /// defeated every parser in the cascade.
    pub date: Option<DateTime<Utc>>,

    /// Sender address record, when the `From` header decoded cleanly.
    pub author_id: Option<i64>,

    /// Plain-text body, size-capped. Back-filled from HTML when the source
    /// carried no text part.
    pub content_text: Option<String>,

    /// HTML body, size-capped (larger cap than the text body).
    pub content_html: Option<String>,

    pub created_at: DateTime<Utc>,
    pub indexing_log: Option<String>,
}

/// A header row owned by exactly one message.
///
/// Headers promoted to message columns (date, subject, in-reply-to, from,
/// to, cc, message-id) are not duplicated here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HeaderRecord {
    pub id: i64,
    pub message_id: i64,
    pub name: String,
    pub value: Option<String>,
}

/// An attachment row owned by exactly one message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AttachmentRecord {
    pub id: i64,
    pub message_id: i64,
    /// Decoded file name, size-capped. `None` when the part carried none.
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    /// Raw decoded payload.
    #[serde(skip)]
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Which recipient list an address appears on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientKind {
    To,
    Cc,
}

impl RecipientKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::To => "to",
            Self::Cc => "cc",
        }
    }

    /// The RFC 5322 header carrying this list.
    pub fn header_name(self) -> &'static str {
        match self {
            Self::To => "To",
            Self::Cc => "Cc",
        }
    }
}
