//! Persisted record types.
//!
//! Every record kind shares the same base metadata (id, kind discriminant,
//! creation timestamp, diagnostic note log), composed into each concrete
//! type rather than inherited.

pub mod address;
pub mod message;

pub use address::{AddressRecord, Mailbox};
pub use message::{AttachmentRecord, HeaderRecord, MessageRecord, RecipientKind};

/// Discriminant stored with every record row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(i64)]
pub enum RecordKind {
    Message = 1,
    Address = 2,
    Attachment = 3,
    Header = 4,
}

impl RecordKind {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Append-only diagnostic note log attached to a record.
///
/// Notes describe anomalies met while processing (truncations, decode
/// failures, unrecognized MIME parts). They are joined with newlines and
/// stored in the record's `indexing_log` column.
#[derive(Debug, Clone, Default)]
pub struct NoteLog {
    notes: Vec<String>,
}

impl NoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a note. Never fails; an empty note is dropped.
    pub fn add(&mut self, note: impl Into<String>) {
        let note = note.into();
        if !note.is_empty() {
            self.notes.push(note);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Render for storage: newline-joined, `None` when no notes were taken.
    pub fn render(&self) -> Option<String> {
        if self.notes.is_empty() {
            None
        } else {
            Some(self.notes.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_log_render() {
        let mut log = NoteLog::new();
        assert_eq!(log.render(), None);
        log.add("first");
        log.add("");
        log.add("second");
        assert_eq!(log.render().as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_record_kind_discriminants() {
        assert_eq!(RecordKind::Message.as_i64(), 1);
        assert_eq!(RecordKind::Address.as_i64(), 2);
        assert_eq!(RecordKind::Attachment.as_i64(), 3);
        assert_eq!(RecordKind::Header.as_i64(), 4);
    }
}
