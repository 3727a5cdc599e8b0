//! mailindex: an email ingestion engine.
//!
//! Raw MIME messages from a filesystem tree are parsed, normalized and
//! written to a deduplicated SQLite store suitable for full-text search.
//! Each message yields one message record plus linked address, header and
//! attachment records; anomalies met along the way are kept as diagnostic
//! notes on the affected record instead of failing the run.
//!
//! # Architecture
//!
//! - [`parser`]: header decoding (RFC 2047 encoded-words, date cascade)
//!   and HTML reduction
//! - [`model`]: the persisted record types
//! - [`store`]: SQLite persistence with an FTS5 mirror of the bodies
//! - [`ingest`]: address normalization, part classification, the
//!   per-message pipeline and the folder walker
//! - [`config`]: TOML configuration and size limits

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod store;

pub use config::{Config, Limits};
pub use error::{IndexError, Result};
pub use ingest::{ingest_message, visit_folder, VisitStats};
pub use store::MailStore;
