//! The ingestion pipeline: address normalization, content classification,
//! per-message coordination, and folder traversal.

pub mod address;
pub mod content;
pub mod pipeline;
pub mod walker;

pub use pipeline::ingest_message;
pub use walker::{visit_folder, VisitStats};
