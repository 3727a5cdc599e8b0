//! Recursive mailbox-tree traversal.
//!
//! Every regular file under the root is treated as one raw message.
//! Entries are visited in name order so repeated runs behave the same.
//! A failing file is counted and skipped unless the caller asked to stop
//! on the first error.

use std::path::Path;

use tracing::error;

use crate::config::Limits;
use crate::error::{IndexError, Result};
use crate::ingest::pipeline::ingest_message;
use crate::store::MailStore;

/// Outcome counters for one traversal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VisitStats {
    /// Messages newly indexed.
    pub created: u64,
    /// Files whose path or Message-ID was already in the store.
    pub existing: u64,
    /// Files that could not be read or ingested.
    pub failed: u64,
}

impl VisitStats {
    fn absorb(&mut self, other: VisitStats) {
        self.created += other.created;
        self.existing += other.existing;
        self.failed += other.failed;
    }
}

/// Walk `folder` recursively and ingest every file found.
///
/// `progress` is invoked with each file path before it is processed.
pub fn visit_folder(
    store: &mut MailStore,
    folder: &Path,
    limits: &Limits,
    stop_on_error: bool,
    progress: Option<&dyn Fn(&Path)>,
) -> Result<VisitStats> {
    let mut stats = VisitStats::default();

    let mut entries: Vec<_> = std::fs::read_dir(folder)
        .map_err(|e| IndexError::io(folder, e))?
        .collect::<std::io::Result<_>>()
        .map_err(|e| IndexError::io(folder, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| IndexError::io(&path, e))?;

        if file_type.is_dir() {
            stats.absorb(visit_folder(store, &path, limits, stop_on_error, progress)?);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        if let Some(report) = progress {
            report(&path);
        }

        match visit_file(store, &path, limits) {
            Ok(true) => stats.created += 1,
            Ok(false) => stats.existing += 1,
            Err(e) if stop_on_error => return Err(e),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to index file");
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

fn visit_file(store: &mut MailStore, path: &Path, limits: &Limits) -> Result<bool> {
    let raw = std::fs::read(path).map_err(|e| IndexError::io(path, e))?;
    ingest_message(store, &raw, &path.to_string_lossy(), limits)
}
