//! Durable file ledger
//!
//! Records which remote entries have been ingested, keyed by entry name, so
//! unchanged files are never re-fetched and restarts never reprocess history.
//! Entries are appended or updated in place, never deleted; a file that
//! disappears remotely simply stops being listed.
//!
//! Persistence is a single JSON document written via temp-file-and-rename so
//! a crash mid-save leaves the previous ledger intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use tankflow_common::Result;

use crate::gateway::RemoteEntry;

/// Outcome of the last ingestion attempt for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    Failed,
}

/// Per-file ingestion history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Remote entry name
    pub entry_name: String,
    /// Size in bytes at the time of ingestion
    pub size: u64,
    /// Remote modification time at the time of ingestion
    pub modified_time: DateTime<Utc>,
    /// SHA-256 of the fetched content, when the fetch succeeded
    pub content_fingerprint: Option<String>,
    /// When this ingestion attempt finished
    pub ingested_at: DateTime<Utc>,
    /// Whether the attempt succeeded
    pub status: IngestStatus,
    /// Ids of the records this file produced
    pub record_ids: Vec<String>,
    /// Why the attempt failed, when it did
    pub last_error: Option<String>,
}

/// Durable record of ingested remote entries
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl FileLedger {
    /// Load the ledger from disk, starting empty if the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let data = std::fs::read(&path)?;
            let entries: BTreeMap<String, LedgerEntry> = serde_json::from_slice(&data)?;
            info!("Loaded ledger with {} entries from {}", entries.len(), path.display());
            entries
        } else {
            debug!("No ledger at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self { path, entries })
    }

    /// Persist the ledger atomically (write temp file, rename over target)
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!("Saved ledger ({} entries) to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    /// Decide whether a remote entry must be fetched and parsed this cycle
    ///
    /// A file is processed when it has never been seen, when its size or
    /// modified time changed since the last attempt, or when the last attempt
    /// failed. Unchanged successes are skipped.
    pub fn needs_processing(&self, entry: &RemoteEntry) -> bool {
        match self.entries.get(&entry.name) {
            None => true,
            Some(known) => {
                known.status == IngestStatus::Failed
                    || known.size != entry.size
                    || known.modified_time != entry.modified_time
            },
        }
    }

    /// Record a successful ingestion of a remote entry
    pub fn record_success(
        &mut self,
        entry: &RemoteEntry,
        content_fingerprint: String,
        record_ids: Vec<String>,
    ) {
        self.entries.insert(
            entry.name.clone(),
            LedgerEntry {
                entry_name: entry.name.clone(),
                size: entry.size,
                modified_time: entry.modified_time,
                content_fingerprint: Some(content_fingerprint),
                ingested_at: Utc::now(),
                status: IngestStatus::Success,
                record_ids,
                last_error: None,
            },
        );
    }

    /// Record a failed ingestion attempt; retried every cycle until it succeeds
    pub fn record_failure(&mut self, entry: &RemoteEntry, error: String) {
        self.entries.insert(
            entry.name.clone(),
            LedgerEntry {
                entry_name: entry.name.clone(),
                size: entry.size,
                modified_time: entry.modified_time,
                content_fingerprint: None,
                ingested_at: Utc::now(),
                status: IngestStatus::Failed,
                record_ids: Vec::new(),
                last_error: Some(error),
            },
        );
    }

    /// Look up the history for one entry
    pub fn get(&self, entry_name: &str) -> Option<&LedgerEntry> {
        self.entries.get(entry_name)
    }

    /// Number of entries ever seen
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, size: u64, mtime_secs: i64) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            size,
            modified_time: Utc.timestamp_opt(mtime_secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_unknown_entry_needs_processing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::load(dir.path().join("ledger.json")).unwrap();
        assert!(ledger.needs_processing(&entry("txn_001.xml", 100, 1000)));
    }

    #[test]
    fn test_unchanged_success_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = FileLedger::load(dir.path().join("ledger.json")).unwrap();

        let e = entry("txn_001.xml", 100, 1000);
        ledger.record_success(&e, "abc123".to_string(), vec!["1001".to_string()]);

        assert!(!ledger.needs_processing(&e));
    }

    #[test]
    fn test_changed_metadata_forces_reprocess() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = FileLedger::load(dir.path().join("ledger.json")).unwrap();

        let e = entry("txn_001.xml", 100, 1000);
        ledger.record_success(&e, "abc123".to_string(), vec![]);

        assert!(ledger.needs_processing(&entry("txn_001.xml", 100, 2000)));
        assert!(ledger.needs_processing(&entry("txn_001.xml", 150, 1000)));
    }

    #[test]
    fn test_failed_entry_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = FileLedger::load(dir.path().join("ledger.json")).unwrap();

        let e = entry("txn_002.xml", 100, 1000);
        ledger.record_failure(&e, "no Transaction element".to_string());

        // Identical metadata, but failures are retried every cycle
        assert!(ledger.needs_processing(&e));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let e = entry("txn_001.xml", 100, 1000);
        {
            let mut ledger = FileLedger::load(&path).unwrap();
            ledger.record_success(&e, "abc123".to_string(), vec!["1001".to_string()]);
            ledger.save().unwrap();
        }

        let reloaded = FileLedger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(!reloaded.needs_processing(&e));

        let stored = reloaded.get("txn_001.xml").unwrap();
        assert_eq!(stored.record_ids, vec!["1001".to_string()]);
        assert_eq!(stored.status, IngestStatus::Success);
    }
}
