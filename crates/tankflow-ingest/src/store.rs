//! In-process state store
//!
//! The authoritative snapshot of all known records plus sync metadata. Only
//! the sync engine writes; readers (query interface, publisher) clone an
//! `Arc<Snapshot>` and never observe a partially merged cycle, because every
//! commit builds the next snapshot off to the side and swaps it in whole.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::record::Record;

/// Immutable view of the store at a point in cycle time
#[derive(Debug, Clone, Serialize, Default)]
pub struct Snapshot {
    /// All known records, keyed by id
    pub records: BTreeMap<String, Record>,
    /// When the last successful cycle merged
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Error or warning from the most recent cycle, if any
    pub last_sync_error: Option<String>,
    /// Number of completed merge cycles
    pub cycle_sequence: u64,
}

impl Snapshot {
    /// Records ordered newest-first by source timestamp
    pub fn records_newest_first(&self) -> Vec<&Record> {
        let mut records: Vec<&Record> = self.records.values().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

/// Result of committing a cycle delta
#[derive(Debug)]
pub struct CommitResult {
    /// Whether any record was added or changed value
    pub changed: bool,
    /// The snapshot readers now see
    pub snapshot: Arc<Snapshot>,
}

/// Swap-on-write state store; mutated only by the sync engine
#[derive(Debug, Default)]
pub struct StateStore {
    current: RwLock<Arc<Snapshot>>,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot; cheap, never blocks on an in-flight cycle
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&read_lock(&self.current))
    }

    /// Merge a cycle delta atomically and expose the next snapshot
    ///
    /// Later records in the delta have already overwritten earlier ones with
    /// the same id (the delta is a map). `warning` carries non-fatal per-file
    /// failures from the cycle.
    pub fn commit(&self, delta: BTreeMap<String, Record>, warning: Option<String>) -> CommitResult {
        let mut guard = write_lock(&self.current);
        let previous = Arc::clone(&guard);

        let mut records = previous.records.clone();
        let mut changed = false;
        for (id, record) in delta {
            match records.get(&id) {
                Some(existing) if *existing == record => {},
                _ => changed = true,
            }
            records.insert(id, record);
        }

        let next = Arc::new(Snapshot {
            records,
            last_sync_at: Some(Utc::now()),
            last_sync_error: warning,
            cycle_sequence: previous.cycle_sequence + 1,
        });

        *guard = Arc::clone(&next);
        debug!(
            "Committed cycle {} ({} records, changed={})",
            next.cycle_sequence,
            next.records.len(),
            changed
        );

        CommitResult { changed, snapshot: next }
    }

    /// Record an aborted cycle without touching records or sync time
    ///
    /// Keeps the last good data serveable while making staleness observable
    /// through `last_sync_error`.
    pub fn record_cycle_failure(&self, error: String) {
        let mut guard = write_lock(&self.current);
        let previous = Arc::clone(&guard);

        *guard = Arc::new(Snapshot {
            records: previous.records.clone(),
            last_sync_at: previous.last_sync_at,
            last_sync_error: Some(error),
            cycle_sequence: previous.cycle_sequence,
        });
    }
}

// Lock poisoning only happens if a writer panicked; the snapshot Arc inside is
// still consistent, so recover it rather than propagate the panic.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, quantity: f64) -> Record {
        Record {
            id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
            tank_identifier: "1".to_string(),
            quantity,
            product_type: "AVGAS".to_string(),
            unit_price: None,
            raw_attributes: BTreeMap::new(),
        }
    }

    fn delta(records: Vec<Record>) -> BTreeMap<String, Record> {
        records.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[test]
    fn test_commit_upserts_by_id() {
        let store = StateStore::new();

        let result = store.commit(delta(vec![record("1001", 10.0)]), None);
        assert!(result.changed);
        assert_eq!(result.snapshot.cycle_sequence, 1);

        let result = store.commit(delta(vec![record("1001", 25.0)]), None);
        assert!(result.changed);
        assert_eq!(result.snapshot.records.len(), 1);
        assert_eq!(result.snapshot.records["1001"].quantity, 25.0);
    }

    #[test]
    fn test_unchanged_delta_reports_no_change() {
        let store = StateStore::new();
        store.commit(delta(vec![record("1001", 10.0)]), None);

        let result = store.commit(delta(vec![record("1001", 10.0)]), None);
        assert!(!result.changed);
        assert_eq!(result.snapshot.cycle_sequence, 2);
    }

    #[test]
    fn test_failure_preserves_last_good_snapshot() {
        let store = StateStore::new();
        store.commit(delta(vec![record("1001", 10.0)]), None);
        let before = store.snapshot();

        store.record_cycle_failure("Connection error: unreachable".to_string());
        let after = store.snapshot();

        assert_eq!(after.records.len(), 1);
        assert_eq!(after.last_sync_at, before.last_sync_at);
        assert_eq!(after.cycle_sequence, before.cycle_sequence);
        assert_eq!(
            after.last_sync_error.as_deref(),
            Some("Connection error: unreachable")
        );
    }

    #[test]
    fn test_readers_keep_their_snapshot_across_commits() {
        let store = StateStore::new();
        store.commit(delta(vec![record("1001", 10.0)]), None);

        let held = store.snapshot();
        store.commit(delta(vec![record("1002", 20.0)]), None);

        // The held snapshot is immutable; new state is a separate Arc
        assert_eq!(held.records.len(), 1);
        assert_eq!(store.snapshot().records.len(), 2);
    }

    #[test]
    fn test_records_newest_first() {
        let store = StateStore::new();
        let mut older = record("1001", 10.0);
        older.timestamp = Utc.with_ymd_and_hms(2026, 3, 13, 8, 0, 0).unwrap();
        let newer = record("1002", 20.0);

        store.commit(delta(vec![older, newer]), None);
        let snapshot = store.snapshot();
        let ordered = snapshot.records_newest_first();
        assert_eq!(ordered[0].id, "1002");
        assert_eq!(ordered[1].id, "1001");
    }
}
