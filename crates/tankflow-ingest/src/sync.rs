//! Sync engine
//!
//! One cycle: list the remote directory, diff against the ledger, fetch and
//! parse changed entries, merge the cycle delta atomically into the state
//! store, persist the ledger, and publish the full snapshot when anything
//! changed. Per-entry failures are isolated; only a failed directory listing
//! aborts the cycle, and even then the last good snapshot stays serveable.
//!
//! Nothing is retried within a cycle. Transient failures heal on the next
//! scheduled cycle through the ledger's failed-status rule.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use tankflow_common::fingerprint::fingerprint_bytes;

use crate::gateway::{GatewayError, RemoteSource};
use crate::ledger::FileLedger;
use crate::parser;
use crate::publish::{publish_full_state, Publisher};
use crate::record::Record;
use crate::store::StateStore;

/// Statistics for one completed cycle
#[derive(Debug, Default)]
pub struct CycleStats {
    /// Entries in the remote listing
    pub listed: usize,
    /// Entries skipped as unchanged
    pub skipped_unchanged: usize,
    /// Entries fetched and parsed
    pub processed: usize,
    /// Entries whose fetch or parse failed this cycle
    pub failed: usize,
    /// Malformed transactions skipped inside otherwise valid files
    pub records_skipped: usize,
    /// Records merged into the store
    pub records_upserted: usize,
    /// Whether the merge changed any record
    pub changed: bool,
    /// Whether a publish was attempted and succeeded
    pub published: bool,
}

/// Orchestrates ingestion cycles over a remote source
pub struct SyncEngine {
    source: Arc<dyn RemoteSource>,
    publisher: Option<Arc<dyn Publisher>>,
    store: Arc<StateStore>,
    ledger: Mutex<FileLedger>,
    remote_path: String,
    topic_prefix: String,
}

impl SyncEngine {
    /// Create a sync engine without bus publication
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Arc<StateStore>,
        ledger: FileLedger,
        remote_path: impl Into<String>,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            source,
            publisher: None,
            store,
            ledger: Mutex::new(ledger),
            remote_path: remote_path.into(),
            topic_prefix: topic_prefix.into(),
        }
    }

    /// Attach a bus publisher; the engine publishes once per changed cycle
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Run one full ingestion cycle
    ///
    /// Returns `Err` only when the directory listing fails; the store then
    /// carries the error while keeping its previous records. Everything past
    /// the listing degrades per entry instead of aborting.
    pub async fn run_cycle(&self) -> Result<CycleStats, GatewayError> {
        let mut stats = CycleStats::default();

        let entries = match self.source.list(&self.remote_path).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Cycle aborted, listing {} failed: {}", self.remote_path, e);
                self.store.record_cycle_failure(e.to_string());
                return Err(e);
            },
        };
        stats.listed = entries.len();

        // The scheduler guarantees a single cycle in flight, so this lock is
        // uncontended; it exists to keep ledger mutation out of the read path.
        let mut ledger = self.ledger.lock().await;

        let mut delta: BTreeMap<String, Record> = BTreeMap::new();
        let mut failures: Vec<String> = Vec::new();

        for entry in &entries {
            if !ledger.needs_processing(entry) {
                stats.skipped_unchanged += 1;
                continue;
            }

            // A configured trailing slash must not produce a double slash
            let remote_file =
                format!("{}/{}", self.remote_path.trim_end_matches('/'), entry.name);
            let bytes = match self.source.fetch(&remote_file).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Fetch failed for {}: {}", entry.name, e);
                    ledger.record_failure(entry, e.to_string());
                    failures.push(format!("{}: {}", entry.name, e));
                    stats.failed += 1;
                    continue;
                },
            };

            let fingerprint = fingerprint_bytes(&bytes);
            match parser::parse(&entry.name, &bytes) {
                Ok(outcome) => {
                    stats.processed += 1;
                    stats.records_skipped += outcome.skipped;
                    if outcome.skipped > 0 {
                        failures.push(format!(
                            "{}: {} malformed transactions skipped",
                            entry.name, outcome.skipped
                        ));
                    }

                    let ids: Vec<String> =
                        outcome.records.iter().map(|r| r.id.clone()).collect();
                    for record in outcome.records {
                        // Later records in the same cycle overwrite earlier
                        // ones with the same id
                        delta.insert(record.id.clone(), record);
                    }
                    ledger.record_success(entry, fingerprint, ids);
                },
                Err(e) => {
                    warn!("Parse failed for {}: {}", entry.name, e);
                    ledger.record_failure(entry, e.reason.clone());
                    failures.push(format!("{}: {}", entry.name, e.reason));
                    stats.failed += 1;
                },
            }
        }

        if let Err(e) = ledger.save() {
            error!("Failed to persist ledger: {}", e);
            failures.push(format!("ledger not persisted: {}", e));
        }
        drop(ledger);

        stats.records_upserted = delta.len();
        let warning = if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        };

        let result = self.store.commit(delta, warning);
        stats.changed = result.changed;

        if result.changed {
            if let Some(publisher) = &self.publisher {
                match publish_full_state(publisher.as_ref(), &self.topic_prefix, &result.snapshot)
                    .await
                {
                    Ok(()) => stats.published = true,
                    Err(e) => {
                        // State is already merged; the failure joins the
                        // cycle's warning and the next changed cycle republishes
                        warn!("Publish failed after merge: {}", e);
                        failures.push(format!("Publish error: {}", e));
                        self.store.record_cycle_failure(failures.join("; "));
                    },
                }
            }
        }

        info!(
            "Cycle {} complete: {} listed, {} skipped, {} processed, {} failed, {} upserted",
            result.snapshot.cycle_sequence,
            stats.listed,
            stats.skipped_unchanged,
            stats.processed,
            stats.failed,
            stats.records_upserted
        );

        Ok(stats)
    }

    /// The state store this engine commits to
    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }
}
