//! Cycle scheduler
//!
//! Drives sync cycles on a fixed interval and accepts out-of-band refresh
//! requests. Requests are funneled through a capacity-one channel: a request
//! arriving while a cycle runs parks in the channel slot, any further requests
//! find the slot occupied and are coalesced away. That bounds execution to one
//! cycle at a time and guarantees a manual refresh starts a fresh cycle no
//! later than the end of the in-flight one.
//!
//! Shutdown never preempts a cycle; the loop observes the signal between
//! cycles and lets the current one finish.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::sync::SyncEngine;

/// Non-blocking trigger for an out-of-band sync cycle
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Request a refresh; returns immediately
    ///
    /// Returns `false` when a request is already pending (the new one is
    /// coalesced into it), `true` when this request occupied the slot.
    pub fn request_refresh(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Start the scheduling loop in a background task
///
/// The first cycle runs immediately, then every `interval`. The returned
/// handle resolves after a shutdown signal once the in-flight cycle finished.
pub fn start(
    engine: Arc<SyncEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> (RefreshHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        info!("Scheduler started (interval: {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Timer tick");
                },
                Some(()) = rx.recv() => {
                    debug!("Manual refresh request");
                },
                _ = shutdown.changed() => {
                    break;
                },
            }

            // Errors are already reflected in the store; the next tick retries
            let _ = engine.run_cycle().await;
        }

        info!("Scheduler stopped");
    });

    (RefreshHandle { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, RemoteEntry, RemoteSource};
    use crate::ledger::FileLedger;
    use crate::store::StateStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that counts listings and can hold a cycle open
    struct SlowSource {
        listings: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl RemoteSource for SlowSource {
        async fn list(&self, _path: &str) -> Result<Vec<RemoteEntry>, GatewayError> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }

        async fn fetch(&self, path: &str) -> Result<Vec<u8>, GatewayError> {
            Err(GatewayError::NotFound(path.to_string()))
        }
    }

    fn engine(source: Arc<SlowSource>, dir: &tempfile::TempDir) -> Arc<SyncEngine> {
        let ledger = FileLedger::load(dir.path().join("ledger.json")).unwrap();
        Arc::new(SyncEngine::new(
            source,
            Arc::new(StateStore::new()),
            ledger,
            "/upload",
            "tank_data",
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_drives_cycles() {
        let source = Arc::new(SlowSource {
            listings: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        });
        let dir = tempfile::tempdir().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (_refresh, handle) =
            start(engine(source.clone(), &dir), Duration::from_secs(300), shutdown_rx);

        // Immediate first cycle, then one per interval
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.listings.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(source.listings.load(Ordering::SeqCst), 3);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_requests_coalesce_to_one_extra_cycle() {
        let source = Arc::new(SlowSource {
            listings: AtomicUsize::new(0),
            delay: Duration::from_secs(10),
        });
        let dir = tempfile::tempdir().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (refresh, handle) =
            start(engine(source.clone(), &dir), Duration::from_secs(3600), shutdown_rx);

        // Let the immediate first cycle begin (it sleeps 10s inside list)
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.listings.load(Ordering::SeqCst), 1);

        // Burst of refresh requests while the cycle is running
        assert!(refresh.request_refresh());
        for _ in 0..4 {
            assert!(!refresh.request_refresh());
        }

        // After the in-flight cycle and the coalesced one, exactly 2 cycles ran
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(source.listings.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_cycle() {
        let source = Arc::new(SlowSource {
            listings: AtomicUsize::new(0),
            delay: Duration::from_secs(5),
        });
        let dir = tempfile::tempdir().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (_refresh, handle) =
            start(engine(source.clone(), &dir), Duration::from_secs(3600), shutdown_rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();

        // The join only resolves after the 5s cycle completes
        handle.await.unwrap();
        assert_eq!(source.listings.load(Ordering::SeqCst), 1);
    }
}
