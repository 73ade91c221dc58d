//! Query interface routes
//!
//! Read-only views over the state store snapshot plus the non-blocking
//! refresh trigger. Handlers never touch the remote source; they serve
//! whatever the last completed cycle left behind.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

use tankflow_ingest::scheduler::RefreshHandle;
use tankflow_ingest::store::StateStore;

use crate::error::AppError;
use crate::html;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// State store written by the sync engine
    pub store: Arc<StateStore>,
    /// Trigger for out-of-band sync cycles
    pub refresh: RefreshHandle,
    /// Configured polling interval, for status reporting
    pub poll_interval_secs: u64,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(overview_page))
        .route("/health", get(health_check))
        .route("/reload", get(reload))
        .route("/api/transactions", get(list_transactions))
        .route("/api/transaction/:id", get(get_transaction))
        .route("/api/status", get(sync_status))
        .with_state(state)
}

/// Rendered overview table of all known transactions
///
/// GET /
async fn overview_page(State(state): State<AppState>) -> Html<String> {
    Html(html::render_overview(&state.store.snapshot()))
}

/// Liveness probe
///
/// GET /health
async fn health_check() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

/// Full snapshot as JSON, newest first
///
/// GET /api/transactions
async fn list_transactions(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    let records = snapshot.records_newest_first();

    let body = json!({
        "success": true,
        "data": records,
        "count": records.len(),
        "timestamp": Utc::now().to_rfc3339(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// One record by id
///
/// GET /api/transaction/:id
async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let snapshot = state.store.snapshot();

    match snapshot.records.get(&id) {
        Some(record) => Ok((StatusCode::OK, Json(json!(record))).into_response()),
        None => Err(AppError::NotFound(format!("No transaction with id {}", id))),
    }
}

/// Sync metadata: staleness is observable without inferring it from data
///
/// GET /api/status
async fn sync_status(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();

    let next_update = snapshot
        .last_sync_at
        .map(|t| t + Duration::seconds(state.poll_interval_secs as i64));

    let body = json!({
        "status": "online",
        "record_count": snapshot.records.len(),
        "cycle_sequence": snapshot.cycle_sequence,
        "last_sync_at": snapshot.last_sync_at.map(|t| t.to_rfc3339()),
        "last_sync_error": snapshot.last_sync_error,
        "update_interval": state.poll_interval_secs,
        "next_update": next_update.map(|t| t.to_rfc3339()),
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// Request an out-of-band sync cycle; returns before the cycle runs
///
/// GET /reload
async fn reload(State(state): State<AppState>) -> Response {
    let accepted = state.refresh.request_refresh();
    let message = if accepted {
        "Refresh requested"
    } else {
        "Refresh already pending"
    };

    tracing::info!("{} via /reload", message);

    let body = json!({
        "success": true,
        "message": message,
        "timestamp": Utc::now().to_rfc3339(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tankflow_ingest::gateway::{GatewayError, RemoteEntry, RemoteSource};
    use tankflow_ingest::ledger::FileLedger;
    use tankflow_ingest::record::Record;
    use tankflow_ingest::scheduler;
    use tankflow_ingest::sync::SyncEngine;
    use std::collections::BTreeMap;
    use std::time::Duration as StdDuration;
    use tokio::sync::watch;

    /// Remote source with an empty directory; cycles are harmless no-ops
    struct EmptySource;

    #[async_trait]
    impl RemoteSource for EmptySource {
        async fn list(&self, _path: &str) -> Result<Vec<RemoteEntry>, GatewayError> {
            Ok(Vec::new())
        }

        async fn fetch(&self, path: &str) -> Result<Vec<u8>, GatewayError> {
            Err(GatewayError::NotFound(path.to_string()))
        }
    }

    fn test_state(dir: &tempfile::TempDir) -> (AppState, watch::Sender<bool>) {
        let store = Arc::new(StateStore::new());
        let ledger = FileLedger::load(dir.path().join("ledger.json")).unwrap();
        let engine = Arc::new(SyncEngine::new(
            Arc::new(EmptySource),
            Arc::clone(&store),
            ledger,
            "/upload",
            "tank_data",
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (refresh, _handle) =
            scheduler::start(engine, StdDuration::from_secs(3600), shutdown_rx);

        (
            AppState {
                store,
                refresh,
                poll_interval_secs: 300,
            },
            shutdown_tx,
        )
    }

    fn sample_record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            timestamp: Utc::now(),
            tank_identifier: "2".to_string(),
            quantity: 53.2,
            product_type: "AVGAS".to_string(),
            unit_price: None,
            raw_attributes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_router_builds() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _shutdown) = test_state(&dir);
        let _router = router(state);
    }

    #[tokio::test]
    async fn test_get_transaction_found_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _shutdown) = test_state(&dir);

        let record = sample_record("1001");
        let mut delta = BTreeMap::new();
        delta.insert(record.id.clone(), record);
        state.store.commit(delta, None);

        let found = get_transaction(State(state.clone()), Path("1001".to_string())).await;
        assert!(found.is_ok());

        let missing = get_transaction(State(state), Path("9999".to_string())).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reload_acknowledges_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _shutdown) = test_state(&dir);

        let response = reload(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_reports_sync_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _shutdown) = test_state(&dir);

        state
            .store
            .commit(BTreeMap::new(), Some("txn_002.xml: parse failed".to_string()));

        let response = sync_status(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
