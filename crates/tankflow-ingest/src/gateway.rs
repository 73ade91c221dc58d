//! Remote source gateway
//!
//! Abstract list/fetch capability over the remote upload directory. The sync
//! engine only depends on this trait; the concrete SFTP adapter lives in
//! [`crate::sftp`] so provider quirks never leak into core logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from remote source operations
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// One file-like object in the remote directory listing
///
/// Transient: re-fetched every cycle, never stored beyond the ledger's copy of
/// `size` and `modified_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File name relative to the listed directory
    pub name: String,
    /// Size in bytes as reported by the server
    pub size: u64,
    /// Modification time, normalized to UTC by the adapter
    pub modified_time: DateTime<Utc>,
}

/// Abstract remote file source (list directory, fetch file)
///
/// Every call is a fresh round trip; the sync engine tolerates each call
/// failing independently per entry.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// List entries in the remote directory
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, GatewayError>;

    /// Fetch the contents of one remote file
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, GatewayError>;
}
