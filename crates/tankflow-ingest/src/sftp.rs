//! SFTP adapter for the remote source gateway
//!
//! Wraps the blocking `ssh2` client in `spawn_blocking` with bounded retry,
//! one short-lived session per operation. Provider quirks (missing sizes,
//! epoch-second mtimes) are normalized here so the core only ever sees a
//! well-formed [`RemoteEntry`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssh2::Session;
use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, RemoteEntry, RemoteSource};

/// Maximum number of retry attempts for SFTP operations
pub const MAX_RETRIES: u32 = 3;

/// Base delay between retry attempts (in seconds)
/// Actual delay is this value multiplied by the attempt number
pub const RETRY_DELAY_SECS: u64 = 5;

/// Configuration for the SFTP connection
#[derive(Debug, Clone)]
pub struct SftpConfig {
    /// SFTP server hostname
    pub host: String,

    /// SFTP server port (usually 22)
    pub port: u16,

    /// SFTP username
    pub username: String,

    /// SFTP password
    pub password: String,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Per-operation timeout in seconds; a hung fetch fails instead of
    /// stalling the whole cycle
    pub operation_timeout_secs: u64,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            username: "tankdata".to_string(),
            password: String::new(),
            connect_timeout_secs: 10,
            operation_timeout_secs: 60,
        }
    }
}

/// SFTP-backed remote source with retry logic
pub struct SftpSource {
    config: SftpConfig,
}

impl SftpSource {
    /// Create a new SFTP source with the given configuration
    pub fn new(config: SftpConfig) -> Self {
        Self { config }
    }

    /// Run a blocking SFTP operation with retry on connection failure
    async fn with_retry<T, F>(&self, what: &str, target: &str, op: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: Fn(SftpConfig, String) -> Result<T, GatewayError> + Send + Sync + Clone + 'static,
    {
        let target = target.to_string();

        for attempt in 1..=MAX_RETRIES {
            debug!("{} attempt {}/{} for: {}", what, attempt, MAX_RETRIES, target);

            let config = self.config.clone();
            let path = target.clone();
            let op = op.clone();
            let result = tokio::task::spawn_blocking(move || op(config, path))
                .await
                .map_err(|e| GatewayError::Connection(format!("SFTP task panicked: {}", e)))?;

            match result {
                Ok(value) => return Ok(value),
                // Auth and not-found failures are not transient
                Err(e @ GatewayError::Auth(_)) | Err(e @ GatewayError::NotFound(_)) => {
                    return Err(e)
                },
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let delay = RETRY_DELAY_SECS * attempt as u64;
                        warn!(
                            "{} attempt {}/{} failed: {}. Retrying in {}s...",
                            what, attempt, MAX_RETRIES, e, delay
                        );
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    } else {
                        return Err(GatewayError::Connection(format!(
                            "{} of {} failed after {} attempts: {}",
                            what, target, MAX_RETRIES, e
                        )));
                    }
                },
            }
        }

        unreachable!("Retry loop should always return")
    }

    /// Open an authenticated SFTP channel (blocking)
    fn connect_sync(config: &SftpConfig) -> Result<(Session, ssh2::Sftp), GatewayError> {
        debug!("Connecting to SFTP server: {}:{}", config.host, config.port);

        let addr = format!("{}:{}", config.host, config.port);
        let socket_addr = {
            use std::net::ToSocketAddrs;
            addr.to_socket_addrs()
                .map_err(|e| GatewayError::Connection(format!("Failed to resolve {}: {}", addr, e)))?
                .next()
                .ok_or_else(|| {
                    GatewayError::Connection(format!("No addresses resolved for {}", addr))
                })?
        };

        let tcp =
            TcpStream::connect_timeout(&socket_addr, Duration::from_secs(config.connect_timeout_secs))
                .map_err(|e| {
                    GatewayError::Connection(format!("Failed to connect to {}: {}", addr, e))
                })?;

        let mut session = Session::new()
            .map_err(|e| GatewayError::Connection(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout((config.operation_timeout_secs * 1000) as u32);
        session
            .handshake()
            .map_err(|e| GatewayError::Connection(format!("SSH handshake failed: {}", e)))?;

        session
            .userauth_password(&config.username, &config.password)
            .map_err(|e| {
                GatewayError::Auth(format!("Authentication failed for {}: {}", config.username, e))
            })?;

        let sftp = session
            .sftp()
            .map_err(|e| GatewayError::Connection(format!("Failed to open SFTP channel: {}", e)))?;

        Ok((session, sftp))
    }

    /// Synchronous directory listing
    fn list_sync(config: SftpConfig, path: String) -> Result<Vec<RemoteEntry>, GatewayError> {
        let (_session, sftp) = Self::connect_sync(&config)?;

        debug!("Listing directory: {}", path);
        let listing = sftp.readdir(Path::new(&path)).map_err(|e| {
            GatewayError::Connection(format!("Failed to list directory {}: {}", path, e))
        })?;

        let entries = listing
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_str()?.to_string();
                Some(RemoteEntry {
                    name,
                    size: stat.size.unwrap_or(0),
                    modified_time: mtime_to_utc(stat.mtime),
                })
            })
            .collect();

        Ok(entries)
    }

    /// Synchronous file download
    fn fetch_sync(config: SftpConfig, path: String) -> Result<Vec<u8>, GatewayError> {
        let (_session, sftp) = Self::connect_sync(&config)?;

        debug!("Downloading file: {}", path);
        let mut remote_file = sftp
            .open(Path::new(&path))
            .map_err(|e| GatewayError::NotFound(format!("Failed to open {}: {}", path, e)))?;

        let mut data = Vec::new();
        remote_file.read_to_end(&mut data).map_err(|e| {
            GatewayError::Connection(format!("Failed to read {}: {}", path, e))
        })?;

        debug!("Downloaded {} bytes from {}", data.len(), path);
        Ok(data)
    }
}

#[async_trait]
impl RemoteSource for SftpSource {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, GatewayError> {
        let entries = self.with_retry("LIST", path, Self::list_sync).await?;
        info!("Successfully listed {} ({} entries)", path, entries.len());
        Ok(entries)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, GatewayError> {
        let data = self.with_retry("Download", path, Self::fetch_sync).await?;
        info!("Successfully downloaded {} ({} bytes)", path, data.len());
        Ok(data)
    }
}

/// Convert an SFTP mtime (epoch seconds, possibly absent) to UTC
fn mtime_to_utc(mtime: Option<u64>) -> DateTime<Utc> {
    mtime
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default())
}
