//! Tankflow Ingest Library
//!
//! Ingestion-and-synchronization pipeline for dispenser transaction files.
//!
//! # Overview
//!
//! The pipeline periodically lists an SFTP upload directory, detects new or
//! changed transaction files through a durable ledger, parses them into
//! canonical [`record::Record`]s, merges the result atomically into an
//! in-process [`store::StateStore`], and publishes the full known state to an
//! MQTT broker. A capacity-one scheduler serializes timer ticks and manual
//! refresh requests so at most one sync cycle runs at a time.
//!
//! # Components
//!
//! - [`gateway`]: abstract remote source (list/fetch) plus the SFTP adapter
//! - [`ledger`]: durable per-file ingestion history (skip unchanged files)
//! - [`parser`]: XML transaction extraction with per-record fault isolation
//! - [`store`]: swap-on-write snapshot of all known records
//! - [`sync`]: one list -> diff -> fetch -> parse -> merge -> publish cycle
//! - [`scheduler`]: interval timer with coalesced manual refresh
//! - [`publish`]: event bus seam plus the MQTT adapter

pub mod config;
pub mod gateway;
pub mod ledger;
pub mod mqtt;
pub mod parser;
pub mod publish;
pub mod record;
pub mod scheduler;
pub mod sftp;
pub mod store;
pub mod sync;

pub use config::Config;
pub use record::Record;
pub use store::{Snapshot, StateStore};
