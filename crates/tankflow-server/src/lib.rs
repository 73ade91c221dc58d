//! Tankflow Server Library
//!
//! HTTP query surface over the ingestion pipeline's state store.
//!
//! # Overview
//!
//! The server exposes read-only views of the latest known transaction state
//! plus a non-blocking refresh trigger:
//!
//! - `GET /`: rendered overview table of all known transactions
//! - `GET /health`: liveness probe
//! - `GET /api/transactions`: full snapshot as JSON, newest first
//! - `GET /api/transaction/:id`: one record by id
//! - `GET /api/status`: sync metadata (last sync time, last error)
//! - `GET /reload`: request an out-of-band sync cycle, acknowledged
//!   immediately without waiting for the cycle
//!
//! Every read serves the state store's current snapshot; no handler ever
//! performs remote I/O or waits on an in-flight sync cycle.

pub mod config;
pub mod error;
pub mod html;
pub mod routes;

pub use error::AppError;
