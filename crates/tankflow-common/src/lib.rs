//! Tankflow Common Library
//!
//! Shared error handling, logging setup, and content fingerprinting used by
//! all tankflow workspace members.
//!
//! # Example
//!
//! ```no_run
//! use tankflow_common::fingerprint::fingerprint_bytes;
//!
//! let digest = fingerprint_bytes(b"<Transaction>...</Transaction>");
//! println!("content fingerprint: {}", digest);
//! ```

pub mod error;
pub mod fingerprint;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, TankflowError};
