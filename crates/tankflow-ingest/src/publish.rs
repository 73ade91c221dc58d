//! Event bus publication
//!
//! The [`Publisher`] trait is the only thing the sync engine knows about the
//! bus; [`crate::mqtt`] provides the broker-backed implementation. Publish
//! failures never roll back a committed cycle, they surface as the cycle's
//! warning and are implicitly retried by the next changed cycle.
//!
//! Topic layout under the configured prefix:
//!
//! - `status`: retained `online`/`offline` liveness marker
//! - `transactions`: full JSON array of all known records, newest first
//! - `transaction/<id>`: one JSON object per record
//! - `last_update`: RFC 3339 timestamp of the publishing cycle
//! - `total_quantity`: sum of all record quantities
//! - `article_counts`: record count per raw article code

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::store::Snapshot;

/// Reserved liveness topic suffix
pub const STATUS_TOPIC: &str = "status";

/// Errors from bus publication
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publish connection error: {0}")]
    Connection(String),

    #[error("Payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Abstract bus publication capability
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a payload to a topic (at-least-once, non-retained)
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    /// Publish a retained payload (used for the liveness topic)
    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Publish the full known state for one cycle
///
/// Consumers receive the whole snapshot rather than a delta; duplicate
/// publication across cycles is acceptable, record loss is not.
pub async fn publish_full_state<P: Publisher + ?Sized>(
    publisher: &P,
    topic_prefix: &str,
    snapshot: &Snapshot,
) -> Result<(), PublishError> {
    let records = snapshot.records_newest_first();

    let array = serde_json::to_vec(&records)?;
    publisher
        .publish(&format!("{}/transactions", topic_prefix), array)
        .await?;

    for record in &records {
        let payload = serde_json::to_vec(record)?;
        publisher
            .publish(&format!("{}/transaction/{}", topic_prefix, record.id), payload)
            .await?;
    }

    let total_quantity: f64 = records.iter().map(|r| r.quantity).sum();
    publisher
        .publish(
            &format!("{}/total_quantity", topic_prefix),
            format!("{:.2}", total_quantity).into_bytes(),
        )
        .await?;

    let mut article_counts: BTreeMap<&str, u64> = BTreeMap::new();
    for record in &records {
        let code = record
            .raw_attributes
            .get("article_code")
            .map(String::as_str)
            .unwrap_or(record.product_type.as_str());
        *article_counts.entry(code).or_insert(0) += 1;
    }
    publisher
        .publish(
            &format!("{}/article_counts", topic_prefix),
            serde_json::to_vec(&json!(article_counts))?,
        )
        .await?;

    publisher
        .publish(
            &format!("{}/last_update", topic_prefix),
            Utc::now().to_rfc3339().into_bytes(),
        )
        .await?;

    debug!(
        "Published full state: {} records to prefix {}",
        records.len(),
        topic_prefix
    );

    Ok(())
}
