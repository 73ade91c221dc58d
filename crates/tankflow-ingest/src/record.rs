//! Canonical transaction record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tankflow_common::fingerprint::fingerprint_fields;

/// Article code for AVGAS in the dispenser export format
pub const ARTICLE_AVGAS: &str = "1";

/// Article code for MOGAS in the dispenser export format
pub const ARTICLE_MOGAS: &str = "2";

/// One fueling transaction, parsed from a remote XML file
///
/// `id` is stable across re-parses of the same content: the source transaction
/// number when present, otherwise a content hash of the key fields. It is never
/// derived from file position, so re-ingesting an unchanged file upserts the
/// same records instead of duplicating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identity, unique within the state store
    pub id: String,
    /// Transaction start time as reported by the source
    pub timestamp: DateTime<Utc>,
    /// Dispenser/tank the transaction was drawn from
    pub tank_identifier: String,
    /// Dispensed quantity in liters
    pub quantity: f64,
    /// Product name (article code translated where known)
    pub product_type: String,
    /// Price per unit, if the source reports one
    pub unit_price: Option<f64>,
    /// Source fields not otherwise modeled (raw article code, license plate, ...)
    pub raw_attributes: BTreeMap<String, String>,
}

impl Record {
    /// Derive the stable record identity
    ///
    /// Prefers the source-provided transaction number. Falls back to a
    /// fingerprint of the key fields so files without transaction numbers
    /// still re-ingest idempotently.
    pub fn derive_id(
        transaction_number: Option<&str>,
        timestamp: &DateTime<Utc>,
        tank_identifier: &str,
        quantity: f64,
        product_type: &str,
    ) -> String {
        match transaction_number {
            Some(number) if !number.trim().is_empty() => number.trim().to_string(),
            _ => {
                let ts = timestamp.to_rfc3339();
                let qty = format!("{:.3}", quantity);
                fingerprint_fields([ts.as_str(), tank_identifier, qty.as_str(), product_type])
            },
        }
    }

    /// Translate a raw article code to its product name
    ///
    /// Unknown codes pass through verbatim; the raw code is always preserved
    /// in `raw_attributes` by the parser.
    pub fn product_name(article_code: &str) -> String {
        match article_code {
            ARTICLE_AVGAS => "AVGAS".to_string(),
            ARTICLE_MOGAS => "MOGAS".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_derive_id_prefers_transaction_number() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let id = Record::derive_id(Some("4711"), &ts, "2", 53.2, "AVGAS");
        assert_eq!(id, "4711");
    }

    #[test]
    fn test_derive_id_ignores_blank_transaction_number() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let id = Record::derive_id(Some("   "), &ts, "2", 53.2, "AVGAS");
        assert_eq!(id.len(), 64);
    }

    #[test]
    fn test_derive_id_content_hash_is_stable() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let a = Record::derive_id(None, &ts, "2", 53.2, "AVGAS");
        let b = Record::derive_id(None, &ts, "2", 53.2, "AVGAS");
        assert_eq!(a, b);

        let c = Record::derive_id(None, &ts, "3", 53.2, "AVGAS");
        assert_ne!(a, c);
    }

    #[test]
    fn test_product_name_translation() {
        assert_eq!(Record::product_name("1"), "AVGAS");
        assert_eq!(Record::product_name("2"), "MOGAS");
        assert_eq!(Record::product_name("JET-A1"), "JET-A1");
    }
}
