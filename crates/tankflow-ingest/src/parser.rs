//! Transaction XML parser
//!
//! Extracts [`Record`]s from dispenser export files. The format is a shallow
//! XML document with one or more `<Transaction>` elements, each carrying leaf
//! fields like `TransactionNumber`, `TransactionStartDate`, `DispenserNumber`,
//! `ArticleNumber` and `TransactionQuantity` (possibly nested one level under
//! grouping elements such as `DispenserData` or `ArticleData`).
//!
//! Fault isolation: a malformed individual transaction is skipped and counted,
//! not fatal. Only an unreadable envelope (broken XML, no `<Transaction>`
//! element at all) fails the whole file.

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::record::Record;

/// Date formats accepted for `TransactionStartDate`
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%d.%m.%Y %H:%M:%S"];

/// Envelope-level parse failure; the file is recorded as `failed` in the ledger
#[derive(Error, Debug)]
#[error("Parse error in {filename}: {reason}")]
pub struct ParseError {
    /// File the error occurred in
    pub filename: String,
    /// What went wrong
    pub reason: String,
    /// Offending input fragment, when one can be pointed at
    pub fragment: Option<String>,
}

/// Result of parsing one file
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// Successfully extracted records
    pub records: Vec<Record>,
    /// Count of malformed transactions skipped within the file
    pub skipped: usize,
}

/// Parse one transaction file into records
///
/// Record identity is derived from content (see [`Record::derive_id`]), so
/// parsing the same bytes twice yields identical ids.
pub fn parse(filename: &str, bytes: &[u8]) -> Result<ParseOutcome, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError {
        filename: filename.to_string(),
        reason: format!("File is not valid UTF-8: {}", e),
        fragment: None,
    })?;

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut transactions_seen = 0usize;

    let mut builder: Option<TransactionBuilder> = None;
    let mut current_leaf: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Transaction" {
                    transactions_seen += 1;
                    builder = Some(TransactionBuilder::default());
                } else if builder.is_some() {
                    // Grouping elements (DispenserData, ArticleData, ...) have
                    // no text of their own; only the innermost name matters
                    current_leaf = Some(name);
                }
            },
            Ok(Event::Text(t)) => {
                if let (Some(b), Some(leaf)) = (builder.as_mut(), current_leaf.as_ref()) {
                    let value = t.unescape().map_err(|e| ParseError {
                        filename: filename.to_string(),
                        reason: format!("Invalid text content: {}", e),
                        fragment: Some(leaf.clone()),
                    })?;
                    b.set_field(leaf, value.trim());
                }
            },
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "Transaction" {
                    if let Some(b) = builder.take() {
                        match b.build() {
                            Ok(record) => records.push(record),
                            Err(reason) => {
                                warn!("Skipping malformed transaction in {}: {}", filename, reason);
                                skipped += 1;
                            },
                        }
                    }
                    current_leaf = None;
                } else if current_leaf.as_deref() == Some(name.as_str()) {
                    current_leaf = None;
                }
            },
            Ok(Event::Eof) => {
                if builder.is_some() {
                    return Err(ParseError {
                        filename: filename.to_string(),
                        reason: "Unexpected end of file inside Transaction".to_string(),
                        fragment: None,
                    });
                }
                break;
            },
            Ok(_) => {},
            Err(e) => {
                return Err(ParseError {
                    filename: filename.to_string(),
                    reason: format!("XML error at byte {}: {}", reader.buffer_position(), e),
                    fragment: None,
                });
            },
        }
    }

    if transactions_seen == 0 {
        return Err(ParseError {
            filename: filename.to_string(),
            reason: "No Transaction element found".to_string(),
            fragment: None,
        });
    }

    debug!(
        "Parsed {}: {} records, {} skipped",
        filename,
        records.len(),
        skipped
    );

    Ok(ParseOutcome { records, skipped })
}

/// Accumulates leaf fields for one `<Transaction>` element
#[derive(Debug, Default)]
struct TransactionBuilder {
    transaction_number: Option<String>,
    start_date: Option<String>,
    dispenser_number: Option<String>,
    article_number: Option<String>,
    quantity: Option<String>,
    unit_price: Option<String>,
    extra: BTreeMap<String, String>,
}

impl TransactionBuilder {
    fn set_field(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        match name {
            "TransactionNumber" => self.transaction_number = Some(value.to_string()),
            "TransactionStartDate" => self.start_date = Some(value.to_string()),
            "DispenserNumber" => self.dispenser_number = Some(value.to_string()),
            "ArticleNumber" => self.article_number = Some(value.to_string()),
            "TransactionQuantity" => self.quantity = Some(value.to_string()),
            "UnitPrice" => self.unit_price = Some(value.to_string()),
            other => {
                self.extra.insert(other.to_string(), value.to_string());
            },
        }
    }

    /// Validate and assemble the record; Err means skip-and-count
    fn build(self) -> Result<Record, String> {
        let timestamp = match self.start_date.as_deref() {
            Some(raw) => parse_start_date(raw)
                .ok_or_else(|| format!("Unparseable TransactionStartDate: {:?}", raw))?,
            // The source occasionally omits the date; sorted to the far past
            None => DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default(),
        };

        let quantity = match self.quantity.as_deref() {
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|_| format!("Unparseable TransactionQuantity: {:?}", raw))?,
            None => 0.0,
        };

        let unit_price = match self.unit_price.as_deref() {
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|_| format!("Unparseable UnitPrice: {:?}", raw))?,
            ),
            None => None,
        };

        let tank_identifier = self.dispenser_number.unwrap_or_else(|| "N/A".to_string());

        let mut raw_attributes = self.extra;
        let product_type = match self.article_number {
            Some(code) => {
                let name = Record::product_name(&code);
                raw_attributes.insert("article_code".to_string(), code);
                name
            },
            None => "N/A".to_string(),
        };

        let id = Record::derive_id(
            self.transaction_number.as_deref(),
            &timestamp,
            &tank_identifier,
            quantity,
            &product_type,
        );

        Ok(Record {
            id,
            timestamp,
            tank_identifier,
            quantity,
            product_type,
            unit_price,
            raw_attributes,
        })
    }
}

/// Parse a source-reported start date in either accepted format
fn parse_start_date(raw: &str) -> Option<DateTime<Utc>> {
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_FILE: &str = r#"<?xml version="1.0"?>
<TransactionData>
  <Transaction>
    <TransactionNumber>1001</TransactionNumber>
    <TransactionStartDate>2026-03-14 09:30:00</TransactionStartDate>
    <DispenserData>
      <DispenserNumber>2</DispenserNumber>
    </DispenserData>
    <ArticleData>
      <ArticleNumber>1</ArticleNumber>
    </ArticleData>
    <TransactionQuantity>53.20</TransactionQuantity>
    <MediaData>
      <AdditionalEntry>D-EABC</AdditionalEntry>
    </MediaData>
  </Transaction>
  <Transaction>
    <TransactionNumber>1002</TransactionNumber>
    <TransactionStartDate>14.03.2026 10:15:00</TransactionStartDate>
    <DispenserNumber>1</DispenserNumber>
    <ArticleNumber>2</ArticleNumber>
    <TransactionQuantity>18.7</TransactionQuantity>
  </Transaction>
</TransactionData>"#;

    #[test]
    fn test_parse_valid_file() {
        let outcome = parse("txn_001.xml", VALID_FILE.as_bytes()).unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.skipped, 0);

        let first = &outcome.records[0];
        assert_eq!(first.id, "1001");
        assert_eq!(first.tank_identifier, "2");
        assert_eq!(first.product_type, "AVGAS");
        assert_eq!(first.quantity, 53.2);
        assert_eq!(first.raw_attributes.get("article_code").unwrap(), "1");
        assert_eq!(first.raw_attributes.get("AdditionalEntry").unwrap(), "D-EABC");
    }

    #[test]
    fn test_parse_accepts_both_date_formats() {
        let outcome = parse("txn_001.xml", VALID_FILE.as_bytes()).unwrap();
        assert_eq!(
            outcome.records[0].timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2026-03-14 09:30:00"
        );
        assert_eq!(
            outcome.records[1].timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2026-03-14 10:15:00"
        );
    }

    #[test]
    fn test_parse_is_idempotent() {
        let a = parse("txn_001.xml", VALID_FILE.as_bytes()).unwrap();
        let b = parse("txn_001.xml", VALID_FILE.as_bytes()).unwrap();
        let ids_a: Vec<_> = a.records.iter().map(|r| r.id.clone()).collect();
        let ids_b: Vec<_> = b.records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_malformed_transaction_is_skipped_not_fatal() {
        let file = r#"<TransactionData>
  <Transaction>
    <TransactionNumber>1001</TransactionNumber>
    <TransactionStartDate>2026-03-14 09:30:00</TransactionStartDate>
    <TransactionQuantity>53.20</TransactionQuantity>
  </Transaction>
  <Transaction>
    <TransactionNumber>1002</TransactionNumber>
    <TransactionStartDate>not a date</TransactionStartDate>
    <TransactionQuantity>18.7</TransactionQuantity>
  </Transaction>
  <Transaction>
    <TransactionNumber>1003</TransactionNumber>
    <TransactionStartDate>2026-03-14 11:00:00</TransactionStartDate>
    <TransactionQuantity>three liters</TransactionQuantity>
  </Transaction>
</TransactionData>"#;

        let outcome = parse("txn_mixed.xml", file.as_bytes()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.records[0].id, "1001");
    }

    #[test]
    fn test_broken_envelope_fails() {
        let err = parse("txn_002.xml", b"<TransactionData><Transaction>").unwrap_err();
        assert_eq!(err.filename, "txn_002.xml");
    }

    #[test]
    fn test_no_transactions_fails() {
        let err = parse("empty.xml", b"<TransactionData></TransactionData>").unwrap_err();
        assert!(err.reason.contains("No Transaction element"));
    }

    #[test]
    fn test_missing_transaction_number_falls_back_to_content_hash() {
        let file = r#"<TransactionData>
  <Transaction>
    <TransactionStartDate>2026-03-14 09:30:00</TransactionStartDate>
    <DispenserNumber>2</DispenserNumber>
    <ArticleNumber>1</ArticleNumber>
    <TransactionQuantity>53.20</TransactionQuantity>
  </Transaction>
</TransactionData>"#;

        let a = parse("t.xml", file.as_bytes()).unwrap();
        let b = parse("t.xml", file.as_bytes()).unwrap();
        assert_eq!(a.records[0].id.len(), 64);
        assert_eq!(a.records[0].id, b.records[0].id);
    }
}
