//! Stored order document decoding.
//!
//! The `entries` column holds JSON. Two shapes exist in the wild:
//!
//! - nested: `[{"partNumberCount": 2, "partNumbers": ["A1", "A1"]}, ...]`
//! - legacy flat: `{"partNumber": "A1", "quantity": 2}`, alone or in an array
//!
//! Flat items load as a single entry holding one part number with
//! `part_number_count = quantity`; `DeclaredQuantities` knows how to count those.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use shipcheck_orders::{Entry, PartNumber};

use super::r#trait::OrderStoreError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Nested(Entry),
    Flat {
        #[serde(alias = "partNumber")]
        part_number: PartNumber,
        quantity: u32,
    },
}

impl From<StoredEntry> for Entry {
    fn from(value: StoredEntry) -> Self {
        match value {
            StoredEntry::Nested(entry) => entry,
            StoredEntry::Flat {
                part_number,
                quantity,
            } => Entry {
                part_number_count: quantity,
                part_numbers: vec![part_number],
            },
        }
    }
}

/// Decode a stored `entries` document in either shape.
pub fn decode_entries(doc: JsonValue) -> Result<Vec<Entry>, OrderStoreError> {
    let items: Vec<StoredEntry> = match doc {
        JsonValue::Array(_) => serde_json::from_value::<Vec<StoredEntry>>(doc),
        JsonValue::Object(_) => serde_json::from_value::<StoredEntry>(doc).map(|one| vec![one]),
        other => {
            return Err(OrderStoreError::Corrupt(format!(
                "entries must be an array or object, got {other}"
            )));
        }
    }
    .map_err(|e| OrderStoreError::Corrupt(format!("undecodable entries document: {e}")))?;

    Ok(items.into_iter().map(Entry::from).collect())
}

/// Encode entries in the nested shape (the only shape ever written).
pub fn encode_entries(entries: &[Entry]) -> Result<JsonValue, OrderStoreError> {
    serde_json::to_value(entries)
        .map_err(|e| OrderStoreError::Corrupt(format!("entries serialization failed: {e}")))
}
