//! Random JSON documents of an approximate target size.
//!
//! The document shape is `{"id", "timestamp", "data": [...], "padding"?}`.
//! About 100 bytes are reserved for the envelope and each `data` item
//! accounts for roughly 100 bytes. After the first serialization the
//! document is padded with spaces when short or trimmed from the tail of
//! `data` when long.

use serde::Serialize;

use crate::error::LoadgenError;

use super::text::random_alphanumeric;

const ENVELOPE_BYTES: usize = 100;
const ITEM_BYTES: usize = 100;
const ITEM_VALUE_CHARS: usize = 80;
const PADDING_SLACK: usize = 50;

#[derive(Debug, Serialize)]
struct Item {
    value: String,
    index: u32,
    flag: bool,
}

#[derive(Debug, Serialize)]
struct Document {
    id: String,
    timestamp: f64,
    data: Vec<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    padding: Option<String>,
}

/// Generates a random JSON string of roughly `target_kb * 1024` bytes.
///
/// # Errors
///
/// Returns [`LoadgenError::Json`] if serialization fails.
pub fn random_json(target_kb: usize) -> Result<String, LoadgenError> {
    let target = target_kb.saturating_mul(1024);
    let num_items = target.saturating_sub(ENVELOPE_BYTES) / ITEM_BYTES;

    let timestamp = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
    let mut doc = Document {
        id: fastrand::u32(1..=1_000_000).to_string(),
        timestamp,
        data: (0..num_items)
            .map(|_| Item {
                value: random_alphanumeric(ITEM_VALUE_CHARS),
                index: fastrand::u32(1..=1000),
                flag: fastrand::bool(),
            })
            .collect(),
        padding: None,
    };

    let mut json = serde_json::to_string(&doc)?;
    let current = json.len();
    if current < target {
        let pad = target.saturating_sub(current).saturating_sub(PADDING_SLACK);
        doc.padding = Some(" ".repeat(pad));
        json = serde_json::to_string(&doc)?;
    } else if current > target {
        let excess = (current - target) / ITEM_BYTES + 1;
        let keep = doc.data.len().saturating_sub(excess);
        doc.data.truncate(keep);
        json = serde_json::to_string(&doc)?;
    }

    Ok(json)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn one_kb_lands_near_target() {
        let Ok(json) = random_json(1) else {
            panic!("generation failed");
        };
        let len = json.len();
        assert!(len <= 1024 + ITEM_BYTES, "len {len}");
        assert!(len >= 1024 * 85 / 100, "len {len}");
    }

    #[test]
    fn ten_kb_lands_near_target() {
        let Ok(json) = random_json(10) else {
            panic!("generation failed");
        };
        let len = json.len();
        assert!(len <= 10 * 1024 + ITEM_BYTES, "len {len}");
        assert!(len >= 10 * 1024 * 90 / 100, "len {len}");
    }

    #[test]
    fn zero_kb_does_not_panic() {
        let Ok(json) = random_json(0) else {
            panic!("generation failed");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&json) else {
            panic!("not valid json");
        };
        assert_eq!(value["data"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn items_have_expected_shape() {
        let Ok(json) = random_json(2) else {
            panic!("generation failed");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&json) else {
            panic!("not valid json");
        };
        let Some(items) = value["data"].as_array() else {
            panic!("data is not an array");
        };
        assert!(!items.is_empty());
        for item in items {
            assert_eq!(item["value"].as_str().map(str::len), Some(ITEM_VALUE_CHARS));
            let Some(index) = item["index"].as_u64() else {
                panic!("index missing");
            };
            assert!((1..=1000).contains(&index));
            assert!(item["flag"].is_boolean());
        }
        assert!(value["id"].is_string());
        assert!(value["timestamp"].is_f64());
    }
}
