//! Wire format of one delivery block.

use serde::{Deserialize, Serialize};

use crate::storage::StagedReading;

/// `date` format of each entry (UTC, second precision).
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One reading as the aggregator expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEntry {
    pub content: String,
    pub parameter: String,
    pub date: String,
    pub id_app: String,
    pub id_country: String,
    pub instrument_name: String,
}

/// Body of one POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    pub instrument_content: Vec<DeliveryEntry>,
    /// Instrument id of the block's first reading.
    pub instrument_name: String,
}

impl DeliveryPayload {
    /// Build the payload of a block. Returns `None` for an empty block.
    pub fn from_block(block: &[StagedReading], app_id: &str, country_id: &str) -> Option<Self> {
        let first = block.first()?;
        let instrument_content = block
            .iter()
            .map(|reading| DeliveryEntry {
                content: reading.content.clone(),
                parameter: reading.parameter.clone(),
                date: reading.created_at.format(DATE_FORMAT).to_string(),
                id_app: app_id.to_string(),
                id_country: country_id.to_string(),
                instrument_name: reading.instrument_id.clone(),
            })
            .collect();

        Some(Self {
            instrument_content,
            instrument_name: first.instrument_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn staged(id: i64, content: &str) -> StagedReading {
        StagedReading {
            id,
            instrument_id: "thermo-1".to_string(),
            parameter: "temperature".to_string(),
            user: "lab".to_string(),
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap(),
        }
    }

    #[test]
    fn test_payload_json_shape() {
        let payload =
            DeliveryPayload::from_block(&[staged(1, "21.5"), staged(2, "0aff")], "01", "34")
                .unwrap();
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["instrumentName"], "thermo-1");
        let entries = json["instrumentContent"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            serde_json::json!({
                "content": "21.5",
                "parameter": "temperature",
                "date": "2024-03-09T07:05:01",
                "idApp": "01",
                "idCountry": "34",
                "instrumentName": "thermo-1"
            })
        );
        assert_eq!(entries[1]["content"], "0aff");
    }

    #[test]
    fn test_empty_block_has_no_payload() {
        assert!(DeliveryPayload::from_block(&[], "01", "34").is_none());
    }
}
