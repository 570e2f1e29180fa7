//! Source records, chunks and indexing results

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// A cleaned complaint record as exported by the preprocessing step
///
/// Field aliases accept the upstream column names so the cleaned export can
/// be read without renaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(alias = "Complaint ID", alias = "complaint_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "Product", alias = "product", deserialize_with = "string_or_null")]
    pub category: String,
    #[serde(default, alias = "Sub-product", alias = "sub_product", deserialize_with = "string_or_null")]
    pub sub_category: String,
    #[serde(default, alias = "cleaned_narrative", deserialize_with = "string_or_null")]
    pub narrative: String,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        sub_category: impl Into<String>,
        narrative: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            sub_category: sub_category.into(),
            narrative: narrative.into(),
        }
    }

    /// Whether the record carries any narrative text worth chunking
    pub fn has_narrative(&self) -> bool {
        !self.narrative.trim().is_empty()
    }
}

/// A bounded-length excerpt of one record's narrative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub record_id: String,
    pub category: String,
    pub sub_category: String,
}

impl Chunk {
    /// Create a chunk carrying the provenance of `record`
    pub fn from_record(record: &Record, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            record_id: record.id.clone(),
            category: record.category.clone(),
            sub_category: record.sub_category.clone(),
        }
    }
}

/// Result of an index build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingReport {
    pub records_total: usize,
    pub records_sampled: usize,
    pub records_skipped: usize,
    pub chunks_indexed: usize,
    pub model_id: String,
    pub dimension: usize,
    pub index_path: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or number identifier, found {}",
            other
        ))),
    }
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_upstream_columns() {
        let json = r#"{
            "Complaint ID": 3456789,
            "Product": "Credit card",
            "Sub-product": null,
            "cleaned_narrative": "i was charged twice for the same purchase"
        }"#;

        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "3456789");
        assert_eq!(record.category, "Credit card");
        assert_eq!(record.sub_category, "");
        assert!(record.has_narrative());
    }

    #[test]
    fn test_record_missing_narrative() {
        let json = r#"{"id": "a1", "category": "Savings account", "narrative": null}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert!(!record.has_narrative());

        let blank = Record::new("a2", "Savings account", "", "   \n ");
        assert!(!blank.has_narrative());
    }

    #[test]
    fn test_record_rejects_structured_id() {
        let json = r#"{"id": {"nested": true}, "category": "Credit card"}"#;
        assert!(serde_json::from_str::<Record>(json).is_err());
    }

    #[test]
    fn test_chunk_carries_provenance() {
        let record = Record::new("42", "Personal loan", "Installment loan", "text");
        let chunk = Chunk::from_record(&record, "excerpt");
        assert_eq!(chunk.record_id, "42");
        assert_eq!(chunk.category, "Personal loan");
        assert_eq!(chunk.sub_category, "Installment loan");
        assert_eq!(chunk.text, "excerpt");
    }
}
