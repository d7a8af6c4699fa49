//! Record payload model
//!
//! A record is the raw JSON text handed to the engine, plus the identifying
//! key extracted from its `DATA_SOURCE` and `RECORD_ID` fields.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised while extracting the record key from a payload.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Identifying key of a record, used for logging and in-flight tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub data_source: String,
    pub record_id: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.data_source, self.record_id)
    }
}

/// A parsed record: the key plus the untouched JSON text the engine receives.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: RecordKey,
    pub raw: String,
}

impl Record {
    /// Parse a queue payload into a record.
    ///
    /// The payload must be a JSON object carrying string `DATA_SOURCE` and
    /// `RECORD_ID` fields; everything else is passed through to the engine
    /// verbatim.
    pub fn parse(payload: &str) -> Result<Self, RecordError> {
        let trimmed = payload.trim();
        let value: Value = serde_json::from_str(trimmed)?;

        let data_source = required_str(&value, "DATA_SOURCE")?;
        let record_id = required_str(&value, "RECORD_ID")?;

        Ok(Self {
            key: RecordKey {
                data_source,
                record_id,
            },
            raw: trimmed.to_string(),
        })
    }
}

fn required_str(value: &Value, field: &'static str) -> Result<String, RecordError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(RecordError::MissingField(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_record() {
        let payload = r#" {"DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "1001", "NAME_FULL": "Ann Smith"} "#;
        let record = Record::parse(payload).unwrap();

        assert_eq!(record.key.data_source, "CUSTOMERS");
        assert_eq!(record.key.record_id, "1001");
        assert!(record.raw.starts_with('{'));
        assert!(record.raw.ends_with('}'));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            Record::parse("not json at all"),
            Err(RecordError::Json(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let missing_id = r#"{"DATA_SOURCE": "CUSTOMERS"}"#;
        assert!(matches!(
            Record::parse(missing_id),
            Err(RecordError::MissingField("RECORD_ID"))
        ));

        let missing_source = r#"{"RECORD_ID": "1001"}"#;
        assert!(matches!(
            Record::parse(missing_source),
            Err(RecordError::MissingField("DATA_SOURCE"))
        ));

        let wrong_type = r#"{"DATA_SOURCE": "CUSTOMERS", "RECORD_ID": 1001}"#;
        assert!(matches!(
            Record::parse(wrong_type),
            Err(RecordError::MissingField("RECORD_ID"))
        ));
    }

    #[test]
    fn test_key_display() {
        let key = RecordKey {
            data_source: "CUSTOMERS".into(),
            record_id: "1001".into(),
        };
        assert_eq!(key.to_string(), "CUSTOMERS : 1001");
    }
}
