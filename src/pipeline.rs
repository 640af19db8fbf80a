//! Ingestion pipeline: raw telemetry lines in, validated records out.
//!
//! Each line from the active channel is trimmed, parsed per the configured
//! data type, checked for required fields, and forwarded to the persistence
//! gateway. Parse and validation failures drop the line and surface one
//! `error` event; they never touch the connection.

use crate::config::{ConnectionConfig, DataType};
use crate::events::{Event, EventSink};
use crate::persistence::PersistenceGateway;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Malformed or unsupported line content. Local to one line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was not parseable in the configured mode.
    #[error("malformed line: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `json-object` mode got valid JSON that is not an object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// `json-array` mode got valid JSON that is not an array.
    #[error("expected a JSON array")]
    NotAnArray,

    /// `json-array` payload length differs from the field mapping.
    #[error("array length mismatch: expected {expected} fields, got {actual}")]
    ArrayLengthMismatch { expected: usize, actual: usize },

    /// CSV payload length differs from the field mapping.
    #[error("csv length mismatch: expected {expected} fields, got {actual}")]
    CsvLengthMismatch { expected: usize, actual: usize },

    /// The configured data type is not one the pipeline supports.
    #[error("unsupported dataType")]
    UnsupportedDataType,
}

/// A required field is missing or blank. Local to one record.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("required field '{0}' is missing or empty")]
    MissingField(String),
}

/// One parsed telemetry record, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomingRecord {
    /// Named scalar values parsed from the line.
    pub fields: Map<String, Value>,
    /// The trimmed line the record came from.
    pub raw_line: String,
    /// Arrival time.
    pub timestamp: DateTime<Utc>,
    /// Path of the port the line arrived on.
    pub source_port: String,
}

/// Parses, validates, and forwards telemetry lines.
///
/// Collaborators are injected at construction; the pipeline holds no
/// global state and is cheap to clone.
#[derive(Clone)]
pub struct IngestionPipeline {
    config: Arc<ConnectionConfig>,
    gateway: Arc<dyn PersistenceGateway>,
    sink: Arc<dyn EventSink>,
}

impl IngestionPipeline {
    pub fn new(
        config: Arc<ConnectionConfig>,
        gateway: Arc<dyn PersistenceGateway>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            gateway,
            sink,
        }
    }

    /// Process one raw line from `source_port`.
    ///
    /// Emits `data-received` unconditionally, then either forwards a
    /// validated record to the gateway or drops the line with one `error`
    /// event. The connection is never affected from here.
    pub async fn handle_line(&self, raw: &str, source_port: &str) {
        let trimmed = raw.trim();
        let timestamp = Utc::now();

        self.sink.emit(Event::DataReceived {
            raw: trimmed.to_string(),
            timestamp,
            port: source_port.to_string(),
        });

        if trimmed.is_empty() {
            return;
        }

        let fields = match self.parse(trimmed, timestamp) {
            Ok(fields) => fields,
            Err(e) => {
                debug!(port = source_port, error = %e, line = trimmed, "dropping unparseable line");
                self.sink.emit(Event::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        let record = IncomingRecord {
            fields,
            raw_line: trimmed.to_string(),
            timestamp,
            source_port: source_port.to_string(),
        };

        if let Err(e) = self.validate(&record) {
            debug!(port = source_port, error = %e, "dropping invalid record");
            self.sink.emit(Event::Error {
                message: e.to_string(),
            });
            return;
        }

        let Some(table) = self.config.db_table_name.as_deref() else {
            return;
        };

        // Not retried and not queued: a failed write loses the record.
        match self
            .gateway
            .save(table, &record, &self.config.fields_to_encrypt)
            .await
        {
            Ok(receipt) => self.sink.emit(Event::PersistenceSuccess {
                table: table.to_string(),
                insert_id: receipt.insert_id,
            }),
            Err(e) => self.sink.emit(Event::Error {
                message: format!("failed to persist record: {e}"),
            }),
        }
    }

    fn parse(
        &self,
        trimmed: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        match self.config.data_type {
            DataType::JsonObject => match serde_json::from_str::<Value>(trimmed)? {
                Value::Object(map) => Ok(map),
                _ => Err(ProtocolError::NotAnObject),
            },
            DataType::JsonArray => {
                let values = match serde_json::from_str::<Value>(trimmed)? {
                    Value::Array(values) => values,
                    _ => return Err(ProtocolError::NotAnArray),
                };
                let mapping = &self.config.field_mapping;
                if values.len() != mapping.len() {
                    return Err(ProtocolError::ArrayLengthMismatch {
                        expected: mapping.len(),
                        actual: values.len(),
                    });
                }
                Ok(mapping.iter().cloned().zip(values).collect())
            }
            DataType::Csv => {
                let parts: Vec<&str> = trimmed.split(&self.config.csv_delimiter).collect();
                let mapping = &self.config.field_mapping;
                if parts.len() != mapping.len() {
                    return Err(ProtocolError::CsvLengthMismatch {
                        expected: mapping.len(),
                        actual: parts.len(),
                    });
                }
                Ok(mapping
                    .iter()
                    .cloned()
                    .zip(parts.iter().map(|p| coerce_scalar(p)))
                    .collect())
            }
            DataType::Raw => {
                let mut map = Map::new();
                map.insert("raw_data".to_string(), Value::String(trimmed.to_string()));
                map.insert(
                    "timestamp".to_string(),
                    Value::String(timestamp.to_rfc3339()),
                );
                Ok(map)
            }
            DataType::Unsupported => Err(ProtocolError::UnsupportedDataType),
        }
    }

    fn validate(&self, record: &IncomingRecord) -> Result<(), ValidationError> {
        for name in &self.config.required_fields {
            let present = record
                .fields
                .get(name)
                .map(|v| !stringify(v).trim().is_empty())
                .unwrap_or(false);
            if !present {
                return Err(ValidationError::MissingField(name.clone()));
            }
        }
        Ok(())
    }
}

/// Trim a CSV value and coerce it to a JSON number when it parses as a
/// finite numeric literal, keeping it a string otherwise.
fn coerce_scalar(value: &str) -> Value {
    let trimmed = value.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(trimmed.to_string())
}

/// Stringified view of a field value for required-field checks.
/// Null counts as absent.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::persistence::MemoryGateway;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn pipeline(config: ConnectionConfig) -> (IngestionPipeline, MemoryGateway, RecordingSink) {
        let gateway = MemoryGateway::new();
        let sink = RecordingSink::new();
        let pipeline = IngestionPipeline::new(
            Arc::new(config),
            Arc::new(gateway.clone()),
            Arc::new(sink.clone()),
        );
        (pipeline, gateway, sink)
    }

    fn csv_config() -> ConnectionConfig {
        ConnectionConfig {
            data_type: DataType::Csv,
            field_mapping: vec!["temp".into(), "humidity".into()],
            db_table_name: Some("readings".into()),
            ..Default::default()
        }
    }

    fn error_count(sink: &RecordingSink) -> usize {
        sink.count_matching(|e| matches!(e, Event::Error { .. }))
    }

    #[tokio::test]
    async fn test_csv_line_coerces_numbers_and_saves() {
        let (pipeline, gateway, sink) = pipeline(csv_config());

        pipeline.handle_line("23.5,60\r\n", "/dev/ttyUSB0").await;

        let saved = gateway.saved();
        assert_eq!(saved.len(), 1);
        let (table, record) = &saved[0];
        assert_eq!(table, "readings");
        assert_eq!(record.fields["temp"], json!(23.5));
        assert_eq!(record.fields["humidity"], json!(60));
        assert_eq!(record.source_port, "/dev/ttyUSB0");
        assert_eq!(error_count(&sink), 0);
        assert_eq!(
            sink.count_matching(|e| matches!(e, Event::PersistenceSuccess { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_csv_length_mismatch_drops_line() {
        let (pipeline, gateway, sink) = pipeline(csv_config());

        pipeline.handle_line("23.5", "/dev/ttyUSB0").await;

        assert_eq!(gateway.save_count(), 0, "save must not be called");
        assert_eq!(error_count(&sink), 1, "exactly one error event");
        // The raw-data event still fires for rejected lines
        assert_eq!(
            sink.count_matching(|e| matches!(e, Event::DataReceived { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_json_array_happy_path() {
        let (pipeline, gateway, _sink) = pipeline(ConnectionConfig {
            data_type: DataType::JsonArray,
            field_mapping: vec!["temp".into(), "humidity".into()],
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline.handle_line("[23.5, 60]", "MOCK0").await;

        let saved = gateway.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1.fields["temp"], json!(23.5));
        assert_eq!(saved[0].1.fields["humidity"], json!(60));
    }

    #[tokio::test]
    async fn test_json_array_length_mismatch() {
        let (pipeline, gateway, sink) = pipeline(ConnectionConfig {
            data_type: DataType::JsonArray,
            field_mapping: vec!["temp".into(), "humidity".into()],
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline.handle_line("[23.5]", "MOCK0").await;

        assert_eq!(gateway.save_count(), 0);
        assert_eq!(error_count(&sink), 1);
    }

    #[tokio::test]
    async fn test_json_object_is_the_record() {
        let (pipeline, gateway, _sink) = pipeline(ConnectionConfig {
            data_type: DataType::JsonObject,
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline
            .handle_line(r#"{"temp": 23.5, "unit": "C"}"#, "MOCK0")
            .await;

        let saved = gateway.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1.fields["unit"], json!("C"));
    }

    #[tokio::test]
    async fn test_json_object_rejects_non_object() {
        let (pipeline, gateway, sink) = pipeline(ConnectionConfig {
            data_type: DataType::JsonObject,
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline.handle_line("[1, 2, 3]", "MOCK0").await;

        assert_eq!(gateway.save_count(), 0);
        assert_eq!(error_count(&sink), 1);
    }

    #[tokio::test]
    async fn test_raw_mode_wraps_line() {
        let (pipeline, gateway, _sink) = pipeline(ConnectionConfig {
            data_type: DataType::Raw,
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline.handle_line("  anything goes  ", "MOCK0").await;

        let saved = gateway.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1.fields["raw_data"], json!("anything goes"));
        assert!(saved[0].1.fields.contains_key("timestamp"));
    }

    #[tokio::test]
    async fn test_unsupported_data_type_drops_with_error() {
        let (pipeline, gateway, sink) = pipeline(ConnectionConfig {
            data_type: DataType::Unsupported,
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline.handle_line("23.5,60", "MOCK0").await;

        assert_eq!(gateway.save_count(), 0);
        assert_eq!(error_count(&sink), 1);
    }

    #[tokio::test]
    async fn test_empty_line_dropped_silently() {
        let (pipeline, gateway, sink) = pipeline(csv_config());

        pipeline.handle_line("   \r\n", "MOCK0").await;

        assert_eq!(gateway.save_count(), 0);
        assert_eq!(error_count(&sink), 0, "empty lines drop without an error");
        assert_eq!(
            sink.count_matching(|e| matches!(e, Event::DataReceived { .. })),
            1,
            "raw-data event still fires"
        );
    }

    #[tokio::test]
    async fn test_missing_required_field_blocks_save() {
        let (pipeline, gateway, sink) = pipeline(ConnectionConfig {
            data_type: DataType::JsonObject,
            required_fields: vec!["temp".into()],
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline.handle_line(r#"{"humidity": 60}"#, "MOCK0").await;

        assert_eq!(gateway.save_count(), 0, "save must never be called");
        assert_eq!(error_count(&sink), 1);
    }

    #[tokio::test]
    async fn test_blank_required_field_blocks_save() {
        let (pipeline, gateway, sink) = pipeline(ConnectionConfig {
            data_type: DataType::JsonObject,
            required_fields: vec!["temp".into()],
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline
            .handle_line(r#"{"temp": "   ", "humidity": 60}"#, "MOCK0")
            .await;
        pipeline
            .handle_line(r#"{"temp": null, "humidity": 60}"#, "MOCK0")
            .await;

        assert_eq!(gateway.save_count(), 0);
        assert_eq!(error_count(&sink), 2);
    }

    #[tokio::test]
    async fn test_numeric_required_field_passes() {
        let (pipeline, gateway, _sink) = pipeline(ConnectionConfig {
            data_type: DataType::JsonObject,
            required_fields: vec!["temp".into()],
            db_table_name: Some("readings".into()),
            ..Default::default()
        });

        pipeline.handle_line(r#"{"temp": 0}"#, "MOCK0").await;

        assert_eq!(gateway.save_count(), 1, "zero is a present value");
    }

    #[tokio::test]
    async fn test_no_table_means_no_persistence() {
        let (pipeline, gateway, sink) = pipeline(ConnectionConfig {
            data_type: DataType::JsonObject,
            db_table_name: None,
            ..Default::default()
        });

        pipeline.handle_line(r#"{"temp": 1}"#, "MOCK0").await;

        assert_eq!(gateway.save_count(), 0);
        assert_eq!(error_count(&sink), 0);
    }

    #[tokio::test]
    async fn test_failed_save_reports_error_and_drops_record() {
        let (pipeline, gateway, sink) = pipeline(csv_config());
        gateway.fail_saves(true);

        pipeline.handle_line("23.5,60", "MOCK0").await;

        assert_eq!(gateway.save_count(), 0);
        assert_eq!(error_count(&sink), 1);
        assert_eq!(
            sink.count_matching(|e| matches!(e, Event::PersistenceSuccess { .. })),
            0
        );
    }

    #[test]
    fn test_coerce_scalar() {
        assert_eq!(coerce_scalar("60"), json!(60));
        assert_eq!(coerce_scalar(" 23.5 "), json!(23.5));
        assert_eq!(coerce_scalar("-4"), json!(-4));
        assert_eq!(coerce_scalar("abc"), json!("abc"));
        assert_eq!(coerce_scalar(""), json!(""));
        // Non-finite literals stay strings
        assert_eq!(coerce_scalar("NaN"), json!("NaN"));
        assert_eq!(coerce_scalar("inf"), json!("inf"));
    }

    proptest! {
        #[test]
        fn prop_integer_literals_coerce_to_integers(n in i64::MIN..i64::MAX) {
            let value = coerce_scalar(&n.to_string());
            prop_assert_eq!(value, json!(n));
        }

        #[test]
        fn prop_finite_floats_coerce_to_numbers(f in proptest::num::f64::NORMAL) {
            let value = coerce_scalar(&format!("{f:?}"));
            prop_assert!(value.is_number(), "expected number for {:?}, got {:?}", f, value);
        }

        #[test]
        fn prop_coercion_never_panics(s in ".*") {
            let _ = coerce_scalar(&s);
        }
    }
}
