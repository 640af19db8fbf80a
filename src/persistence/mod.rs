//! Persistence gateway consumed by the ingestion pipeline.
//!
//! The pipeline only knows the narrow `save(table, record)` contract; what
//! a gateway does with the record (hosted database, local SQLite, test
//! buffer) is its own concern. Encryption of hinted fields likewise belongs
//! to the gateway, never to the pipeline.

pub mod sqlite;

pub use sqlite::SqliteGateway;

use crate::pipeline::IncomingRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a persistence gateway.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The target table name is not usable.
    #[error("invalid table name: {0}")]
    InvalidTable(String),

    /// The underlying store rejected the write.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Acknowledgement of one accepted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReceipt {
    /// Row identifier assigned by the store.
    pub insert_id: i64,
}

/// Sink for validated telemetry records.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist one record into `table`.
    ///
    /// `fields_to_encrypt` is a hint naming fields the gateway should
    /// encrypt at rest if it supports that; gateways without encryption
    /// store them as-is.
    async fn save(
        &self,
        table: &str,
        record: &IncomingRecord,
        fields_to_encrypt: &[String],
    ) -> Result<SaveReceipt, PersistenceError>;
}

/// In-memory recording gateway for tests.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryGatewayState>>,
}

#[derive(Default)]
struct MemoryGatewayState {
    saved: Vec<(String, IncomingRecord)>,
    next_id: i64,
    fail: bool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail.
    pub fn fail_saves(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    /// Every `(table, record)` pair accepted so far, in order.
    pub fn saved(&self) -> Vec<(String, IncomingRecord)> {
        self.state.lock().saved.clone()
    }

    /// Number of accepted records.
    pub fn save_count(&self) -> usize {
        self.state.lock().saved.len()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn save(
        &self,
        table: &str,
        record: &IncomingRecord,
        _fields_to_encrypt: &[String],
    ) -> Result<SaveReceipt, PersistenceError> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(PersistenceError::Database(sqlx::Error::PoolClosed));
        }
        state.next_id += 1;
        state.saved.push((table.to_string(), record.clone()));
        Ok(SaveReceipt {
            insert_id: state.next_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> IncomingRecord {
        IncomingRecord {
            fields: serde_json::Map::new(),
            raw_line: "raw".into(),
            timestamp: Utc::now(),
            source_port: "MOCK0".into(),
        }
    }

    #[tokio::test]
    async fn test_memory_gateway_ids_ascend() {
        let gateway = MemoryGateway::new();
        let a = gateway.save("readings", &record(), &[]).await.unwrap();
        let b = gateway.save("readings", &record(), &[]).await.unwrap();
        assert!(b.insert_id > a.insert_id);
        assert_eq!(gateway.save_count(), 2);
    }

    #[tokio::test]
    async fn test_memory_gateway_scripted_failure() {
        let gateway = MemoryGateway::new();
        gateway.fail_saves(true);
        let result = gateway.save("readings", &record(), &[]).await;
        assert!(result.is_err());
        assert_eq!(gateway.save_count(), 0);
    }
}
