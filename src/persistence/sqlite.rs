//! SQLite-backed persistence gateway.
//!
//! Stores each validated record as a row of `(received_at, source_port,
//! raw_line, payload)` where `payload` is the record's fields serialized as
//! JSON. The target table is created on first use.

use super::{PersistenceError, PersistenceGateway, SaveReceipt};
use crate::pipeline::IncomingRecord;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;

/// [`PersistenceGateway`] over a local SQLite database.
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Open (creating if missing) the database at `path`.
    pub async fn connect(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by tests).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn ensure_table(&self, table: &str) -> Result<(), PersistenceError> {
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            received_at TEXT NOT NULL,
            source_port TEXT NOT NULL,
            raw_line TEXT NOT NULL,
            payload TEXT NOT NULL
        )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are
/// accepted.
fn validate_table_name(table: &str) -> Result<(), PersistenceError> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(PersistenceError::InvalidTable(table.to_string()))
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn save(
        &self,
        table: &str,
        record: &IncomingRecord,
        fields_to_encrypt: &[String],
    ) -> Result<SaveReceipt, PersistenceError> {
        validate_table_name(table)?;
        self.ensure_table(table).await?;

        if !fields_to_encrypt.is_empty() {
            // Encryption at rest lives in the hosted-database gateway; the
            // local store keeps the hint visible in logs only.
            debug!(table, fields = ?fields_to_encrypt, "encrypt hint ignored by sqlite gateway");
        }

        let payload = serde_json::Value::Object(record.fields.clone()).to_string();

        // Single connection so last_insert_rowid() refers to this INSERT.
        let mut conn = self.pool.acquire().await?;
        sqlx::query(&format!(
            "INSERT INTO {table} (received_at, source_port, raw_line, payload) VALUES (?1, ?2, ?3, ?4)"
        ))
        .bind(record.timestamp)
        .bind(&record.source_port)
        .bind(&record.raw_line)
        .bind(payload)
        .execute(&mut *conn)
        .await?;
        let insert_id: i64 = sqlx::query_scalar("SELECT last_insert_rowid()")
            .fetch_one(&mut *conn)
            .await?;

        Ok(SaveReceipt { insert_id })
    }
}
