use signal_core::{CycleRecord, SignalError, SignalResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

pub(crate) fn persistence(err: impl std::fmt::Display) -> SignalError {
    SignalError::Persistence(err.to_string())
}

#[derive(Clone)]
pub struct HistoryDb {
    pool: SqlitePool,
}

impl HistoryDb {
    /// Open (creating if missing) the history database and apply the schema.
    pub async fn new(database_url: &str) -> SignalResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(persistence)?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database, so pin one.
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await.map_err(persistence)?;

        let db = Self { pool };
        db.init_schema().await?;

        Ok(db)
    }

    async fn init_schema(&self) -> SignalResult<()> {
        let schema = include_str!("../schema.sql");

        // sqlx executes one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(persistence)?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert one record and evict everything beyond the newest `retention`
    /// rows, in a single transaction.
    pub async fn insert_and_evict(&self, record: &CycleRecord, retention: usize) -> SignalResult<u64> {
        let body = serde_json::to_string(record).map_err(persistence)?;
        let status = serde_json::to_value(record.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let mut tx = self.pool.begin().await.map_err(persistence)?;

        sqlx::query(
            "INSERT INTO cycle_records (cycle_id, timestamp, status, record_json) VALUES (?, ?, ?, ?)",
        )
        .bind(record.cycle_id as i64)
        .bind(record.timestamp.to_rfc3339())
        .bind(status)
        .bind(body)
        .execute(&mut *tx)
        .await
        .map_err(persistence)?;

        let evicted = sqlx::query(
            "DELETE FROM cycle_records WHERE cycle_id NOT IN \
             (SELECT cycle_id FROM cycle_records ORDER BY cycle_id DESC LIMIT ?)",
        )
        .bind(retention as i64)
        .execute(&mut *tx)
        .await
        .map_err(persistence)?
        .rows_affected();

        tx.commit().await.map_err(persistence)?;
        Ok(evicted)
    }

    /// The newest `limit` records, oldest first. Rows that no longer decode
    /// are skipped.
    pub async fn load_recent(&self, limit: usize) -> SignalResult<Vec<CycleRecord>> {
        let rows = sqlx::query(
            "SELECT cycle_id, record_json FROM cycle_records ORDER BY cycle_id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let cycle_id: i64 = row.try_get("cycle_id").map_err(persistence)?;
            let body: String = row.try_get("record_json").map_err(persistence)?;
            match serde_json::from_str::<CycleRecord>(&body) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping undecodable cycle record {}: {}", cycle_id, e),
            }
        }
        Ok(records)
    }

    pub async fn max_cycle_id(&self) -> SignalResult<Option<u64>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(cycle_id) FROM cycle_records")
            .fetch_one(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(max.map(|id| id as u64))
    }

    pub async fn count(&self) -> SignalResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM cycle_records")
            .fetch_one(&self.pool)
            .await
            .map_err(persistence)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check if database file exists
    pub fn exists(path: &str) -> bool {
        let file_path = path.strip_prefix("sqlite:").unwrap_or(path);
        Path::new(file_path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_db_creation() {
        let db = HistoryDb::new("sqlite::memory:").await.unwrap();
        assert!(db.pool().acquire().await.is_ok());
        assert_eq!(db.count().await.unwrap(), 0);
        assert_eq!(db.max_cycle_id().await.unwrap(), None);
    }

    #[test]
    fn test_exists_strips_scheme() {
        assert!(!HistoryDb::exists("sqlite:/definitely/not/here.db"));
    }
}
