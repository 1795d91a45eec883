use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use signal_core::{Alert, CycleRecord, SignalError, SignalResult};
use tokio::sync::{Mutex, RwLock};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::db::HistoryDb;

pub const DEFAULT_RETENTION: usize = 500;

/// Bounded, append-only cycle history.
///
/// SQLite is the durable copy; the in-memory deque mirrors its newest
/// `retention` rows and is what readers see. The deque is only swapped after
/// the insert commits, so readers observe either the pre- or post-append
/// state.
pub struct HistoryStore {
    db: HistoryDb,
    retention: usize,
    max_retries: usize,
    records: RwLock<VecDeque<CycleRecord>>,
    write_gate: Mutex<()>,
    next_id: AtomicU64,
}

impl HistoryStore {
    pub async fn open(database_url: &str, retention: usize, max_retries: usize) -> SignalResult<Self> {
        if retention == 0 {
            return Err(SignalError::Configuration(
                "history retention must be at least 1".to_string(),
            ));
        }

        let db = HistoryDb::new(database_url).await?;
        let loaded = db.load_recent(retention).await?;
        let last_id = db.max_cycle_id().await?.unwrap_or(0);

        tracing::info!(
            "History store opened: {} records reloaded, next cycle id {}",
            loaded.len(),
            last_id + 1
        );

        Ok(Self {
            db,
            retention,
            max_retries,
            records: RwLock::new(loaded.into_iter().collect()),
            write_gate: Mutex::new(()),
            next_id: AtomicU64::new(last_id + 1),
        })
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Allocate the id for a new cycle.
    pub fn next_cycle_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Persist `record`, then expose it to readers.
    ///
    /// Failed writes are retried with exponential backoff. Once retries are
    /// exhausted the error is returned and the record is not visible;
    /// callers decide whether to [`publish_unpersisted`](Self::publish_unpersisted).
    pub async fn append(&self, record: CycleRecord) -> SignalResult<()> {
        let _gate = self.write_gate.lock().await;

        if self.contains(record.cycle_id).await {
            return Err(SignalError::Persistence(format!(
                "cycle {} already recorded",
                record.cycle_id
            )));
        }

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(25)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.max_retries);

        let db = &self.db;
        let pending = &record;
        let retention = self.retention;
        let evicted = Retry::spawn(strategy, || async move {
            db.insert_and_evict(pending, retention).await.map_err(|e| {
                tracing::warn!("Persisting cycle {} failed: {}", pending.cycle_id, e);
                e
            })
        })
        .await?;

        if evicted > 0 {
            tracing::debug!("Evicted {} cycle records beyond retention", evicted);
        }

        self.push(record).await;
        Ok(())
    }

    /// Make a record readable without a durable copy. Used when persistence
    /// is exhausted so the dashboard still shows the cycle.
    pub async fn publish_unpersisted(&self, record: CycleRecord) {
        let _gate = self.write_gate.lock().await;
        tracing::error!(
            "Cycle {} published in memory only; it will not survive a restart",
            record.cycle_id
        );
        self.push(record).await;
    }

    pub async fn latest(&self) -> Option<CycleRecord> {
        self.records.read().await.back().cloned()
    }

    /// Up to `n` records, most recent first.
    pub async fn recent(&self, n: usize) -> Vec<CycleRecord> {
        self.records.read().await.iter().rev().take(n).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Alerts raised by cycles newer than `since`, most recent first.
    pub async fn active_alerts(&self, since: DateTime<Utc>) -> Vec<Alert> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .take_while(|r| r.timestamp > since)
            .flat_map(|r| r.alerts.iter().cloned())
            .collect()
    }

    pub async fn close(&self) {
        self.db.close().await;
    }

    async fn contains(&self, cycle_id: u64) -> bool {
        self.records.read().await.iter().any(|r| r.cycle_id == cycle_id)
    }

    async fn push(&self, record: CycleRecord) {
        let mut records = self.records.write().await;
        records.push_back(record);
        while records.len() > self.retention {
            records.pop_front();
        }
    }
}
