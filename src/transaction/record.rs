//! In-flight transaction record with expiry
//!
//! Remembers which (folder, file set) requests were already submitted so an
//! identical request is not sent twice. Entries are not persisted. They
//! leave the record when:
//! - their time-to-live elapses (if configured)
//! - the record is full and they are the oldest entry (if bounded)
//! - the caller releases them after observing the transfer finish
//! - the submission failed and the failure policy is `Retract`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::TransactionKey;
use crate::types::SyncDirection;

/// What happens to a recorded key when its submission fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep the key: an identical request stays suppressed until the entry
    /// expires or is released, even though the remote never accepted it
    #[default]
    KeepRecorded,
    /// Drop the key so the next cycle submits the request again
    Retract,
}

/// Configuration for the transaction record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Time-to-live for recorded keys in seconds (None = never expire)
    #[serde(default = "default_ttl")]
    pub ttl_seconds: Option<u64>,
    /// Maximum number of recorded keys (None = unbounded)
    #[serde(default)]
    pub max_entries: Option<usize>,
    /// Handling of keys whose submission failed
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_ttl() -> Option<u64> {
    Some(3600)
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_entries: None,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl RecordConfig {
    fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }
}

/// A submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransaction {
    pub transaction_id: Uuid,
    pub direction: SyncDirection,
    pub submitted_at: DateTime<Utc>,
    recorded_at: Instant,
}

impl RecordedTransaction {
    fn new(direction: SyncDirection) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            direction,
            submitted_at: Utc::now(),
            recorded_at: Instant::now(),
        }
    }

    /// Check if this entry is expired
    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.recorded_at.elapsed() > ttl)
    }
}

/// Outcome of [`TransactionRecord::reserve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The key was free; a new transaction was minted and recorded
    Fresh(RecordedTransaction),
    /// The key is already in flight under this transaction
    InFlight(RecordedTransaction),
}

/// Record statistics
#[derive(Debug, Default)]
struct Counters {
    reserved: AtomicU64,
    suppressed: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
    released: AtomicU64,
}

/// Snapshot of record statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStats {
    pub entries: usize,
    pub reserved: u64,
    pub suppressed: u64,
    pub expired: u64,
    pub evicted: u64,
    pub released: u64,
}

/// Thread-safe map of in-flight transaction keys
pub struct TransactionRecord {
    entries: Mutex<HashMap<TransactionKey, RecordedTransaction>>,
    config: RecordConfig,
    counters: Counters,
}

impl Default for TransactionRecord {
    fn default() -> Self {
        Self::new(RecordConfig::default())
    }
}

impl TransactionRecord {
    pub fn new(config: RecordConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &RecordConfig {
        &self.config
    }

    /// Atomically check for `key` and record a new transaction if it is free
    ///
    /// An expired entry counts as free and is replaced.
    pub fn reserve(&self, key: TransactionKey, direction: SyncDirection) -> Reservation {
        let ttl = self.config.ttl();
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.get(&key) {
            if !existing.is_expired(ttl) {
                self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
                return Reservation::InFlight(existing.clone());
            }
            entries.remove(&key);
            self.counters.expired.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(max) = self.config.max_entries {
            while entries.len() >= max.max(1) {
                if !Self::evict_oldest(&mut entries) {
                    break;
                }
                self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }

        let recorded = RecordedTransaction::new(direction);
        entries.insert(key, recorded.clone());
        self.counters.reserved.fetch_add(1, Ordering::Relaxed);
        Reservation::Fresh(recorded)
    }

    /// Drop the oldest entry; false if there was nothing to drop
    fn evict_oldest(entries: &mut HashMap<TransactionKey, RecordedTransaction>) -> bool {
        let oldest = entries
            .iter()
            .min_by_key(|(_, v)| v.recorded_at)
            .map(|(k, _)| k.clone());

        match oldest {
            Some(key) => entries.remove(&key).is_some(),
            None => false,
        }
    }

    /// Remove `key` only if it is still recorded under `transaction_id`
    pub fn retract(&self, key: &TransactionKey, transaction_id: Uuid) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(existing) if existing.transaction_id == transaction_id => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Forget a key, e.g. after its transfer was observed to finish
    pub fn release(&self, key: &TransactionKey) -> Option<RecordedTransaction> {
        let removed = self.entries.lock().remove(key);
        if removed.is_some() {
            self.counters.released.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Forget whichever key is recorded under `transaction_id`
    pub fn release_transaction(&self, transaction_id: Uuid) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, v| v.transaction_id != transaction_id);
        let released = entries.len() < before;
        if released {
            self.counters.released.fetch_add(1, Ordering::Relaxed);
        }
        released
    }

    /// Look up a live (non-expired) entry
    pub fn get(&self, key: &TransactionKey) -> Option<RecordedTransaction> {
        let ttl = self.config.ttl();
        self.entries
            .lock()
            .get(key)
            .filter(|v| !v.is_expired(ttl))
            .cloned()
    }

    pub fn contains(&self, key: &TransactionKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn remove_expired(&self) -> usize {
        let Some(ttl) = self.config.ttl() else {
            return 0;
        };
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired(Some(ttl)));
        let removed = before - entries.len();
        self.counters
            .expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> RecordStats {
        RecordStats {
            entries: self.len(),
            reserved: self.counters.reserved.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
        }
    }

    /// Start background expiration task; stops when `cancel` fires
    ///
    /// Periods shorter than a millisecond run every millisecond.
    pub fn spawn_expiration_task(
        record: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = record.remove_expired();
                        if removed > 0 {
                            tracing::debug!("Expired {} transaction keys", removed);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(folder: &str, files: &[&str]) -> TransactionKey {
        TransactionKey::new(folder, files)
    }

    #[test]
    fn test_reserve_then_in_flight() {
        let record = TransactionRecord::default();
        let k = key("/sub", &["a.txt", "b.txt"]);

        let first = match record.reserve(k.clone(), SyncDirection::Up) {
            Reservation::Fresh(t) => t,
            other => panic!("expected fresh reservation, got {other:?}"),
        };
        match record.reserve(key("sub", &["b.txt", "a.txt"]), SyncDirection::Up) {
            Reservation::InFlight(t) => assert_eq!(t.transaction_id, first.transaction_id),
            other => panic!("expected in-flight, got {other:?}"),
        }

        let stats = record.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.reserved, 1);
        assert_eq!(stats.suppressed, 1);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let record = TransactionRecord::new(RecordConfig {
            ttl_seconds: Some(0),
            ..Default::default()
        });
        let k = key("/", &["a.txt"]);
        record.reserve(k.clone(), SyncDirection::Down);
        std::thread::sleep(Duration::from_millis(5));

        assert!(!record.contains(&k));
        assert!(matches!(
            record.reserve(k, SyncDirection::Down),
            Reservation::Fresh(_)
        ));
        assert_eq!(record.stats().expired, 1);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let record = TransactionRecord::new(RecordConfig {
            ttl_seconds: None,
            ..Default::default()
        });
        let k = key("/", &["a.txt"]);
        record.reserve(k.clone(), SyncDirection::Up);
        assert_eq!(record.remove_expired(), 0);
        assert!(record.contains(&k));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let record = TransactionRecord::new(RecordConfig {
            max_entries: Some(2),
            ..Default::default()
        });
        let first = key("/", &["1"]);
        record.reserve(first.clone(), SyncDirection::Up);
        std::thread::sleep(Duration::from_millis(2));
        record.reserve(key("/", &["2"]), SyncDirection::Up);
        std::thread::sleep(Duration::from_millis(2));
        record.reserve(key("/", &["3"]), SyncDirection::Up);

        assert_eq!(record.len(), 2);
        assert!(!record.contains(&first));
        assert_eq!(record.stats().evicted, 1);
    }

    #[test]
    fn test_retract_checks_transaction_id() {
        let record = TransactionRecord::default();
        let k = key("/", &["a.txt"]);
        let Reservation::Fresh(t) = record.reserve(k.clone(), SyncDirection::Up) else {
            panic!("expected fresh reservation");
        };

        assert!(!record.retract(&k, Uuid::new_v4()));
        assert!(record.contains(&k));
        assert!(record.retract(&k, t.transaction_id));
        assert!(!record.contains(&k));
    }

    #[test]
    fn test_release() {
        let record = TransactionRecord::default();
        let k1 = key("/", &["a.txt"]);
        let k2 = key("/", &["b.txt"]);
        record.reserve(k1.clone(), SyncDirection::Up);
        let Reservation::Fresh(t2) = record.reserve(k2.clone(), SyncDirection::Up) else {
            panic!("expected fresh reservation");
        };

        assert!(record.release(&k1).is_some());
        assert!(record.release(&k1).is_none());
        assert!(record.release_transaction(t2.transaction_id));
        assert!(record.is_empty());
        assert_eq!(record.stats().released, 2);
    }

    #[tokio::test]
    async fn test_expiration_task_stops_on_cancel() {
        let record = Arc::new(TransactionRecord::new(RecordConfig {
            ttl_seconds: Some(0),
            ..Default::default()
        }));
        record.reserve(key("/", &["a.txt"]), SyncDirection::Up);

        let cancel = CancellationToken::new();
        let handle = TransactionRecord::spawn_expiration_task(
            record.clone(),
            Duration::from_millis(5),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_expiration_task_with_zero_period() {
        let record = Arc::new(TransactionRecord::new(RecordConfig {
            ttl_seconds: Some(0),
            ..Default::default()
        }));
        record.reserve(key("/", &["a.txt"]), SyncDirection::Up);

        let cancel = CancellationToken::new();
        let handle =
            TransactionRecord::spawn_expiration_task(record.clone(), Duration::ZERO, cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(record.is_empty());
    }
}
