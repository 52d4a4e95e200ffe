//! Quota store
//!
//! Bounded in-memory map from wallet address to its usage in the current
//! window. Two independent purge triggers apply to every entry:
//!
//! - capacity: once the map holds more than `capacity` keys, the least
//!   recently used key is evicted
//! - ttl: an entry not written for `ttl` is dropped, lazily when it is
//!   next looked up or eagerly by [`QuotaStore::purge_expired`]
//!
//! All state lives behind one lock. The lock is only held for in-memory
//! bookkeeping, never across an `.await`.

use crate::clock::{Clock, SystemClock};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Default maximum number of tracked wallets
pub const DEFAULT_CAPACITY: usize = 500;

/// Default lifetime of an entry after its last write
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Usage of one wallet within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    /// Requests counted since `window_start`
    pub count: u32,
    /// Start of the current counting window
    pub window_start: Instant,
}

impl UsageRecord {
    /// Record for the first request of a fresh window.
    pub fn first(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    /// Whether `window` has fully elapsed since this window began.
    pub fn window_elapsed(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

#[derive(Debug)]
struct Slot {
    record: UsageRecord,
    written_at: Instant,
    /// Position in the recency order; larger is more recent
    tick: u64,
}

#[derive(Debug, Default)]
struct Entries {
    slots: HashMap<String, Slot>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
}

impl Entries {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Live record for `key`, purging it first if its ttl ran out.
    fn lookup(&mut self, key: &str, now: Instant, ttl: Duration) -> Option<UsageRecord> {
        let expired = match self.slots.get(key) {
            Some(slot) => now.saturating_duration_since(slot.written_at) >= ttl,
            None => return None,
        };

        if expired {
            self.remove(key);
            debug!(wallet = key, "Quota record expired");
            return None;
        }

        let tick = self.bump();
        let slot = self.slots.get_mut(key)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, key.to_string());
        Some(slot.record)
    }

    fn write(&mut self, key: &str, record: UsageRecord, now: Instant) {
        let tick = self.bump();
        match self.slots.get_mut(key) {
            Some(slot) => {
                self.recency.remove(&slot.tick);
                slot.record = record;
                slot.written_at = now;
                slot.tick = tick;
            }
            None => {
                self.slots.insert(
                    key.to_string(),
                    Slot {
                        record,
                        written_at: now,
                        tick,
                    },
                );
            }
        }
        self.recency.insert(tick, key.to_string());
    }

    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot)
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.slots.remove(&key);
        Some(key)
    }
}

/// Bounded, expiring wallet → usage map shared by all requests.
#[derive(Debug)]
pub struct QuotaStore {
    entries: Mutex<Entries>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl QuotaStore {
    /// Create a store backed by the system clock.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    /// Create a store that reads time from `clock`.
    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
            ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current record for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<UsageRecord> {
        let now = self.clock.now();
        self.lock().lookup(key, now, self.ttl)
    }

    /// Insert or replace the record for `key`.
    ///
    /// Restarts the entry's ttl, marks it most recently used and evicts the
    /// least recently used key if the store is now over capacity.
    pub fn set(&self, key: &str, record: UsageRecord) {
        let now = self.clock.now();
        let mut entries = self.lock();
        self.write_locked(&mut entries, key, record, now);
    }

    /// Atomic read-modify-write for one key.
    ///
    /// `f` receives the live record (expired records are seen as absent) and
    /// returns an optional replacement along with a result. Returning `None`
    /// leaves the stored record untouched. No other `get`, `set` or `update`
    /// can interleave with `f`.
    pub fn update<R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<UsageRecord>) -> (Option<UsageRecord>, R),
    ) -> R {
        let now = self.clock.now();
        let mut entries = self.lock();
        let current = entries.lookup(key, now, self.ttl);
        let (next, result) = f(current);
        if let Some(record) = next {
            self.write_locked(&mut entries, key, record, now);
        }
        result
    }

    fn write_locked(&self, entries: &mut Entries, key: &str, record: UsageRecord, now: Instant) {
        entries.write(key, record, now);
        if entries.slots.len() > self.capacity {
            if let Some(evicted) = entries.evict_lru() {
                debug!(wallet = %evicted, capacity = self.capacity, "Evicted least recently used quota record");
            }
        }
    }

    /// Drop every entry whose ttl has run out. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .slots
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.written_at) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.remove(key);
        }
        expired.len()
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for QuotaStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

/// Periodically purge expired records from `store`.
pub fn spawn_sweeper(store: Arc<QuotaStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.len(), "Swept expired quota records");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn store_with_clock(capacity: usize, ttl: Duration) -> (QuotaStore, MockClock) {
        let clock = MockClock::default();
        let store = QuotaStore::with_clock(capacity, ttl, Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_get_absent() {
        let store = QuotaStore::default();
        assert_eq!(store.get("A1"), None);
        assert!(store.is_empty());
        assert_eq!(store.capacity(), DEFAULT_CAPACITY);
        assert_eq!(store.ttl(), DEFAULT_TTL);
    }

    #[test]
    fn test_set_then_get() {
        let (store, clock) = store_with_clock(10, DEFAULT_TTL);
        let record = UsageRecord::first(clock.now());

        store.set("A1", record);
        assert_eq!(store.get("A1"), Some(record));

        let bumped = UsageRecord {
            count: 2,
            ..record
        };
        store.set("A1", bumped);
        assert_eq!(store.get("A1"), Some(bumped));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_record_expires_after_ttl() {
        let (store, clock) = store_with_clock(10, Duration::from_secs(60));
        store.set("A1", UsageRecord::first(clock.now()));

        clock.advance(Duration::from_secs(59));
        assert!(store.get("A1").is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("A1"), None);
        assert_eq!(store.len(), 0, "expired record should be purged on access");
    }

    #[test]
    fn test_write_restarts_ttl() {
        let (store, clock) = store_with_clock(10, Duration::from_secs(60));
        store.set("A1", UsageRecord::first(clock.now()));

        clock.advance(Duration::from_secs(50));
        store.set("A1", UsageRecord::first(clock.now()));

        clock.advance(Duration::from_secs(50));
        assert!(store.get("A1").is_some());
    }

    #[test]
    fn test_read_does_not_restart_ttl() {
        let (store, clock) = store_with_clock(10, Duration::from_secs(60));
        store.set("A1", UsageRecord::first(clock.now()));

        clock.advance(Duration::from_secs(40));
        assert!(store.get("A1").is_some());

        clock.advance(Duration::from_secs(20));
        assert_eq!(store.get("A1"), None);
    }

    #[test]
    fn test_capacity_evicts_exactly_one_lru_key() {
        let (store, clock) = store_with_clock(3, DEFAULT_TTL);
        for key in ["k1", "k2", "k3"] {
            store.set(key, UsageRecord::first(clock.now()));
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(store.len(), 3);

        store.set("k4", UsageRecord::first(clock.now()));

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("k1"), None);
        assert!(store.get("k2").is_some());
        assert!(store.get("k3").is_some());
        assert!(store.get("k4").is_some());
    }

    #[test]
    fn test_access_refreshes_recency() {
        let (store, clock) = store_with_clock(3, DEFAULT_TTL);
        for key in ["k1", "k2", "k3"] {
            store.set(key, UsageRecord::first(clock.now()));
        }

        // k1 becomes most recently used, so k2 is now the oldest
        assert!(store.get("k1").is_some());
        store.set("k4", UsageRecord::first(clock.now()));

        assert!(store.get("k1").is_some());
        assert_eq!(store.get("k2"), None);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let (store, clock) = store_with_clock(50, DEFAULT_TTL);
        for i in 0..500 {
            store.set(&format!("wallet-{}", i), UsageRecord::first(clock.now()));
            assert!(store.len() <= 50);
        }
        assert_eq!(store.len(), 50);
        assert!(store.get("wallet-499").is_some());
        assert_eq!(store.get("wallet-0"), None);
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = store_with_clock(10, Duration::from_secs(60));
        store.set("old-1", UsageRecord::first(clock.now()));
        store.set("old-2", UsageRecord::first(clock.now()));

        clock.advance(Duration::from_secs(30));
        store.set("fresh", UsageRecord::first(clock.now()));

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_update_without_replacement_leaves_record() {
        let (store, clock) = store_with_clock(10, Duration::from_secs(60));
        let record = UsageRecord::first(clock.now());
        store.set("A1", record);

        clock.advance(Duration::from_secs(30));
        let seen = store.update("A1", |current| (None, current));
        assert_eq!(seen, Some(record));

        // ttl still counts from the original write
        clock.advance(Duration::from_secs(30));
        assert_eq!(store.get("A1"), None);
    }

    #[test]
    fn test_update_sees_expired_as_absent() {
        let (store, clock) = store_with_clock(10, Duration::from_secs(60));
        store.set("A1", UsageRecord::first(clock.now()));
        clock.advance(Duration::from_secs(61));

        let seen = store.update("A1", |current| (None, current));
        assert_eq!(seen, None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_is_atomic_across_threads() {
        let store = Arc::new(QuotaStore::new(10, DEFAULT_TTL));
        let start = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        store.update("shared", |current| {
                            let next = match current {
                                Some(r) => UsageRecord {
                                    count: r.count + 1,
                                    ..r
                                },
                                None => UsageRecord::first(start),
                            };
                            (Some(next), ())
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("shared").map(|r| r.count), Some(2000));
    }

    #[tokio::test]
    async fn test_sweeper_purges_in_background() {
        let (store, clock) = store_with_clock(10, Duration::from_secs(60));
        let store = Arc::new(store);
        store.set("A1", UsageRecord::first(clock.now()));
        clock.advance(Duration::from_secs(120));

        let handle = spawn_sweeper(Arc::clone(&store), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_window_elapsed() {
        let start = Instant::now();
        let record = UsageRecord::first(start);
        let hour = Duration::from_secs(3600);

        assert!(!record.window_elapsed(start + Duration::from_secs(3599), hour));
        assert!(record.window_elapsed(start + hour, hour));
        // A clock reading before the window start never counts as elapsed
        assert!(!record.window_elapsed(start, hour));
    }
}
