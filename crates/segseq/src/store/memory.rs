use crate::{SequenceRow, SequenceStore, StoreError};
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use rand::{Rng, rng};
use std::collections::HashMap;
use std::time::SystemTime;

struct Record {
    row: SequenceRow,
    created_at: SystemTime,
    modified_at: SystemTime,
}

/// Operation counters of a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub inserts: u64,
    pub cas_calls: u64,
    pub cas_successes: u64,
}

/// A thread-safe in-process [`SequenceStore`].
///
/// Useful as a test double and for single-process deployments. Besides the
/// rows it records creation/modification timestamps and counts every call,
/// and it can simulate outages: switch it off with [`Self::set_available`] or
/// give it a random per-call failure rate.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Record>>,
    unavailable: AtomicBool,
    // Failure probability scaled to u64::MAX; zero means never fail.
    failure_threshold: AtomicU64,
    reads: AtomicU64,
    inserts: AtomicU64,
    cas_calls: AtomicU64,
    cas_successes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with `rows`.
    pub fn with_rows(rows: impl IntoIterator<Item = SequenceRow>) -> Self {
        let store = Self::new();
        {
            let now = SystemTime::now();
            let mut records = store.records.lock();
            for row in rows {
                records.insert(
                    row.name.clone(),
                    Record {
                        row,
                        created_at: now,
                        modified_at: now,
                    },
                );
            }
        }
        store
    }

    /// Makes every call fail with [`StoreError::Unavailable`] while `false`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::Acquire)
    }

    /// Makes each call fail with probability `rate` (clamped to `[0, 1]`).
    pub fn set_failure_rate(&self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let threshold = (rate * u64::MAX as f64) as u64;
        self.failure_threshold.store(threshold, Ordering::Release);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            cas_calls: self.cas_calls.load(Ordering::Relaxed),
            cas_successes: self.cas_successes.load(Ordering::Relaxed),
        }
    }

    /// Creation and last modification time of the row for `name`.
    pub fn timestamps(&self, name: &str) -> Option<(SystemTime, SystemTime)> {
        self.records
            .lock()
            .get(name)
            .map(|record| (record.created_at, record.modified_at))
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StoreError::unavailable("store switched off"));
        }
        let threshold = self.failure_threshold.load(Ordering::Acquire);
        if threshold > 0 && rng().random::<u64>() <= threshold {
            return Err(StoreError::unavailable("injected failure"));
        }
        Ok(())
    }
}

impl SequenceStore for MemoryStore {
    fn read_value(&self, name: &str) -> Result<Option<i64>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self.records.lock().get(name).map(|record| record.row.value))
    }

    fn insert_if_absent(&self, row: &SequenceRow) -> Result<bool, StoreError> {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let mut records = self.records.lock();
        if records.contains_key(&row.name) {
            return Ok(false);
        }
        let now = SystemTime::now();
        records.insert(
            row.name.clone(),
            Record {
                row: row.clone(),
                created_at: now,
                modified_at: now,
            },
        );
        Ok(true)
    }

    fn compare_and_swap_value(
        &self,
        name: &str,
        expected: i64,
        new: i64,
    ) -> Result<u64, StoreError> {
        self.cas_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let mut records = self.records.lock();
        match records.get_mut(name) {
            Some(record) if record.row.value == expected => {
                record.row.value = new;
                record.modified_at = SystemTime::now();
                self.cas_successes.fetch_add(1, Ordering::Relaxed);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn list_rows(&self) -> Result<Vec<SequenceRow>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let mut rows: Vec<_> = self
            .records
            .lock()
            .values()
            .map(|record| record.row.clone())
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn find_row(&self, name: &str) -> Result<Option<SequenceRow>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self.records.lock().get(name).map(|record| record.row.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SequenceConfig;

    fn row(name: &str, value: i64) -> SequenceRow {
        SequenceRow::for_config(&SequenceConfig::new(name).with_step(10), value)
    }

    #[test]
    fn insert_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.insert_if_absent(&row("a", 0)).unwrap());
        assert!(!store.insert_if_absent(&row("a", 99)).unwrap());
        assert_eq!(store.read_value("a").unwrap(), Some(0));
        assert_eq!(store.read_value("b").unwrap(), None);
    }

    #[test]
    fn cas_only_applies_on_expected_value() {
        let store = MemoryStore::with_rows([row("a", 10)]);
        assert_eq!(store.compare_and_swap_value("a", 0, 20).unwrap(), 0);
        assert_eq!(store.compare_and_swap_value("a", 10, 20).unwrap(), 1);
        assert_eq!(store.compare_and_swap_value("a", 10, 30).unwrap(), 0);
        assert_eq!(store.compare_and_swap_value("missing", 0, 1).unwrap(), 0);
        assert_eq!(store.read_value("a").unwrap(), Some(20));

        let stats = store.stats();
        assert_eq!(stats.cas_calls, 4);
        assert_eq!(stats.cas_successes, 1);
    }

    #[test]
    fn cas_touches_modification_time() {
        let store = MemoryStore::new();
        store.insert_if_absent(&row("a", 0)).unwrap();
        let (created, modified) = store.timestamps("a").unwrap();
        assert_eq!(created, modified);
        store.compare_and_swap_value("a", 0, 10).unwrap();
        let (created_after, modified_after) = store.timestamps("a").unwrap();
        assert_eq!(created, created_after);
        assert!(modified_after >= modified);
    }

    #[test]
    fn switched_off_store_fails_every_call() {
        let store = MemoryStore::with_rows([row("a", 0)]);
        store.set_available(false);
        assert!(matches!(
            store.read_value("a"),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(store.list_rows().is_err());
        assert!(store.compare_and_swap_value("a", 0, 1).is_err());
        store.set_available(true);
        assert_eq!(store.read_value("a").unwrap(), Some(0));
    }

    #[test]
    fn full_failure_rate_always_fails() {
        let store = MemoryStore::with_rows([row("a", 0)]);
        store.set_failure_rate(1.0);
        for _ in 0..100 {
            assert!(store.read_value("a").is_err());
        }
        store.set_failure_rate(0.0);
        assert!(store.read_value("a").is_ok());
    }

    #[test]
    fn rows_are_listed_by_name() {
        let store = MemoryStore::with_rows([row("b", 1), row("a", 2)]);
        let names: Vec<_> = store
            .list_rows()
            .unwrap()
            .into_iter()
            .map(|row| row.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.find_row("b").unwrap().unwrap().value, 1);
    }
}
