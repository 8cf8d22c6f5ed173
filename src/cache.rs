//! Cache store abstraction.
//!
//! The engine persists all of its per-user state through this trait: goal
//! baselines, last-observed progress snapshots, notification marks, and the
//! last-known-good copies of remote data used as offline fallback. The
//! SQLite store (`db::SqliteCache`) is the production implementation;
//! `MemoryCache` backs tests and can be told to refuse reads or writes so
//! the best-effort persistence paths are exercisable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AggregateCounters, Baseline, Goal};

/// Errors specific to cache store operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("home directory not found")]
    HomeDirNotFound,

    #[error("failed to create cache directory: {0}")]
    CreateDir(std::io::Error),

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// A persisted "already notified" record.
///
/// Custom goals carry no period key and stay marked until the goal is
/// deleted or the user switches. Built-in kinds store the period key they
/// fired in so the mark lapses when the period rolls over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedMark {
    pub key: String,
    pub period_key: Option<String>,
    pub notified_at: DateTime<Utc>,
}

/// Durable per-user state store. Writes are last-write-wins per key, except
/// baselines where the first write wins.
pub trait CacheStore: Send + Sync {
    fn baseline(&self, user_id: &str, goal_id: &str) -> Result<Option<Baseline>, CacheError>;

    /// First write wins: a baseline is captured once and never mutated.
    fn put_baseline(&self, user_id: &str, baseline: &Baseline) -> Result<(), CacheError>;

    /// Last-observed current value for a goal id or built-in kind key.
    fn snapshot(&self, user_id: &str, key: &str) -> Result<Option<i64>, CacheError>;

    fn put_snapshot(&self, user_id: &str, key: &str, current: i64) -> Result<(), CacheError>;

    fn notified_mark(&self, user_id: &str, key: &str) -> Result<Option<NotifiedMark>, CacheError>;

    /// Upsert: built-in kinds re-mark with a fresh period key after rollover.
    fn put_notified_mark(&self, user_id: &str, mark: &NotifiedMark) -> Result<(), CacheError>;

    fn last_counters(&self, user_id: &str) -> Result<Option<AggregateCounters>, CacheError>;

    fn put_counters(&self, user_id: &str, counters: &AggregateCounters) -> Result<(), CacheError>;

    fn last_goals(&self, user_id: &str) -> Result<Option<Vec<Goal>>, CacheError>;

    fn put_goals(&self, user_id: &str, goals: &[Goal]) -> Result<(), CacheError>;

    /// Drop a single goal's baseline, snapshot, and notified mark. Called on
    /// explicit goal deletion.
    fn remove_goal_state(&self, user_id: &str, goal_id: &str) -> Result<(), CacheError>;

    /// Drop every row belonging to a user. Called on user switch.
    fn clear_user(&self, user_id: &str) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct UserTables {
    baselines: HashMap<String, Baseline>,
    snapshots: HashMap<String, i64>,
    marks: HashMap<String, NotifiedMark>,
    counters: Option<AggregateCounters>,
    goals: Option<Vec<Goal>>,
}

/// HashMap-backed store. Used as the test double for the SQLite cache; the
/// write-failure switch simulates a full or broken disk.
#[derive(Default)]
pub struct MemoryCache {
    users: Mutex<HashMap<String, UserTables>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every write returns `CacheError::Unavailable` until unset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// When set, every read returns `CacheError::Unavailable` until unset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<(), CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn with_user<T>(&self, user_id: &str, f: impl FnOnce(&UserTables) -> T) -> T {
        let mut users = self.users.lock();
        f(users.entry(user_id.to_string()).or_default())
    }

    fn with_user_mut<T>(&self, user_id: &str, f: impl FnOnce(&mut UserTables) -> T) -> T {
        let mut users = self.users.lock();
        f(users.entry(user_id.to_string()).or_default())
    }
}

impl CacheStore for MemoryCache {
    fn baseline(&self, user_id: &str, goal_id: &str) -> Result<Option<Baseline>, CacheError> {
        self.check_readable()?;
        Ok(self.with_user(user_id, |t| t.baselines.get(goal_id).cloned()))
    }

    fn put_baseline(&self, user_id: &str, baseline: &Baseline) -> Result<(), CacheError> {
        self.check_writable()?;
        self.with_user_mut(user_id, |t| {
            t.baselines
                .entry(baseline.goal_id.clone())
                .or_insert_with(|| baseline.clone());
        });
        Ok(())
    }

    fn snapshot(&self, user_id: &str, key: &str) -> Result<Option<i64>, CacheError> {
        self.check_readable()?;
        Ok(self.with_user(user_id, |t| t.snapshots.get(key).copied()))
    }

    fn put_snapshot(&self, user_id: &str, key: &str, current: i64) -> Result<(), CacheError> {
        self.check_writable()?;
        self.with_user_mut(user_id, |t| {
            t.snapshots.insert(key.to_string(), current);
        });
        Ok(())
    }

    fn notified_mark(&self, user_id: &str, key: &str) -> Result<Option<NotifiedMark>, CacheError> {
        self.check_readable()?;
        Ok(self.with_user(user_id, |t| t.marks.get(key).cloned()))
    }

    fn put_notified_mark(&self, user_id: &str, mark: &NotifiedMark) -> Result<(), CacheError> {
        self.check_writable()?;
        self.with_user_mut(user_id, |t| {
            t.marks.insert(mark.key.clone(), mark.clone());
        });
        Ok(())
    }

    fn last_counters(&self, user_id: &str) -> Result<Option<AggregateCounters>, CacheError> {
        self.check_readable()?;
        Ok(self.with_user(user_id, |t| t.counters))
    }

    fn put_counters(&self, user_id: &str, counters: &AggregateCounters) -> Result<(), CacheError> {
        self.check_writable()?;
        self.with_user_mut(user_id, |t| t.counters = Some(*counters));
        Ok(())
    }

    fn last_goals(&self, user_id: &str) -> Result<Option<Vec<Goal>>, CacheError> {
        self.check_readable()?;
        Ok(self.with_user(user_id, |t| t.goals.clone()))
    }

    fn put_goals(&self, user_id: &str, goals: &[Goal]) -> Result<(), CacheError> {
        self.check_writable()?;
        self.with_user_mut(user_id, |t| t.goals = Some(goals.to_vec()));
        Ok(())
    }

    fn remove_goal_state(&self, user_id: &str, goal_id: &str) -> Result<(), CacheError> {
        self.check_writable()?;
        self.with_user_mut(user_id, |t| {
            t.baselines.remove(goal_id);
            t.snapshots.remove(goal_id);
            t.marks.remove(goal_id);
        });
        Ok(())
    }

    fn clear_user(&self, user_id: &str) -> Result<(), CacheError> {
        self.check_writable()?;
        self.users.lock().remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_baseline(goal_id: &str, daily: i64) -> Baseline {
        Baseline {
            goal_id: goal_id.to_string(),
            daily_minutes_at_creation: daily,
            weekly_books_at_creation: 0,
            monthly_books_at_creation: 0,
        }
    }

    #[test]
    fn test_baseline_first_write_wins() {
        let cache = MemoryCache::new();
        cache.put_baseline("u1", &sample_baseline("g1", 10)).unwrap();
        cache.put_baseline("u1", &sample_baseline("g1", 99)).unwrap();

        let stored = cache.baseline("u1", "g1").unwrap().unwrap();
        assert_eq!(stored.daily_minutes_at_creation, 10);
    }

    #[test]
    fn test_snapshot_last_write_wins() {
        let cache = MemoryCache::new();
        cache.put_snapshot("u1", "g1", 2).unwrap();
        cache.put_snapshot("u1", "g1", 5).unwrap();
        assert_eq!(cache.snapshot("u1", "g1").unwrap(), Some(5));
    }

    #[test]
    fn test_fail_writes_switch() {
        let cache = MemoryCache::new();
        cache.set_fail_writes(true);
        assert!(cache.put_snapshot("u1", "g1", 1).is_err());
        assert_eq!(cache.snapshot("u1", "g1").unwrap(), None, "failed write left no state");

        cache.set_fail_writes(false);
        cache.put_snapshot("u1", "g1", 1).unwrap();
        assert_eq!(cache.snapshot("u1", "g1").unwrap(), Some(1));
    }

    #[test]
    fn test_users_are_isolated() {
        let cache = MemoryCache::new();
        cache.put_snapshot("u1", "g1", 3).unwrap();
        assert_eq!(cache.snapshot("u2", "g1").unwrap(), None);
    }

    #[test]
    fn test_remove_goal_state() {
        let cache = MemoryCache::new();
        cache.put_baseline("u1", &sample_baseline("g1", 1)).unwrap();
        cache.put_snapshot("u1", "g1", 4).unwrap();
        cache
            .put_notified_mark(
                "u1",
                &NotifiedMark {
                    key: "g1".to_string(),
                    period_key: None,
                    notified_at: Utc::now(),
                },
            )
            .unwrap();

        cache.remove_goal_state("u1", "g1").unwrap();
        assert!(cache.baseline("u1", "g1").unwrap().is_none());
        assert!(cache.snapshot("u1", "g1").unwrap().is_none());
        assert!(cache.notified_mark("u1", "g1").unwrap().is_none());
    }

    #[test]
    fn test_clear_user_drops_everything() {
        let cache = MemoryCache::new();
        cache.put_baseline("u1", &sample_baseline("g1", 1)).unwrap();
        cache.put_counters("u1", &AggregateCounters::default()).unwrap();

        cache.clear_user("u1").unwrap();
        assert!(cache.baseline("u1", "g1").unwrap().is_none());
        assert!(cache.last_counters("u1").unwrap().is_none());
    }
}
