//! Notification dedup ledger.
//!
//! Persisted per-user record of which goal ids and built-in kinds have
//! already produced a completion event. The engine marks before yielding the
//! event to the caller, so a crash in that window loses at most one toast
//! and never re-queues it.

use chrono::Utc;

use crate::cache::{CacheStore, NotifiedMark};

/// Per-cycle view over the persisted mark set.
pub struct DedupLedger<'a> {
    cache: &'a dyn CacheStore,
    user_id: &'a str,
}

impl<'a> DedupLedger<'a> {
    pub fn new(cache: &'a dyn CacheStore, user_id: &'a str) -> Self {
        Self { cache, user_id }
    }

    /// True if no mark exists for `key`, or (for built-in kinds, which pass
    /// the current period) the stored mark is from a previous period.
    ///
    /// A read failure suppresses: the acceptable loss is a missed toast, the
    /// guarded loss is a duplicate.
    pub fn should_notify(&self, key: &str, current_period: Option<&str>) -> bool {
        match self.cache.notified_mark(self.user_id, key) {
            Ok(None) => true,
            Ok(Some(mark)) => match (current_period, mark.period_key.as_deref()) {
                (Some(now), Some(marked)) => now != marked,
                _ => false,
            },
            Err(e) => {
                log::warn!("notified-mark read failed for {key}: {e}; suppressing notification");
                false
            }
        }
    }

    /// Record that `key` fired. Best-effort: a failed write is logged and the
    /// event is still surfaced this cycle; the snapshot table keeps the
    /// detector from re-firing while the process lives.
    pub fn mark_notified(&self, key: &str, period_key: Option<&str>) {
        let mark = NotifiedMark {
            key: key.to_string(),
            period_key: period_key.map(str::to_string),
            notified_at: Utc::now(),
        };
        if let Err(e) = self.cache.put_notified_mark(self.user_id, &mark) {
            log::warn!("notified-mark write failed for {key}: {e}");
        }
    }
}
