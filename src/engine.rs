//! Refresh-cycle orchestration.
//!
//! One engine instance serves one signed-in user at a time. A refresh runs
//! IDLE → FETCHING → RECONCILING → IDLE: fetch counters and goals (falling
//! back to the cache and flagging the outcome stale), merge optimistic local
//! goals with the server list, capture baselines for newly observed goals,
//! compute progress, detect threshold crossings, and consult the dedup
//! ledger before surfacing completion events.
//!
//! Concurrent refresh triggers (a view appearing while a timer fires) are
//! collapsed into a single in-flight cycle. This is a correctness
//! requirement, not an optimization: two cycles racing their ledger writes
//! could surface the same completion twice.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::baseline::ensure_baseline;
use crate::cache::CacheStore;
use crate::completion::{check_completion, crossed_target, BuiltinKind};
use crate::config::{load_config, EngineConfig, FirstObservationPolicy};
use crate::db::SqliteCache;
use crate::error::EngineError;
use crate::ledger::DedupLedger;
use crate::merge;
use crate::progress::{compute_current, percentage};
use crate::source::{HttpProgressSource, ProgressSource};
use crate::types::{AggregateCounters, CompletionEvent, Goal, GoalDraft, GoalProgress};

/// Observable refresh phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Fetching,
    Reconciling,
}

/// Result of one refresh cycle.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Merged goal list with computed progress, server goals first.
    pub goals: Vec<GoalProgress>,
    /// Completion events detected this cycle, already marked in the ledger.
    pub completions: Vec<CompletionEvent>,
    /// True when any served data came from the cache rather than the service.
    pub stale: bool,
}

/// Value published to refreshes attached to an in-flight cycle.
#[derive(Clone)]
enum CyclePublish {
    Outcome(Arc<RefreshOutcome>),
    Offline,
}

/// Goal-progress engine over an injectable progress service and cache store.
pub struct GoalEngine {
    source: Arc<dyn ProgressSource>,
    cache: Arc<dyn CacheStore>,
    config: EngineConfig,
    user_id: Mutex<String>,
    /// Optimistic goals awaiting server acknowledgment, in insertion order.
    local_goals: Mutex<Vec<Goal>>,
    phase: Mutex<EnginePhase>,
    /// Some while a cycle is in flight; later callers clone the receiver and
    /// await the published outcome instead of starting a second cycle.
    inflight: AsyncMutex<Option<watch::Receiver<Option<CyclePublish>>>>,
}

impl GoalEngine {
    pub fn new(
        source: Arc<dyn ProgressSource>,
        cache: Arc<dyn CacheStore>,
        user_id: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            cache,
            config,
            user_id: Mutex::new(user_id.into()),
            local_goals: Mutex::new(Vec::new()),
            phase: Mutex::new(EnginePhase::Idle),
            inflight: AsyncMutex::new(None),
        }
    }

    /// Wire an engine against the HTTP service and the on-disk cache using
    /// the saved configuration, or defaults when none has been written yet.
    pub fn open_default(user_id: impl Into<String>) -> Result<Self, EngineError> {
        let config = match load_config() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("config load failed: {e}; using defaults");
                EngineConfig::default()
            }
        };
        let cache = SqliteCache::open()?;
        let source = HttpProgressSource::new(config.service_url.clone());
        Ok(Self::new(Arc::new(source), Arc::new(cache), user_id, config))
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.lock()
    }

    pub fn current_user(&self) -> String {
        self.user_id.lock().clone()
    }

    fn set_phase(&self, phase: EnginePhase) {
        *self.phase.lock() = phase;
    }

    /// Run a refresh, or attach to one already in flight.
    ///
    /// Always runs to completion once started; there is no cancellation
    /// surface, so the ledger is never left half-updated. Network timeouts
    /// are the progress service's responsibility.
    pub async fn refresh(&self) -> Result<Arc<RefreshOutcome>, EngineError> {
        enum Role {
            Leader(watch::Sender<Option<CyclePublish>>),
            Attached(watch::Receiver<Option<CyclePublish>>),
        }

        let user_id = self.current_user();

        let role = {
            let mut slot = self.inflight.lock().await;
            if let Some(rx) = slot.as_ref() {
                Role::Attached(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx);
                Role::Leader(tx)
            }
        };

        let tx = match role {
            Role::Attached(mut rx) => {
                let published = match rx.wait_for(|v| v.is_some()).await {
                    Ok(value) => (*value).clone(),
                    Err(_) => None,
                };
                return match published {
                    Some(CyclePublish::Outcome(outcome)) => Ok(outcome),
                    _ => Err(EngineError::NetworkUnavailable { user_id }),
                };
            }
            Role::Leader(tx) => tx,
        };

        let result = self.run_cycle(&user_id).await;

        // Publish before releasing the slot so attached callers observe the
        // outcome, then let the next trigger start a fresh cycle.
        let publish = match &result {
            Ok(outcome) => CyclePublish::Outcome(outcome.clone()),
            Err(_) => CyclePublish::Offline,
        };
        let _ = tx.send(Some(publish));
        *self.inflight.lock().await = None;

        result
    }

    async fn run_cycle(&self, user_id: &str) -> Result<Arc<RefreshOutcome>, EngineError> {
        self.set_phase(EnginePhase::Fetching);

        let (counters, counters_stale) = match self.source.fetch_counters(user_id).await {
            Ok(counters) => {
                if let Err(e) = self.cache.put_counters(user_id, &counters) {
                    log::warn!("counter snapshot write failed for {user_id}: {e}");
                }
                (counters, false)
            }
            Err(e) => {
                log::warn!("counter fetch failed for {user_id}: {e}; serving cached totals");
                match self.cache.last_counters(user_id) {
                    Ok(Some(cached)) => (cached, true),
                    Ok(None) => {
                        self.set_phase(EnginePhase::Idle);
                        return Err(EngineError::NetworkUnavailable {
                            user_id: user_id.to_string(),
                        });
                    }
                    Err(cache_err) => {
                        log::warn!("counter cache read failed for {user_id}: {cache_err}");
                        self.set_phase(EnginePhase::Idle);
                        return Err(EngineError::NetworkUnavailable {
                            user_id: user_id.to_string(),
                        });
                    }
                }
            }
        };

        let (server_goals, goals_stale) = match self.source.fetch_goals(user_id).await {
            Ok(goals) => {
                if let Err(e) = self.cache.put_goals(user_id, &goals) {
                    log::warn!("goal snapshot write failed for {user_id}: {e}");
                }
                (goals, false)
            }
            Err(e) => {
                log::warn!("goal fetch failed for {user_id}: {e}; serving cached list");
                match self.cache.last_goals(user_id) {
                    Ok(Some(cached)) => (cached, true),
                    _ => (Vec::new(), true),
                }
            }
        };

        self.set_phase(EnginePhase::Reconciling);

        // Server acknowledgment supersedes the optimistic copies. Only a
        // fresh fetch counts; a cached list proves nothing new.
        if !goals_stale {
            let mut locals = self.local_goals.lock();
            let confirmed: HashSet<String> = merge::confirmed_ids(&locals, &server_goals)
                .into_iter()
                .collect();
            locals.retain(|g| !confirmed.contains(&g.id));
        }

        let local = self.local_goals.lock().clone();
        let merged = merge::merge(&local, &server_goals);

        let ledger = DedupLedger::new(self.cache.as_ref(), user_id);
        let mut goals = Vec::with_capacity(merged.len());
        let mut completions = Vec::new();

        for goal in merged {
            // Baseline before progress, always: a goal observed for the
            // first time measures from this cycle's counters.
            let baseline = ensure_baseline(self.cache.as_ref(), user_id, &goal, &counters);
            let current = compute_current(&goal, &baseline, &counters);
            let previous = self.previous_observation(user_id, &goal.id, current);

            if check_completion(&goal, previous, current) && ledger.should_notify(&goal.id, None)
            {
                ledger.mark_notified(&goal.id, None);
                completions.push(CompletionEvent {
                    key: goal.id.clone(),
                    title: goal.title.clone(),
                });
            }

            if let Err(e) = self.cache.put_snapshot(user_id, &goal.id, current) {
                log::warn!("progress snapshot write failed for goal {}: {e}", goal.id);
            }

            goals.push(GoalProgress {
                percentage: percentage(goal.target, current),
                current,
                goal,
            });
        }

        self.detect_builtin_completions(user_id, &counters, &ledger, &mut completions);

        self.set_phase(EnginePhase::Idle);

        let stale = counters_stale || goals_stale;
        if stale {
            log::info!("refresh for {user_id} served stale data ({} goals)", goals.len());
        }

        Ok(Arc::new(RefreshOutcome {
            goals,
            completions,
            stale,
        }))
    }

    /// Built-in aggregate goals from user settings: same detector over
    /// absolute period totals, ledger marks scoped to the current period.
    fn detect_builtin_completions(
        &self,
        user_id: &str,
        counters: &AggregateCounters,
        ledger: &DedupLedger<'_>,
        completions: &mut Vec<CompletionEvent>,
    ) {
        for kind in BuiltinKind::ALL {
            let Some(target) = kind.target(&self.config.builtin_targets) else {
                continue;
            };
            let key = kind.ledger_key();
            let current = kind.current(counters);
            let previous = self.previous_observation(user_id, key, current);
            let period = kind.period_key(Utc::now());

            if crossed_target(target, previous, current)
                && ledger.should_notify(key, Some(&period))
            {
                ledger.mark_notified(key, Some(&period));
                completions.push(CompletionEvent {
                    key: key.to_string(),
                    title: kind.title().to_string(),
                });
            }

            if let Err(e) = self.cache.put_snapshot(user_id, key, current) {
                log::warn!("progress snapshot write failed for {key}: {e}");
            }
        }
    }

    /// Last-observed value for a goal or built-in key. Absence is resolved
    /// by the configured first-observation policy, not treated as unknown.
    fn previous_observation(&self, user_id: &str, key: &str, current: i64) -> i64 {
        match self.cache.snapshot(user_id, key) {
            Ok(Some(previous)) => previous,
            Ok(None) => match self.config.first_observation {
                FirstObservationPolicy::TreatAsZero => 0,
                FirstObservationPolicy::SeedFromCurrent => current,
            },
            Err(e) => {
                // An unreadable snapshot must not look like fresh progress.
                log::warn!("snapshot read failed for {key}: {e}");
                current
            }
        }
    }

    /// Create an optimistic goal, visible from the next refresh and superseded
    /// once the service reports the same id.
    pub fn register_local_goal(&self, draft: GoalDraft) -> Result<Goal, EngineError> {
        validate_draft(&draft)?;
        let goal = Goal {
            id: format!("local-{}", Uuid::new_v4()),
            title: draft.title,
            goal_type: draft.goal_type,
            period: draft.period,
            target: draft.target,
            active: true,
            created_at: Utc::now(),
            server_confirmed: false,
            current: None,
        };
        self.local_goals.lock().push(goal.clone());
        Ok(goal)
    }

    /// Create a goal on the service; it appears confirmed on the next fetch.
    pub async fn create_goal(&self, draft: GoalDraft) -> Result<Goal, EngineError> {
        validate_draft(&draft)?;
        let user_id = self.current_user();
        let goal = self.source.create_goal(&user_id, &draft).await?;
        Ok(goal)
    }

    /// Delete a goal and forget its baseline, snapshot, and notified mark.
    ///
    /// Optimistic local goals are dropped without a service call, since the
    /// service never issued their ids.
    pub async fn delete_goal(&self, goal_id: &str) -> Result<(), EngineError> {
        let user_id = self.current_user();

        let was_local = {
            let mut locals = self.local_goals.lock();
            let before = locals.len();
            locals.retain(|g| g.id != goal_id);
            locals.len() != before
        };
        if !was_local {
            self.source.delete_goal(&user_id, goal_id).await?;
        }

        if let Err(e) = self.cache.remove_goal_state(&user_id, goal_id) {
            log::warn!("failed to clear cached state for deleted goal {goal_id}: {e}");
        }
        Ok(())
    }

    /// Switch the engine to another user, clearing the departing user's
    /// cached state and optimistic goals so nothing leaks across accounts.
    pub fn on_user_switch(&self, new_user_id: impl Into<String>) {
        let new_user_id = new_user_id.into();
        let old = {
            let mut user = self.user_id.lock();
            std::mem::replace(&mut *user, new_user_id.clone())
        };
        self.local_goals.lock().clear();

        if old != new_user_id {
            if let Err(e) = self.cache.clear_user(&old) {
                log::warn!("failed to clear cached state for {old}: {e}");
            }
        }
    }
}

fn validate_draft(draft: &GoalDraft) -> Result<(), EngineError> {
    if draft.target < 1 {
        return Err(EngineError::InvalidGoal(format!(
            "target must be at least 1, got {}",
            draft.target
        )));
    }
    if draft.title.trim().is_empty() {
        return Err(EngineError::InvalidGoal("title must not be empty".to_string()));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
