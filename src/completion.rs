//! Threshold-crossing detection for goal completion.
//!
//! Completion fires on the transition across the target, not on the state
//! being above it. The detector itself is a pure predicate; persistence of
//! the previous value and dedup of the resulting event live in the snapshot
//! table and the ledger.

use chrono::{DateTime, Datelike, Utc};

use crate::types::{AggregateCounters, BuiltinTargets, Goal};

/// True iff progress crossed the target between two observations.
///
/// Requires `current > previous`: a counter reset at a period boundary makes
/// `current <= previous`, which must never read as a fresh completion.
pub fn crossed_target(target: i64, previous: i64, current: i64) -> bool {
    previous < target && current >= target && current > previous
}

/// Detector for custom goals; inactive goals never fire.
pub fn check_completion(goal: &Goal, previous: i64, current: i64) -> bool {
    goal.active && crossed_target(goal.target, previous, current)
}

// ---------------------------------------------------------------------------
// Built-in goals
// ---------------------------------------------------------------------------

/// Built-in aggregate goals sourced from user settings rather than the goal
/// list. They use the same detector over absolute period totals, keyed in
/// the ledger by fixed strings, and their marks lapse when the underlying
/// period rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    DailyMinutes,
    WeeklyBooks,
    MonthlyBooks,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 3] = [
        BuiltinKind::DailyMinutes,
        BuiltinKind::WeeklyBooks,
        BuiltinKind::MonthlyBooks,
    ];

    /// Stable ledger/snapshot key. Never collides with goal ids.
    pub fn ledger_key(self) -> &'static str {
        match self {
            BuiltinKind::DailyMinutes => "builtin:daily-minutes",
            BuiltinKind::WeeklyBooks => "builtin:weekly-books",
            BuiltinKind::MonthlyBooks => "builtin:monthly-books",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            BuiltinKind::DailyMinutes => "Daily reading goal",
            BuiltinKind::WeeklyBooks => "Weekly books goal",
            BuiltinKind::MonthlyBooks => "Monthly books goal",
        }
    }

    /// Period key a notification mark is stamped with. A mark whose key
    /// differs from the current one is from a previous period and lapses.
    pub fn period_key(self, now: DateTime<Utc>) -> String {
        match self {
            BuiltinKind::DailyMinutes => now.format("%Y-%m-%d").to_string(),
            BuiltinKind::WeeklyBooks => {
                let week = now.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            BuiltinKind::MonthlyBooks => now.format("%Y-%m").to_string(),
        }
    }

    /// Absolute period total this kind tracks.
    pub fn current(self, counters: &AggregateCounters) -> i64 {
        match self {
            BuiltinKind::DailyMinutes => counters.daily_minutes,
            BuiltinKind::WeeklyBooks => counters.weekly_books,
            BuiltinKind::MonthlyBooks => counters.monthly_books,
        }
    }

    /// Target from user settings; `None` disables the kind.
    pub fn target(self, targets: &BuiltinTargets) -> Option<i64> {
        match self {
            BuiltinKind::DailyMinutes => targets.daily_minutes,
            BuiltinKind::WeeklyBooks => targets.weekly_books,
            BuiltinKind::MonthlyBooks => targets.monthly_books,
        }
    }
}
