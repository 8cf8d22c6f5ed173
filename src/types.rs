//! Core data types shared across the goal engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Periodic reading totals reported by the progress service.
///
/// Authoritative and monotonically non-decreasing within a period; the
/// service resets them to zero at day/week/month boundaries. The engine
/// treats a fetched value as a read-only snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounters {
    #[serde(default)]
    pub daily_minutes: i64,
    #[serde(default)]
    pub weekly_books: i64,
    #[serde(default)]
    pub monthly_books: i64,
}

/// What a goal counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    Minutes,
    Books,
}

/// The window a goal's target applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPeriod {
    Day,
    Week,
    Month,
    Year,
}

/// A reading goal, either confirmed by the service or created locally and
/// awaiting acknowledgment.
///
/// Identity is by `id`. Locally-created goals carry a synthetic `local-`
/// prefixed id and `server_confirmed = false`; once the service reports the
/// same id, the server copy supersedes the local one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub period: GoalPeriod,
    pub target: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub server_confirmed: bool,
    /// Service-computed progress, used verbatim for (type, period)
    /// combinations the engine does not derive from counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<i64>,
}

fn default_active() -> bool {
    true
}

/// Fields required to create a goal, locally or via the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDraft {
    pub title: String,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub period: GoalPeriod,
    pub target: i64,
}

/// Counter snapshot taken the first time a goal is observed.
///
/// Written once, never mutated. Progress for counter-backed goals is
/// computed relative to these values so a goal created mid-period does not
/// retroactively count reading done earlier in that period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub goal_id: String,
    pub daily_minutes_at_creation: i64,
    pub weekly_books_at_creation: i64,
    pub monthly_books_at_creation: i64,
}

/// One goal with computed progress, as handed to the UI layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub goal: Goal,
    pub current: i64,
    pub percentage: u8,
}

/// Emitted at most once per goal (or built-in kind) per threshold crossing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    /// Goal id, or the fixed key of a built-in kind.
    pub key: String,
    pub title: String,
}

/// User-level targets for the built-in aggregate goals, from settings.
/// A `None` target disables that built-in kind entirely.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinTargets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_books: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_books: Option<i64>,
}
