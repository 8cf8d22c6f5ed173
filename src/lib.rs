//! Goal-progress engine for the PagePace reading client.
//!
//! Tracks progress toward user-defined and built-in periodic reading goals
//! and fires each completion notification exactly once per goal per period,
//! across process restarts and intermittent network failure. The engine owns
//! all of its per-user local state (baselines, progress snapshots,
//! notification marks, offline-fallback snapshots) behind injectable
//! collaborators: a [`source::ProgressSource`] for the remote service and a
//! [`cache::CacheStore`] for durable local state.
//!
//! Typical wiring:
//!
//! ```no_run
//! use pagepace_goals::GoalEngine;
//!
//! # async fn run() -> Result<(), pagepace_goals::EngineError> {
//! let engine = GoalEngine::open_default("user-123")?;
//! let outcome = engine.refresh().await?;
//! for event in &outcome.completions {
//!     println!("completed: {}", event.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod baseline;
pub mod cache;
pub mod completion;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod merge;
pub mod progress;
pub mod source;
pub mod types;

pub use cache::{CacheStore, MemoryCache};
pub use config::{EngineConfig, FirstObservationPolicy};
pub use db::SqliteCache;
pub use engine::{EnginePhase, GoalEngine, RefreshOutcome};
pub use error::EngineError;
pub use source::{HttpProgressSource, ProgressSource};
pub use types::{
    AggregateCounters, CompletionEvent, Goal, GoalDraft, GoalPeriod, GoalProgress, GoalType,
};
