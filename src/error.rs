//! Error types for the goal engine.
//!
//! Nothing here is fatal to the hosting application. The worst outcome is a
//! temporarily stale or momentarily absent progress display:
//! - Offline with cached data: not an error, the refresh outcome is flagged stale.
//! - Offline with an empty cache: `NetworkUnavailable`, the UI shows a loading state.
//! - Cache write failures: logged, the cycle proceeds in-memory.

use thiserror::Error;

use crate::cache::CacheError;
use crate::source::SourceError;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fetch failed and no cached counters exist for this user. The only
    /// error a refresh can return.
    #[error("network unavailable and no cached data for user {user_id}")]
    NetworkUnavailable { user_id: String },

    /// Rejected at creation; invalid drafts never enter the merge/compute
    /// pipeline.
    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    /// Progress service failure from an explicit remote operation
    /// (create/delete). Refresh degrades to cache instead of raising this.
    #[error("progress service error: {0}")]
    Source(#[from] SourceError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl EngineError {
    /// True when retrying after connectivity returns is reasonable.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::NetworkUnavailable { .. } => true,
            EngineError::Source(e) => e.is_network(),
            EngineError::InvalidGoal(_) | EngineError::Cache(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_is_retryable() {
        let err = EngineError::NetworkUnavailable {
            user_id: "u1".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_goal_is_not_retryable() {
        let err = EngineError::InvalidGoal("target must be at least 1".to_string());
        assert!(!err.is_retryable());
    }
}
