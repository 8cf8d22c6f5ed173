//! Progress service abstraction.
//!
//! The engine consumes the remote service through this trait so tests can
//! swap in a fake without touching engine logic. `HttpProgressSource` is the
//! production implementation against the PagePace REST API. Request timeouts
//! are the service client's concern; the engine never imposes its own.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{AggregateCounters, Goal, GoalDraft};

/// Errors from progress service operations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl SourceError {
    /// True for transport-level failures, where cached fallback applies.
    pub fn is_network(&self) -> bool {
        matches!(self, SourceError::Network(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

/// Read and mutate operations the progress service exposes.
///
/// The two fetches are the only calls a refresh cycle makes; create and
/// delete are explicit user actions.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn fetch_counters(&self, user_id: &str) -> Result<AggregateCounters, SourceError>;

    async fn fetch_goals(&self, user_id: &str) -> Result<Vec<Goal>, SourceError>;

    /// The service assigns the authoritative id.
    async fn create_goal(&self, user_id: &str, draft: &GoalDraft) -> Result<Goal, SourceError>;

    async fn delete_goal(&self, user_id: &str, goal_id: &str) -> Result<(), SourceError>;
}

/// REST client for the progress service.
pub struct HttpProgressSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProgressSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Map a non-success response to `SourceError::Api` with the body as message.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SourceError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

#[async_trait]
impl ProgressSource for HttpProgressSource {
    async fn fetch_counters(&self, user_id: &str) -> Result<AggregateCounters, SourceError> {
        let resp = self
            .client
            .get(self.url(&format!("/users/{user_id}/stats")))
            .send()
            .await?;
        let counters = check_status(resp).await?.json().await?;
        Ok(counters)
    }

    async fn fetch_goals(&self, user_id: &str) -> Result<Vec<Goal>, SourceError> {
        let resp = self
            .client
            .get(self.url(&format!("/users/{user_id}/goals")))
            .send()
            .await?;
        let mut goals: Vec<Goal> = check_status(resp).await?.json().await?;
        // Anything the service reports is confirmed by definition.
        for goal in &mut goals {
            goal.server_confirmed = true;
        }
        Ok(goals)
    }

    async fn create_goal(&self, user_id: &str, draft: &GoalDraft) -> Result<Goal, SourceError> {
        let resp = self
            .client
            .post(self.url(&format!("/users/{user_id}/goals")))
            .json(draft)
            .send()
            .await?;
        let mut goal: Goal = check_status(resp).await?.json().await?;
        goal.server_confirmed = true;
        Ok(goal)
    }

    async fn delete_goal(&self, user_id: &str, goal_id: &str) -> Result<(), SourceError> {
        let resp = self
            .client
            .delete(self.url(&format!("/users/{user_id}/goals/{goal_id}")))
            .send()
            .await?;
        // Already-deleted is fine; deletion is idempotent from the caller's view.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(resp).await?;
        Ok(())
    }
}
