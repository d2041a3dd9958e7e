//! MISP integration: API abstraction, payload construction, transport and
//! the retrying submission client.
//!
//! [`MispApi`] is the seam between the submission logic and the wire. The
//! production implementation is [`http::HttpMispClient`]; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ApiError;

pub mod client;
pub mod http;
pub mod payload;
pub mod retry;

pub use client::SubmissionClient;
pub use http::HttpMispClient;
pub use payload::{build_event_payload, is_safe_tag, EventPayload};
pub use retry::RetryPolicy;

/// The identity MISP assigns to a newly created event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
    pub uuid: String,
}

/// Filters for an event search.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Tag names the events must carry.
    pub tags: Vec<String>,
    /// Inclusive lower bound on event date, `YYYY-MM-DD`.
    pub from: Option<String>,
    /// Inclusive upper bound on event date, `YYYY-MM-DD`.
    pub to: Option<String>,
}

/// Minimal MISP API surface used by this tool.
#[async_trait]
pub trait MispApi: Send + Sync {
    /// Creates one event and returns its assigned id and uuid.
    async fn create_event(&self, payload: &EventPayload) -> Result<CreatedEvent, ApiError>;

    /// Returns the server's reported version string.
    async fn server_version(&self) -> Result<String, ApiError>;

    /// Returns matching events as raw JSON, as served by the instance.
    async fn search_events(&self, query: &SearchQuery)
        -> Result<Vec<serde_json::Value>, ApiError>;
}
