//! Submission client: validation gate, payload build and retrying calls.

use log::info;
use serde_json::Value;

use crate::error::ClientError;
use crate::event::EventRecord;
use crate::misp::payload::build_event_payload;
use crate::misp::retry::RetryPolicy;
use crate::misp::{MispApi, SearchQuery};

/// A created event with the instance URL a human can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedEvent {
    pub id: String,
    pub uuid: String,
    pub url: String,
}

/// High-level client over any [`MispApi`] transport.
///
/// Every submission passes the validation gate again before anything is
/// sent. Records normally arrive pre-validated from the CSV pipeline, but
/// the interactive flow builds them directly and this is the last stop
/// before the network.
pub struct SubmissionClient<A> {
    api: A,
    base_url: String,
    retry: RetryPolicy,
}

impl<A: MispApi> SubmissionClient<A> {
    pub fn new(api: A, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        SubmissionClient {
            api,
            base_url: base_url.into(),
            retry,
        }
    }

    /// The underlying transport.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Creates one event, retrying transient failures per the policy.
    pub async fn submit(&self, record: &EventRecord) -> Result<SubmittedEvent, ClientError> {
        let payload = build_event_payload(record)?;
        let created = self
            .retry
            .run("create event", || self.api.create_event(&payload))
            .await?;
        info!(
            "Created event '{}' (id {}, uuid {})",
            record.event_name, created.id, created.uuid
        );
        Ok(SubmittedEvent {
            url: format!("{}/events/view/{}", self.base_url, created.id),
            id: created.id,
            uuid: created.uuid,
        })
    }

    /// Verifies connectivity and credentials; returns the server version.
    pub async fn test_connection(&self) -> Result<String, ClientError> {
        self.retry
            .run("server version", || self.api.server_version())
            .await
    }

    /// Searches events matching `query`, returning the raw JSON documents.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>, ClientError> {
        self.retry
            .run("event search", || self.api.search_events(query))
            .await
    }
}
