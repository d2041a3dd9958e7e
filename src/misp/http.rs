//! HTTP transport for the MISP REST API, on reqwest.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};

use crate::config::Settings;
use crate::error::ApiError;
use crate::misp::payload::EventPayload;
use crate::misp::{CreatedEvent, MispApi, SearchQuery};

/// A MISP REST client bound to one instance and API key.
pub struct HttpMispClient {
    client: Client,
    base_url: String,
}

impl HttpMispClient {
    /// Builds a client from validated settings. TLS verification is only
    /// relaxed when `verify_ssl` is explicitly disabled.
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&settings.misp_api_key)
            .map_err(|e| ApiError::Transport(format!("invalid API key header: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .default_headers(headers)
            .build()?;

        Ok(HttpMispClient {
            client,
            base_url: settings.misp_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read_json(response: Response) -> Result<Value, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// MISP serves ids as either strings or numbers depending on version.
fn id_field(value: &Value, key: &str) -> Option<String> {
    match &value[key] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl MispApi for HttpMispClient {
    async fn create_event(&self, payload: &EventPayload) -> Result<CreatedEvent, ApiError> {
        let response = self
            .client
            .post(self.url("events/add"))
            .json(payload)
            .send()
            .await?;
        if response.status() == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: 403,
                body: format!("authentication failed (check MISP_API_KEY): {}", truncate(&body, 200)),
            });
        }
        let body = Self::read_json(response).await?;

        let event = &body["Event"];
        let id = id_field(event, "id");
        let uuid = id_field(event, "uuid");
        match (id, uuid) {
            (Some(id), Some(uuid)) => {
                debug!("Created event id={id} uuid={uuid}");
                Ok(CreatedEvent { id, uuid })
            }
            _ => Err(ApiError::Decode(
                "response missing Event.id or Event.uuid".to_string(),
            )),
        }
    }

    async fn server_version(&self) -> Result<String, ApiError> {
        let response = self
            .client
            .get(self.url("servers/getVersion"))
            .send()
            .await?;
        let body = Self::read_json(response).await?;
        body["version"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode("response missing version".to_string()))
    }

    async fn search_events(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<Value>, ApiError> {
        let mut body = Map::new();
        body.insert("returnFormat".to_string(), json!("json"));
        if !query.tags.is_empty() {
            body.insert("tags".to_string(), json!(query.tags));
        }
        if let Some(from) = &query.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(to) = &query.to {
            body.insert("to".to_string(), json!(to));
        }

        let response = self
            .client
            .post(self.url("events/restSearch"))
            .json(&Value::Object(body))
            .send()
            .await?;
        let body = Self::read_json(response).await?;
        match &body["response"] {
            Value::Array(events) => Ok(events.clone()),
            _ => Err(ApiError::Decode(
                "response missing event array".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_field_accepts_string_and_number() {
        let v = json!({"id": "17", "uuid": "abc", "num": 42});
        assert_eq!(id_field(&v, "id").as_deref(), Some("17"));
        assert_eq!(id_field(&v, "num").as_deref(), Some("42"));
        assert_eq!(id_field(&v, "missing"), None);
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate("short", 500), "short");
        assert_eq!(truncate("ééééé", 3), "ééé");
    }
}
