//! HTTP client for the obs collector events API
//!
//! One request per event: `POST {endpoint}/api/events` with the JSON event as
//! body and the API key in the `X-OBS-Key` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;

use crate::dsn::Dsn;
use crate::error::{Error, Result};
use crate::event::Event;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-OBS-Key";

/// Delivers a single event to the collector
///
/// The dispatch worker owns one transport and calls it for every queued event,
/// one at a time. Any error is logged by the worker and the event dropped.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, event: &Event) -> Result<()>;
}

/// Response from POST /api/events
#[derive(Debug, Deserialize)]
pub struct EventsResponse {
    /// Id the collector stored the event under
    #[serde(default)]
    pub id: Option<String>,
}

/// reqwest-backed [`Transport`]
pub struct HttpTransport {
    http_client: reqwest::Client,
    events_url: String,
}

impl HttpTransport {
    /// Create a transport for a resolved DSN
    ///
    /// Returns an error if the API key cannot be sent as a header value or the
    /// HTTP client cannot be built.
    pub fn new(dsn: &Dsn, timeout: Duration) -> Result<Self> {
        // Build default headers
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(&dsn.api_key)
                .map_err(|e| Error::Config(format!("invalid api key: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            events_url: dsn.events_url(),
        })
    }

    pub fn events_url(&self) -> &str {
        &self.events_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, event: &Event) -> Result<()> {
        let body = event.to_json()?;

        let response = self
            .http_client
            .post(&self.events_url)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            // The body is informational; a collector that answers 2xx with
            // something else still accepted the event.
            if let Ok(stored) = response.json::<EventsResponse>().await {
                tracing::trace!(event_id = %event.event_id, stored_as = ?stored.id, "Event accepted");
            }
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Transport(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn test_transport_rejects_unprintable_key() {
        let dsn = Dsn {
            endpoint: "http://localhost:1".to_string(),
            api_key: "bad\nkey".to_string(),
        };
        assert!(HttpTransport::new(&dsn, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_send_posts_event_with_key() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/events")
            .match_header("x-obs-key", "testkey")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "level": "warning",
                "message": "disk almost full",
                "platform": "rust",
            })))
            .with_status(201)
            .with_body(r#"{"id":"abc"}"#)
            .create();

        let dsn = Dsn::parse(&format!("http://testkey@{}", server.host_with_port())).unwrap();
        let transport = HttpTransport::new(&dsn, Duration::from_secs(5)).unwrap();
        let event = Event::new(Level::Warning, "disk almost full");

        block_on(transport.send(&event)).unwrap();
        mock.assert();
    }

    #[test]
    fn test_send_reports_non_success_status() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/events")
            .with_status(401)
            .with_body(r#"{"error":"Invalid API key"}"#)
            .create();

        let dsn = Dsn::parse(&format!("http://wrong@{}", server.host_with_port())).unwrap();
        let transport = HttpTransport::new(&dsn, Duration::from_secs(5)).unwrap();

        let err = block_on(transport.send(&Event::new(Level::Info, "hi"))).unwrap_err();
        assert!(matches!(err, Error::Transport(ref msg) if msg.contains("401")));
        mock.assert();
    }

    #[test]
    fn test_send_reports_connection_failure() {
        // Nothing listens on port 1
        let dsn = Dsn::parse("http://k@127.0.0.1:1").unwrap();
        let transport = HttpTransport::new(&dsn, Duration::from_secs(2)).unwrap();

        let err = block_on(transport.send(&Event::new(Level::Info, "hi"))).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
