//! HTTP transport collaborator behind the governor.
//!
//! The governor is agnostic to what actually performs the call; it only
//! needs an asynchronous operation that eventually settles. `Transport` is
//! that seam, and `HttpTransport` is the production implementation the host
//! app hands to [`crate::GovernedClient`]. The governor imposes no timeout
//! of its own — the reqwest client's timeout, set here at construction, is
//! what turns a hung backend into a failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{GovernorError, Result};

/// An asynchronous JSON transport. Must be safe to invoke concurrently and
/// must eventually settle, success or failure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`, returning the parsed JSON body.
    async fn get(&self, url: &str) -> Result<Value>;

    /// Post `payload` to `url`, returning the parsed JSON body.
    async fn post(&self, url: &str, payload: &Value) -> Result<Value>;
}

/// Reqwest-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport whose requests fail after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GovernorError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Build a transport from an existing client (shared connection pool).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Value> {
        debug!(url, "transport GET");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<Value> {
        debug!(url, "transport POST");
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_builds_with_timeout() {
        let transport = HttpTransport::new(Duration::from_secs(10));
        assert!(transport.is_ok());
    }

    #[test]
    fn test_transport_is_object_safe() {
        // GovernedClient stores an Arc<dyn Transport>; keep the trait
        // object-safe.
        fn assert_obj(_t: &dyn Transport) {}
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        assert_obj(&transport);
    }

    #[tokio::test]
    async fn test_get_maps_connect_error_to_transport() {
        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
        // Reserved TEST-NET-1 address: nothing listens there.
        let result = transport.get("http://192.0.2.1:9/none").await;
        match result {
            Err(GovernorError::Transport(_)) => {}
            other => panic!("expected Transport error, got {other:?}"),
        }
    }
}
