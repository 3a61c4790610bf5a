use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::FetchError;
use super::client::{DirectClient, LINKEDIN_ACCEPT, RESTLI_PROTOCOL_VERSION};
use crate::services::credentials::Credentials;
use crate::services::proxy::{ProxyRequestSpec, ProxyRouter};

/// The mode seam: "GET this LinkedIn URL, give me the JSON". The
/// orchestrator, the URN converter and the profile resolver are all written
/// against this, so they neither know nor care which side of the WebSocket
/// actually talked to LinkedIn.
#[async_trait]
pub trait LinkedInTransport: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError>;
}

/// Direct mode: the gateway process calls LinkedIn with stored credentials.
pub struct DirectTransport {
    client: DirectClient,
    credentials: Credentials,
}

impl DirectTransport {
    pub fn new(client: DirectClient, credentials: Credentials) -> Self {
        Self { client, credentials }
    }
}

#[async_trait]
impl LinkedInTransport for DirectTransport {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        self.client.fetch_json(url, &self.credentials).await
    }
}

/// Proxy mode: the request runs inside the user's browser, which supplies
/// live cookies itself (`include_credentials`).
pub struct ProxyTransport {
    router: Arc<ProxyRouter>,
    user_id: Uuid,
}

impl ProxyTransport {
    pub fn new(router: Arc<ProxyRouter>, user_id: Uuid) -> Self {
        Self { router, user_id }
    }

    fn service_headers() -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("accept".to_string(), LINKEDIN_ACCEPT.to_string());
        headers.insert(
            "x-restli-protocol-version".to_string(),
            RESTLI_PROTOCOL_VERSION.to_string(),
        );
        headers
    }
}

#[async_trait]
impl LinkedInTransport for ProxyTransport {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let mut spec = ProxyRequestSpec::get_json(url);
        spec.headers = Self::service_headers();

        let reply = self.router.proxy_http(self.user_id, spec).await?;
        if reply.status_code >= 400 {
            return Err(FetchError::UpstreamHttp { status: reply.status_code });
        }

        // A non-JSON body (login wall, block page) flows through as a plain
        // string; the normalizer reports it as an error page rather than us
        // guessing here.
        Ok(serde_json::from_str(&reply.body)
            .unwrap_or(serde_json::Value::String(reply.body)))
    }
}
