use std::time::Duration;

use reqwest::{Client, StatusCode, header};

use super::FetchError;
use crate::services::credentials::Credentials;

pub const LINKEDIN_ACCEPT: &str = "application/vnd.linkedin.normalized+json+2.1";
pub const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-side Voyager executor. Sends the caller's stored cookie jar and
/// CSRF token; a 401/403 therefore means the stored session went stale, not
/// that the gateway itself is misconfigured.
#[derive(Clone)]
pub struct DirectClient {
    client: Client,
}

impl DirectClient {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub async fn fetch_json(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> Result<serde_json::Value, FetchError> {
        let Some(csrf_token) = credentials.csrf_token.as_deref() else {
            return Err(FetchError::MissingCredentials);
        };

        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .header("csrf-token", csrf_token)
            .header(header::ACCEPT, LINKEDIN_ACCEPT)
            .header("x-restli-protocol-version", RESTLI_PROTOCOL_VERSION)
            .header(header::COOKIE, credentials.cookie_header())
            .header(header::USER_AGENT, DESKTOP_USER_AGENT)
            .send()
            .await
            .map_err(|e| FetchError::UpstreamTransport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::AuthStale);
        }
        if !status.is_success() {
            return Err(FetchError::UpstreamHttp { status: status.as_u16() });
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::UpstreamTransport(e.to_string()))
    }
}

impl Default for DirectClient {
    fn default() -> Self {
        Self::new()
    }
}
