//! Shared request shape and execution path for the fetch endpoints.
//!
//! Every `POST /posts/*` and `POST /profile/*` body deserializes into
//! [`FetchRequest`]; the handlers differ only in the endpoint kind and which
//! anchor URL they require.

use axum::Json;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use ts_rs::TS;

use db::models::api_key::ApiKey;
use services::services::credentials::{AuthOutcome, Credentials};
use services::services::linkedin::fetcher::{
    DEFAULT_DELAY_MAX_SECONDS, DEFAULT_DELAY_MIN_SECONDS, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use services::services::linkedin::urn::ConversionError;
use services::services::linkedin::{
    Anchor, DirectTransport, EndpointKind, FetchPlan, LinkedInTransport, ProxyTransport,
    parse_post_url, parse_profile_url,
};
use utils::response::ApiResponse;

use crate::AppState;
use crate::error::ApiError;

pub const MAX_COUNT: i64 = 10_000;
pub const MAX_MIN_DELAY_SECONDS: f64 = 30.0;
pub const MAX_MAX_DELAY_SECONDS: f64 = 60.0;

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export)]
pub struct FetchRequest {
    #[serde(default)]
    pub post_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    /// `-1` fetches everything the endpoint will give us.
    #[serde(default = "default_count")]
    pub count: i64,
    /// Body-level key for CLI callers; takes precedence over `X-API-Key`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// `true` runs the fetch from the gateway with stored credentials,
    /// `false` proxies through the caller's browser extension.
    #[serde(default)]
    pub server_call: bool,
    #[serde(default = "default_min_delay")]
    pub min_delay: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
    #[serde(default)]
    pub page_size: Option<i64>,
}

fn default_count() -> i64 {
    -1
}

fn default_min_delay() -> f64 {
    DEFAULT_DELAY_MIN_SECONDS
}

fn default_max_delay() -> f64 {
    DEFAULT_DELAY_MAX_SECONDS
}

pub fn validate(req: &FetchRequest) -> Result<(), ApiError> {
    if req.count != -1 && !(1..=MAX_COUNT).contains(&req.count) {
        return Err(ApiError::ValidationFailed(format!(
            "count must be -1 or between 1 and {}",
            MAX_COUNT
        )));
    }
    if !(0.0..=MAX_MIN_DELAY_SECONDS).contains(&req.min_delay) {
        return Err(ApiError::ValidationFailed(format!(
            "min_delay must be between 0 and {}",
            MAX_MIN_DELAY_SECONDS
        )));
    }
    if !(0.0..=MAX_MAX_DELAY_SECONDS).contains(&req.max_delay) {
        return Err(ApiError::ValidationFailed(format!(
            "max_delay must be between 0 and {}",
            MAX_MAX_DELAY_SECONDS
        )));
    }
    if req.max_delay < req.min_delay {
        return Err(ApiError::ValidationFailed(
            "max_delay must be greater than or equal to min_delay".into(),
        ));
    }
    if let Some(page_size) = req.page_size {
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ApiError::ValidationFailed(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
    }
    Ok(())
}

/// The presented key: body field first (CLI ergonomics), header otherwise.
pub fn pick_api_key<'a>(headers: &'a HeaderMap, body_key: Option<&'a str>) -> Option<&'a str> {
    body_key.or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
}

pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    body_key: Option<&str>,
) -> Result<ApiKey, ApiError> {
    let presented = pick_api_key(headers, body_key).ok_or(ApiError::Unauthorized)?;
    match state.registry.authenticate(presented).await? {
        AuthOutcome::Found(key) => Ok(key),
        AuthOutcome::NotFound | AuthOutcome::Invalid => Err(ApiError::Unauthorized),
    }
}

/// Validate, pick the execution mode, resolve the anchor, run the
/// orchestrator, and wrap the items in the uniform `{ "data": [...] }`
/// envelope.
pub async fn execute(
    state: &AppState,
    headers: &HeaderMap,
    req: &FetchRequest,
    kind: EndpointKind,
) -> Result<Json<ApiResponse<Vec<Value>>>, ApiError> {
    let key = authenticate(state, headers, req.api_key.as_deref()).await?;
    validate(req)?;

    let transport: Box<dyn LinkedInTransport> = if req.server_call {
        if !state.registry.server_execution_allowed() {
            return Err(ApiError::ServerExecutionDisabled);
        }
        Box::new(DirectTransport::new(
            state.direct.clone(),
            Credentials::from_key(&key),
        ))
    } else {
        if !state.proxy.is_connected(key.user_id) {
            return Err(ApiError::NoProxyConnection);
        }
        Box::new(ProxyTransport::new(state.proxy.clone(), key.user_id))
    };

    let anchor = resolve_anchor(state, transport.as_ref(), req, kind).await?;

    let mut plan = FetchPlan::new(kind, anchor);
    plan.count = req.count;
    plan.page_size = req.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    plan.delay_min_seconds = req.min_delay;
    plan.delay_max_seconds = req.max_delay;

    let items = state.orchestrator.run(transport.as_ref(), &plan).await?;
    Ok(Json(ApiResponse::new(items)))
}

async fn resolve_anchor(
    state: &AppState,
    transport: &dyn LinkedInTransport,
    req: &FetchRequest,
    kind: EndpointKind,
) -> Result<Anchor, ApiError> {
    match kind {
        EndpointKind::Feed => Ok(Anchor::None),
        EndpointKind::PostComments | EndpointKind::PostReactions => {
            let post_url = req
                .post_url
                .as_deref()
                .ok_or_else(|| ApiError::ValidationFailed("post_url is required".into()))?;
            Ok(Anchor::Post(parse_post_url(post_url)?))
        }
        EndpointKind::ProfilePosts | EndpointKind::ProfileComments => {
            let profile_url = req
                .profile_url
                .as_deref()
                .ok_or_else(|| ApiError::ValidationFailed("profile_url is required".into()))?;
            let segment = parse_profile_url(profile_url)?;
            let profile_id = state
                .profiles
                .resolve(transport, &segment)
                .await
                .map_err(|e| match e {
                    ConversionError::Lookup(msg) => ApiError::UpstreamTransport(msg),
                    ConversionError::Missing => {
                        ApiError::Parse(format!("could not resolve profile id for {}", segment))
                    }
                })?;
            Ok(Anchor::Profile(profile_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> FetchRequest {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }

    #[test]
    fn defaults_are_fetch_all_with_polite_delays() {
        let req = request();
        assert_eq!(req.count, -1);
        assert!(!req.server_call);
        assert_eq!(req.min_delay, 2.0);
        assert_eq!(req.max_delay, 5.0);
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn count_bounds_are_enforced() {
        let mut req = request();
        req.count = 0;
        assert!(validate(&req).is_err());
        req.count = 10_001;
        assert!(validate(&req).is_err());
        req.count = 10_000;
        assert!(validate(&req).is_ok());
        req.count = -1;
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn inverted_delay_window_is_rejected() {
        let mut req = request();
        req.min_delay = 5.0;
        req.max_delay = 2.0;
        let err = validate(&req).unwrap_err();
        assert!(matches!(err, ApiError::ValidationFailed(_)));
    }

    #[test]
    fn zero_delays_are_allowed() {
        let mut req = request();
        req.min_delay = 0.0;
        req.max_delay = 0.0;
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn delay_ceilings_are_enforced() {
        let mut req = request();
        req.min_delay = 31.0;
        req.max_delay = 40.0;
        assert!(validate(&req).is_err());

        let mut req = request();
        req.max_delay = 61.0;
        assert!(validate(&req).is_err());
    }

    #[test]
    fn page_size_ceiling_is_enforced() {
        let mut req = request();
        req.page_size = Some(100);
        assert!(validate(&req).is_ok());
        req.page_size = Some(101);
        assert!(validate(&req).is_err());
        req.page_size = Some(0);
        assert!(validate(&req).is_err());
    }

    #[test]
    fn body_key_takes_precedence_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "LKG_from_header".parse().unwrap());

        assert_eq!(pick_api_key(&headers, Some("LKG_from_body")), Some("LKG_from_body"));
        assert_eq!(pick_api_key(&headers, None), Some("LKG_from_header"));
        assert_eq!(pick_api_key(&HeaderMap::new(), None), None);
    }
}
