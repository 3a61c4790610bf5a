//! Credential push endpoints.
//!
//! The extension mirrors its live LinkedIn session into the registry after
//! every successful round-trip; there is no server-side TTL, so these calls
//! are the only thing keeping direct mode fresh. All three authenticate with
//! the API key (header or body field) like the fetch endpoints.

use std::collections::HashMap;

use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use ts_rs::TS;
use utils::response::ApiResponse;

use super::fetch::authenticate;
use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct UpdateCsrfRequest {
    pub csrf_token: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct UpdateCookiesRequest {
    pub cookies: HashMap<String, String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct UpdateGeminiRequest {
    pub credentials: Value,
    #[serde(default)]
    pub api_key: Option<String>,
}

async fn update_csrf(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateCsrfRequest>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let key = authenticate(&state, &headers, req.api_key.as_deref()).await?;
    state.registry.update_csrf(key.user_id, &req.csrf_token).await?;
    Ok(Json(ApiResponse::new(json!({ "updated": true }))))
}

async fn update_cookies(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateCookiesRequest>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let key = authenticate(&state, &headers, req.api_key.as_deref()).await?;
    let count = req.cookies.len();
    state.registry.update_cookies(key.user_id, req.cookies).await?;
    Ok(Json(ApiResponse::new(json!({ "updated": true, "cookie_count": count }))))
}

async fn update_gemini(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateGeminiRequest>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let key = authenticate(&state, &headers, req.api_key.as_deref()).await?;
    state.registry.update_gemini(key.user_id, req.credentials).await?;
    Ok(Json(ApiResponse::new(json!({ "updated": true }))))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/credentials/csrf", post(update_csrf))
        .route("/credentials/cookies", post(update_cookies))
        .route("/credentials/gemini", post(update_gemini))
}
