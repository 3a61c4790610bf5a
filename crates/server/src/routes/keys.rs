//! API-key management for the extension dashboard. Gated by a gateway
//! session token, not by an API key — a fresh install has no key yet.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use db::models::api_key::ApiKey;

use crate::middleware::session::require_session;
use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct GenerateKeyRequest {
    pub instance_id: String,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub browser_info: Option<String>,
}

/// The only response that ever carries the plaintext key.
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct GeneratedKeyResponse {
    pub api_key: String,
    pub record: ApiKey,
}

async fn generate_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateKeyRequest>,
) -> Result<Json<ApiResponse<GeneratedKeyResponse>>, ApiError> {
    let user_id = require_session(&state.config.jwt_secret, &headers)?;

    let generated = state
        .registry
        .generate_key(user_id, &req.instance_id, req.instance_name, req.browser_info)
        .await?;

    Ok(Json(ApiResponse::new(GeneratedKeyResponse {
        api_key: generated.plaintext,
        record: generated.record,
    })))
}

async fn list_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<ApiKey>>>, ApiError> {
    let user_id = require_session(&state.config.jwt_secret, &headers)?;
    let keys = state.registry.list_keys(user_id).await?;
    Ok(Json(ApiResponse::new(keys)))
}

async fn revoke_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = require_session(&state.config.jwt_secret, &headers)?;

    let key = state
        .registry
        .find_key(key_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("API key not found".into()))?;
    if key.user_id != user_id {
        // Do not leak other users' key ids.
        return Err(ApiError::NotFound("API key not found".into()));
    }

    state.registry.delete_key(key_id).await?;
    Ok(Json(ApiResponse::new(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/keys/generate", post(generate_key))
        .route("/keys", get(list_keys))
        .route("/keys/{key_id}", delete(revoke_key))
}
