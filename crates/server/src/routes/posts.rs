//! Post-scoped fetch endpoints: the feed, and the comments/reactions under
//! a single post.

use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
use serde_json::Value;
use services::services::linkedin::EndpointKind;
use utils::response::ApiResponse;

use super::fetch::{self, FetchRequest};
use crate::{AppState, error::ApiError};

async fn feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FetchRequest>,
) -> Result<Json<ApiResponse<Vec<Value>>>, ApiError> {
    fetch::execute(&state, &headers, &req, EndpointKind::Feed).await
}

async fn comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FetchRequest>,
) -> Result<Json<ApiResponse<Vec<Value>>>, ApiError> {
    fetch::execute(&state, &headers, &req, EndpointKind::PostComments).await
}

async fn reactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FetchRequest>,
) -> Result<Json<ApiResponse<Vec<Value>>>, ApiError> {
    fetch::execute(&state, &headers, &req, EndpointKind::PostReactions).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/feed", post(feed))
        .route("/posts/comments", post(comments))
        .route("/posts/reactions", post(reactions))
}
