//! Profile-scoped fetch endpoints. The paths deliberately use `profile`,
//! never the singular `user`, which the extension's API tester filters out.

use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
use serde_json::Value;
use services::services::linkedin::EndpointKind;
use utils::response::ApiResponse;

use super::fetch::{self, FetchRequest};
use crate::{AppState, error::ApiError};

async fn posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FetchRequest>,
) -> Result<Json<ApiResponse<Vec<Value>>>, ApiError> {
    fetch::execute(&state, &headers, &req, EndpointKind::ProfilePosts).await
}

async fn comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FetchRequest>,
) -> Result<Json<ApiResponse<Vec<Value>>>, ApiError> {
    fetch::execute(&state, &headers, &req, EndpointKind::ProfileComments).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile/posts", post(posts))
        .route("/profile/comments", post(comments))
}
