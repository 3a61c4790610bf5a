use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use serde_json::{Value, json};
use ts_rs::TS;
use utils::version::VersionInfo;

use crate::AppState;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn version() -> Json<VersionInfo> {
    Json(VersionInfo::current())
}

/// Capability card the extension reads before enabling `server_call=true`.
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct ServerInfo {
    pub edition: String,
    pub channel: String,
    pub server_name: String,
    pub version: &'static str,
    pub is_default_server: bool,
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(ServerInfo {
        edition: state.config.edition.as_str().to_string(),
        channel: state.config.channel.clone(),
        server_name: state.config.server_name.clone(),
        version: utils::version::VERSION,
        is_default_server: state.config.is_default_server,
    })
}

async fn linkedin_config_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "is_configured": state.config.linkedin_oauth_configured() }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version))
        .route("/api/v1/server/info", get(server_info))
        .route("/auth/linkedin/config-status", get(linkedin_config_status))
}
