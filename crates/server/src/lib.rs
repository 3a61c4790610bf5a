use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use db::DBService;
use services::services::credentials::CredentialRegistry;
use services::services::linkedin::{DirectClient, FetchOrchestrator, ProfileResolver};
use services::services::proxy::ProxyRouter;
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub config: Arc<Config>,
    pub registry: Arc<CredentialRegistry>,
    pub proxy: Arc<ProxyRouter>,
    pub orchestrator: Arc<FetchOrchestrator>,
    pub profiles: Arc<ProfileResolver>,
    pub direct: DirectClient,
}

pub fn app(state: AppState) -> Router {
    let cors = if state.config.allow_any_origin() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    routes::router(state).layer(cors)
}
