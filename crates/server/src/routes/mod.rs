use axum::Router;

use crate::AppState;

pub mod credentials;
pub mod fetch;
pub mod health;
pub mod keys;
pub mod posts;
pub mod profile;
pub mod ws;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(posts::router())
        .merge(profile::router())
        .merge(credentials::router())
        .merge(keys::router())
        .merge(ws::router())
        .with_state(state)
}
