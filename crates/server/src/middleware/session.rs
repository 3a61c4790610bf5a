//! Gateway session tokens.
//!
//! The OAuth flow that signs these lives outside the core; the server only
//! verifies them. Subject is the user id; used by the key-management routes
//! and the WebSocket handshake.

use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
}

pub fn verify_session_token(secret: &str, token: &str) -> Result<Uuid, ApiError> {
    let data = jsonwebtoken::decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    Uuid::parse_str(&data.claims.sub).map_err(|_| ApiError::Unauthorized)
}

/// Sign a session token. The login flow is the production caller; tests use
/// it to mint fixtures.
pub fn issue_session_token(
    secret: &str,
    user_id: Uuid,
    ttl: std::time::Duration,
) -> Result<String, ApiError> {
    let exp = chrono::Utc::now().timestamp() as usize + ttl.as_secs() as usize;
    let claims = SessionClaims { sub: user_id.to_string(), exp };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign session token: {}", e)))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub fn require_session(secret: &str, headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    verify_session_token(secret, token)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn issued_tokens_verify_and_carry_the_subject() {
        let user_id = Uuid::new_v4();
        let token = issue_session_token("secret", user_id, Duration::from_secs(60)).unwrap();
        assert_eq!(verify_session_token("secret", &token).unwrap(), user_id);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token =
            issue_session_token("secret", Uuid::new_v4(), Duration::from_secs(60)).unwrap();
        assert!(matches!(
            verify_session_token("other", &token),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn bearer_header_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        let mut basic = HeaderMap::new();
        basic.insert("authorization", "Basic dXNlcg==".parse().unwrap());
        assert_eq!(bearer_token(&basic), None);
    }
}
