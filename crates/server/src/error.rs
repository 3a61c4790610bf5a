use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::api_key::ApiKeyError;
use db::models::user::UserError;
use services::services::credentials::CredentialError;
use services::services::linkedin::{FetchError, ParseError};
use thiserror::Error;
use utils::response::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key missing, unknown, or revoked")]
    Unauthorized,
    #[error("server-side execution is not available on this edition")]
    ServerExecutionDisabled,
    #[error("no live extension connection for this user")]
    NoProxyConnection,
    #[error("{0}")]
    ValidationFailed(String),
    #[error("{0}")]
    Parse(String),
    #[error("extension did not answer within the proxy timeout")]
    ProxyTimeout,
    #[error("extension connection is not keeping up; try again shortly")]
    ProxyBackpressure,
    #[error("LinkedIn returned HTTP {0}")]
    UpstreamHttp(u16),
    #[error("network failure talking to LinkedIn: {0}")]
    UpstreamTransport(String),
    #[error(
        "LinkedIn rejected the stored session credentials; refresh them via the extension or retry with server_call=false"
    )]
    AuthStale,
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Machine-readable error kind for the response body. The extension
    /// switches on these, so they are part of the wire contract.
    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "Unauthorized",
            ApiError::ServerExecutionDisabled => "ServerExecutionDisabled",
            ApiError::NoProxyConnection => "NoProxyConnection",
            ApiError::ValidationFailed(_) => "ValidationFailed",
            ApiError::Parse(_) => "ParseError",
            ApiError::ProxyTimeout => "ProxyTimeout",
            ApiError::ProxyBackpressure => "ProxyBackpressure",
            ApiError::UpstreamHttp(_) => "UpstreamHttpError",
            ApiError::UpstreamTransport(_) => "UpstreamTransportError",
            ApiError::AuthStale => "AuthStale",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Database(_) | ApiError::Internal(_) => "Internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ServerExecutionDisabled => StatusCode::FORBIDDEN,
            ApiError::NoProxyConnection => StatusCode::NOT_FOUND,
            ApiError::ValidationFailed(_) | ApiError::Parse(_) => StatusCode::BAD_REQUEST,
            ApiError::ProxyTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ProxyBackpressure => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UpstreamHttp(_)
            | ApiError::UpstreamTransport(_)
            | ApiError::AuthStale => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::UpstreamHttp { status } => ApiError::UpstreamHttp(status),
            FetchError::UpstreamTransport(msg) => ApiError::UpstreamTransport(msg),
            FetchError::AuthStale | FetchError::MissingCredentials => ApiError::AuthStale,
            FetchError::NoProxyConnection => ApiError::NoProxyConnection,
            FetchError::ProxyTimeout => ApiError::ProxyTimeout,
            FetchError::ProxyBackpressure => ApiError::ProxyBackpressure,
            FetchError::AnchorMismatch { kind } => {
                ApiError::Internal(format!("anchor mismatch for {}", kind))
            }
        }
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        ApiError::Parse(err.0)
    }
}

impl From<ApiKeyError> for ApiError {
    fn from(err: ApiKeyError) -> Self {
        match err {
            ApiKeyError::Database(e) => ApiError::Database(e),
            ApiKeyError::NotFound => ApiError::NotFound("API key not found".into()),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Database(e) => ApiError::Database(e),
            UserError::NotFound => ApiError::NotFound("User not found".into()),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Database(e) => e.into(),
            // An authenticated caller without an active key is a revocation
            // race; treat it the same as a bad key.
            CredentialError::NoActiveKey => ApiError::Unauthorized,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = ErrorBody::new(self.to_string(), self.code());
        (status, Json(body)).into_response()
    }
}
