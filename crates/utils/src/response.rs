use serde::Serialize;
use ts_rs::TS;

/// Uniform success envelope for the public REST surface.
///
/// Every fetch endpoint answers `{ "data": <payload> }`; error responses are
/// shaped by the server's error type instead and never pass through here.
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Body attached to every error status: a short human message plus the
/// machine-readable error kind the extension switches on.
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct ErrorBody {
    pub detail: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            code: code.into(),
        }
    }
}
