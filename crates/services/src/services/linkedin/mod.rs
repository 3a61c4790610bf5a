//! LinkedIn Voyager Access
//!
//! Everything that touches LinkedIn's private GraphQL API: URL assembly,
//! envelope normalization, URN resolution, the direct HTTP client, and the
//! pagination orchestrator. Requests flow through the [`LinkedInTransport`]
//! seam so the same code serves both execution modes (server-side with
//! stored credentials, or proxied through the user's browser extension).

pub mod client;
pub mod fetcher;
pub mod normalizer;
pub mod transport;
pub mod urls;
pub mod urn;

pub use client::DirectClient;
pub use fetcher::{FetchOrchestrator, FetchPlan};
pub use normalizer::PageResult;
pub use transport::{DirectTransport, LinkedInTransport, ProxyTransport};
pub use urls::{QueryIds, UrlBuilder, parse_post_url, parse_profile_url};
pub use urn::{ParseError, ProfileResolver, Urn, UrnConverter, UrnKind};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::services::proxy::router::ProxyError;

/// The fetch operations the gateway exposes. Each kind carries its own
/// GraphQL variable template and response shape; everything else about the
/// fetch pipeline is shared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq, Hash)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Feed,
    PostComments,
    PostReactions,
    ProfilePosts,
    ProfileComments,
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndpointKind::Feed => "feed",
            EndpointKind::PostComments => "post_comments",
            EndpointKind::PostReactions => "post_reactions",
            EndpointKind::ProfilePosts => "profile_posts",
            EndpointKind::ProfileComments => "profile_comments",
        };
        write!(f, "{}", s)
    }
}

/// What a fetch is anchored to, after URL parsing and URN resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    None,
    Post(Urn),
    Profile(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("LinkedIn returned HTTP {status}")]
    UpstreamHttp { status: u16 },
    #[error("network failure talking to LinkedIn: {0}")]
    UpstreamTransport(String),
    #[error(
        "LinkedIn rejected the stored session credentials; refresh them via the extension or retry with server_call=false"
    )]
    AuthStale,
    #[error("no stored credentials available for direct execution")]
    MissingCredentials,
    #[error("no live extension connection for this user")]
    NoProxyConnection,
    #[error("extension did not answer within the proxy timeout")]
    ProxyTimeout,
    #[error("extension connection is not keeping up; try again shortly")]
    ProxyBackpressure,
    #[error("endpoint {kind} cannot be fetched with this anchor")]
    AnchorMismatch { kind: EndpointKind },
}

impl From<ProxyError> for FetchError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::NotConnected | ProxyError::Closed => FetchError::NoProxyConnection,
            ProxyError::Timeout => FetchError::ProxyTimeout,
            ProxyError::Backpressure => FetchError::ProxyBackpressure,
            ProxyError::Extension(e) => FetchError::UpstreamTransport(e),
        }
    }
}
