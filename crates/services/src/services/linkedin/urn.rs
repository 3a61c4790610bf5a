use std::sync::Arc;

use moka::future::Cache;
use thiserror::Error;

use super::normalizer::{find_string_with_prefix, get_path};
use super::transport::LinkedInTransport;

/// Identifier parse failure, also raised for unrecognized post/profile URLs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrnKind {
    Activity,
    UgcPost,
    FsdProfile,
    FsdSocialDetail,
    HighlightedReply,
}

impl UrnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrnKind::Activity => "activity",
            UrnKind::UgcPost => "ugcPost",
            UrnKind::FsdProfile => "fsd_profile",
            UrnKind::FsdSocialDetail => "fsd_socialDetail",
            UrnKind::HighlightedReply => "highlightedReply",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "activity" => Some(UrnKind::Activity),
            "ugcPost" => Some(UrnKind::UgcPost),
            "fsd_profile" => Some(UrnKind::FsdProfile),
            "fsd_socialDetail" => Some(UrnKind::FsdSocialDetail),
            "highlightedReply" => Some(UrnKind::HighlightedReply),
            _ => None,
        }
    }
}

/// A LinkedIn URN, `urn:li:<kind>:<id>`. Only the kinds the gateway actually
/// routes on are representable; anything else fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Urn {
    kind: UrnKind,
    id: String,
}

impl Urn {
    pub fn new(kind: UrnKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let rest = s
            .strip_prefix("urn:li:")
            .ok_or_else(|| ParseError(format!("not a LinkedIn urn: {}", s)))?;
        let (kind_str, id) = rest
            .split_once(':')
            .ok_or_else(|| ParseError(format!("urn missing id segment: {}", s)))?;
        let kind =
            UrnKind::parse(kind_str).ok_or_else(|| ParseError(format!("unknown urn kind: {}", s)))?;
        if id.is_empty() {
            return Err(ParseError(format!("urn missing id segment: {}", s)));
        }
        Ok(Self { kind, id: id.to_string() })
    }

    pub fn kind(&self) -> UrnKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for Urn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "urn:li:{}:{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Error, Clone)]
pub enum ConversionError {
    #[error("lookup request failed: {0}")]
    Lookup(String),
    #[error("response carried no resolvable urn")]
    Missing,
}

const SINGLE_POST_BASE: &str = "https://www.linkedin.com/voyager/api/feed/updates";
const PROFILE_VIEW_BASE: &str = "https://www.linkedin.com/voyager/api/identity/profiles";

/// Resolves activity ids to their ugcPost form. Several Voyager endpoints
/// only accept the ugcPost identity of a post, so the converter fetches the
/// single-post envelope once per activity id and keeps the answer for the
/// lifetime of the process. Concurrent misses for the same id collapse into
/// one upstream request; failures are surfaced but never cached.
pub struct UrnConverter {
    cache: Cache<String, String>,
}

impl UrnConverter {
    pub fn new() -> Self {
        Self { cache: Cache::builder().build() }
    }

    pub async fn to_ugc_post(
        &self,
        transport: &dyn LinkedInTransport,
        activity_id: &str,
    ) -> Result<Urn, ConversionError> {
        let urn_str = self
            .cache
            .try_get_with(activity_id.to_string(), fetch_ugc_post_urn(transport, activity_id))
            .await
            .map_err(|e: Arc<ConversionError>| (*e).clone())?;

        Urn::parse(&urn_str).map_err(|_| ConversionError::Missing)
    }
}

impl Default for UrnConverter {
    fn default() -> Self {
        Self::new()
    }
}

async fn fetch_ugc_post_urn(
    transport: &dyn LinkedInTransport,
    activity_id: &str,
) -> Result<String, ConversionError> {
    let activity_urn = format!("urn:li:activity:{}", activity_id);
    let url = format!("{}/{}", SINGLE_POST_BASE, urlencoding::encode(&activity_urn));

    let envelope = transport
        .get_json(&url)
        .await
        .map_err(|e| ConversionError::Lookup(e.to_string()))?;

    // The minimal envelope carries the ugcPost identity under updateMetadata;
    // fall back to scanning when the shape shifts.
    if let Some(urn) = get_path(&envelope, &["data", "updateMetadata", "urn"])
        .and_then(|v| v.as_str())
        .filter(|s| s.starts_with("urn:li:ugcPost:"))
    {
        return Ok(urn.to_string());
    }

    find_string_with_prefix(&envelope, "urn:li:ugcPost:")
        .map(str::to_string)
        .ok_or(ConversionError::Missing)
}

/// Resolves the `/in/<segment>/` part of a profile URL to the `fsd_profile`
/// id the GraphQL endpoints want. URLs that already carry the raw id skip
/// the network entirely; vanity slugs go through the profileView endpoint
/// with the same cache-forever, single-flight discipline as the URN
/// converter.
pub struct ProfileResolver {
    cache: Cache<String, String>,
}

impl ProfileResolver {
    pub fn new() -> Self {
        Self { cache: Cache::builder().build() }
    }

    pub async fn resolve(
        &self,
        transport: &dyn LinkedInTransport,
        segment: &str,
    ) -> Result<String, ConversionError> {
        // Member ids embedded directly in the URL look like "ACoAAB…".
        if segment.starts_with("ACoAA") {
            return Ok(segment.to_string());
        }

        self.cache
            .try_get_with(segment.to_string(), fetch_profile_id(transport, segment))
            .await
            .map_err(|e: Arc<ConversionError>| (*e).clone())
    }
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self::new()
    }
}

async fn fetch_profile_id(
    transport: &dyn LinkedInTransport,
    vanity: &str,
) -> Result<String, ConversionError> {
    let url = format!("{}/{}/profileView", PROFILE_VIEW_BASE, urlencoding::encode(vanity));

    let envelope = transport
        .get_json(&url)
        .await
        .map_err(|e| ConversionError::Lookup(e.to_string()))?;

    for prefix in ["urn:li:fsd_profile:", "urn:li:fs_profile:"] {
        if let Some(urn) = find_string_with_prefix(&envelope, prefix) {
            let id = &urn[prefix.len()..];
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }

    Err(ConversionError::Missing)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::services::linkedin::FetchError;

    struct StubTransport {
        envelope: serde_json::Value,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubTransport {
        fn new(envelope: serde_json::Value) -> Self {
            Self { envelope, calls: AtomicUsize::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { envelope: json!(null), calls: AtomicUsize::new(0), fail: true }
        }
    }

    #[async_trait::async_trait]
    impl LinkedInTransport for StubTransport {
        async fn get_json(&self, _url: &str) -> Result<serde_json::Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Let a racing second caller reach the cache before we answer.
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if self.fail {
                return Err(FetchError::UpstreamHttp { status: 404 });
            }
            Ok(self.envelope.clone())
        }
    }

    #[test]
    fn urn_round_trip() {
        let urn = Urn::parse("urn:li:activity:7280000000000000001").unwrap();
        assert_eq!(urn.kind(), UrnKind::Activity);
        assert_eq!(urn.id(), "7280000000000000001");
        assert_eq!(urn.to_string(), "urn:li:activity:7280000000000000001");
    }

    #[test]
    fn urn_rejects_foreign_shapes() {
        assert!(Urn::parse("urn:li:unknownKind:1").is_err());
        assert!(Urn::parse("urn:li:activity:").is_err());
        assert!(Urn::parse("https://example.com").is_err());
    }

    #[tokio::test]
    async fn converts_activity_to_ugc_post_and_caches() {
        let transport = StubTransport::new(json!({
            "data": {
                "updateMetadata": { "urn": "urn:li:ugcPost:7280000000000000000" }
            },
            "included": []
        }));
        let converter = UrnConverter::new();

        let first = converter
            .to_ugc_post(&transport, "7280000000000000001")
            .await
            .expect("conversion failed");
        assert_eq!(first.to_string(), "urn:li:ugcPost:7280000000000000000");

        let second = converter
            .to_ugc_post(&transport, "7280000000000000001")
            .await
            .expect("conversion failed");
        assert_eq!(second, first);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_collapse_to_one_request() {
        let transport = StubTransport::new(json!({
            "included": [
                { "updateMetadata": { "urn": "urn:li:ugcPost:42" } }
            ]
        }));
        let converter = UrnConverter::new();

        let (a, b) = tokio::join!(
            converter.to_ugc_post(&transport, "42"),
            converter.to_ugc_post(&transport, "42"),
        );
        assert_eq!(a.unwrap().to_string(), "urn:li:ugcPost:42");
        assert_eq!(b.unwrap().to_string(), "urn:li:ugcPost:42");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_conversions_are_not_cached() {
        let transport = StubTransport::failing();
        let converter = UrnConverter::new();

        assert!(converter.to_ugc_post(&transport, "7").await.is_err());
        assert!(converter.to_ugc_post(&transport, "7").await.is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn raw_profile_ids_skip_the_lookup() {
        let transport = StubTransport::failing();
        let resolver = ProfileResolver::new();

        let id = resolver
            .resolve(&transport, "ACoAABkVEvgB9mkl")
            .await
            .expect("raw id should resolve locally");
        assert_eq!(id, "ACoAABkVEvgB9mkl");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn vanity_slugs_resolve_through_profile_view() {
        let transport = StubTransport::new(json!({
            "included": [
                { "entityUrn": "urn:li:fsd_profile:ACoAABkVEvgB9mkl", "$type": "com.linkedin.voyager.dash.identity.profile.Profile" }
            ]
        }));
        let resolver = ProfileResolver::new();

        let id = resolver.resolve(&transport, "janedoe").await.expect("resolve failed");
        assert_eq!(id, "ACoAABkVEvgB9mkl");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
