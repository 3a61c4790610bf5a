use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::urn::{ParseError, Urn, UrnKind};
use super::{Anchor, EndpointKind, FetchError};

pub const GRAPHQL_BASE: &str = "https://www.linkedin.com/voyager/api/graphql";

/// GraphQL query ids. LinkedIn rotates these, so they are configuration
/// rather than constants: the compiled defaults can be overridden per
/// endpoint through `LINKEDIN_QUERY_ID_*` before startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryIds {
    pub post_comments: String,
    pub post_reactions: String,
    pub profile_updates: String,
    pub feed: String,
}

impl Default for QueryIds {
    fn default() -> Self {
        Self {
            post_comments: "voyagerSocialDashComments.1f4a68e5403d6d4b2e9a7a3bb09a4f2d".into(),
            post_reactions: "voyagerSocialDashReactions.d9e2bfc8a9b54d1e8c3f716e5a0d22b4".into(),
            profile_updates: "voyagerFeedDashProfileUpdates.2f30941a6efb8cd59bb0b1c89ea65216".into(),
            feed: "voyagerFeedDashMainFeed.5b8f7e2d94c1a3e6b0d2f4a8c6e19573".into(),
        }
    }
}

impl QueryIds {
    pub fn from_env() -> Self {
        let mut ids = Self::default();
        if let Ok(v) = std::env::var("LINKEDIN_QUERY_ID_POST_COMMENTS") {
            ids.post_comments = v;
        }
        if let Ok(v) = std::env::var("LINKEDIN_QUERY_ID_POST_REACTIONS") {
            ids.post_reactions = v;
        }
        if let Ok(v) = std::env::var("LINKEDIN_QUERY_ID_PROFILE_UPDATES") {
            ids.profile_updates = v;
        }
        if let Ok(v) = std::env::var("LINKEDIN_QUERY_ID_FEED") {
            ids.feed = v;
        }
        ids
    }
}

/// Positioning for one page of a paginated fetch.
#[derive(Debug, Clone, Default)]
pub struct PageParams {
    pub start: i64,
    pub count: i64,
    pub pagination_token: Option<String>,
}

/// Assembles Voyager GraphQL URLs. The `variables=(…)` CSV grammar is
/// literal — its commas and colons are structure, not data — while URN and
/// token values inside it are percent-encoded with an empty safe set, so
/// every `:` in a value becomes `%3A` (and `(`, `)`, `,` become `%28`,
/// `%29`, `%2C` where they occur inside a value). Variable order is fixed
/// per endpoint and observable; do not reorder.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    query_ids: QueryIds,
}

impl UrlBuilder {
    pub fn new(query_ids: QueryIds) -> Self {
        Self { query_ids }
    }

    pub fn page_url(
        &self,
        kind: EndpointKind,
        anchor: &Anchor,
        page: &PageParams,
    ) -> Result<String, FetchError> {
        match (kind, anchor) {
            (EndpointKind::Feed, _) => Ok(self.feed_url(page)),
            (EndpointKind::PostComments, Anchor::Post(urn)) => Ok(self.post_comments_url(urn, page)),
            (EndpointKind::PostReactions, Anchor::Post(urn)) => {
                Ok(self.post_reactions_url(urn, page))
            }
            (EndpointKind::ProfilePosts | EndpointKind::ProfileComments, Anchor::Profile(id)) => {
                Ok(self.profile_updates_url(id, page))
            }
            _ => Err(FetchError::AnchorMismatch { kind }),
        }
    }

    fn feed_url(&self, page: &PageParams) -> String {
        format!(
            "{}?variables=(count:{},startIndex:{})&queryId={}",
            GRAPHQL_BASE, page.count, page.start, self.query_ids.feed
        )
    }

    fn post_comments_url(&self, post: &Urn, page: &PageParams) -> String {
        let social_detail = format!(
            "urn:li:fsd_socialDetail:({post},{post},urn:li:highlightedReply:-)",
            post = post
        );
        format!(
            "{}?variables=(count:{},numReplies:1,socialDetailUrn:{},sortOrder:RELEVANCE,start:{})&queryId={}",
            GRAPHQL_BASE,
            page.count,
            urlencoding::encode(&social_detail),
            page.start,
            self.query_ids.post_comments
        )
    }

    fn post_reactions_url(&self, post: &Urn, page: &PageParams) -> String {
        format!(
            "{}?includeWebMetadata=true&variables=(count:{},start:{},threadUrn:{})&queryId={}",
            GRAPHQL_BASE,
            page.count,
            page.start,
            urlencoding::encode(&post.to_string()),
            self.query_ids.post_reactions
        )
    }

    fn profile_updates_url(&self, profile_id: &str, page: &PageParams) -> String {
        // Assembled by concatenation on purpose: the encoded prefix is part
        // of the wire contract and must never go through a second encode of
        // a pre-formed urn.
        let profile_urn = format!("urn%3Ali%3Afsd_profile%3A{}", profile_id);
        let token_part = page
            .pagination_token
            .as_deref()
            .map(|t| format!(",paginationToken:{}", urlencoding::encode(t)))
            .unwrap_or_default();
        format!(
            "{}?variables=(count:{},start:{},profileUrn:{}{})&queryId={}",
            GRAPHQL_BASE, page.count, page.start, profile_urn, token_part, self.query_ids.profile_updates
        )
    }
}

static POST_URN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"urn:li:(activity|ugcPost):(\d+)").expect("valid regex"));
static POST_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[/_-])(activity|ugcPost)[:-](\d+)").expect("valid regex"));
static PROFILE_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/in/([^/?#]+)").expect("valid regex"));

/// Extracts the post identity out of any LinkedIn post URL shape: a full
/// urn in the path or query, or `activity-<id>` / `activity:<id>` path
/// segments (likewise for ugcPost). Activity forms canonicalize to
/// `urn:li:activity:<id>`.
pub fn parse_post_url(url: &str) -> Result<Urn, ParseError> {
    let captures = POST_URN_RE
        .captures(url)
        .or_else(|| POST_SEGMENT_RE.captures(url))
        .ok_or_else(|| ParseError(format!("no post identifier in url: {}", url)))?;

    let kind = match &captures[1] {
        "activity" => UrnKind::Activity,
        _ => UrnKind::UgcPost,
    };
    Ok(Urn::new(kind, &captures[2]))
}

/// Extracts the `/in/<segment>/` piece of a profile URL — either a vanity
/// slug or a raw member id; resolution to an fsd_profile id happens later.
pub fn parse_profile_url(url: &str) -> Result<String, ParseError> {
    PROFILE_SEGMENT_RE
        .captures(url)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ParseError(format!("no profile segment in url: {}", url)))
}
