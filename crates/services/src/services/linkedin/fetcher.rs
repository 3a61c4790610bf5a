use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::normalizer;
use super::transport::LinkedInTransport;
use super::urls::{PageParams, UrlBuilder};
use super::urn::{UrnConverter, UrnKind};
use super::{Anchor, EndpointKind, FetchError};

/// Backstop against an upstream that hands out pagination tokens forever.
pub const MAX_PAGES: usize = 1000;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_DELAY_MIN_SECONDS: f64 = 2.0;
pub const DEFAULT_DELAY_MAX_SECONDS: f64 = 5.0;

/// One fully validated fetch: what to get, how much of it, and how politely.
/// `count == -1` means everything the endpoint will give us.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub endpoint_kind: EndpointKind,
    pub anchor: Anchor,
    pub count: i64,
    pub page_size: i64,
    pub delay_min_seconds: f64,
    pub delay_max_seconds: f64,
}

impl FetchPlan {
    pub fn new(endpoint_kind: EndpointKind, anchor: Anchor) -> Self {
        Self {
            endpoint_kind,
            anchor,
            count: -1,
            page_size: DEFAULT_PAGE_SIZE,
            delay_min_seconds: DEFAULT_DELAY_MIN_SECONDS,
            delay_max_seconds: DEFAULT_DELAY_MAX_SECONDS,
        }
    }
}

/// Mode-agnostic pagination loop. Pages arrive in order within one run;
/// between pages the loop sleeps a uniform jitter inside the plan's delay
/// window (never before the first page, never after the last).
pub struct FetchOrchestrator {
    builder: UrlBuilder,
    converter: Arc<UrnConverter>,
}

impl FetchOrchestrator {
    pub fn new(builder: UrlBuilder, converter: Arc<UrnConverter>) -> Self {
        Self { builder, converter }
    }

    pub async fn run(
        &self,
        transport: &dyn LinkedInTransport,
        plan: &FetchPlan,
    ) -> Result<Vec<serde_json::Value>, FetchError> {
        let anchor = self.resolve_anchor(transport, plan).await;

        let mut accumulated: Vec<serde_json::Value> = Vec::new();
        let mut start: i64 = 0;
        let mut pagination_token: Option<String> = None;
        let mut pages_fetched: usize = 0;

        loop {
            if pages_fetched >= MAX_PAGES {
                tracing::warn!(
                    "{}: page ceiling of {} reached with {} items; stopping",
                    plan.endpoint_kind,
                    MAX_PAGES,
                    accumulated.len()
                );
                break;
            }

            let params = PageParams {
                start,
                count: plan.page_size,
                pagination_token: pagination_token.clone(),
            };
            let url = self.builder.page_url(plan.endpoint_kind, &anchor, &params)?;

            let envelope = match transport.get_json(&url).await {
                Ok(envelope) => envelope,
                Err(FetchError::UpstreamHttp { status }) if !accumulated.is_empty() => {
                    // Partial success: keep what we already have.
                    tracing::warn!(
                        "{}: upstream returned {} after {} items; returning partial results",
                        plan.endpoint_kind,
                        status,
                        accumulated.len()
                    );
                    break;
                }
                Err(e) => return Err(e),
            };
            pages_fetched += 1;

            let page = normalizer::parse_page(plan.endpoint_kind, &envelope);
            if page.raw_had_error {
                tracing::warn!("{}: unreadable envelope on page {}", plan.endpoint_kind, pages_fetched);
            }
            if page.items.is_empty() {
                break;
            }
            accumulated.extend(page.items);

            if plan.count >= 0 && accumulated.len() as i64 >= plan.count {
                accumulated.truncate(plan.count as usize);
                break;
            }

            let Some(token) = page.pagination_token else {
                break;
            };
            start += plan.page_size;
            pagination_token = Some(token);

            let delay = sample_delay(plan.delay_min_seconds, plan.delay_max_seconds);
            if delay > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
        }

        Ok(accumulated)
    }

    /// Comments and reactions want the ugcPost identity of the post. A
    /// failed conversion is logged and the activity urn used as-is — some
    /// endpoints still accept it.
    async fn resolve_anchor(
        &self,
        transport: &dyn LinkedInTransport,
        plan: &FetchPlan,
    ) -> Anchor {
        let needs_ugc = matches!(
            plan.endpoint_kind,
            EndpointKind::PostComments | EndpointKind::PostReactions
        );
        if let (true, Anchor::Post(urn)) = (needs_ugc, &plan.anchor) {
            if urn.kind() == UrnKind::Activity {
                match self.converter.to_ugc_post(transport, urn.id()).await {
                    Ok(ugc) => return Anchor::Post(ugc),
                    Err(e) => {
                        tracing::warn!(
                            "urn conversion for activity {} failed ({}); proceeding with activity urn",
                            urn.id(),
                            e
                        );
                    }
                }
            }
        }
        plan.anchor.clone()
    }
}

fn sample_delay(min: f64, max: f64) -> f64 {
    if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    }
}
