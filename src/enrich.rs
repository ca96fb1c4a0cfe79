//! Per-phrase enrichment: resolve an article, fetch its pageviews, and map
//! every failure to a terminal prominence outcome.

use std::time::Duration;

use crate::config::RunConfig;
use crate::dataset::{Method, Prominence};
use crate::pageviews;
use crate::resolver;
use crate::wiki::{WikiClient, WikiError};

/// Seam between the scheduler and the network stack. Implementations always
/// return a terminal outcome: per-item failures must not unwind past here.
pub trait Enrich {
    async fn enrich(&self, phrase: &str) -> Prominence;
}

/// The real enricher: Wikipedia search + pageviews, with pacing delays
/// before each outbound call to throttle absolute request rate.
pub struct WikiEnricher {
    client: WikiClient,
    search_delay: Duration,
    pageview_delay: Duration,
}

impl WikiEnricher {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            client: WikiClient::new(config.request_timeout, config.rate_limit_backoff),
            search_delay: config.search_delay,
            pageview_delay: config.pageview_delay,
        }
    }
}

impl Enrich for WikiEnricher {
    async fn enrich(&self, phrase: &str) -> Prominence {
        let resolution = match resolver::resolve(&self.client, phrase, self.search_delay).await {
            Ok(r) => r,
            Err(e) => return outcome_for_error(e),
        };

        let Some(article) = resolution.article else {
            // No article at all: search hit count is the fallback signal.
            return if resolution.totalhits > 0 {
                Prominence::totalhits(resolution.totalhits)
            } else {
                Prominence::zero(Method::NoArticle)
            };
        };

        tokio::time::sleep(self.pageview_delay).await;

        match pageviews::fetch_views(&self.client, &article).await {
            // Zero views still beats a totalhits fallback: the article is
            // the higher-confidence signal.
            Ok(views) => Prominence::pageviews(views, article, resolution.totalhits),
            Err(WikiError::NotFound) => {
                Prominence::zero_for_article(Method::WikiPageviewsNotfound, article)
            }
            Err(e) => outcome_for_error(e),
        }
    }
}

fn outcome_for_error(e: WikiError) -> Prominence {
    let method = match e {
        WikiError::RateLimited | WikiError::Timeout => Method::Timeout,
        WikiError::NotFound | WikiError::Status(_) | WikiError::Transport(_) => Method::ApiError,
    };
    Prominence::zero(method)
}

#[cfg(test)]
impl WikiEnricher {
    fn with_client(client: WikiClient) -> Self {
        Self {
            client,
            search_delay: Duration::ZERO,
            pageview_delay: Duration::ZERO,
        }
    }
}
