//! HTTP collaborators: the Wikipedia search API and the Wikimedia
//! pageviews REST API.
//!
//! Every outbound call carries the crate user agent and the per-request
//! timeout. A 429 gets exactly one retry after a long fixed pause; a second
//! 429 surfaces as [`WikiError::RateLimited`] and the caller decides what
//! terminal outcome the affected item gets.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{PAGEVIEWS_API, SEARCH_API, USER_AGENT};

/// Failure taxonomy at the API seam. Nothing here escapes the enrichment
/// layer; each variant maps to a terminal per-item outcome.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("rate limited (retry exhausted)")]
    RateLimited,
    #[error("no data for article or date range")]
    NotFound,
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for WikiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WikiError::Timeout
        } else {
            WikiError::Transport(e.to_string())
        }
    }
}

/// Candidate titles plus the informational total-hit count for one search.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub titles: Vec<String>,
    pub totalhits: u64,
}

#[derive(Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    query: SearchBody,
}

#[derive(Deserialize, Default)]
struct SearchBody {
    #[serde(default)]
    searchinfo: SearchInfo,
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize, Default)]
struct SearchInfo {
    #[serde(default)]
    totalhits: u64,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize, Default)]
struct PageviewsResponse {
    #[serde(default)]
    items: Vec<MonthlyViews>,
}

/// One monthly pageviews entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyViews {
    pub views: u64,
}

/// Thin client over the two Wikimedia APIs.
pub struct WikiClient {
    http: reqwest::Client,
    rate_limit_backoff: Duration,
    search_api: String,
    pageviews_api: String,
}

impl WikiClient {
    pub fn new(request_timeout: Duration, rate_limit_backoff: Duration) -> Self {
        Self::build(
            SEARCH_API.to_string(),
            PAGEVIEWS_API.to_string(),
            request_timeout,
            rate_limit_backoff,
        )
    }

    #[cfg(test)]
    pub(crate) fn with_endpoints(
        search_api: String,
        pageviews_api: String,
        request_timeout: Duration,
        rate_limit_backoff: Duration,
    ) -> Self {
        Self::build(search_api, pageviews_api, request_timeout, rate_limit_backoff)
    }

    fn build(
        search_api: String,
        pageviews_api: String,
        request_timeout: Duration,
        rate_limit_backoff: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            rate_limit_backoff,
            search_api,
            pageviews_api,
        }
    }

    /// Full-text search. `exact` wraps the term in quotes for a stricter
    /// exact-phrase pass.
    pub async fn search(
        &self,
        term: &str,
        exact: bool,
        limit: usize,
    ) -> Result<SearchOutcome, WikiError> {
        let srsearch = if exact {
            format!("\"{}\"", term)
        } else {
            term.to_string()
        };
        let srlimit = limit.to_string();
        let params = [
            ("action", "query"),
            ("list", "search"),
            ("srsearch", srsearch.as_str()),
            ("format", "json"),
            ("srlimit", srlimit.as_str()),
            ("srprop", ""),
        ];

        let req = self.http.get(self.search_api.as_str()).query(&params);
        let resp = self.send_with_retry(req).await?;
        let body: SearchResponse = resp.json().await?;

        Ok(SearchOutcome {
            titles: body.query.search.into_iter().map(|h| h.title).collect(),
            totalhits: body.query.searchinfo.totalhits,
        })
    }

    /// Monthly pageviews entries for an article over `start..end`
    /// (`YYYYMM01`/`YYYYMMDD`). A 404 means the article or range has no
    /// data and surfaces as [`WikiError::NotFound`].
    pub async fn pageviews(
        &self,
        article: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<MonthlyViews>, WikiError> {
        // The REST API addresses articles with underscores; the title goes
        // into a single (percent-encoded) path segment.
        let title = article.replace(' ', "_");
        let mut url = reqwest::Url::parse(&self.pageviews_api)
            .map_err(|e| WikiError::Transport(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| WikiError::Transport("cannot-be-a-base pageviews URL".into()))?
            .extend([
                "en.wikipedia.org",
                "all-access",
                "all-agents",
                title.as_str(),
                "monthly",
                start,
                end,
            ]);

        let resp = self.send_with_retry(self.http.get(url)).await?;
        let body: PageviewsResponse = resp.json().await?;
        Ok(body.items)
    }

    /// Cheap connectivity probe used before a long run.
    pub async fn probe(&self) -> Result<(), WikiError> {
        self.search("test", false, 1).await.map(|_| ())
    }

    /// Send a request, pausing and retrying exactly once on a 429. Any
    /// further 429 is a hard `RateLimited`; other non-2xx statuses map to
    /// their own variants.
    async fn send_with_retry(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, WikiError> {
        let retry = req.try_clone();
        let resp = req.send().await?;
        if resp.status() != StatusCode::TOO_MANY_REQUESTS {
            return check_status(resp);
        }

        tokio::time::sleep(self.rate_limit_backoff).await;

        let retry = retry.ok_or_else(|| WikiError::Transport("request not retryable".into()))?;
        let resp = retry.send().await?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(WikiError::RateLimited);
        }
        check_status(resp)
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, WikiError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(WikiError::NotFound);
    }
    if !status.is_success() {
        return Err(WikiError::Status(status.as_u16()));
    }
    Ok(resp)
}
