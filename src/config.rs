use std::time::Duration;

/// Wikipedia search API endpoint.
pub const SEARCH_API: &str = "https://en.wikipedia.org/w/api.php";

/// Wikimedia pageviews REST endpoint (per-article metrics).
pub const PAGEVIEWS_API: &str = "https://wikimedia.org/api/rest_v1/metrics/pageviews/per-article";

/// Identify ourselves per Wikimedia API etiquette.
pub const USER_AGENT: &str = concat!("wikirank/", env!("CARGO_PKG_VERSION"));

/// Default dataset path when --file is not given.
pub const DEFAULT_DATASET: &str = "phrases.json";

/// Tunables for one enrichment run. Defaults are deliberately conservative:
/// two in-flight requests, sub-second pacing, a single long-backoff retry on
/// rate limiting, and five-minute batch ceilings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Max in-flight resolve/fetch operations at any instant.
    pub concurrency: usize,
    /// Pacing delay before each outbound search call.
    pub search_delay: Duration,
    /// Pacing delay before each outbound pageviews call.
    pub pageview_delay: Duration,
    /// Back-off before the single retry after a 429.
    pub rate_limit_backoff: Duration,
    /// Per-request timeout on every outbound call.
    pub request_timeout: Duration,
    /// Work items per batch.
    pub batch_size: usize,
    /// Wall-clock ceiling for one batch.
    pub batch_timeout: Duration,
    /// Write a progress snapshot every N batches.
    pub checkpoint_every: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            search_delay: Duration::from_millis(500),
            pageview_delay: Duration::from_millis(300),
            rate_limit_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            batch_size: 100,
            batch_timeout: Duration::from_secs(300),
            checkpoint_every: 5,
        }
    }
}

impl RunConfig {
    /// Rough wall-clock estimate for processing `items` work items,
    /// used only for the pre-run confirmation gate.
    pub fn estimated_duration(&self, items: usize) -> Duration {
        if items == 0 {
            return Duration::ZERO;
        }
        // Two paced calls per item, interleaved across the gate.
        let per_item = self.search_delay + self.pageview_delay;
        per_item * items as u32 / self.concurrency.max(1) as u32
    }
}
