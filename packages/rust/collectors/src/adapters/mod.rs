//! Source adapter trait and the built-in adapters.
//!
//! Each adapter translates one external source into [`CanonicalRecord`]s.
//! Paging is sequential per (city, role) query; the rate limiter and retry
//! policy live inside each adapter instance.

mod adzuna;
mod jobbank;
mod jsearch;
mod remoteok;
mod rss;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use jobcompass_shared::{CanonicalRecord, JobCompassError, Result, Source, SourceConfig};

use crate::http::HttpClient;
use crate::throttle::{RetryPolicy, Throttle};

pub use adzuna::AdzunaAdapter;
pub use jobbank::JobBankAdapter;
pub use jsearch::JSearchAdapter;
pub use remoteok::RemoteOkAdapter;
pub use rss::{RssAdapter, RssFeed};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One (city, role) search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub city: String,
    pub role: String,
}

impl SearchQuery {
    pub fn new(city: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            role: role.into(),
        }
    }
}

/// Outcome of paging one query through an adapter.
#[derive(Debug, Default)]
pub struct Harvest {
    /// Records gathered before paging stopped.
    pub records: Vec<CanonicalRecord>,
    /// Pages that returned at least one record.
    pub pages_fetched: u32,
    /// The failure that stopped paging early, after retries.
    pub error: Option<JobCompassError>,
}

impl Harvest {
    /// Whether the source should be skipped for the rest of the run.
    pub fn source_disabled(&self) -> bool {
        self.error.as_ref().is_some_and(JobCompassError::disables_source)
    }
}

/// A job-posting source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter reads.
    fn source(&self) -> Source;

    /// Upper bound on pages regardless of the caller's `max_pages`.
    fn page_limit(&self) -> Option<u32> {
        None
    }

    /// Fetch one page. `Ok(vec![])` means the query is exhausted.
    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<Vec<CanonicalRecord>>;

    /// Page through `query` sequentially until exhausted, `max_pages`, or an
    /// error. Never fails: an error is reported alongside what was gathered.
    async fn fetch(&self, query: &SearchQuery, max_pages: u32) -> Harvest {
        let source = self.source();
        let last_page = self
            .page_limit()
            .map_or(max_pages, |limit| limit.min(max_pages));
        let mut harvest = Harvest::default();

        for page in 1..=last_page {
            match self.fetch_page(query, page).await {
                Ok(records) if records.is_empty() => {
                    debug!(%source, page, city = %query.city, role = %query.role, "source exhausted");
                    break;
                }
                Ok(records) => {
                    debug!(%source, page, count = records.len(), "page fetched");
                    harvest.pages_fetched += 1;
                    harvest.records.extend(records);
                }
                Err(e) => {
                    warn!(%source, page, city = %query.city, role = %query.role, error = %e, "fetch failed, keeping partial results");
                    harvest.error = Some(e);
                    break;
                }
            }
        }

        info!(
            %source,
            city = %query.city,
            role = %query.role,
            records = harvest.records.len(),
            pages = harvest.pages_fetched,
            "query harvested"
        );
        harvest
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Build one adapter per requested source.
///
/// Sources with missing credentials are still built; their first fetch
/// fails with an auth error so the run reports and skips them.
pub fn build_adapters(
    config: &SourceConfig,
    sources: &[Source],
) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(sources.len());
    for source in sources {
        let adapter: Arc<dyn SourceAdapter> = match source {
            Source::JobBank => Arc::new(JobBankAdapter::new(config)?),
            Source::JSearch => Arc::new(JSearchAdapter::new(config)?),
            Source::Adzuna => Arc::new(AdzunaAdapter::new(config)?),
            Source::RemoteOk => Arc::new(RemoteOkAdapter::new(config)?),
            Source::Indeed => Arc::new(RssAdapter::new(RssFeed::Indeed, config)?),
            Source::Workopolis => Arc::new(RssAdapter::new(RssFeed::Workopolis, config)?),
        };
        adapters.push(adapter);
    }
    Ok(adapters)
}

/// HTTP client and throttle shared by every adapter constructor.
pub(crate) fn adapter_parts(
    source: Source,
    config: &SourceConfig,
) -> Result<(HttpClient, Throttle)> {
    let http = HttpClient::new(&config.user_agent, config.request_timeout)?;
    let interval = match source {
        Source::JobBank => config.jobbank_min_interval,
        _ => config.api_min_interval,
    };
    let throttle = Throttle::new(source, interval, RetryPolicy::new(&config.retry));
    Ok((http, throttle))
}

/// Accept an id that some APIs send as a string and others as a number.
pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Decode array items one at a time so a single malformed posting does not
/// sink the page.
pub(crate) fn decode_items<T: DeserializeOwned>(
    source: Source,
    items: Vec<serde_json::Value>,
) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(source = %source, error = %e, "skipping malformed item");
                None
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use jobcompass_shared::{RetryConfig, SourceConfig};

    /// Source config with no politeness delays, for mock-server tests.
    pub fn fast_config() -> SourceConfig {
        SourceConfig {
            user_agent: "JobCompass/test".into(),
            request_timeout: Duration::from_secs(5),
            jobbank_min_interval: Duration::ZERO,
            api_min_interval: Duration::ZERO,
            retry: RetryConfig {
                max_attempts: 2,
                backoff_base: Duration::from_millis(5),
                backoff_ceiling: Duration::from_millis(10),
            },
            rapidapi_key: Some("test-key".into()),
            adzuna_credentials: Some(("test-id".into(), "test-key".into())),
        }
    }

    pub fn load_fixture(relative: &str) -> String {
        let path = format!("../../../fixtures/{relative}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }
}
