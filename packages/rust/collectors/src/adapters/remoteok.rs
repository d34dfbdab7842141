//! RemoteOK adapter. The API returns every open posting in one array, so
//! results are filtered by the role's words locally.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use jobcompass_shared::{
    CanonicalRecord, JobCompassError, Result, Source, SourceConfig, WorkMode, record_id,
};

use super::{SearchQuery, SourceAdapter, adapter_parts, de_opt_id, decode_items};
use crate::http::HttpClient;
use crate::normalize::{description_text, hashed_external_id, parse_location, parse_posted_date};
use crate::throttle::Throttle;

const DEFAULT_BASE_URL: &str = "https://remoteok.com/api";

#[derive(Debug, Deserialize)]
struct RemoteOkJob {
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    position: Option<String>,
    company: Option<String>,
    location: Option<String>,
    description: Option<String>,
    date: Option<String>,
    url: Option<String>,
    apply_url: Option<String>,
}

/// Reads the RemoteOK public feed.
pub struct RemoteOkAdapter {
    http: HttpClient,
    throttle: Throttle,
    base_url: String,
}

impl RemoteOkAdapter {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let (http, throttle) = adapter_parts(Source::RemoteOk, config)?;
        Ok(Self {
            http,
            throttle,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }
}

#[async_trait]
impl SourceAdapter for RemoteOkAdapter {
    fn source(&self) -> Source {
        Source::RemoteOk
    }

    fn page_limit(&self) -> Option<u32> {
        Some(1)
    }

    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<Vec<CanonicalRecord>> {
        if page > 1 {
            return Ok(Vec::new());
        }
        let body = self
            .throttle
            .call(|| {
                self.http.get_text(
                    Source::RemoteOk,
                    &self.base_url,
                    &[],
                    &[("Accept", "application/json")],
                )
            })
            .await?;

        parse_response(&body, &query.role, Utc::now().date_naive())
    }
}

pub(crate) fn parse_response(body: &str, role: &str, today: NaiveDate) -> Result<Vec<CanonicalRecord>> {
    let items: Vec<serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| JobCompassError::parse(format!("remoteok response: {e}")))?;
    let role_words = words(role);

    // The first element is the API's legal notice.
    let postings = items.into_iter().skip(1).collect();
    Ok(decode_items::<RemoteOkJob>(Source::RemoteOk, postings)
        .into_iter()
        // Every word of the role must appear in the title.
        .filter(|job| {
            job.position
                .as_deref()
                .is_some_and(|title| role_words.is_subset(&words(title)))
        })
        .filter_map(|job| to_record(job, today))
        .collect())
}

fn to_record(job: RemoteOkJob, today: NaiveDate) -> Option<CanonicalRecord> {
    let title = job.position.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    let url = job.url.or(job.apply_url).unwrap_or_default();
    let external_id = job.id.unwrap_or_else(|| hashed_external_id(&url));
    let (city, province) = remote_location(job.location.as_deref().unwrap_or_default());

    Some(CanonicalRecord {
        source: Source::RemoteOk,
        job_id: record_id(Source::RemoteOk, &external_id),
        title,
        company: job
            .company
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        city,
        province,
        description: description_text(&job.description.unwrap_or_default()),
        // RemoteOK salary fields are self-reported USD estimates.
        salary_min: None,
        salary_max: None,
        remote_type: Some(WorkMode::Remote),
        posted_date: parse_posted_date(job.date.as_deref(), today),
        url,
    })
}

/// Canadian locations are kept; everything else is plain "Remote".
fn remote_location(location: &str) -> (String, String) {
    if location.to_lowercase().contains("canada") {
        let (city, province) = parse_location(location, "Remote");
        if !city.eq_ignore_ascii_case("canada") {
            return (city, province);
        }
    }
    ("Remote".to_string(), String::new())
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}
