//! Adzuna Canada search API adapter.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use jobcompass_shared::regions::province_code;
use jobcompass_shared::{CanonicalRecord, JobCompassError, Result, Source, SourceConfig, record_id};

use super::{SearchQuery, SourceAdapter, adapter_parts, de_opt_id, decode_items};
use crate::http::HttpClient;
use crate::normalize::{
    amount, description_text, hashed_external_id, html_to_text, parse_location, parse_posted_date,
};
use crate::throttle::Throttle;

const DEFAULT_BASE_URL: &str = "https://api.adzuna.com/v1/api/jobs/ca/search";
const RESULTS_PER_PAGE: &str = "20";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AdzunaJob {
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    title: Option<String>,
    company: Option<Named>,
    location: Option<AdzunaLocation>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    created: Option<String>,
    description: Option<String>,
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaLocation {
    display_name: Option<String>,
    /// `["Canada", "Ontario", "Toronto", ...]`, broadest first.
    #[serde(default)]
    area: Vec<String>,
}

/// Queries the Adzuna search API. Requires an app id and key.
pub struct AdzunaAdapter {
    http: HttpClient,
    throttle: Throttle,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl AdzunaAdapter {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let (http, throttle) = adapter_parts(Source::Adzuna, config)?;
        Ok(Self {
            http,
            throttle,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: config.adzuna_credentials.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }
}

#[async_trait]
impl SourceAdapter for AdzunaAdapter {
    fn source(&self) -> Source {
        Source::Adzuna
    }

    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<Vec<CanonicalRecord>> {
        let Some((app_id, app_key)) = self.credentials.as_ref() else {
            return Err(JobCompassError::auth(
                Source::Adzuna.as_str(),
                "Adzuna app id/key not configured",
            ));
        };

        let url = format!("{}/{page}", self.base_url);
        let params = [
            ("app_id", app_id.clone()),
            ("app_key", app_key.clone()),
            ("what", query.role.clone()),
            ("where", query.city.clone()),
            ("results_per_page", RESULTS_PER_PAGE.to_string()),
            ("content-type", "application/json".to_string()),
        ];

        let body = self
            .throttle
            .call(|| self.http.get_text(Source::Adzuna, &url, &params, &[]))
            .await?;

        parse_response(&body, &query.city, Utc::now().date_naive())
    }
}

pub(crate) fn parse_response(
    body: &str,
    fallback_city: &str,
    today: NaiveDate,
) -> Result<Vec<CanonicalRecord>> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| JobCompassError::parse(format!("adzuna response: {e}")))?;

    Ok(decode_items::<AdzunaJob>(Source::Adzuna, response.results)
        .into_iter()
        .filter_map(|job| {
            let record = to_record(job, fallback_city, today);
            if record.is_none() {
                debug!("skipping incomplete Adzuna item");
            }
            record
        })
        .collect())
}

fn to_record(job: AdzunaJob, fallback_city: &str, today: NaiveDate) -> Option<CanonicalRecord> {
    // Titles arrive with <strong> highlighting around matched terms.
    let title = job
        .title
        .map(|t| html_to_text(&t))
        .filter(|t| !t.is_empty())?;
    let url = job.redirect_url.unwrap_or_default();
    let external_id = job
        .id
        .unwrap_or_else(|| hashed_external_id(&format!("{title}|{url}")));

    let (display, area) = match job.location {
        Some(loc) => (loc.display_name.unwrap_or_default(), loc.area),
        None => (String::new(), Vec::new()),
    };
    let (mut city, mut province) = parse_location(&display, fallback_city);
    if province.is_empty() {
        if let Some(code) = area.iter().find_map(|a| province_code(a)) {
            province = code.to_string();
        }
    }
    // A province-only display name ("Ontario") is not a city.
    if province_code(&city).is_some() {
        city = area
            .get(2)
            .cloned()
            .unwrap_or_else(|| fallback_city.to_string());
    }

    Some(
        CanonicalRecord {
            source: Source::Adzuna,
            job_id: record_id(Source::Adzuna, &external_id),
            title,
            company: job
                .company
                .and_then(|c| c.display_name)
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            city,
            province,
            description: description_text(&job.description.unwrap_or_default()),
            salary_min: amount(job.salary_min),
            salary_max: amount(job.salary_max),
            remote_type: None,
            posted_date: parse_posted_date(job.created.as_deref(), today),
            url,
        }
        .with_repaired_compensation(),
    )
}
