//! JSearch (RapidAPI) adapter.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use jobcompass_shared::{
    CanonicalRecord, JobCompassError, Result, Source, SourceConfig, WorkMode, record_id,
};

use super::{SearchQuery, SourceAdapter, adapter_parts, de_opt_id, decode_items};
use crate::http::HttpClient;
use crate::normalize::{amount, description_text, hashed_external_id, parse_location, parse_posted_date};
use crate::throttle::Throttle;

const DEFAULT_BASE_URL: &str = "https://jsearch.p.rapidapi.com";
const RAPIDAPI_HOST: &str = "jsearch.p.rapidapi.com";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JSearchJob {
    #[serde(default, deserialize_with = "de_opt_id")]
    job_id: Option<String>,
    job_title: Option<String>,
    employer_name: Option<String>,
    job_city: Option<String>,
    job_state: Option<String>,
    job_description: Option<String>,
    job_min_salary: Option<f64>,
    job_max_salary: Option<f64>,
    #[serde(default)]
    job_is_remote: Option<bool>,
    job_employment_type: Option<String>,
    job_posted_at_datetime_utc: Option<String>,
    job_apply_link: Option<String>,
    job_google_link: Option<String>,
}

/// Queries the JSearch aggregation API. Requires a RapidAPI key.
pub struct JSearchAdapter {
    http: HttpClient,
    throttle: Throttle,
    base_url: String,
    api_key: Option<String>,
}

impl JSearchAdapter {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let (http, throttle) = adapter_parts(Source::JSearch, config)?;
        Ok(Self {
            http,
            throttle,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: config.rapidapi_key.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }
}

#[async_trait]
impl SourceAdapter for JSearchAdapter {
    fn source(&self) -> Source {
        Source::JSearch
    }

    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<Vec<CanonicalRecord>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(JobCompassError::auth(
                Source::JSearch.as_str(),
                "RapidAPI key not configured",
            ));
        };

        let url = format!("{}/search", self.base_url);
        let params = [
            ("query", format!("{} in {}, Canada", query.role, query.city)),
            ("page", page.to_string()),
            ("num_pages", "1".to_string()),
            ("date_posted", "month".to_string()),
        ];
        let headers = [("X-RapidAPI-Key", api_key), ("X-RapidAPI-Host", RAPIDAPI_HOST)];

        let body = self
            .throttle
            .call(|| self.http.get_text(Source::JSearch, &url, &params, &headers))
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
        .map_err(|e| JobCompassError::parse(format!("jsearch response: {e}")))?;

    Ok(decode_items::<JSearchJob>(Source::JSearch, response.data)
        .into_iter()
        .filter_map(|job| {
            let record = to_record(job, fallback_city, today);
            if record.is_none() {
                debug!("skipping incomplete JSearch item");
            }
            record
        })
        .collect())
}

fn to_record(job: JSearchJob, fallback_city: &str, today: NaiveDate) -> Option<CanonicalRecord> {
    let title = job.job_title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    let url = job.job_apply_link.or(job.job_google_link).unwrap_or_default();
    let external_id = job
        .job_id
        .unwrap_or_else(|| hashed_external_id(&format!("{title}|{url}")));

    let location = match (job.job_city.as_deref(), job.job_state.as_deref()) {
        (Some(city), Some(state)) => format!("{city}, {state}"),
        (Some(city), None) => city.to_string(),
        (None, Some(state)) => format!(", {state}"),
        (None, None) => String::new(),
    };
    let (city, province) = parse_location(&location, fallback_city);

    let raw_description = job.job_description.unwrap_or_default();
    let remote_type = detect_work_mode(
        job.job_is_remote.unwrap_or(false),
        job.job_employment_type.as_deref(),
        &raw_description,
    );

    Some(
        CanonicalRecord {
            source: Source::JSearch,
            job_id: record_id(Source::JSearch, &external_id),
            title,
            company: job
                .employer_name
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            city,
            province,
            description: description_text(&raw_description),
            salary_min: amount(job.job_min_salary),
            salary_max: amount(job.job_max_salary),
            remote_type,
            posted_date: parse_posted_date(job.job_posted_at_datetime_utc.as_deref(), today),
            url,
        }
        .with_repaired_compensation(),
    )
}

/// The API flag wins; otherwise look for hybrid wording.
fn detect_work_mode(is_remote: bool, employment_type: Option<&str>, description: &str) -> Option<WorkMode> {
    if is_remote {
        return Some(WorkMode::Remote);
    }
    let employment = employment_type.unwrap_or_default().to_lowercase();
    let description = description.to_lowercase();
    if employment.contains("hybrid") || description.contains("hybrid") {
        Some(WorkMode::Hybrid)
    } else {
        None
    }
}
