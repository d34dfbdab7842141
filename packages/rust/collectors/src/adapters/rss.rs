//! RSS feed adapters for Indeed and Workopolis.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use feed_rs::model::Entry;
use tracing::debug;

use jobcompass_shared::regions::province_for_city;
use jobcompass_shared::{CanonicalRecord, JobCompassError, Result, Source, SourceConfig, record_id};

use super::{SearchQuery, SourceAdapter, adapter_parts};
use crate::http::HttpClient;
use crate::normalize::{collapse_whitespace, description_text, hashed_external_id, parse_location};
use crate::throttle::Throttle;

/// Which RSS feed an [`RssAdapter`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RssFeed {
    Indeed,
    Workopolis,
}

impl RssFeed {
    fn source(self) -> Source {
        match self {
            RssFeed::Indeed => Source::Indeed,
            RssFeed::Workopolis => Source::Workopolis,
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            RssFeed::Indeed => "https://ca.indeed.com/rss",
            RssFeed::Workopolis => "https://www.workopolis.com/rss/search/cs",
        }
    }

    /// Query parameters for one search, or `None` when the feed cannot
    /// express the locality.
    fn params(self, query: &SearchQuery) -> Option<Vec<(&'static str, String)>> {
        match self {
            RssFeed::Indeed => Some(vec![
                ("q", query.role.clone()),
                ("l", format!("{}, Canada", query.city)),
                ("fromage", "30".to_string()),
                ("limit", "50".to_string()),
            ]),
            RssFeed::Workopolis => {
                let province = province_for_city(&query.city)?;
                Some(vec![
                    ("as", format!("ca-{}", province.to_lowercase())),
                    ("keywords", query.role.clone()),
                    ("jt", "fulltime".to_string()),
                    ("et", "30d".to_string()),
                ])
            }
        }
    }
}

/// Reads one job-board RSS feed. Feeds are not paged.
pub struct RssAdapter {
    feed: RssFeed,
    http: HttpClient,
    throttle: Throttle,
    base_url: String,
}

impl RssAdapter {
    pub fn new(feed: RssFeed, config: &SourceConfig) -> Result<Self> {
        let (http, throttle) = adapter_parts(feed.source(), config)?;
        Ok(Self {
            feed,
            http,
            throttle,
            base_url: feed.default_base_url().to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn source(&self) -> Source {
        self.feed.source()
    }

    fn page_limit(&self) -> Option<u32> {
        Some(1)
    }

    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<Vec<CanonicalRecord>> {
        if page > 1 {
            return Ok(Vec::new());
        }
        let Some(params) = self.feed.params(query) else {
            debug!(source = %self.source(), city = %query.city, "no feed region for city");
            return Ok(Vec::new());
        };

        let source = self.source();
        let bytes = self
            .throttle
            .call(|| {
                self.http.get_bytes(
                    source,
                    &self.base_url,
                    &params,
                    &[("Accept", "application/rss+xml, application/xml")],
                )
            })
            .await?;

        parse_feed(self.feed, &bytes, &query.city, Utc::now().date_naive())
    }
}

pub(crate) fn parse_feed(
    feed: RssFeed,
    bytes: &[u8],
    fallback_city: &str,
    today: NaiveDate,
) -> Result<Vec<CanonicalRecord>> {
    let parsed = feed_rs::parser::parse(bytes)
        .map_err(|e| JobCompassError::parse(format!("{} feed: {e}", feed.source())))?;

    Ok(parsed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let record = to_record(feed, entry, fallback_city, today);
            if record.is_none() {
                debug!(source = %feed.source(), "skipping feed entry without title or link");
            }
            record
        })
        .collect())
}

fn to_record(feed: RssFeed, entry: Entry, fallback_city: &str, today: NaiveDate) -> Option<CanonicalRecord> {
    let source = feed.source();
    let link = entry.links.first().map(|l| l.href.trim().to_string())?;
    let raw_title = entry
        .title
        .map(|t| collapse_whitespace(&t.content))
        .filter(|t| !t.is_empty())?;

    let author = entry
        .authors
        .first()
        .map(|p| p.name.trim().to_string())
        .filter(|n| !n.is_empty());

    let (title, company, location) = match feed {
        RssFeed::Indeed => split_indeed_title(&raw_title),
        RssFeed::Workopolis => (raw_title, author.clone(), None),
    };
    let company = company.or(author).unwrap_or_else(|| "Unknown".to_string());
    let (city, province) = parse_location(location.as_deref().unwrap_or(fallback_city), fallback_city);

    let summary = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .unwrap_or_default();
    let posted_date = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.date_naive())
        .unwrap_or(today);

    Some(
        CanonicalRecord {
            source,
            job_id: record_id(source, &hashed_external_id(&link)),
            title,
            company,
            city,
            province,
            description: description_text(&summary),
            salary_min: None,
            salary_max: None,
            remote_type: None,
            posted_date,
            url: link,
        }
        .with_repaired_compensation(),
    )
}

/// Indeed titles read `"Title - Company - City, PR"`; the title itself may
/// contain dashes.
fn split_indeed_title(raw: &str) -> (String, Option<String>, Option<String>) {
    let parts: Vec<&str> = raw.split(" - ").map(str::trim).collect();
    match parts.len() {
        0 | 1 => (raw.to_string(), None, None),
        2 => (parts[0].to_string(), Some(parts[1].to_string()), None),
        n => (
            parts[..n - 2].join(" - "),
            Some(parts[n - 2].to_string()),
            Some(parts[n - 1].to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{fast_config, load_fixture};
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    #[test]
    fn splits_indeed_titles() {
        assert_eq!(
            split_indeed_title("Data Analyst - Maple Inc - Toronto, ON"),
            (
                "Data Analyst".to_string(),
                Some("Maple Inc".to_string()),
                Some("Toronto, ON".to_string())
            )
        );
        assert_eq!(
            split_indeed_title("Analyst - Data - Acme - Ottawa, ON").0,
            "Analyst - Data"
        );
        assert_eq!(split_indeed_title("Data Analyst").1, None);
    }

    #[test]
    fn parses_indeed_fixture() {
        let xml = load_fixture("rss/indeed.xml");
        let records = parse_feed(RssFeed::Indeed, xml.as_bytes(), "Toronto", today()).expect("parse");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.title, "Data Analyst");
        assert_eq!(first.company, "Harbourfront Health");
        assert_eq!(first.city, "Toronto");
        assert_eq!(first.province, "ON");
        assert_eq!(
            first.posted_date,
            NaiveDate::from_ymd_opt(2026, 10, 13).expect("date")
        );
        assert_eq!(
            first.job_id,
            record_id(
                Source::Indeed,
                &hashed_external_id("https://ca.indeed.com/viewjob?jk=7f3a2c9e1b0d4a55")
            )
        );
        assert!(first.description.contains("SQL"));
        assert!(!first.description.contains('<'));

        let second = &records[1];
        assert_eq!(second.city, "Markham");
        assert_eq!(second.province, "ON");
    }

    #[test]
    fn malformed_feed_is_a_parse_error() {
        let err = parse_feed(RssFeed::Indeed, b"not a feed", "Toronto", today()).unwrap_err();
        assert!(matches!(err, JobCompassError::Parse { .. }));
    }

    #[test]
    fn workopolis_params_need_a_known_city() {
        let params = RssFeed::Workopolis
            .params(&SearchQuery::new("Calgary", "data analyst"))
            .expect("known city");
        assert!(params.contains(&("as", "ca-ab".to_string())));
        assert!(
            RssFeed::Workopolis
                .params(&SearchQuery::new("Smallville", "data analyst"))
                .is_none()
        );
    }

    #[tokio::test]
    async fn unknown_workopolis_city_yields_nothing_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = RssAdapter::new(RssFeed::Workopolis, &fast_config())
            .expect("adapter")
            .with_base_url(&server.uri())
            .expect("base url");
        let harvest = adapter.fetch(&SearchQuery::new("Smallville", "analyst"), 2).await;
        assert!(harvest.records.is_empty());
        assert!(harvest.error.is_none());
    }

    #[tokio::test]
    async fn fetches_indeed_feed_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "data analyst"))
            .and(query_param("l", "Toronto, Canada"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/rss+xml")
                    .set_body_string(load_fixture("rss/indeed.xml")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adapter = RssAdapter::new(RssFeed::Indeed, &fast_config())
            .expect("adapter")
            .with_base_url(&server.uri())
            .expect("base url");
        let harvest = adapter.fetch(&SearchQuery::new("Toronto", "data analyst"), 3).await;
        assert_eq!(harvest.records.len(), 2);
        assert!(harvest.records.iter().all(|r| r.source == Source::Indeed));
    }
}
