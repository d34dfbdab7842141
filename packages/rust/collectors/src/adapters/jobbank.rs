//! Job Bank Canada adapter (scraped HTML search results).

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use jobcompass_shared::{
    CanonicalRecord, JobCompassError, Result, Source, SourceConfig, record_id,
};

use super::{SearchQuery, SourceAdapter, adapter_parts};
use crate::http::HttpClient;
use crate::normalize::{
    collapse_whitespace, hashed_external_id, parse_compensation, parse_location,
    parse_posted_date,
};
use crate::throttle::Throttle;

const DEFAULT_BASE_URL: &str = "https://www.jobbank.gc.ca";
const SEARCH_PATH: &str = "/jobsearch/jobsearch";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

static ARTICLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article.resultJobItem").expect("valid selector"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3.noctitle, h2.jobTitle, h3").expect("valid selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static COMPANY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.business, div.company").expect("valid selector"));
static LOCATION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.location, div.location").expect("valid selector"));
static SALARY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.salary, div.salary").expect("valid selector"));
static DATE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time, span.date, li.date").expect("valid selector"));

static POSTING_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)/?$").expect("valid regex"));

/// Scrapes the Job Bank search results page.
pub struct JobBankAdapter {
    http: HttpClient,
    throttle: Throttle,
    base_url: Url,
}

impl JobBankAdapter {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let (http, throttle) = adapter_parts(Source::JobBank, config)?;
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| JobCompassError::config(format!("invalid Job Bank URL: {e}")))?;
        Ok(Self {
            http,
            throttle,
            base_url,
        })
    }

    /// Point the adapter at another host (mock servers in tests).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Url::parse(base_url)
            .map_err(|e| JobCompassError::config(format!("invalid base URL '{base_url}': {e}")))?;
        Ok(self)
    }
}

#[async_trait]
impl SourceAdapter for JobBankAdapter {
    fn source(&self) -> Source {
        Source::JobBank
    }

    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<Vec<CanonicalRecord>> {
        let url = self
            .base_url
            .join(SEARCH_PATH)
            .map_err(|e| JobCompassError::config(format!("invalid search URL: {e}")))?;
        let params = [
            ("searchstring", query.role.clone()),
            ("location", query.city.clone()),
            ("postedDate", "30".to_string()),
            ("sort", "posted".to_string()),
            ("page", page.to_string()),
        ];
        let headers = [("Accept", ACCEPT_HTML), ("Accept-Language", "en-CA,en;q=0.9")];

        let html = self
            .throttle
            .call(|| {
                self.http
                    .get_text(Source::JobBank, url.as_str(), &params, &headers)
            })
            .await?;

        Ok(parse_search_results(
            &html,
            &query.city,
            &self.base_url,
            Utc::now().date_naive(),
        ))
    }
}

/// Parse every result article; articles that fail to parse are skipped.
pub(crate) fn parse_search_results(
    html: &str,
    fallback_city: &str,
    base_url: &Url,
    today: NaiveDate,
) -> Vec<CanonicalRecord> {
    let doc = Html::parse_document(html);
    doc.select(&ARTICLE_SEL)
        .filter_map(|article| {
            let record = parse_article(article, fallback_city, base_url, today);
            if record.is_none() {
                debug!("skipping unparseable Job Bank article");
            }
            record
        })
        .collect()
}

fn parse_article(
    article: ElementRef<'_>,
    fallback_city: &str,
    base_url: &Url,
    today: NaiveDate,
) -> Option<CanonicalRecord> {
    let title_el = article.select(&TITLE_SEL).next()?;
    let link = title_el.select(&LINK_SEL).next()?;
    let title = element_text(link);
    let href = link.value().attr("href")?.trim();
    if title.is_empty() || href.is_empty() {
        return None;
    }

    // Drop session ids and query strings so the id is stable across scrapes.
    let path = href.split([';', '?', '#']).next().unwrap_or(href);
    let external_id = POSTING_ID_RE
        .captures(path)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| hashed_external_id(path));
    let url = base_url.join(path).ok()?;

    let company = first_text(article, &COMPANY_SEL).unwrap_or_else(|| "Unknown".to_string());
    let location = first_text(article, &LOCATION_SEL).unwrap_or_default();
    let (city, province) = parse_location(&location, fallback_city);
    let (salary_min, salary_max) = first_text(article, &SALARY_SEL)
        .map(|text| parse_compensation(&text))
        .unwrap_or((None, None));

    let date_el = article.select(&DATE_SEL).next();
    let date_text = date_el
        .and_then(|el| el.value().attr("datetime").map(str::to_string))
        .or_else(|| date_el.map(element_text));
    let posted_date = parse_posted_date(date_text.as_deref(), today);

    Some(
        CanonicalRecord {
            source: Source::JobBank,
            job_id: record_id(Source::JobBank, &external_id),
            title,
            company,
            city,
            province,
            // Search results carry no description; fetched lazily if ever needed.
            description: String::new(),
            salary_min,
            salary_max,
            remote_type: None,
            posted_date,
            url: url.to_string(),
        }
        .with_repaired_compensation(),
    )
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{fast_config, load_fixture};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    fn base() -> Url {
        Url::parse(DEFAULT_BASE_URL).expect("base url")
    }

    #[test]
    fn parses_fixture_results() {
        let html = load_fixture("html/jobbank_search.html");
        let records = parse_search_results(&html, "Toronto", &base(), today());

        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.job_id, "jobbank_41234567");
        assert_eq!(first.title, "Data Analyst");
        assert_eq!(first.company, "Maple Analytics Inc.");
        assert_eq!(first.city, "Toronto");
        assert_eq!(first.province, "ON");
        assert_eq!(first.salary_min, Some(60_000));
        assert_eq!(first.salary_max, Some(80_000));
        assert_eq!(
            first.posted_date,
            NaiveDate::from_ymd_opt(2026, 10, 14).expect("date")
        );
        assert_eq!(
            first.url,
            "https://www.jobbank.gc.ca/jobsearch/jobposting/41234567"
        );
    }

    #[test]
    fn reversed_salary_is_repaired_and_missing_salary_is_none() {
        let html = load_fixture("html/jobbank_search.html");
        let records = parse_search_results(&html, "Toronto", &base(), today());

        let second = &records[1];
        assert_eq!(second.city, "Mississauga");
        assert_eq!(second.province, "ON");
        assert_eq!(second.salary_min, Some(55_000));
        assert_eq!(second.salary_max, Some(70_000));

        let third = &records[2];
        assert_eq!(third.salary_min, None);
        assert_eq!(third.salary_max, None);
        assert_eq!(third.posted_date, today() - chrono::Duration::days(1));
    }

    #[test]
    fn non_numeric_path_gets_hashed_id() {
        let html = r#"<html><body>
            <article class="resultJobItem">
              <h3 class="noctitle"><a href="/jobsearch/jobposting/abc-def;jsessionid=XYZ">Junior Data Analyst</a></h3>
              <span class="business">Prairie Data Co</span>
              <span class="location">Regina (SK)</span>
            </article>
        </body></html>"#;
        let records = parse_search_results(html, "Regina", &base(), today());
        assert_eq!(records.len(), 1);
        let expected = record_id(
            Source::JobBank,
            &hashed_external_id("/jobsearch/jobposting/abc-def"),
        );
        assert_eq!(records[0].job_id, expected);
        assert_eq!(records[0].province, "SK");
        assert_eq!(records[0].posted_date, today());
    }

    #[test]
    fn article_without_link_is_skipped() {
        let html = r#"<article class="resultJobItem"><h3 class="noctitle">No link</h3></article>"#;
        assert!(parse_search_results(html, "Toronto", &base(), today()).is_empty());
    }

    #[tokio::test]
    async fn fetch_pages_until_empty() {
        let server = MockServer::start().await;
        let page1 = load_fixture("html/jobbank_search.html");

        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("searchstring", "data analyst"))
            .and(query_param("location", "Toronto"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page1))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let adapter = JobBankAdapter::new(&fast_config())
            .expect("adapter")
            .with_base_url(&server.uri())
            .expect("base url");
        let harvest = adapter
            .fetch(&SearchQuery::new("Toronto", "data analyst"), 5)
            .await;

        assert!(harvest.error.is_none());
        assert_eq!(harvest.pages_fetched, 1);
        assert_eq!(harvest.records.len(), 3);
        assert!(harvest.records[0].url.starts_with(&server.uri()));
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = JobBankAdapter::new(&fast_config())
            .expect("adapter")
            .with_base_url(&server.uri())
            .expect("base url");
        let harvest = adapter
            .fetch(&SearchQuery::new("Toronto", "data analyst"), 3)
            .await;

        assert!(harvest.records.is_empty());
        assert!(matches!(
            harvest.error,
            Some(JobCompassError::Http { status: 503, .. })
        ));
    }
}
