//! Record quality gate.
//!
//! Checks run in a fixed order and are independent of each other: a record
//! collects every reason that applies, not just the first.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDate, TimeDelta};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use jobcompass_shared::regions::{is_major_city, is_province_code};
use jobcompass_shared::{CanonicalRecord, ValidationConfig};

static LOCALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}][\p{L}\s\-'.]+$").expect("valid regex"));

static SPAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:click here|act now|make \$\s?\d[\d,]*|earn \$\s?\d[\d,]*\s*(?:a|per) (?:day|week)|no experience needed!|limited time offer|100% free|work from home and earn)",
    )
    .expect("valid regex")
});

const TITLE_MIN_CHARS: usize = 3;
const TITLE_MAX_CHARS: usize = 150;
const PLACEHOLDER_ORGS: [&str; 3] = ["unknown", "n/a", "na"];

/// Why a record was rejected. The `as_str` codes are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingRequiredField,
    InvalidRegion,
    InvalidLocality,
    ImplausibleCompensation,
    StaleOrFutureDate,
    InvalidUrl,
    InvalidTitleLength,
    InvalidOrganization,
    SpamPattern,
    IdSourceMismatch,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingRequiredField => "missing_required_field",
            RejectReason::InvalidRegion => "invalid_region",
            RejectReason::InvalidLocality => "invalid_locality",
            RejectReason::ImplausibleCompensation => "implausible_compensation",
            RejectReason::StaleOrFutureDate => "stale_or_future_date",
            RejectReason::InvalidUrl => "invalid_url",
            RejectReason::InvalidTitleLength => "invalid_title_length",
            RejectReason::InvalidOrganization => "invalid_organization",
            RejectReason::SpamPattern => "spam_pattern",
            RejectReason::IdSourceMismatch => "id_source_mismatch",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected record and every reason that applied.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub record: CanonicalRecord,
    pub reasons: Vec<RejectReason>,
}

/// Outcome of [`validate_batch`].
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub accepted: Vec<CanonicalRecord>,
    pub rejected: Vec<Rejection>,
}

impl ValidationReport {
    /// How often each reason occurred across the rejected records.
    pub fn reason_counts(&self) -> BTreeMap<RejectReason, usize> {
        let mut counts = BTreeMap::new();
        for rejection in &self.rejected {
            for reason in &rejection.reasons {
                *counts.entry(*reason).or_insert(0) += 1;
            }
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Single record
// ---------------------------------------------------------------------------

/// Run every check against `record`. Returns `(accepted, reasons)`.
pub fn validate(
    record: &CanonicalRecord,
    config: &ValidationConfig,
    today: NaiveDate,
) -> (bool, Vec<RejectReason>) {
    let mut reasons = Vec::new();

    if missing_required(record) {
        reasons.push(RejectReason::MissingRequiredField);
    }
    if !record.province.is_empty() && !is_province_code(&record.province) {
        reasons.push(RejectReason::InvalidRegion);
    }
    if !record.city.trim().is_empty() && !locality_ok(&record.city) {
        reasons.push(RejectReason::InvalidLocality);
    }
    if !compensation_ok(record.salary_min, record.salary_max, config) {
        reasons.push(RejectReason::ImplausibleCompensation);
    }
    // A window wider than the calendar means no lower bound.
    let oldest = TimeDelta::try_days(config.max_age_days)
        .and_then(|window| today.checked_sub_signed(window));
    if oldest.is_some_and(|oldest| record.posted_date < oldest) || record.posted_date > today {
        reasons.push(RejectReason::StaleOrFutureDate);
    }
    if !record.url.trim().is_empty() && !url_ok(&record.url) {
        reasons.push(RejectReason::InvalidUrl);
    }
    let title_len = record.title.trim().chars().count();
    if !record.title.trim().is_empty() && !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&title_len) {
        reasons.push(RejectReason::InvalidTitleLength);
    }
    if !organization_ok(&record.company) {
        reasons.push(RejectReason::InvalidOrganization);
    }
    if config.strict_mode
        && (SPAM_RE.is_match(&record.title) || SPAM_RE.is_match(&record.description))
    {
        reasons.push(RejectReason::SpamPattern);
    }
    if record.external_id().is_none_or(str::is_empty) {
        reasons.push(RejectReason::IdSourceMismatch);
    }

    (reasons.is_empty(), reasons)
}

fn missing_required(record: &CanonicalRecord) -> bool {
    [&record.job_id, &record.title, &record.city, &record.url]
        .iter()
        .any(|field| field.trim().is_empty())
}

fn locality_ok(city: &str) -> bool {
    let city = city.trim();
    is_major_city(city) || (city.chars().count() >= 2 && LOCALITY_RE.is_match(city))
}

/// Bounds are plausible when the effective maximum clears the floor,
/// nothing is negative or above the ceiling, and the spread is sane.
fn compensation_ok(min: Option<i64>, max: Option<i64>, config: &ValidationConfig) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    if [min, max]
        .into_iter()
        .flatten()
        .any(|v| v < 0 || v > config.max_compensation)
    {
        return false;
    }
    if max.or(min).is_some_and(|top| top < config.min_annual_compensation) {
        return false;
    }
    match (min, max) {
        (Some(lo), Some(hi)) if lo > hi => false,
        (Some(lo), Some(hi)) if lo > 0 => hi <= lo.saturating_mul(config.max_range_ratio),
        _ => true,
    }
}

fn url_ok(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    url.host_str().is_some_and(|host| {
        host.contains('.')
            && host
                .split('.')
                .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
    })
}

fn organization_ok(company: &str) -> bool {
    let trimmed = company.trim();
    let lower = trimmed.to_lowercase();
    trimmed.chars().count() >= 2
        && !PLACEHOLDER_ORGS.contains(&lower.as_str())
        && !trimmed.chars().all(|c| c.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Partition `records` into accepted and rejected.
pub fn validate_batch(
    records: Vec<CanonicalRecord>,
    config: &ValidationConfig,
    today: NaiveDate,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for record in records {
        let (accepted, reasons) = validate(&record, config, today);
        if accepted {
            report.accepted.push(record);
        } else {
            debug!(job_id = %record.job_id, reasons = ?reasons, "record rejected");
            report.rejected.push(Rejection { record, reasons });
        }
    }

    info!(
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        "validation complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobcompass_shared::{Source, record_id};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    fn good() -> CanonicalRecord {
        CanonicalRecord {
            source: Source::JobBank,
            job_id: record_id(Source::JobBank, "41234567"),
            title: "Data Analyst".into(),
            company: "Maple Analytics".into(),
            city: "Toronto".into(),
            province: "ON".into(),
            description: "SQL and Python".into(),
            salary_min: Some(60_000),
            salary_max: Some(80_000),
            remote_type: None,
            posted_date: NaiveDate::from_ymd_opt(2026, 10, 10).expect("date"),
            url: "https://www.jobbank.gc.ca/jobsearch/jobposting/41234567".into(),
        }
    }

    fn check(record: &CanonicalRecord) -> Vec<RejectReason> {
        validate(record, &ValidationConfig::default(), today()).1
    }

    #[test]
    fn clean_record_is_accepted() {
        let (accepted, reasons) = validate(&good(), &ValidationConfig::default(), today());
        assert!(accepted);
        assert!(reasons.is_empty());
    }

    #[test]
    fn blank_region_is_allowed() {
        let mut r = good();
        r.province.clear();
        assert!(check(&r).is_empty());
    }

    #[test]
    fn hourly_figures_fall_below_floor() {
        let mut r = good();
        r.salary_min = Some(8);
        r.salary_max = Some(35);
        assert_eq!(check(&r), vec![RejectReason::ImplausibleCompensation]);
    }

    #[test]
    fn compensation_bounds() {
        let cfg = ValidationConfig::default();
        assert!(compensation_ok(None, None, &cfg));
        assert!(compensation_ok(Some(50_000), None, &cfg));
        assert!(!compensation_ok(Some(80_000), Some(50_000), &cfg));
        assert!(!compensation_ok(Some(50_000), Some(900_000), &cfg));
        assert!(!compensation_ok(Some(-1), Some(50_000), &cfg));
        assert!(!compensation_ok(Some(100), Some(20_000), &cfg));
        assert!(compensation_ok(Some(200), Some(20_000), &cfg));
    }

    #[test]
    fn collects_every_reason() {
        let mut r = good();
        r.province = "XX".into();
        r.city = "T0r0nt0".into();
        r.url = "ftp://jobs".into();
        r.title = "DA".into();
        r.company = "N/A".into();
        r.posted_date = today() + TimeDelta::days(1);
        r.job_id = "jsearch_123".into();

        assert_eq!(
            check(&r),
            vec![
                RejectReason::InvalidRegion,
                RejectReason::InvalidLocality,
                RejectReason::StaleOrFutureDate,
                RejectReason::InvalidUrl,
                RejectReason::InvalidTitleLength,
                RejectReason::InvalidOrganization,
                RejectReason::IdSourceMismatch,
            ]
        );
    }

    #[test]
    fn missing_fields_and_stale_dates() {
        let mut r = good();
        r.title.clear();
        r.posted_date = today() - TimeDelta::days(91);
        assert_eq!(
            check(&r),
            vec![
                RejectReason::MissingRequiredField,
                RejectReason::StaleOrFutureDate
            ]
        );
    }

    #[test]
    fn huge_age_window_disables_staleness_check() {
        let config = ValidationConfig {
            max_age_days: i64::MAX,
            ..ValidationConfig::default()
        };
        let mut r = good();
        r.posted_date = NaiveDate::from_ymd_opt(1999, 1, 4).expect("date");
        assert_eq!(validate(&r, &config, today()), (true, vec![]));

        r.posted_date = today() + TimeDelta::days(1);
        assert_eq!(
            validate(&r, &config, today()).1,
            vec![RejectReason::StaleOrFutureDate]
        );
    }

    #[test]
    fn localities_and_organizations() {
        assert!(locality_ok("St. John's"));
        assert!(locality_ok("Trois-Rivières"));
        assert!(locality_ok("Remote"));
        assert!(!locality_ok("X"));
        assert!(!locality_ok("12345"));

        assert!(organization_ok("IBM"));
        assert!(!organization_ok("Unknown"));
        assert!(!organization_ok("12345"));
        assert!(!organization_ok("A"));
    }

    #[test]
    fn urls_need_scheme_and_dotted_host() {
        assert!(url_ok("https://ca.indeed.com/viewjob?jk=1"));
        assert!(url_ok("http://jobs.example.ca/1"));
        assert!(!url_ok("https://localhost/1"));
        assert!(!url_ok("mailto:hr@example.ca"));
        assert!(!url_ok("not a url"));
    }

    #[test]
    fn spam_only_rejected_in_strict_mode() {
        let mut r = good();
        r.description = "Click here to apply and make $5000 a week!".into();
        assert!(check(&r).is_empty());

        let strict = ValidationConfig {
            strict_mode: true,
            ..ValidationConfig::default()
        };
        let (accepted, reasons) = validate(&r, &strict, today());
        assert!(!accepted);
        assert_eq!(reasons, vec![RejectReason::SpamPattern]);
    }

    #[test]
    fn batch_partitions_and_counts_reasons() {
        let mut bad = good();
        bad.job_id = record_id(Source::JobBank, "2");
        bad.salary_min = Some(8);
        bad.salary_max = Some(35);

        let report = validate_batch(vec![good(), bad], &ValidationConfig::default(), today());
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(
            report.reason_counts().get(&RejectReason::ImplausibleCompensation),
            Some(&1)
        );
    }
}
