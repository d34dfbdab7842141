//! Normalization helpers shared by every adapter: locations, compensation,
//! posting dates, identifiers, and description text.

use std::sync::LazyLock;

use chrono::{NaiveDate, TimeDelta};
use regex::Regex;
use scraper::Html;
use sha2::{Digest, Sha256};

use jobcompass_shared::regions::{province_code, province_for_city};

/// Descriptions are cut to this many characters.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

static PAREN_REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\(([A-Za-z]{2})\)\s*$").expect("valid regex"));

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)(?:to|-|–|—)(\d+)").expect("valid regex"));

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").expect("valid regex"));

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid regex"));

static DAYS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+days?\s+ago").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Split a free-form location into `(city, province_code)`.
///
/// Tries, in order: a `City (XX)` suffix, a `City, Province` comma pattern
/// (full names, abbreviations, or codes; later segments such as `Canada`
/// are skipped), then the static city table. An empty city falls back to
/// `fallback_city`; an unresolved province is returned empty.
pub fn parse_location(text: &str, fallback_city: &str) -> (String, String) {
    let text = text.trim();

    if let Some(caps) = PAREN_REGION_RE.captures(text) {
        if let Some(code) = province_code(&caps[2]) {
            let city = caps[1].trim().trim_end_matches(',').trim();
            return (non_empty_or(city, fallback_city), code.to_string());
        }
    }

    let mut parts = text.split(',').map(str::trim);
    let city = non_empty_or(parts.next().unwrap_or_default(), fallback_city);

    let province = parts
        .find_map(province_code)
        .or_else(|| province_for_city(&city))
        .unwrap_or_default();

    (city, province.to_string())
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.trim().to_string()
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Compensation
// ---------------------------------------------------------------------------

/// Extract `(min, max)` from salary text like `"$60,000 to $80,000 annually"`.
///
/// A single number yields `min == max`; a reversed range is swapped.
/// Text saying the salary is not available yields `(None, None)`. Hourly
/// figures are returned as written, never annualized.
pub fn parse_compensation(text: &str) -> (Option<i64>, Option<i64>) {
    let lower = text.to_lowercase();
    if lower.trim().is_empty() || lower.contains("not ") || lower.contains("n/a") {
        return (None, None);
    }

    // Drop cents so "25.50" reads as 25, then strip formatting.
    let cleaned: String = strip_cents(&lower)
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' ' | '\u{a0}'))
        .collect();

    if let Some(caps) = RANGE_RE.captures(&cleaned) {
        let a = caps[1].parse::<i64>().ok();
        let b = caps[2].parse::<i64>().ok();
        return match (a, b) {
            (Some(a), Some(b)) if a > b => (Some(b), Some(a)),
            (Some(a), Some(b)) => (Some(a), Some(b)),
            _ => (None, None),
        };
    }

    match NUMBER_RE
        .captures(&cleaned)
        .and_then(|caps| caps[1].parse::<i64>().ok())
    {
        Some(value) => (Some(value), Some(value)),
        None => (None, None),
    }
}

fn strip_cents(text: &str) -> String {
    static CENTS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d)\.\d{1,2}\b").expect("valid regex"));
    CENTS_RE.replace_all(text, "$1").into_owned()
}

/// Convert an optional float amount from a JSON API into whole units.
pub fn amount(value: Option<f64>) -> Option<i64> {
    value.filter(|v| v.is_finite()).map(|v| v.round() as i64)
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Resolve posting-date text relative to `today`.
///
/// Accepts an ISO date anywhere in the text, `"Month D, YYYY"`,
/// `"N days ago"`, `"yesterday"`, and `"today"`. Anything else is `today`.
pub fn parse_posted_date(text: Option<&str>, today: NaiveDate) -> NaiveDate {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return today;
    };

    if let Some(date) = ISO_DATE_RE
        .captures(text)
        .and_then(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok())
    {
        return date;
    }

    if let Some(days) = DAYS_AGO_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<i64>().ok())
    {
        // Counts too large for the calendar fall back to today.
        return TimeDelta::try_days(days)
            .and_then(|delta| today.checked_sub_signed(delta))
            .unwrap_or(today);
    }

    let lower = text.to_lowercase();
    if lower.contains("yesterday") {
        return today.pred_opt().unwrap_or(today);
    }
    if lower.contains("today") || lower.contains("just posted") {
        return today;
    }

    let without_prefix = lower.trim_start_matches("posted on").trim();
    for format in ["%B %d, %Y", "%b %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(without_prefix, format) {
            return date;
        }
    }

    today
}

// ---------------------------------------------------------------------------
// Identifiers and text
// ---------------------------------------------------------------------------

/// Stable external id from a content hash: first 12 hex chars of SHA-256.
pub fn hashed_external_id(stable_input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_input.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

/// Reduce an HTML fragment to whitespace-collapsed plain text.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Cut `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Plain-text description capped at [`MAX_DESCRIPTION_CHARS`].
pub fn description_text(html_or_text: &str) -> String {
    truncate_chars(&html_to_text(html_or_text), MAX_DESCRIPTION_CHARS)
}
