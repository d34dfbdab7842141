//! Duplicate detection within a batch and against previously stored ids.
//!
//! Three passes run in order over the batch: exact `job_id`, content
//! fingerprint over normalized `title::company::city`, then an optional
//! fuzzy title comparison among records that share company and city.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use jobcompass_shared::{CanonicalRecord, DedupConfig, NearDuplicateMode};

/// Two records whose normalized titles are suspiciously close.
#[derive(Debug, Clone, PartialEq)]
pub struct NearDuplicate {
    pub first: String,
    pub second: String,
    pub similarity: f64,
}

/// Outcome of [`dedupe`].
#[derive(Debug, Default)]
pub struct DedupReport {
    /// Surviving records, in input order.
    pub unique: Vec<CanonicalRecord>,
    pub exact_duplicates: usize,
    pub fingerprint_duplicates: usize,
    /// Every flagged pair, whether or not it was removed.
    pub near_duplicates: Vec<NearDuplicate>,
    /// Records dropped by the fuzzy pass (`remove` mode only).
    pub near_removed: usize,
}

impl DedupReport {
    /// Total records dropped by all passes.
    pub fn removed(&self) -> usize {
        self.exact_duplicates + self.fingerprint_duplicates + self.near_removed
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content fingerprint: SHA-256 hex over normalized `title::company::city`.
pub fn fingerprint(record: &CanonicalRecord) -> String {
    let key = format!(
        "{}::{}::{}",
        normalize_text(&record.title),
        normalize_text(&record.company),
        normalize_text(&record.city)
    );
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Remove intra-batch duplicates. The first occurrence always wins.
pub fn dedupe(records: Vec<CanonicalRecord>, config: &DedupConfig) -> DedupReport {
    let mut report = DedupReport::default();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_fingerprints: HashSet<String> = HashSet::new();
    let mut survivors = Vec::with_capacity(records.len());

    for record in records {
        if !seen_ids.insert(record.job_id.clone()) {
            debug!(job_id = %record.job_id, "exact duplicate id");
            report.exact_duplicates += 1;
            continue;
        }
        if !seen_fingerprints.insert(fingerprint(&record)) {
            debug!(job_id = %record.job_id, "duplicate content fingerprint");
            report.fingerprint_duplicates += 1;
            continue;
        }
        survivors.push(record);
    }

    if config.fuzzy_enabled {
        let (near, dropped) = fuzzy_pass(&survivors, config);
        report.near_duplicates = near;
        report.near_removed = dropped.len();
        report.unique = survivors
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !dropped.contains(idx))
            .map(|(_, record)| record)
            .collect();
    } else {
        report.unique = survivors;
    }

    info!(
        unique = report.unique.len(),
        exact = report.exact_duplicates,
        fingerprint = report.fingerprint_duplicates,
        near = report.near_duplicates.len(),
        near_removed = report.near_removed,
        "dedup complete"
    );
    report
}

/// Compare normalized titles pairwise inside each (company, city) group.
///
/// In `remove` mode a record already dropped is not compared again, so a
/// chain of similar titles keeps its earliest member.
fn fuzzy_pass(records: &[CanonicalRecord], config: &DedupConfig) -> (Vec<NearDuplicate>, HashSet<usize>) {
    let remove = config.near_duplicate_mode == NearDuplicateMode::Remove;
    let mut groups: HashMap<(String, String), Vec<usize>> = HashMap::new();
    let mut group_order = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let key = (normalize_text(&record.company), normalize_text(&record.city));
        let members = groups.entry(key.clone()).or_default();
        if members.is_empty() {
            group_order.push(key);
        }
        members.push(idx);
    }

    let titles: Vec<String> = records.iter().map(|r| normalize_text(&r.title)).collect();
    let mut pairs = Vec::new();
    let mut dropped = HashSet::new();

    for key in &group_order {
        let members = &groups[key];
        for (pos, &second) in members.iter().enumerate() {
            for &first in &members[..pos] {
                if remove && dropped.contains(&first) {
                    continue;
                }
                let similarity = strsim::normalized_levenshtein(&titles[first], &titles[second]);
                if similarity >= config.similarity_threshold {
                    pairs.push(NearDuplicate {
                        first: records[first].job_id.clone(),
                        second: records[second].job_id.clone(),
                        similarity,
                    });
                    if remove {
                        dropped.insert(second);
                        break;
                    }
                }
            }
        }
    }

    (pairs, dropped)
}

/// Drop records whose id is already stored. Returns the new records and
/// how many were dropped.
pub fn dedupe_against_known(
    records: Vec<CanonicalRecord>,
    known_ids: &HashSet<String>,
) -> (Vec<CanonicalRecord>, usize) {
    let before = records.len();
    let fresh: Vec<CanonicalRecord> = records
        .into_iter()
        .filter(|r| !known_ids.contains(&r.job_id))
        .collect();
    let dropped = before - fresh.len();
    debug!(dropped, "cross-run duplicates removed");
    (fresh, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use jobcompass_shared::{Source, record_id};

    fn record(id: &str, title: &str, company: &str, city: &str) -> CanonicalRecord {
        CanonicalRecord {
            source: Source::Adzuna,
            job_id: record_id(Source::Adzuna, id),
            title: title.into(),
            company: company.into(),
            city: city.into(),
            province: "ON".into(),
            description: String::new(),
            salary_min: None,
            salary_max: None,
            remote_type: None,
            posted_date: NaiveDate::from_ymd_opt(2026, 10, 10).expect("date"),
            url: format!("https://www.adzuna.ca/land/ad/{id}"),
        }
    }

    #[test]
    fn same_id_keeps_first() {
        let mut later = record("1", "Data Analyst", "Maple", "Toronto");
        later.description = "different text".into();
        let report = dedupe(
            vec![record("1", "Data Analyst", "Maple", "Toronto"), later],
            &DedupConfig::default(),
        );
        assert_eq!(report.unique.len(), 1);
        assert_eq!(report.unique[0].description, "");
        assert_eq!(report.exact_duplicates, 1);
    }

    #[test]
    fn same_fingerprint_different_ids_keeps_one() {
        let report = dedupe(
            vec![
                record("1", "Data Analyst", "Maple Analytics Inc.", "Toronto"),
                record("2", "data analyst!", "maple analytics inc", "TORONTO"),
            ],
            &DedupConfig::default(),
        );
        assert_eq!(report.unique.len(), 1);
        assert_eq!(report.fingerprint_duplicates, 1);
        assert_eq!(report.removed(), 1);
    }

    #[test]
    fn near_duplicates_reported_not_removed_by_default() {
        let report = dedupe(
            vec![
                record("1", "Senior Data Analyst", "Maple", "Toronto"),
                record("2", "Senior Data Analyst I", "Maple", "Toronto"),
                record("3", "Senior Data Analyst I", "Maple", "Ottawa"),
            ],
            &DedupConfig::default(),
        );
        assert_eq!(report.unique.len(), 3);
        assert_eq!(report.near_duplicates.len(), 1);
        let pair = &report.near_duplicates[0];
        assert_eq!(pair.first, "adzuna_1");
        assert_eq!(pair.second, "adzuna_2");
        assert!(pair.similarity >= 0.85);
    }

    #[test]
    fn remove_mode_drops_later_record() {
        let config = DedupConfig {
            near_duplicate_mode: NearDuplicateMode::Remove,
            ..DedupConfig::default()
        };
        let report = dedupe(
            vec![
                record("1", "Senior Data Analyst", "Maple", "Toronto"),
                record("2", "Senior Data Analyst I", "Maple", "Toronto"),
                record("3", "Software Developer", "Maple", "Toronto"),
            ],
            &config,
        );
        let ids: Vec<&str> = report.unique.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["adzuna_1", "adzuna_3"]);
        assert_eq!(report.near_removed, 1);
    }

    #[test]
    fn fuzzy_pass_can_be_disabled() {
        let config = DedupConfig {
            fuzzy_enabled: false,
            near_duplicate_mode: NearDuplicateMode::Remove,
            ..DedupConfig::default()
        };
        let report = dedupe(
            vec![
                record("1", "Senior Data Analyst", "Maple", "Toronto"),
                record("2", "Senior Data Analyst I", "Maple", "Toronto"),
            ],
            &config,
        );
        assert_eq!(report.unique.len(), 2);
        assert!(report.near_duplicates.is_empty());
    }

    #[test]
    fn known_ids_are_filtered() {
        let known: HashSet<String> = ["adzuna_1".to_string()].into_iter().collect();
        let (fresh, dropped) = dedupe_against_known(
            vec![
                record("1", "Data Analyst", "Maple", "Toronto"),
                record("2", "Data Engineer", "Maple", "Toronto"),
            ],
            &known,
        );
        assert_eq!(dropped, 1);
        assert_eq!(fresh[0].job_id, "adzuna_2");
    }

    #[test]
    fn normalization_strips_punctuation() {
        assert_eq!(normalize_text("  Sr. Data-Analyst (Remote) "), "sr data analyst remote");
    }
}
