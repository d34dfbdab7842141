//! Core domain types: canonical job records, derived features, run metrics.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobCompassError;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Closed set of origin adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    JobBank,
    JSearch,
    Adzuna,
    RemoteOk,
    Indeed,
    Workopolis,
}

impl Source {
    /// Every source, in default scheduling order.
    pub const ALL: [Source; 6] = [
        Source::JobBank,
        Source::JSearch,
        Source::Adzuna,
        Source::RemoteOk,
        Source::Indeed,
        Source::Workopolis,
    ];

    /// Stable lowercase tag, also the `job_id` prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::JobBank => "jobbank",
            Source::JSearch => "jsearch",
            Source::Adzuna => "adzuna",
            Source::RemoteOk => "remoteok",
            Source::Indeed => "indeed",
            Source::Workopolis => "workopolis",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = JobCompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|src| src.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| JobCompassError::config(format!("unknown source '{s}'")))
    }
}

/// Build the globally unique record id `"{source}_{external_id}"`.
pub fn record_id(source: Source, external_id: &str) -> String {
    format!("{}_{}", source.as_str(), external_id)
}

// ---------------------------------------------------------------------------
// WorkMode
// ---------------------------------------------------------------------------

/// Where the work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    Remote,
    Hybrid,
    Onsite,
}

impl WorkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkMode::Remote => "remote",
            WorkMode::Hybrid => "hybrid",
            WorkMode::Onsite => "onsite",
        }
    }

    /// Remote and hybrid both count as remote-friendly.
    pub fn is_remote_friendly(&self) -> bool {
        matches!(self, WorkMode::Remote | WorkMode::Hybrid)
    }
}

impl FromStr for WorkMode {
    type Err = JobCompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(WorkMode::Remote),
            "hybrid" => Ok(WorkMode::Hybrid),
            "onsite" | "on-site" => Ok(WorkMode::Onsite),
            other => Err(JobCompassError::parse(format!("unknown work mode '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// CanonicalRecord
// ---------------------------------------------------------------------------

/// The normalized job posting every adapter produces.
///
/// Field names follow the persisted JSON/column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub source: Source,
    /// `"{source}_{external_id}"`.
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub city: String,
    /// 2-letter province code, or empty when unknown.
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub salary_min: Option<i64>,
    #[serde(default)]
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub remote_type: Option<WorkMode>,
    pub posted_date: NaiveDate,
    pub url: String,
}

impl CanonicalRecord {
    /// The source-scoped id, if `job_id` carries the expected prefix.
    pub fn external_id(&self) -> Option<&str> {
        self.job_id
            .strip_prefix(self.source.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
    }

    /// Swap a reversed compensation range in place.
    pub fn repair_compensation(&mut self) {
        if let (Some(min), Some(max)) = (self.salary_min, self.salary_max) {
            if min > max {
                self.salary_min = Some(max);
                self.salary_max = Some(min);
            }
        }
    }

    /// Consuming form of [`repair_compensation`](Self::repair_compensation).
    pub fn with_repaired_compensation(mut self) -> Self {
        self.repair_compensation();
        self
    }
}

// ---------------------------------------------------------------------------
// DerivedFeatures
// ---------------------------------------------------------------------------

/// Seniority tier inferred from the experience range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeniorityTier {
    Entry,
    Junior,
    Mid,
    Senior,
    Lead,
}

impl SeniorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeniorityTier::Entry => "entry",
            SeniorityTier::Junior => "junior",
            SeniorityTier::Mid => "mid",
            SeniorityTier::Senior => "senior",
            SeniorityTier::Lead => "lead",
        }
    }
}

impl FromStr for SeniorityTier {
    type Err = JobCompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(SeniorityTier::Entry),
            "junior" => Ok(SeniorityTier::Junior),
            "mid" => Ok(SeniorityTier::Mid),
            "senior" => Ok(SeniorityTier::Senior),
            "lead" => Ok(SeniorityTier::Lead),
            other => Err(JobCompassError::parse(format!("unknown seniority '{other}'"))),
        }
    }
}

/// Role category from the fixed taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleCategory {
    DataScientist,
    DataEngineer,
    DataAnalyst,
    SoftwareEngineer,
    Devops,
    Security,
    WebDeveloper,
    MobileDeveloper,
    Qa,
    DatabaseAdministrator,
    Other,
}

impl RoleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleCategory::DataScientist => "data-scientist",
            RoleCategory::DataEngineer => "data-engineer",
            RoleCategory::DataAnalyst => "data-analyst",
            RoleCategory::SoftwareEngineer => "software-engineer",
            RoleCategory::Devops => "devops",
            RoleCategory::Security => "security",
            RoleCategory::WebDeveloper => "web-developer",
            RoleCategory::MobileDeveloper => "mobile-developer",
            RoleCategory::Qa => "qa",
            RoleCategory::DatabaseAdministrator => "database-administrator",
            RoleCategory::Other => "other",
        }
    }
}

impl FromStr for RoleCategory {
    type Err = JobCompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            RoleCategory::DataScientist,
            RoleCategory::DataEngineer,
            RoleCategory::DataAnalyst,
            RoleCategory::SoftwareEngineer,
            RoleCategory::Devops,
            RoleCategory::Security,
            RoleCategory::WebDeveloper,
            RoleCategory::MobileDeveloper,
            RoleCategory::Qa,
            RoleCategory::DatabaseAdministrator,
            RoleCategory::Other,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
        .ok_or_else(|| JobCompassError::parse(format!("unknown role category '{s}'")))
    }
}

/// Structured attributes inferred from a record's free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub job_id: String,
    pub exp_min: Option<u32>,
    pub exp_max: Option<u32>,
    pub exp_level: SeniorityTier,
    /// Canonical skill tokens in order of first mention, at most 10.
    pub skills: Vec<String>,
    pub is_remote: bool,
    #[serde(default)]
    pub remote_type: Option<WorkMode>,
    pub role: RoleCategory,
    /// Extraction certainty in `[0, 1]`.
    pub confidence: f32,
}

impl DerivedFeatures {
    /// True when no experience signal was found and `exp_level` is the
    /// `mid` fallback rather than an inference.
    pub fn seniority_is_default(&self) -> bool {
        self.exp_min.is_none() && self.exp_max.is_none()
    }
}

// ---------------------------------------------------------------------------
// RunMetrics
// ---------------------------------------------------------------------------

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Partial,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Partial => "partial",
        }
    }
}

impl FromStr for RunStatus {
    type Err = JobCompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "partial" => Ok(RunStatus::Partial),
            other => Err(JobCompassError::parse(format!("unknown run status '{other}'"))),
        }
    }
}

/// Aggregate counters for one pipeline execution.
///
/// `jobs_valid` counts records that passed every stage and were newly
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: Uuid,
    pub run_date: DateTime<Utc>,
    pub jobs_collected: u64,
    pub jobs_valid: u64,
    pub jobs_duplicates: u64,
    pub jobs_failed: u64,
    pub sources_used: Vec<Source>,
    pub jobs_by_source: BTreeMap<String, u64>,
    pub collection_time_ms: u64,
    pub processing_time_ms: u64,
    pub total_time_ms: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub status: RunStatus,
}

impl RunMetrics {
    /// Fresh metrics in the `running` state.
    pub fn start() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            run_date: Utc::now(),
            jobs_collected: 0,
            jobs_valid: 0,
            jobs_duplicates: 0,
            jobs_failed: 0,
            sources_used: Vec::new(),
            jobs_by_source: BTreeMap::new(),
            collection_time_ms: 0,
            processing_time_ms: 0,
            total_time_ms: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            status: RunStatus::Running,
        }
    }

    /// Tally collected records per source.
    pub fn count_collected(&mut self, records: &[CanonicalRecord]) {
        for record in records {
            *self
                .jobs_by_source
                .entry(record.source.as_str().to_string())
                .or_insert(0) += 1;
            if !self.sources_used.contains(&record.source) {
                self.sources_used.push(record.source);
            }
        }
        self.jobs_collected += records.len() as u64;
    }

    /// Derive the final status. `completed` if anything was inserted,
    /// `partial` when a cancelled run still inserted, `failed` otherwise.
    pub fn finalize(&mut self, cancelled: bool) {
        self.status = match (self.jobs_valid > 0, cancelled) {
            (true, false) => RunStatus::Completed,
            (true, true) => RunStatus::Partial,
            (false, _) => RunStatus::Failed,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CanonicalRecord {
        CanonicalRecord {
            source: Source::JobBank,
            job_id: record_id(Source::JobBank, "41234567"),
            title: "Data Analyst".into(),
            company: "Maple Analytics".into(),
            city: "Toronto".into(),
            province: "ON".into(),
            description: String::new(),
            salary_min: Some(80_000),
            salary_max: Some(50_000),
            remote_type: None,
            posted_date: NaiveDate::from_ymd_opt(2026, 10, 1).expect("valid date"),
            url: "https://www.jobbank.gc.ca/jobsearch/jobposting/41234567".into(),
        }
    }

    #[test]
    fn source_roundtrip() {
        for source in Source::ALL {
            let parsed: Source = source.as_str().parse().expect("parse source");
            assert_eq!(parsed, source);
        }
        assert!("monster".parse::<Source>().is_err());
    }

    #[test]
    fn record_id_and_external_id() {
        let record = sample_record();
        assert_eq!(record.job_id, "jobbank_41234567");
        assert_eq!(record.external_id(), Some("41234567"));

        let mismatched = CanonicalRecord {
            job_id: "adzuna_1".into(),
            ..sample_record()
        };
        assert_eq!(mismatched.external_id(), None);
    }

    #[test]
    fn reversed_compensation_is_swapped() {
        let record = sample_record().with_repaired_compensation();
        assert_eq!(record.salary_min, Some(50_000));
        assert_eq!(record.salary_max, Some(80_000));
    }

    #[test]
    fn record_json_uses_wire_names() {
        let json = serde_json::to_value(sample_record()).expect("serialize");
        assert_eq!(json["source"], "jobbank");
        assert_eq!(json["posted_date"], "2026-10-01");
        assert!(json.get("salary_min").is_some());
        assert!(json["remote_type"].is_null());
    }

    #[test]
    fn seniority_default_flag() {
        let features = DerivedFeatures {
            job_id: "jobbank_1".into(),
            exp_min: None,
            exp_max: None,
            exp_level: SeniorityTier::Mid,
            skills: vec![],
            is_remote: false,
            remote_type: None,
            role: RoleCategory::Other,
            confidence: 0.4,
        };
        assert!(features.seniority_is_default());

        let inferred = DerivedFeatures {
            exp_min: Some(3),
            exp_max: Some(5),
            ..features
        };
        assert!(!inferred.seniority_is_default());
    }

    #[test]
    fn metrics_finalize_rules() {
        let mut metrics = RunMetrics::start();
        assert_eq!(metrics.status, RunStatus::Running);

        metrics.finalize(false);
        assert_eq!(metrics.status, RunStatus::Failed);

        metrics.jobs_valid = 2;
        metrics.finalize(false);
        assert_eq!(metrics.status, RunStatus::Completed);

        metrics.finalize(true);
        assert_eq!(metrics.status, RunStatus::Partial);
    }

    #[test]
    fn metrics_tally_by_source() {
        let mut metrics = RunMetrics::start();
        let a = sample_record();
        let b = CanonicalRecord {
            source: Source::Adzuna,
            job_id: record_id(Source::Adzuna, "9"),
            ..sample_record()
        };
        metrics.count_collected(&[a.clone(), a, b]);
        assert_eq!(metrics.jobs_collected, 3);
        assert_eq!(metrics.jobs_by_source["jobbank"], 2);
        assert_eq!(metrics.jobs_by_source["adzuna"], 1);
        assert_eq!(metrics.sources_used, vec![Source::JobBank, Source::Adzuna]);
    }
}
