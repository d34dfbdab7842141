//! Feature extraction over a record's title and description.
//!
//! Everything here is a pure function of the text plus the work mode the
//! adapter reported.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use jobcompass_shared::{CanonicalRecord, DerivedFeatures, RoleCategory, SeniorityTier, WorkMode};

const MAX_SKILLS: usize = 10;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

const YEARS: &str = r"(?:years?|yrs?)";

static EXP_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(\d{{1,2}})\s*(?:-|–|to)\s*(\d{{1,2}})\+?\s*{YEARS}")).expect("valid regex")
});
static EXP_PLUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(\d{{1,2}})\s*\+\s*{YEARS}")).expect("valid regex"));
static EXP_AT_LEAST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?:at least|minimum(?: of)?|min\.?)\s*(\d{{1,2}})\s*{YEARS}"))
        .expect("valid regex")
});
static EXP_PLAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b(\d{{1,2}})\s*{YEARS}")).expect("valid regex"));
static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:entry[\s-]level|junior|graduate|new grad|intern(?:ship)?)\b").expect("valid regex")
});

static HYBRID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:hybrid|hybride)\b").expect("valid regex"));
static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:remote|work from home|wfh|telecommute|télétravail|distributed team)\b")
        .expect("valid regex")
});
static ONSITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:on[\s-]?site|in[\s-]office|in[\s-]person|sur place)\b").expect("valid regex")
});

/// Canonical skill tokens. Matching is case-insensitive with boundaries
/// that tolerate `+`, `#`, `.` and `/` inside a token.
const SKILLS: &[&str] = &[
    "python", "java", "javascript", "typescript", "c++", "c#", "golang", "rust", "scala", "kotlin",
    "swift", "sql", "nosql", "postgresql", "mysql", "mongodb", "redis", "excel", "tableau",
    "power bi", "looker", "pandas", "numpy", "scikit-learn", "tensorflow", "pytorch", "spark",
    "hadoop", "kafka", "airflow", "dbt", "snowflake", "databricks", "aws", "azure", "gcp",
    "docker", "kubernetes", "terraform", "ci/cd", "git", "linux", "react", "angular", "node.js",
    "django", "machine learning", "statistics",
];

static SKILL_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    SKILLS
        .iter()
        .map(|skill| {
            let pattern = format!(r"(?:^|[^a-z0-9+#./])({})(?:$|[^a-z0-9+#])", regex::escape(skill));
            (*skill, Regex::new(&pattern).expect("valid regex"))
        })
        .collect()
});

/// Role families in priority order; the first family that matches wins.
static ROLE_RES: LazyLock<Vec<(RoleCategory, Regex)>> = LazyLock::new(|| {
    [
        (
            RoleCategory::DataScientist,
            r"data scientist|machine learning|ml engineer|ai engineer|research scientist",
        ),
        (RoleCategory::DataEngineer, r"data engineer|etl|big data|data platform"),
        (
            RoleCategory::DataAnalyst,
            r"data analyst|business intelligence|bi analyst|business analyst|reporting analyst|analytics|analyste",
        ),
        (
            RoleCategory::SoftwareEngineer,
            r"software|backend|back-end|full[\s-]?stack|programmer|application developer",
        ),
        (
            RoleCategory::Devops,
            r"devops|site reliability|sre|platform engineer|cloud engineer|infrastructure",
        ),
        (RoleCategory::Security, r"security|cybersecurity|penetration|soc analyst"),
        (RoleCategory::WebDeveloper, r"web developer|front[\s-]?end|web designer"),
        (RoleCategory::MobileDeveloper, r"mobile|ios|android"),
        (RoleCategory::Qa, r"qa|quality assurance|test automation|tester|sdet"),
        (
            RoleCategory::DatabaseAdministrator,
            r"database administrator|dba|database engineer",
        ),
    ]
    .into_iter()
    .map(|(role, words)| (role, Regex::new(&format!(r"\b(?:{words})\b")).expect("valid regex")))
    .collect()
});

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Derive features for one record.
#[instrument(skip_all, fields(job_id = %record.job_id))]
pub fn extract(record: &CanonicalRecord) -> DerivedFeatures {
    let text = format!("{}\n{}", record.title, record.description).to_lowercase();

    let experience = experience_range(&text);
    let (exp_min, exp_max) = experience.map_or((None, None), |e| (Some(e.min), e.max));
    let exp_level = seniority(exp_min, exp_max);

    let detected_mode = work_mode(&text);
    let remote_type = detected_mode.or(record.remote_type);
    let skills = skills(&text);
    let role = classify_role(&record.title.to_lowercase());

    let mut confidence = 0.2_f32;
    confidence += match experience {
        Some(e) if e.numeric => 0.3,
        Some(_) => 0.15,
        None => 0.0,
    };
    if detected_mode.is_some() {
        confidence += 0.2;
    }
    confidence += 0.06 * skills.len().min(5) as f32;
    let confidence = (confidence.min(1.0) * 100.0).round() / 100.0;

    debug!(?exp_level, skills = skills.len(), role = role.as_str(), "features extracted");

    DerivedFeatures {
        job_id: record.job_id.clone(),
        exp_min,
        exp_max,
        exp_level,
        skills,
        is_remote: remote_type.is_some_and(|m| m.is_remote_friendly()),
        remote_type,
        role,
        confidence,
    }
}

/// Extract features for every record. Never aborts the batch.
pub fn extract_batch(records: &[CanonicalRecord]) -> Vec<DerivedFeatures> {
    records.iter().map(extract).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Experience {
    min: u32,
    max: Option<u32>,
    /// False when inferred from entry-level wording rather than a number.
    numeric: bool,
}

fn experience_range(text: &str) -> Option<Experience> {
    let num = |caps: &regex::Captures<'_>, i: usize| caps[i].parse::<u32>().ok();

    if let Some(caps) = EXP_RANGE_RE.captures(text) {
        if let (Some(a), Some(b)) = (num(&caps, 1), num(&caps, 2)) {
            let (min, max) = if a > b { (b, a) } else { (a, b) };
            return Some(Experience { min, max: Some(max), numeric: true });
        }
    }
    if let Some(n) = EXP_PLUS_RE.captures(text).and_then(|c| num(&c, 1)) {
        return Some(Experience { min: n, max: Some(n + 3), numeric: true });
    }
    if let Some(n) = EXP_AT_LEAST_RE.captures(text).and_then(|c| num(&c, 1)) {
        return Some(Experience { min: n, max: None, numeric: true });
    }
    if let Some(n) = EXP_PLAIN_RE.captures(text).and_then(|c| num(&c, 1)) {
        return Some(Experience { min: n, max: Some(n + 3), numeric: true });
    }
    if ENTRY_RE.is_match(text) {
        return Some(Experience { min: 0, max: Some(2), numeric: false });
    }
    None
}

/// Tier from the range midpoint (or the open lower bound). No range is
/// `mid`; callers can tell via [`DerivedFeatures::seniority_is_default`].
fn seniority(min: Option<u32>, max: Option<u32>) -> SeniorityTier {
    let point = match (min, max) {
        (Some(lo), Some(hi)) => (lo + hi) as f32 / 2.0,
        (Some(lo), None) => lo as f32,
        (None, _) => return SeniorityTier::Mid,
    };
    match point {
        p if p <= 1.0 => SeniorityTier::Entry,
        p if p <= 3.0 => SeniorityTier::Junior,
        p if p <= 5.0 => SeniorityTier::Mid,
        p if p <= 8.0 => SeniorityTier::Senior,
        _ => SeniorityTier::Lead,
    }
}

/// Hybrid wins over remote when both appear.
fn work_mode(text: &str) -> Option<WorkMode> {
    if HYBRID_RE.is_match(text) {
        Some(WorkMode::Hybrid)
    } else if REMOTE_RE.is_match(text) {
        Some(WorkMode::Remote)
    } else if ONSITE_RE.is_match(text) {
        Some(WorkMode::Onsite)
    } else {
        None
    }
}

fn skills(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, &'static str)> = SKILL_RES
        .iter()
        .filter_map(|(skill, re)| {
            re.captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| (m.start(), *skill))
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found
        .into_iter()
        .take(MAX_SKILLS)
        .map(|(_, skill)| skill.to_string())
        .collect()
}

fn classify_role(title: &str) -> RoleCategory {
    ROLE_RES
        .iter()
        .find(|(_, re)| re.is_match(title))
        .map_or(RoleCategory::Other, |(role, _)| *role)
}
