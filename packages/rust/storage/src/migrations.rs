//! SQL migration definitions for the JobCompass database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its own version in `schema_migrations`.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: jobs_raw, jobs_features, scraper_metrics",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Canonical records as collected
CREATE TABLE IF NOT EXISTS jobs_raw (
    job_id       TEXT PRIMARY KEY,
    source       TEXT NOT NULL,
    title        TEXT NOT NULL,
    company      TEXT NOT NULL,
    city         TEXT NOT NULL,
    province     TEXT NOT NULL DEFAULT '',
    description  TEXT NOT NULL DEFAULT '',
    salary_min   INTEGER,
    salary_max   INTEGER,
    remote_type  TEXT,
    posted_date  TEXT NOT NULL,
    url          TEXT NOT NULL,
    collected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_raw_source ON jobs_raw(source);
CREATE INDEX IF NOT EXISTS idx_jobs_raw_posted ON jobs_raw(posted_date);

-- Derived features, one row per raw record
CREATE TABLE IF NOT EXISTS jobs_features (
    job_id       TEXT PRIMARY KEY REFERENCES jobs_raw(job_id) ON DELETE CASCADE,
    exp_min      INTEGER,
    exp_max      INTEGER,
    exp_level    TEXT NOT NULL,
    skills       TEXT NOT NULL DEFAULT '[]',
    is_remote    INTEGER NOT NULL DEFAULT 0,
    remote_type  TEXT,
    role         TEXT NOT NULL,
    confidence   REAL NOT NULL,
    extracted_at TEXT NOT NULL
);

-- One row per pipeline run
CREATE TABLE IF NOT EXISTS scraper_metrics (
    run_id             TEXT PRIMARY KEY,
    run_date           TEXT NOT NULL,
    jobs_collected     INTEGER NOT NULL,
    jobs_valid         INTEGER NOT NULL,
    jobs_duplicates    INTEGER NOT NULL,
    jobs_failed        INTEGER NOT NULL,
    sources_used       TEXT NOT NULL,
    jobs_by_source     TEXT NOT NULL,
    collection_time_ms INTEGER NOT NULL,
    processing_time_ms INTEGER NOT NULL,
    total_time_ms      INTEGER NOT NULL,
    errors             TEXT NOT NULL,
    warnings           TEXT NOT NULL,
    status             TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metrics_run_date ON scraper_metrics(run_date);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Read-only jobs_view joining raw records with features",
            sql: r#"
CREATE VIEW IF NOT EXISTS jobs_view AS
SELECT
    r.job_id,
    r.source,
    r.title,
    r.company,
    r.city,
    r.province,
    r.description,
    r.salary_min,
    r.salary_max,
    COALESCE(f.remote_type, r.remote_type) AS remote_type,
    r.posted_date,
    r.url,
    f.exp_min,
    f.exp_max,
    f.exp_level,
    f.skills,
    f.is_remote,
    f.role,
    f.confidence
FROM jobs_raw r
LEFT JOIN jobs_features f ON f.job_id = r.job_id;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
        Migration {
            version: 3,
            description: "Expose stored and derived remote_type separately in jobs_view",
            sql: r#"
DROP VIEW IF EXISTS jobs_view;

CREATE VIEW jobs_view AS
SELECT
    r.job_id,
    r.source,
    r.title,
    r.company,
    r.city,
    r.province,
    r.description,
    r.salary_min,
    r.salary_max,
    COALESCE(f.remote_type, r.remote_type) AS remote_type,
    r.remote_type AS raw_remote_type,
    f.remote_type AS feature_remote_type,
    r.posted_date,
    r.url,
    f.exp_min,
    f.exp_max,
    f.exp_level,
    f.skills,
    f.is_remote,
    f.role,
    f.confidence
FROM jobs_raw r
LEFT JOIN jobs_features f ON f.job_id = r.job_id;

INSERT INTO schema_migrations (version) VALUES (3);
"#,
        },
    ]
}
