//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding raw job records,
//! derived features, and per-run metrics, plus the read-only `jobs_view`.
//!
//! **Access rules:**
//! - The collection pipeline: read-write (sole writer) via [`Storage::open`]
//! - Reporting consumers: read-only via [`Storage::open_readonly`]

mod migrations;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use jobcompass_shared::{
    CanonicalRecord, DerivedFeatures, JobCompassError, Result, RunMetrics, Source,
};
use libsql::{Connection, Database, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

const RAW_COLUMNS: &str = "job_id, source, title, company, city, province, description, \
     salary_min, salary_max, remote_type, posted_date, url";

const FEATURE_COLUMNS: &str =
    "job_id, exp_min, exp_max, exp_level, skills, is_remote, remote_type, role, confidence";

const METRICS_COLUMNS: &str = "run_id, run_date, jobs_collected, jobs_valid, jobs_duplicates, \
     jobs_failed, sources_used, jobs_by_source, collection_time_ms, processing_time_ms, \
     total_time_ms, errors, warnings, status";

/// Tables reported by [`Storage::table_counts`].
const COUNTED_TABLES: [&str; 3] = ["jobs_raw", "jobs_features", "scraper_metrics"];

/// Per-batch outcome of a raw insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertSummary {
    /// Newly stored records.
    pub inserted: usize,
    /// Ids of the newly stored records, in batch order.
    pub inserted_ids: Vec<String>,
    /// Records whose id was already stored.
    pub duplicates: usize,
    /// Records that failed to write.
    pub errors: usize,
}

/// One row of `jobs_view`: a raw record plus its features, if extracted.
#[derive(Debug, Clone)]
pub struct JobView {
    pub record: CanonicalRecord,
    pub features: Option<DerivedFeatures>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JobCompassError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(JobCompassError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        JobCompassError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(JobCompassError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Raw records
    // -----------------------------------------------------------------------

    /// Insert records, skipping ids already stored, and write one metrics
    /// row describing the batch.
    pub async fn insert_raw(&self, records: &[CanonicalRecord]) -> Result<InsertSummary> {
        let mut metrics = RunMetrics::start();
        metrics.count_collected(records);

        let summary = self.insert_raw_batch(records, &mut metrics).await?;

        metrics.finalize(false);
        self.record_metrics(&metrics).await;
        Ok(summary)
    }

    /// Insert records and fold the counts into `metrics`. Writes no
    /// metrics row; the caller records the run once it is finished.
    ///
    /// Each record is written independently: one failure is logged and
    /// counted without aborting the rest.
    pub async fn insert_raw_batch(
        &self,
        records: &[CanonicalRecord],
        metrics: &mut RunMetrics,
    ) -> Result<InsertSummary> {
        self.check_writable()?;
        let mut summary = InsertSummary::default();
        let collected_at = Utc::now().to_rfc3339();

        for record in records {
            let record = record.clone().with_repaired_compensation();
            match self.insert_one(&record, &collected_at).await {
                Ok(true) => {
                    summary.inserted += 1;
                    summary.inserted_ids.push(record.job_id);
                }
                Ok(false) => {
                    debug!(job_id = %record.job_id, "already stored");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    warn!(job_id = %record.job_id, error = %e, "failed to store record");
                    metrics.errors.push(format!("{}: {e}", record.job_id));
                    summary.errors += 1;
                }
            }
        }

        metrics.jobs_valid += summary.inserted as u64;
        metrics.jobs_duplicates += summary.duplicates as u64;
        metrics.jobs_failed += summary.errors as u64;

        info!(
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            errors = summary.errors,
            "raw batch stored"
        );
        Ok(summary)
    }

    /// Returns `false` when the id already exists.
    async fn insert_one(&self, record: &CanonicalRecord, collected_at: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "INSERT INTO jobs_raw (job_id, source, title, company, city, province, description,
                   salary_min, salary_max, remote_type, posted_date, url, collected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(job_id) DO NOTHING",
                params![
                    record.job_id.as_str(),
                    record.source.as_str(),
                    record.title.as_str(),
                    record.company.as_str(),
                    record.city.as_str(),
                    record.province.as_str(),
                    record.description.as_str(),
                    record.salary_min,
                    record.salary_max,
                    record.remote_type.map(|m| m.as_str()),
                    record.posted_date.to_string(),
                    record.url.as_str(),
                    collected_at,
                ],
            )
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Refresh an existing record with the description, compensation, and
    /// work mode of a newer copy. Empty or missing incoming values keep the
    /// stored ones. Returns whether a row was updated.
    pub async fn supersede_raw(&self, record: &CanonicalRecord) -> Result<bool> {
        self.check_writable()?;
        let record = record.clone().with_repaired_compensation();
        let affected = self
            .conn
            .execute(
                "UPDATE jobs_raw SET
                   description = CASE WHEN ?2 <> '' THEN ?2 ELSE description END,
                   salary_min = COALESCE(?3, salary_min),
                   salary_max = COALESCE(?4, salary_max),
                   remote_type = COALESCE(?5, remote_type)
                 WHERE job_id = ?1",
                params![
                    record.job_id.as_str(),
                    record.description.as_str(),
                    record.salary_min,
                    record.salary_max,
                    record.remote_type.map(|m| m.as_str()),
                ],
            )
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Get a raw record by id.
    pub async fn get_raw(&self, job_id: &str) -> Result<Option<CanonicalRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RAW_COLUMNS} FROM jobs_raw WHERE job_id = ?1"),
                params![job_id],
            )
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(JobCompassError::Storage(e.to_string())),
        }
    }

    /// Most recently posted records first.
    pub async fn list_raw(&self, limit: u32) -> Result<Vec<CanonicalRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RAW_COLUMNS} FROM jobs_raw
                     ORDER BY posted_date DESC, job_id
                     LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    /// Ids already stored, optionally restricted to one source.
    pub async fn existing_ids(&self, source: Option<Source>) -> Result<HashSet<String>> {
        let mut rows = match source {
            Some(source) => {
                self.conn
                    .query(
                        "SELECT job_id FROM jobs_raw WHERE source = ?1",
                        params![source.as_str()],
                    )
                    .await
            }
            None => self.conn.query("SELECT job_id FROM jobs_raw", params![]).await,
        }
        .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        let mut ids = HashSet::new();
        while let Ok(Some(row)) = rows.next().await {
            ids.insert(
                row.get::<String>(0)
                    .map_err(|e| JobCompassError::Storage(e.to_string()))?,
            );
        }
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Features
    // -----------------------------------------------------------------------

    /// Upsert features. On conflict only non-null incoming values replace
    /// stored ones. Returns how many rows were inserted or updated.
    pub async fn insert_features(&self, features: &[DerivedFeatures]) -> Result<usize> {
        self.check_writable()?;
        let extracted_at = Utc::now().to_rfc3339();
        let mut written = 0;

        for f in features {
            let skills = to_json(&f.skills)?;
            let result = self
                .conn
                .execute(
                    "INSERT INTO jobs_features (job_id, exp_min, exp_max, exp_level, skills,
                       is_remote, remote_type, role, confidence, extracted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(job_id) DO UPDATE SET
                       exp_min = COALESCE(excluded.exp_min, jobs_features.exp_min),
                       exp_max = COALESCE(excluded.exp_max, jobs_features.exp_max),
                       exp_level = COALESCE(excluded.exp_level, jobs_features.exp_level),
                       skills = COALESCE(excluded.skills, jobs_features.skills),
                       is_remote = COALESCE(excluded.is_remote, jobs_features.is_remote),
                       remote_type = COALESCE(excluded.remote_type, jobs_features.remote_type),
                       role = COALESCE(excluded.role, jobs_features.role),
                       confidence = COALESCE(excluded.confidence, jobs_features.confidence),
                       extracted_at = excluded.extracted_at",
                    params![
                        f.job_id.as_str(),
                        f.exp_min,
                        f.exp_max,
                        f.exp_level.as_str(),
                        skills,
                        i64::from(f.is_remote),
                        f.remote_type.map(|m| m.as_str()),
                        f.role.as_str(),
                        f64::from(f.confidence),
                        extracted_at.as_str(),
                    ],
                )
                .await;

            match result {
                Ok(_) => written += 1,
                Err(e) => warn!(job_id = %f.job_id, error = %e, "failed to store features"),
            }
        }

        debug!(written, "features stored");
        Ok(written)
    }

    /// Get features for a record.
    pub async fn get_features(&self, job_id: &str) -> Result<Option<DerivedFeatures>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {FEATURE_COLUMNS} FROM jobs_features WHERE job_id = ?1"),
                params![job_id],
            )
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_features(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(JobCompassError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    /// Write one metrics row. Failures are logged and swallowed; returns
    /// whether the row was written.
    pub async fn record_metrics(&self, metrics: &RunMetrics) -> bool {
        match self.try_record_metrics(metrics).await {
            Ok(()) => true,
            Err(e) => {
                warn!(run_id = %metrics.run_id, error = %e, "failed to record run metrics");
                false
            }
        }
    }

    async fn try_record_metrics(&self, m: &RunMetrics) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO scraper_metrics ({METRICS_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    m.run_id.to_string(),
                    m.run_date.to_rfc3339(),
                    m.jobs_collected as i64,
                    m.jobs_valid as i64,
                    m.jobs_duplicates as i64,
                    m.jobs_failed as i64,
                    to_json(&m.sources_used)?,
                    to_json(&m.jobs_by_source)?,
                    m.collection_time_ms as i64,
                    m.processing_time_ms as i64,
                    m.total_time_ms as i64,
                    to_json(&m.errors)?,
                    to_json(&m.warnings)?,
                    m.status.as_str(),
                ],
            )
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_metrics(&self, limit: u32) -> Result<Vec<RunMetrics>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {METRICS_COLUMNS} FROM scraper_metrics
                     ORDER BY run_date DESC
                     LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_metrics(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// Row counts per table.
    pub async fn table_counts(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for table in COUNTED_TABLES {
            let mut rows = self
                .conn
                .query(&format!("SELECT COUNT(*) FROM {table}"), params![])
                .await
                .map_err(|e| JobCompassError::Storage(e.to_string()))?;
            let count = match rows.next().await {
                Ok(Some(row)) => row.get::<i64>(0).unwrap_or(0),
                _ => 0,
            };
            counts.insert(table.to_string(), count.max(0) as u64);
        }
        Ok(counts)
    }

    /// Read `jobs_view`, most recently posted first.
    pub async fn query_view(&self, limit: u32) -> Result<Vec<JobView>> {
        let mut rows = self
            .conn
            .query(
                "SELECT job_id, source, title, company, city, province, description,
                   salary_min, salary_max, raw_remote_type, posted_date, url,
                   exp_min, exp_max, exp_level, skills, is_remote, role, confidence,
                   feature_remote_type
                 FROM jobs_view
                 ORDER BY posted_date DESC, job_id
                 LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| JobCompassError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let record = row_to_record(&row)?;
            let features = match row.get::<String>(14).ok() {
                Some(exp_level) => Some(DerivedFeatures {
                    job_id: record.job_id.clone(),
                    exp_min: row.get::<u32>(12).ok(),
                    exp_max: row.get::<u32>(13).ok(),
                    exp_level: parse_column(&exp_level, "exp_level")?,
                    skills: decode_json(row.get::<String>(15).ok().as_deref(), "skills")?,
                    is_remote: row.get::<i64>(16).unwrap_or(0) != 0,
                    remote_type: row
                        .get::<String>(19)
                        .ok()
                        .and_then(|mode| mode.parse().ok()),
                    role: parse_column(
                        &row.get::<String>(17)
                            .map_err(|e| JobCompassError::Storage(e.to_string()))?,
                        "role",
                    )?,
                    confidence: row.get::<f64>(18).unwrap_or(0.0) as f32,
                }),
                None => None,
            };
            results.push(JobView { record, features });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn parse_column<T>(value: &str, column: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| JobCompassError::Storage(format!("invalid {column} '{value}': {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| JobCompassError::Storage(format!("json encode: {e}")))
}

fn decode_json<T: serde::de::DeserializeOwned + Default>(
    value: Option<&str>,
    column: &str,
) -> Result<T> {
    match value {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| JobCompassError::Storage(format!("invalid {column}: {e}"))),
        None => Ok(T::default()),
    }
}

/// Convert a row whose first twelve columns are [`RAW_COLUMNS`].
fn row_to_record(row: &libsql::Row) -> Result<CanonicalRecord> {
    let source: String = row
        .get(1)
        .map_err(|e| JobCompassError::Storage(e.to_string()))?;
    let posted: String = row
        .get(10)
        .map_err(|e| JobCompassError::Storage(e.to_string()))?;

    Ok(CanonicalRecord {
        job_id: row
            .get::<String>(0)
            .map_err(|e| JobCompassError::Storage(e.to_string()))?,
        source: parse_column::<Source>(&source, "source")?,
        title: row
            .get::<String>(2)
            .map_err(|e| JobCompassError::Storage(e.to_string()))?,
        company: row
            .get::<String>(3)
            .map_err(|e| JobCompassError::Storage(e.to_string()))?,
        city: row
            .get::<String>(4)
            .map_err(|e| JobCompassError::Storage(e.to_string()))?,
        province: row.get::<String>(5).unwrap_or_default(),
        description: row.get::<String>(6).unwrap_or_default(),
        salary_min: row.get::<i64>(7).ok(),
        salary_max: row.get::<i64>(8).ok(),
        remote_type: row
            .get::<String>(9)
            .ok()
            .and_then(|mode| mode.parse().ok()),
        posted_date: NaiveDate::parse_from_str(&posted, "%Y-%m-%d")
            .map_err(|e| JobCompassError::Storage(format!("invalid posted_date: {e}")))?,
        url: row
            .get::<String>(11)
            .map_err(|e| JobCompassError::Storage(e.to_string()))?,
    })
}

/// Convert a row laid out as [`FEATURE_COLUMNS`] starting at `offset`.
fn row_to_features(row: &libsql::Row, offset: i32) -> Result<DerivedFeatures> {
    let exp_level: String = row
        .get(offset + 3)
        .map_err(|e| JobCompassError::Storage(e.to_string()))?;
    let role: String = row
        .get(offset + 7)
        .map_err(|e| JobCompassError::Storage(e.to_string()))?;

    Ok(DerivedFeatures {
        job_id: row
            .get::<String>(offset)
            .map_err(|e| JobCompassError::Storage(e.to_string()))?,
        exp_min: row.get::<u32>(offset + 1).ok(),
        exp_max: row.get::<u32>(offset + 2).ok(),
        exp_level: parse_column(&exp_level, "exp_level")?,
        skills: decode_json(row.get::<String>(offset + 4).ok().as_deref(), "skills")?,
        is_remote: row.get::<i64>(offset + 5).unwrap_or(0) != 0,
        remote_type: row
            .get::<String>(offset + 6)
            .ok()
            .and_then(|mode| mode.parse().ok()),
        role: parse_column(&role, "role")?,
        confidence: row.get::<f64>(offset + 8).unwrap_or(0.0) as f32,
    })
}

fn row_to_metrics(row: &libsql::Row) -> Result<RunMetrics> {
    let run_id: String = row
        .get(0)
        .map_err(|e| JobCompassError::Storage(e.to_string()))?;
    let run_date: String = row
        .get(1)
        .map_err(|e| JobCompassError::Storage(e.to_string()))?;
    let status: String = row
        .get(13)
        .map_err(|e| JobCompassError::Storage(e.to_string()))?;
    let count = |idx: i32| row.get::<i64>(idx).unwrap_or(0).max(0) as u64;

    Ok(RunMetrics {
        run_id: Uuid::parse_str(&run_id)
            .map_err(|e| JobCompassError::Storage(format!("invalid run_id: {e}")))?,
        run_date: DateTime::parse_from_rfc3339(&run_date)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| JobCompassError::Storage(format!("invalid date: {e}")))?,
        jobs_collected: count(2),
        jobs_valid: count(3),
        jobs_duplicates: count(4),
        jobs_failed: count(5),
        sources_used: decode_json(row.get::<String>(6).ok().as_deref(), "sources_used")?,
        jobs_by_source: decode_json(row.get::<String>(7).ok().as_deref(), "jobs_by_source")?,
        collection_time_ms: count(8),
        processing_time_ms: count(9),
        total_time_ms: count(10),
        errors: decode_json(row.get::<String>(11).ok().as_deref(), "errors")?,
        warnings: decode_json(row.get::<String>(12).ok().as_deref(), "warnings")?,
        status: parse_column(&status, "status")?,
    })
}
