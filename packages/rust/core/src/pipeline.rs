//! End-to-end collection run: adapters → validate → dedupe → store → features.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use jobcompass_collectors::{Harvest, SearchQuery, SourceAdapter};
use jobcompass_processing::{dedupe, dedupe_against_known, extract_batch, validate_batch};
use jobcompass_shared::{
    AppConfig, CanonicalRecord, CollectConfig, DedupConfig, JobCompassError, Result, RunMetrics,
    Source, ValidationConfig,
};
use jobcompass_storage::Storage;

/// Everything a collection run needs besides its adapters and storage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub collect: CollectConfig,
    pub validation: ValidationConfig,
    pub dedup: DedupConfig,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            collect: CollectConfig::from(config),
            validation: ValidationConfig::from(config),
            dedup: DedupConfig::from(config),
        }
    }
}

/// Result of [`run_collection`].
#[derive(Debug)]
pub struct RunReport {
    /// The metrics row written for this run.
    pub metrics: RunMetrics,
    /// Records newly stored.
    pub inserted: usize,
    /// Stored records refreshed from a newer copy.
    pub refreshed: usize,
    /// Feature rows inserted or updated.
    pub features_written: usize,
    /// Rejections per reason code.
    pub rejections: BTreeMap<String, usize>,
    /// Near-duplicate pairs flagged by the fuzzy pass.
    pub near_duplicates: usize,
    /// Sources skipped after an auth or config failure.
    pub disabled_sources: Vec<Source>,
    /// Units never fetched (cancelled, target reached, or source disabled).
    pub skipped_units: usize,
    pub cancelled: bool,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each (source, city, role) unit finishes paging.
    fn query_harvested(
        &self,
        source: Source,
        query: &SearchQuery,
        records: usize,
        completed: usize,
        total: usize,
    );
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn query_harvested(
        &self,
        _source: Source,
        _query: &SearchQuery,
        _records: usize,
        _completed: usize,
        _total: usize,
    ) {
    }
    fn done(&self, _report: &RunReport) {}
}

enum UnitOutcome {
    Harvested {
        source: Source,
        query: SearchQuery,
        harvest: Harvest,
    },
    Skipped,
}

/// Run one collection pass.
///
/// 1. Collect: every adapter × city × role, `concurrency` units at a time
/// 2. Validate
/// 3. Deduplicate within the batch and against stored ids
/// 4. Store raw records
/// 5. Extract and store features
///
/// Exactly one metrics row is written per run, including cancelled runs and
/// runs whose storage step failed.
#[instrument(skip_all, fields(sources = adapters.len(), concurrency = config.collect.concurrency))]
pub async fn run_collection(
    config: &RunConfig,
    adapters: &[Arc<dyn SourceAdapter>],
    storage: &Storage,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let start = Instant::now();
    let collect = &config.collect;
    let mut metrics = RunMetrics::start();

    info!(run_id = %metrics.run_id, "starting collection run");

    // --- Phase 1: Collect ---
    progress.phase("Collecting postings");
    let units: Vec<(Arc<dyn SourceAdapter>, SearchQuery)> = adapters
        .iter()
        .flat_map(|adapter| {
            collect.cities.iter().flat_map(move |city| {
                collect
                    .roles
                    .iter()
                    .map(move |role| (Arc::clone(adapter), SearchQuery::new(city, role)))
            })
        })
        .collect();
    let total_units = units.len();

    let collected = AtomicU64::new(0);
    let finished = AtomicUsize::new(0);
    let disabled: Mutex<HashSet<Source>> = Mutex::new(HashSet::new());

    let outcomes: Vec<UnitOutcome> = stream::iter(units.into_iter().map(|(adapter, query)| {
        let collected = &collected;
        let finished = &finished;
        let disabled = &disabled;
        async move {
            let source = adapter.source();
            if cancel.is_cancelled() {
                return UnitOutcome::Skipped;
            }
            if collect
                .target_total
                .is_some_and(|target| collected.load(Ordering::SeqCst) >= target)
            {
                debug!(%source, city = %query.city, role = %query.role, "target reached, unit skipped");
                return UnitOutcome::Skipped;
            }
            if disabled
                .lock()
                .map(|set| set.contains(&source))
                .unwrap_or(false)
            {
                debug!(%source, "source disabled, unit skipped");
                return UnitOutcome::Skipped;
            }

            let harvest = adapter.fetch(&query, collect.max_pages).await;
            collected.fetch_add(harvest.records.len() as u64, Ordering::SeqCst);
            if harvest.source_disabled() {
                if let Ok(mut set) = disabled.lock() {
                    set.insert(source);
                }
            }

            let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
            progress.query_harvested(source, &query, harvest.records.len(), done, total_units);
            UnitOutcome::Harvested {
                source,
                query,
                harvest,
            }
        }
    }))
    .buffer_unordered(collect.concurrency.max(1))
    .collect()
    .await;

    let mut records: Vec<CanonicalRecord> = Vec::new();
    let mut skipped_units = 0;
    for outcome in outcomes {
        match outcome {
            UnitOutcome::Harvested {
                source,
                query,
                harvest,
            } => {
                if let Some(e) = &harvest.error {
                    metrics
                        .errors
                        .push(format!("{source} {}/{}: {e}", query.city, query.role));
                }
                records.extend(harvest.records);
            }
            UnitOutcome::Skipped => skipped_units += 1,
        }
    }

    let mut disabled_sources: Vec<Source> = disabled
        .into_inner()
        .map(|set| set.into_iter().collect())
        .unwrap_or_default();
    disabled_sources.sort();
    for source in &disabled_sources {
        metrics
            .warnings
            .push(format!("{source} skipped for the rest of the run"));
    }

    let cancelled = cancel.is_cancelled();
    if cancelled {
        warn!(skipped_units, "run cancelled, processing what was collected");
        metrics.warnings.push("run cancelled".into());
    }

    metrics.count_collected(&records);
    metrics.collection_time_ms = start.elapsed().as_millis() as u64;
    info!(
        collected = metrics.jobs_collected,
        units = total_units,
        skipped_units,
        "collection phase complete"
    );

    // --- Phase 2: Validate ---
    let processing_start = Instant::now();
    progress.phase("Validating records");
    let today = Utc::now().date_naive();
    let validation = validate_batch(records, &config.validation, today);
    metrics.jobs_failed += validation.rejected.len() as u64;
    let rejections: BTreeMap<String, usize> = validation
        .reason_counts()
        .into_iter()
        .map(|(reason, count)| (reason.as_str().to_string(), count))
        .collect();

    // --- Phase 3: Deduplicate ---
    progress.phase("Removing duplicates");
    let dedup = dedupe(validation.accepted, &config.dedup);
    metrics.jobs_duplicates += dedup.removed() as u64;
    let near_duplicates = dedup.near_duplicates.len();
    if near_duplicates > 0 {
        metrics
            .warnings
            .push(format!("{near_duplicates} near-duplicate pairs flagged"));
    }

    let known = match storage.existing_ids(None).await {
        Ok(ids) => ids,
        Err(e) => return Err(abort_run(storage, metrics, start, e).await),
    };

    let mut refreshed = Vec::new();
    if collect.refresh_existing {
        for record in dedup.unique.iter().filter(|r| known.contains(&r.job_id)) {
            match storage.supersede_raw(record).await {
                Ok(true) => refreshed.push(record.clone()),
                Ok(false) => {}
                Err(e) => warn!(job_id = %record.job_id, error = %e, "refresh failed"),
            }
        }
    }
    let (fresh, known_dropped) = dedupe_against_known(dedup.unique, &known);
    metrics.jobs_duplicates += known_dropped as u64;

    // --- Phase 4: Store raw records ---
    progress.phase("Storing records");
    let summary = match storage.insert_raw_batch(&fresh, &mut metrics).await {
        Ok(summary) => summary,
        Err(e) => return Err(abort_run(storage, metrics, start, e).await),
    };

    // --- Phase 5: Features ---
    progress.phase("Extracting features");
    // Only rows that actually landed in jobs_raw get features.
    let stored: HashSet<&str> = summary.inserted_ids.iter().map(String::as_str).collect();
    let mut to_extract: Vec<CanonicalRecord> = fresh
        .into_iter()
        .filter(|r| stored.contains(r.job_id.as_str()))
        .collect();
    to_extract.extend(refreshed.iter().cloned());
    let features = extract_batch(&to_extract);
    let features_written = match storage.insert_features(&features).await {
        Ok(written) => written,
        Err(e) => {
            warn!(error = %e, "feature storage failed");
            metrics.errors.push(format!("features: {e}"));
            0
        }
    };

    metrics.processing_time_ms = processing_start.elapsed().as_millis() as u64;
    metrics.total_time_ms = start.elapsed().as_millis() as u64;
    metrics.finalize(cancelled);
    storage.record_metrics(&metrics).await;

    let report = RunReport {
        inserted: summary.inserted,
        refreshed: refreshed.len(),
        features_written,
        rejections,
        near_duplicates,
        disabled_sources,
        skipped_units,
        cancelled,
        metrics,
    };

    progress.done(&report);

    info!(
        run_id = %report.metrics.run_id,
        status = report.metrics.status.as_str(),
        collected = report.metrics.jobs_collected,
        valid = report.metrics.jobs_valid,
        duplicates = report.metrics.jobs_duplicates,
        failed = report.metrics.jobs_failed,
        elapsed_ms = report.metrics.total_time_ms,
        "collection run complete"
    );

    Ok(report)
}

/// Record what the run got through before a storage failure and hand the
/// error back.
async fn abort_run(
    storage: &Storage,
    mut metrics: RunMetrics,
    start: Instant,
    error: JobCompassError,
) -> JobCompassError {
    warn!(error = %error, "run aborted");
    metrics.errors.push(error.to_string());
    metrics.total_time_ms = start.elapsed().as_millis() as u64;
    metrics.finalize(false);
    storage.record_metrics(&metrics).await;
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use jobcompass_shared::{RunStatus, record_id};
    use uuid::Uuid;

    struct FakeAdapter {
        source: Source,
        page: Vec<CanonicalRecord>,
        auth_failure: bool,
        calls: AtomicUsize,
    }

    impl FakeAdapter {
        fn new(page: Vec<CanonicalRecord>) -> Self {
            Self {
                source: Source::JobBank,
                page,
                auth_failure: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn source(&self) -> Source {
            self.source
        }

        async fn fetch_page(
            &self,
            _query: &SearchQuery,
            page: u32,
        ) -> Result<Vec<CanonicalRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.auth_failure {
                return Err(JobCompassError::auth("jobbank", "key rejected"));
            }
            Ok(if page == 1 { self.page.clone() } else { vec![] })
        }
    }

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("jc_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn run_config(cities: &[&str], target_total: Option<u64>) -> RunConfig {
        RunConfig {
            collect: CollectConfig {
                database_path: std::env::temp_dir().join("unused.db"),
                sources: vec![Source::JobBank],
                cities: cities.iter().map(|c| c.to_string()).collect(),
                roles: vec!["data analyst".into()],
                max_pages: 3,
                concurrency: 1,
                target_total,
                refresh_existing: false,
            },
            validation: ValidationConfig::default(),
            dedup: DedupConfig::default(),
        }
    }

    fn record(id: &str, title: &str) -> CanonicalRecord {
        CanonicalRecord {
            source: Source::JobBank,
            job_id: record_id(Source::JobBank, id),
            title: title.into(),
            company: "Maple Analytics Inc.".into(),
            city: "Toronto".into(),
            province: "ON".into(),
            description: "3-5 years of SQL and Python experience.".into(),
            salary_min: Some(60_000),
            salary_max: Some(80_000),
            remote_type: None,
            posted_date: Utc::now().date_naive() - Duration::days(2),
            url: format!("https://www.jobbank.gc.ca/jobsearch/jobposting/{id}"),
        }
    }

    #[tokio::test]
    async fn end_to_end_counts_rejections_and_duplicates() {
        let storage = test_storage().await;
        let good = record("1", "Data Analyst");
        let mut lowball = record("2", "Junior Data Analyst");
        lowball.salary_min = Some(8);
        lowball.salary_max = Some(35);
        let mut repeat = good.clone();
        repeat.description = "Same id, different text".into();

        let adapter: Arc<dyn SourceAdapter> = Arc::new(FakeAdapter::new(vec![good, lowball, repeat]));
        let report = run_collection(
            &run_config(&["Toronto"], None),
            &[adapter],
            &storage,
            &CancellationToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.inserted, 1);
        assert_eq!(report.metrics.jobs_collected, 3);
        assert_eq!(report.metrics.jobs_duplicates, 1);
        assert_eq!(report.metrics.jobs_failed, 1);
        assert_eq!(report.metrics.jobs_valid, 1);
        assert_eq!(report.metrics.status, RunStatus::Completed);
        assert_eq!(report.rejections.get("implausible_compensation"), Some(&1));
        assert_eq!(report.features_written, 1);

        let stored = storage
            .get_raw("jobbank_1")
            .await
            .expect("get")
            .expect("persisted");
        assert_eq!(stored.title, "Data Analyst");
        assert_eq!(stored.city, "Toronto");
        assert_eq!(stored.province, "ON");
        assert!(stored.description.starts_with("3-5 years"));

        let counts = storage.table_counts().await.expect("counts");
        assert_eq!(counts["jobs_raw"], 1);
        assert_eq!(counts["jobs_features"], 1);
        assert_eq!(counts["scraper_metrics"], 1);

        let runs = storage.list_metrics(5).await.expect("metrics");
        assert_eq!(runs[0].run_id, report.metrics.run_id);
        assert_eq!(runs[0].jobs_collected, 3);
    }

    #[tokio::test]
    async fn second_run_stores_nothing_new() {
        let storage = test_storage().await;
        let config = run_config(&["Toronto"], None);

        for expected_inserted in [1, 0] {
            let adapter: Arc<dyn SourceAdapter> =
                Arc::new(FakeAdapter::new(vec![record("1", "Data Analyst")]));
            let report = run_collection(
                &config,
                &[adapter],
                &storage,
                &CancellationToken::new(),
                &SilentProgress,
            )
            .await
            .expect("run");
            assert_eq!(report.inserted, expected_inserted);
        }

        let runs = storage.list_metrics(5).await.expect("metrics");
        assert_eq!(runs.len(), 2);
        let latest = runs
            .iter()
            .find(|m| m.jobs_valid == 0)
            .expect("second run");
        assert_eq!(latest.jobs_duplicates, 1);
        assert_eq!(latest.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn cancelled_before_start_still_records_metrics() {
        let storage = test_storage().await;
        let fake = Arc::new(FakeAdapter::new(vec![record("1", "Data Analyst")]));
        let adapter: Arc<dyn SourceAdapter> = fake.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_collection(
            &run_config(&["Toronto", "Ottawa"], None),
            &[adapter],
            &storage,
            &cancel,
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(fake.calls(), 0);
        assert!(report.cancelled);
        assert_eq!(report.skipped_units, 2);
        assert_eq!(report.metrics.status, RunStatus::Failed);
        assert_eq!(storage.table_counts().await.expect("counts")["scraper_metrics"], 1);
    }

    #[tokio::test]
    async fn target_total_stops_scheduling_units() {
        let storage = test_storage().await;
        let fake = Arc::new(FakeAdapter::new(vec![record("1", "Data Analyst")]));
        let adapter: Arc<dyn SourceAdapter> = fake.clone();

        let report = run_collection(
            &run_config(&["Toronto", "Ottawa", "Calgary"], Some(1)),
            &[adapter],
            &storage,
            &CancellationToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run");

        // First unit: page 1 with records, page 2 empty.
        assert_eq!(fake.calls(), 2);
        assert_eq!(report.skipped_units, 2);
        assert_eq!(report.metrics.jobs_collected, 1);
        assert!(!report.cancelled);
        assert_eq!(report.metrics.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn auth_failure_disables_source_for_the_run() {
        let storage = test_storage().await;
        let fake = Arc::new(FakeAdapter {
            auth_failure: true,
            ..FakeAdapter::new(vec![])
        });
        let adapter: Arc<dyn SourceAdapter> = fake.clone();

        let report = run_collection(
            &run_config(&["Toronto", "Ottawa"], None),
            &[adapter],
            &storage,
            &CancellationToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(fake.calls(), 1);
        assert_eq!(report.disabled_sources, vec![Source::JobBank]);
        assert_eq!(report.skipped_units, 1);
        assert_eq!(report.metrics.errors.len(), 1);
        assert_eq!(report.metrics.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn refresh_existing_supersedes_stored_records() {
        let storage = test_storage().await;
        let mut original = record("1", "Data Analyst");
        original.description = String::new();
        storage.insert_raw(&[original]).await.expect("seed");

        let mut config = run_config(&["Toronto"], None);
        config.collect.refresh_existing = true;
        let adapter: Arc<dyn SourceAdapter> =
            Arc::new(FakeAdapter::new(vec![record("1", "Data Analyst")]));

        let report = run_collection(
            &config,
            &[adapter],
            &storage,
            &CancellationToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.inserted, 0);
        assert_eq!(report.refreshed, 1);
        let stored = storage.get_raw("jobbank_1").await.expect("get").expect("row");
        assert!(stored.description.starts_with("3-5 years"));
        assert!(storage.get_features("jobbank_1").await.expect("features").is_some());
    }

    #[tokio::test]
    async fn failed_insert_gets_no_features() {
        let tmp = std::env::temp_dir().join(format!("jc_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open");

        // Make the second record's raw insert fail.
        let db = libsql::Builder::new_local(&tmp).build().await.expect("side db");
        let conn = db.connect().expect("side conn");
        conn.execute(
            "CREATE TRIGGER reject_second BEFORE INSERT ON jobs_raw
             WHEN NEW.job_id = 'jobbank_2'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
            (),
        )
        .await
        .expect("trigger");
        drop(conn);
        drop(db);

        let mut other = record("2", "Senior Data Engineer");
        other.company = "Prairie Grain Co-op".into();
        let adapter: Arc<dyn SourceAdapter> =
            Arc::new(FakeAdapter::new(vec![record("1", "Data Analyst"), other]));

        let report = run_collection(
            &run_config(&["Toronto"], None),
            &[adapter],
            &storage,
            &CancellationToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run");

        assert_eq!(report.inserted, 1);
        assert_eq!(report.features_written, 1);
        assert_eq!(report.metrics.jobs_failed, 1);
        assert!(storage.get_features("jobbank_1").await.expect("get").is_some());
        assert!(storage.get_features("jobbank_2").await.expect("get").is_none());

        let counts = storage.table_counts().await.expect("counts");
        assert_eq!(counts["jobs_raw"], 1);
        assert_eq!(counts["jobs_features"], 1);
    }
}
