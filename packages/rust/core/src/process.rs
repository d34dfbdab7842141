//! Re-extract features for records already in storage.
//!
//! Used after the extraction rules change: raw records are left alone and
//! only `jobs_features` is rewritten.

use std::time::{Duration, Instant};

use tracing::{info, instrument};

use jobcompass_processing::extract_batch;
use jobcompass_shared::Result;
use jobcompass_storage::Storage;

use crate::pipeline::ProgressReporter;

/// Result of [`reprocess_features`].
#[derive(Debug)]
pub struct ProcessReport {
    /// Raw records read.
    pub records: usize,
    /// Feature rows inserted or updated.
    pub written: usize,
    /// Records whose seniority fell back to the default tier.
    pub default_seniority: usize,
    pub elapsed: Duration,
}

/// Re-extract features for the `limit` most recently posted records.
#[instrument(skip_all, fields(limit = limit))]
pub async fn reprocess_features(
    storage: &Storage,
    limit: u32,
    progress: &dyn ProgressReporter,
) -> Result<ProcessReport> {
    let start = Instant::now();

    progress.phase("Loading stored records");
    let records = storage.list_raw(limit).await?;

    progress.phase("Extracting features");
    let features = extract_batch(&records);
    let default_seniority = features.iter().filter(|f| f.seniority_is_default()).count();
    let written = storage.insert_features(&features).await?;

    let report = ProcessReport {
        records: records.len(),
        written,
        default_seniority,
        elapsed: start.elapsed(),
    };

    info!(
        records = report.records,
        written = report.written,
        default_seniority = report.default_seniority,
        elapsed_ms = report.elapsed.as_millis(),
        "reprocessing complete"
    );

    Ok(report)
}
