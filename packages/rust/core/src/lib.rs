//! Run orchestration for JobCompass.
//!
//! This crate ties together the source adapters, validation, deduplication,
//! feature extraction, and storage into end-to-end workflows
//! ([`run_collection`], [`reprocess_features`]).

pub mod pipeline;
pub mod process;

pub use pipeline::{ProgressReporter, RunConfig, RunReport, SilentProgress, run_collection};
pub use process::{ProcessReport, reprocess_features};
