//! Shared types, error model, and configuration for JobCompass.
//!
//! This crate is the foundation depended on by all other JobCompass crates.
//! It provides:
//! - [`JobCompassError`]: the unified error type
//! - Domain types ([`CanonicalRecord`], [`DerivedFeatures`], [`RunMetrics`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)
//! - Canadian region vocabulary ([`regions`])

pub mod config;
pub mod error;
pub mod regions;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectConfig, CredentialsConfig, DedupConfig, DedupSection, DefaultsConfig,
    NearDuplicateMode, RetryConfig, RetrySection, SourceConfig, SourcesConfig, ValidationConfig,
    ValidationSection, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, missing_credentials,
};
pub use error::{JobCompassError, Result};
pub use types::{
    CanonicalRecord, DerivedFeatures, RoleCategory, RunMetrics, RunStatus, SeniorityTier, Source,
    WorkMode, record_id,
};
