//! Application configuration for JobCompass.
//!
//! User config lives at `~/.jobcompass/jobcompass.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JobCompassError, Result};
use crate::types::Source;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jobcompass.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jobcompass";

// ---------------------------------------------------------------------------
// Config structs (matching jobcompass.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Source selection and politeness.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Names of env vars holding API credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Retry policy.
    #[serde(default)]
    pub retry: RetrySection,

    /// Record validation thresholds.
    #[serde(default)]
    pub validation: ValidationSection,

    /// Deduplication settings.
    #[serde(default)]
    pub dedup: DedupSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// SQLite/libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Cities searched when none are given on the command line.
    #[serde(default = "default_cities")]
    pub cities: Vec<String>,

    /// Role keywords searched when none are given on the command line.
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,

    /// Pages fetched per (source, city, role).
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Concurrent (source, city, role) units.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Stop scheduling new fetches once this many records were collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_total: Option<u64>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            cities: default_cities(),
            roles: default_roles(),
            max_pages: default_max_pages(),
            concurrency: default_concurrency(),
            target_total: None,
        }
    }
}

fn default_database_path() -> String {
    "~/.jobcompass/jobs.db".into()
}
fn default_cities() -> Vec<String> {
    ["Toronto", "Vancouver", "Montreal", "Calgary", "Ottawa"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_roles() -> Vec<String> {
    [
        "data analyst",
        "data scientist",
        "data engineer",
        "software engineer",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_max_pages() -> u32 {
    3
}
fn default_concurrency() -> u32 {
    4
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Enabled sources, by tag.
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<Source>,

    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-HTTP-call timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Minimum ms between JobBank requests.
    #[serde(default = "default_jobbank_interval")]
    pub jobbank_min_interval_ms: u64,

    /// Minimum ms between requests for API and feed sources.
    #[serde(default = "default_api_interval")]
    pub api_min_interval_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            jobbank_min_interval_ms: default_jobbank_interval(),
            api_min_interval_ms: default_api_interval(),
        }
    }
}

fn default_enabled_sources() -> Vec<Source> {
    vec![Source::JobBank, Source::JSearch, Source::Adzuna, Source::RemoteOk]
}
fn default_user_agent() -> String {
    concat!("JobCompass/", env!("CARGO_PKG_VERSION")).into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_jobbank_interval() -> u64 {
    2500
}
fn default_api_interval() -> u64 {
    500
}

/// `[credentials]` section. Stores env var names, never the keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_rapidapi_key_env")]
    pub rapidapi_key_env: String,

    #[serde(default = "default_adzuna_app_id_env")]
    pub adzuna_app_id_env: String,

    #[serde(default = "default_adzuna_app_key_env")]
    pub adzuna_app_key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            rapidapi_key_env: default_rapidapi_key_env(),
            adzuna_app_id_env: default_adzuna_app_id_env(),
            adzuna_app_key_env: default_adzuna_app_key_env(),
        }
    }
}

fn default_rapidapi_key_env() -> String {
    "RAPIDAPI_KEY".into()
}
fn default_adzuna_app_id_env() -> String {
    "ADZUNA_APP_ID".into()
}
fn default_adzuna_app_key_env() -> String {
    "ADZUNA_APP_KEY".into()
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_ceiling")]
    pub backoff_ceiling_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_ceiling_ms: default_backoff_ceiling(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    2000
}
fn default_backoff_ceiling() -> u64 {
    10_000
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Postings older than this many days are rejected.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,

    /// Annual compensation floor.
    #[serde(default = "default_min_compensation")]
    pub min_annual_compensation: i64,

    /// Compensation ceiling.
    #[serde(default = "default_max_compensation")]
    pub max_compensation: i64,

    /// Largest accepted `max / min` ratio.
    #[serde(default = "default_max_range_ratio")]
    pub max_range_ratio: i64,

    /// Also reject spam phrasing.
    #[serde(default)]
    pub strict_mode: bool,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            min_annual_compensation: default_min_compensation(),
            max_compensation: default_max_compensation(),
            max_range_ratio: default_max_range_ratio(),
            strict_mode: false,
        }
    }
}

fn default_max_age_days() -> i64 {
    90
}
fn default_min_compensation() -> i64 {
    10_000
}
fn default_max_compensation() -> i64 {
    500_000
}
fn default_max_range_ratio() -> i64 {
    100
}

/// What the fuzzy dedup pass does with flagged pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NearDuplicateMode {
    /// Flag pairs in the report only.
    #[default]
    Report,
    /// Drop the later record of each flagged pair.
    Remove,
}

/// `[dedup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSection {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default)]
    pub near_duplicate_mode: NearDuplicateMode,

    /// Skip the fuzzy pass entirely.
    #[serde(default = "default_true")]
    pub fuzzy_enabled: bool,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            near_duplicate_mode: NearDuplicateMode::Report,
            fuzzy_enabled: true,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime retry policy parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RetryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.retry.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.retry.backoff_base_ms),
            backoff_ceiling: Duration::from_millis(config.retry.backoff_ceiling_ms),
        }
    }
}

/// Runtime HTTP/adapter settings.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub jobbank_min_interval: Duration,
    pub api_min_interval: Duration,
    pub retry: RetryConfig,
    /// Resolved RapidAPI key, if the env var is set.
    pub rapidapi_key: Option<String>,
    /// Resolved Adzuna `(app_id, app_key)`, if both env vars are set.
    pub adzuna_credentials: Option<(String, String)>,
}

impl From<&AppConfig> for SourceConfig {
    fn from(config: &AppConfig) -> Self {
        let adzuna_credentials = match (
            read_credential(&config.credentials.adzuna_app_id_env),
            read_credential(&config.credentials.adzuna_app_key_env),
        ) {
            (Some(id), Some(key)) => Some((id, key)),
            _ => None,
        };
        Self {
            user_agent: config.sources.user_agent.clone(),
            request_timeout: Duration::from_secs(config.sources.request_timeout_secs),
            jobbank_min_interval: Duration::from_millis(config.sources.jobbank_min_interval_ms),
            api_min_interval: Duration::from_millis(config.sources.api_min_interval_ms),
            retry: RetryConfig::from(config),
            rapidapi_key: read_credential(&config.credentials.rapidapi_key_env),
            adzuna_credentials,
        }
    }
}

/// Runtime validation thresholds.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub max_age_days: i64,
    pub min_annual_compensation: i64,
    pub max_compensation: i64,
    pub max_range_ratio: i64,
    pub strict_mode: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ValidationConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_age_days: config.validation.max_age_days,
            min_annual_compensation: config.validation.min_annual_compensation,
            max_compensation: config.validation.max_compensation,
            max_range_ratio: config.validation.max_range_ratio,
            strict_mode: config.validation.strict_mode,
        }
    }
}

/// Runtime dedup settings.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub similarity_threshold: f64,
    pub near_duplicate_mode: NearDuplicateMode,
    pub fuzzy_enabled: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DedupConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            similarity_threshold: config.dedup.similarity_threshold,
            near_duplicate_mode: config.dedup.near_duplicate_mode,
            fuzzy_enabled: config.dedup.fuzzy_enabled,
        }
    }
}

/// Runtime collection run settings.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub database_path: PathBuf,
    pub sources: Vec<Source>,
    pub cities: Vec<String>,
    pub roles: Vec<String>,
    pub max_pages: u32,
    pub concurrency: usize,
    pub target_total: Option<u64>,
    /// Update description/compensation of already stored records instead
    /// of dropping them as cross-run duplicates.
    pub refresh_existing: bool,
}

impl From<&AppConfig> for CollectConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            database_path: expand_home(&config.defaults.database_path),
            sources: config.sources.enabled.clone(),
            cities: config.defaults.cities.clone(),
            roles: config.defaults.roles.clone(),
            max_pages: config.defaults.max_pages.max(1),
            concurrency: config.defaults.concurrency.max(1) as usize,
            target_total: config.defaults.target_total,
            refresh_existing: false,
        }
    }
}

fn read_credential(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.jobcompass/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| JobCompassError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jobcompass/jobcompass.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| JobCompassError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        JobCompassError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| JobCompassError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| JobCompassError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| JobCompassError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// List enabled sources whose credentials are missing.
pub fn missing_credentials(config: &AppConfig) -> Vec<(Source, String)> {
    let creds = &config.credentials;
    let mut missing = Vec::new();
    for source in &config.sources.enabled {
        let vars = match source {
            Source::JSearch => vec![&creds.rapidapi_key_env],
            Source::Adzuna => vec![&creds.adzuna_app_id_env, &creds.adzuna_app_key_env],
            _ => Vec::new(),
        };
        for var in vars {
            if read_credential(var).is_none() {
                missing.push((*source, var.clone()));
            }
        }
    }
    missing
}
