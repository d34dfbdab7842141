//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jobcompass_collectors::{SearchQuery, build_adapters};
use jobcompass_core::{ProgressReporter, RunConfig, RunReport, SilentProgress};
use jobcompass_shared::{
    AppConfig, Source, SourceConfig, expand_home, init_config, load_config, missing_credentials,
};
use jobcompass_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// JobCompass: collect and analyze Canadian tech job postings.
#[derive(Parser)]
#[command(
    name = "jobcompass",
    version,
    about = "Collect, clean, and store Canadian tech job postings.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a collection pass over the configured sources.
    Collect {
        /// City to search (repeatable). Defaults to the configured cities.
        #[arg(long = "city")]
        cities: Vec<String>,

        /// Role keyword to search (repeatable). Defaults to the configured roles.
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Source to query (repeatable): jobbank, jsearch, adzuna, remoteok, indeed, workopolis.
        #[arg(long = "source")]
        sources: Vec<Source>,

        /// Maximum pages per (source, city, role).
        #[arg(long)]
        pages: Option<u32>,

        /// Stop scheduling new queries once this many records are collected.
        #[arg(long)]
        target: Option<u64>,

        /// Queries in flight at once.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Database path (overrides the config file).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Refresh stored records from newer copies instead of skipping them.
        #[arg(long)]
        refresh: bool,
    },

    /// Re-extract features for stored records.
    Process {
        /// Number of most recent records to reprocess.
        #[arg(long, default_value = "1000")]
        limit: u32,

        /// Database path (overrides the config file).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show table counts and recent runs.
    Stats {
        /// Number of recent runs to show.
        #[arg(long, default_value = "5")]
        runs: u32,

        /// Also list the most recent postings.
        #[arg(long, default_value = "0")]
        recent: u32,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// Database path (overrides the config file).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "jobcompass=info",
        1 => "jobcompass=debug",
        _ => "jobcompass=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Collect {
            cities,
            roles,
            sources,
            pages,
            target,
            concurrency,
            db,
            refresh,
        } => {
            let overrides = CollectOverrides {
                cities,
                roles,
                sources,
                pages,
                target,
                concurrency,
                db,
                refresh,
            };
            cmd_collect(overrides).await
        }
        Command::Process { limit, db } => cmd_process(limit, db).await,
        Command::Stats {
            runs,
            recent,
            json,
            db,
        } => cmd_stats(runs, recent, json, db).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// collect
// ---------------------------------------------------------------------------

/// Flags that override the config file for one `collect` run.
struct CollectOverrides {
    cities: Vec<String>,
    roles: Vec<String>,
    sources: Vec<Source>,
    pages: Option<u32>,
    target: Option<u64>,
    concurrency: Option<usize>,
    db: Option<PathBuf>,
    refresh: bool,
}

impl CollectOverrides {
    fn apply(self, run: &mut RunConfig) {
        let collect = &mut run.collect;
        if !self.cities.is_empty() {
            collect.cities = self.cities;
        }
        if !self.roles.is_empty() {
            collect.roles = self.roles;
        }
        if !self.sources.is_empty() {
            collect.sources = self.sources;
        }
        if let Some(pages) = self.pages {
            collect.max_pages = pages.max(1);
        }
        if self.target.is_some() {
            collect.target_total = self.target;
        }
        if let Some(concurrency) = self.concurrency {
            collect.concurrency = concurrency.max(1);
        }
        if let Some(db) = self.db {
            collect.database_path = db;
        }
        collect.refresh_existing = self.refresh;
    }
}

async fn cmd_collect(overrides: CollectOverrides) -> Result<()> {
    let config = load_config()?;
    let mut run_config = RunConfig::from(&config);
    overrides.apply(&mut run_config);

    if run_config.collect.cities.is_empty() || run_config.collect.roles.is_empty() {
        return Err(eyre!("no cities or roles to search; pass --city/--role or edit the config"));
    }

    for (source, var) in missing_credentials(&config) {
        if run_config.collect.sources.contains(&source) {
            warn!(%source, var = %var, "credential not set, source will be skipped");
        }
    }

    let source_config = SourceConfig::from(&config);
    let adapters = build_adapters(&source_config, &run_config.collect.sources)?;
    let storage = Storage::open(&run_config.collect.database_path).await?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight queries");
            signal_token.cancel();
        }
    });

    info!(
        sources = ?run_config.collect.sources,
        cities = run_config.collect.cities.len(),
        roles = run_config.collect.roles.len(),
        db = %run_config.collect.database_path.display(),
        "starting collection"
    );

    let reporter = CliProgress::new();
    let report =
        jobcompass_core::run_collection(&run_config, &adapters, &storage, &cancel, &reporter)
            .await?;

    print_run_report(&report);
    Ok(())
}

fn print_run_report(report: &RunReport) {
    let m = &report.metrics;
    println!();
    println!("  Run {} {}", m.run_id, m.status.as_str());
    println!("  Collected:  {}", m.jobs_collected);
    println!("  Stored:     {}", m.jobs_valid);
    println!("  Duplicates: {}", m.jobs_duplicates);
    println!("  Rejected:   {}", m.jobs_failed);
    if report.refreshed > 0 {
        println!("  Refreshed:  {}", report.refreshed);
    }
    println!("  Features:   {}", report.features_written);
    for (source, count) in &m.jobs_by_source {
        println!("    {source:<12} {count}");
    }
    if !report.rejections.is_empty() {
        println!("  Rejections:");
        for (reason, count) in &report.rejections {
            println!("    {reason:<26} {count}");
        }
    }
    for source in &report.disabled_sources {
        println!("  Skipped source: {source}");
    }
    for error in &m.errors {
        println!("  ! {error}");
    }
    println!("  Time:       {:.1}s", m.total_time_ms as f64 / 1000.0);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn query_harvested(
        &self,
        source: Source,
        query: &SearchQuery,
        records: usize,
        completed: usize,
        total: usize,
    ) {
        self.spinner.set_message(format!(
            "[{completed}/{total}] {source}: {} in {} ({records})",
            query.role, query.city
        ));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// process / stats
// ---------------------------------------------------------------------------

fn database_path(config: &AppConfig, db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| expand_home(&config.defaults.database_path))
}

async fn cmd_process(limit: u32, db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let path = database_path(&config, db);
    let storage = Storage::open(&path).await?;

    let report = jobcompass_core::reprocess_features(&storage, limit, &SilentProgress).await?;

    println!();
    println!("  Records:    {}", report.records);
    println!("  Written:    {}", report.written);
    println!("  No signal:  {}", report.default_seniority);
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_stats(runs: u32, recent: u32, json: bool, db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let path = database_path(&config, db);
    let storage = Storage::open_readonly(&path).await?;

    let counts = storage.table_counts().await?;
    let metrics = storage.list_metrics(runs).await?;
    let postings = if recent > 0 {
        storage.query_view(recent).await?
    } else {
        Vec::new()
    };

    if json {
        let value = serde_json::json!({
            "tables": counts,
            "runs": metrics,
            "recent": postings
                .iter()
                .map(|p| serde_json::json!({ "record": p.record, "features": p.features }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("  Database: {}", path.display());
    for (table, count) in &counts {
        println!("    {table:<16} {count}");
    }

    if !metrics.is_empty() {
        println!();
        println!("  Recent runs:");
        for m in &metrics {
            println!(
                "    {}  {:<9} collected {:>5}  stored {:>5}  dup {:>5}  rejected {:>5}",
                m.run_date.format("%Y-%m-%d %H:%M"),
                m.status.as_str(),
                m.jobs_collected,
                m.jobs_valid,
                m.jobs_duplicates,
                m.jobs_failed
            );
        }
    }

    if !postings.is_empty() {
        println!();
        println!("  Recent postings:");
        for p in &postings {
            let role = p.features.as_ref().map_or("-", |f| f.role.as_str());
            println!(
                "    {}  {:<40} {:<24} {:<12} {role}",
                p.record.posted_date, p.record.title, p.record.company, p.record.city
            );
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
