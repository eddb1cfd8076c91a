//! repo-pulse CLI
//!
//! Windowed contributor interaction graphs and repository activity metrics.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use repo_pulse::{
    config::{Config, EventTypes},
    core::{
        metrics::MetricSnapshot, rollup::Granularity, trend, EventCatalog, MetricName, Pipeline,
        ReportBuilder, Rollup,
    },
    sink::{stats::STATS_FILE, AggregateSink, JsonFileSink, RunStats},
    source::{ArchiveFiles, ArchiveParser, ArchiveRange, CommitLog, RawEvent, SubjectScope},
    VERSION,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "repo-pulse")]
#[command(version = VERSION)]
#[command(about = "Windowed contributor interaction graphs and repository activity metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags overriding the stored configuration.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Days per window
    #[arg(long)]
    window_size: Option<u32>,

    /// Days between window starts
    #[arg(long)]
    stride: Option<u32>,

    /// How the stride is read (direct, skip_day, after_window)
    #[arg(long)]
    stride_convention: Option<String>,

    /// Whether the latest day may start a window (exclusive, inclusive)
    #[arg(long)]
    boundary: Option<String>,

    /// Emit windows that contain no events
    #[arg(long)]
    keep_empty: bool,

    /// Reference time zone (UTC, local, or an IANA name)
    #[arg(long)]
    time_zone: Option<String>,

    /// Only keep events from the last N months
    #[arg(long)]
    months: Option<u32>,

    /// Comma-separated GH Archive event types, or "all"
    #[arg(long)]
    event_types: Option<String>,

    /// Graph subjects for GH Archive input (repository, issue)
    #[arg(long)]
    scope: Option<String>,

    /// Comma-separated repositories to compute metrics for
    #[arg(long)]
    repos: Option<String>,

    /// Only compute metrics for the K most active repositories
    #[arg(long)]
    top_k: Option<usize>,

    /// Output directory
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.stride {
            config.stride = v;
        }
        if let Some(v) = &self.stride_convention {
            config.set("stride_convention", v)?;
        }
        if let Some(v) = &self.boundary {
            config.set("boundary", v)?;
        }
        if self.keep_empty {
            config.ignore_empty_windows = false;
        }
        if let Some(v) = &self.time_zone {
            config.set("time_zone", v)?;
        }
        if let Some(v) = self.months {
            config.time_budget_months = Some(v);
        }
        if let Some(v) = &self.event_types {
            config.event_types = EventTypes::from_csv(v);
        }
        if let Some(v) = &self.scope {
            config.set("subject_scope", v)?;
        }
        if let Some(v) = &self.repos {
            config.set("repositories", v)?;
        }
        if let Some(v) = self.top_k {
            config.top_k = Some(v);
        }
        if let Some(v) = &self.output {
            config.export_path = v.clone();
        }
        config.validate()?;
        Ok(())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build interaction graphs over sliding windows
    Graph {
        /// Commit log directory (authors.json, files.json, commits.json)
        #[arg(long, conflicts_with = "archive")]
        commits: Option<PathBuf>,

        /// Hourly GH Archive files (decompressed JSON lines)
        #[arg(long, num_args = 1..)]
        archive: Vec<PathBuf>,

        /// Keep merge commits
        #[arg(long)]
        include_merge: bool,

        /// Output name (defaults to graph-<run id>)
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Compute daily repository metrics from GH Archive files
    Metrics {
        /// Hourly GH Archive files
        #[arg(required = true)]
        archive: Vec<PathBuf>,

        /// Output name (defaults to metrics-<run id>)
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Count events per repository and period
    Rollup {
        /// Hourly GH Archive files
        #[arg(required = true)]
        archive: Vec<PathBuf>,

        /// daily, weekly or monthly
        #[arg(long, default_value = "daily")]
        granularity: String,

        /// Only keep periods containing this text (e.g. 2020-03)
        #[arg(long = "match")]
        period: Option<String>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Summarise one metric across repositories from a metrics export
    Trend {
        /// Metrics export written by the metrics command
        input: PathBuf,

        /// Metric name (e.g. CommitRate)
        #[arg(long)]
        metric: String,

        /// Single date (YYYY-MM-DD); every date when omitted
        #[arg(long)]
        date: Option<String>,

        /// Comma-separated repositories to include
        #[arg(long)]
        subjects: Option<String>,
    },

    /// List GH Archive hour keys for a date range
    Keys {
        /// First day (YYYY-MM-DD)
        from: NaiveDate,

        /// Last day (YYYY-MM-DD), defaults to the first
        to: Option<NaiveDate>,

        /// Print download URLs instead of keys
        #[arg(long)]
        urls: bool,
    },

    /// Show configuration and cumulative run statistics
    Status,

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration
    Show,
    /// Change one setting
    Set { key: String, value: String },
    /// Restore defaults
    Reset,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Graph {
            commits,
            archive,
            include_merge,
            name,
            overrides,
        } => cmd_graph(commits, archive, include_merge, name, &overrides),
        Commands::Metrics {
            archive,
            name,
            overrides,
        } => cmd_metrics(archive, name, &overrides),
        Commands::Rollup {
            archive,
            granularity,
            period,
            overrides,
        } => cmd_rollup(archive, &granularity, period, &overrides),
        Commands::Trend {
            input,
            metric,
            date,
            subjects,
        } => cmd_trend(&input, &metric, date.as_deref(), subjects.as_deref()),
        Commands::Keys { from, to, urls } => {
            cmd_keys(from, to.unwrap_or(from), urls);
            Ok(())
        }
        Commands::Status => cmd_status(),
        Commands::Config { action } => cmd_config(action.unwrap_or(ConfigAction::Show)),
    }
}

fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load().context("loading configuration")?;
    overrides.apply(&mut config)?;
    Ok(config)
}

fn open_stats(config: &Config) -> RunStats {
    RunStats::with_persistence(config.data_path.join(STATS_FILE))
}

fn archive_events(paths: Vec<PathBuf>, config: &Config, scope: SubjectScope) -> ArchiveFiles {
    let parser = ArchiveParser::new(config.event_types.0.clone()).with_scope(scope);
    ArchiveFiles::new(paths, parser)
}

fn cmd_graph(
    commits: Option<PathBuf>,
    archive: Vec<PathBuf>,
    include_merge: bool,
    name: Option<String>,
    overrides: &Overrides,
) -> Result<()> {
    let mut config = load_config(overrides)?;
    config.include_merge_commits |= include_merge;
    let pipeline = Pipeline::from_config(&config)?;
    let stats = open_stats(&config);

    let (mut catalog, raw): (EventCatalog, Vec<RawEvent>) = match (commits, archive.is_empty()) {
        (Some(dir), _) => {
            let log = CommitLog::load(&dir)?;
            (
                EventCatalog::with_actors(log.actor_identities()),
                log.to_events(config.include_merge_commits),
            )
        }
        (None, false) => (
            EventCatalog::new(),
            archive_events(archive, &config, config.subject_scope).collect(),
        ),
        (None, true) => bail!("pass --commits <dir> or --archive <files>"),
    };

    let run = pipeline.run_graph(&mut catalog, raw, Utc::now());
    stats.record_ingest(&run.report);

    let builder = ReportBuilder::new()
        .with_meta("window_size", config.window_size)
        .with_meta("stride", config.stride)
        .with_meta("stride_convention", config.stride_convention.to_string())
        .with_meta("time_zone", config.time_zone.to_string())
        .with_meta("subject_scope", config.subject_scope.to_string());
    let key = name.unwrap_or_else(|| format!("graph-{}", builder.run_id()));
    let window_count = run.records.len() as u64;
    let envelope = builder.build(run.actors, run.records);

    let mut sink = JsonFileSink::new(&config.export_path);
    sink.accept(&key, &envelope)?;
    stats.record_windows(window_count);
    stats.record_run();
    stats.save()?;

    println!("Windows: {window_count}");
    println!("Actors: {}", envelope.actors.len());
    println!(
        "Skipped records: {} (outside lookback: {})",
        run.report.skipped(),
        run.lookback_dropped
    );
    println!("Wrote {:?}", sink.path_for(&key));
    Ok(())
}

fn cmd_metrics(archive: Vec<PathBuf>, name: Option<String>, overrides: &Overrides) -> Result<()> {
    let config = load_config(overrides)?;
    let pipeline = Pipeline::from_config(&config)?;
    let stats = open_stats(&config);

    let mut events = archive_events(archive, &config, SubjectScope::Repository);
    let raw: Vec<RawEvent> = events.by_ref().collect();
    let archive_stats = events.stats();

    let mut catalog = EventCatalog::new();
    let run = pipeline.run_metrics(&mut catalog, raw, Utc::now());
    stats.record_ingest(&run.report);
    stats.record_fallback_durations(run.aggregator.fallback_durations());

    let snapshot = run.aggregator.snapshot();
    let values: u64 = snapshot
        .values()
        .flat_map(|dates| dates.values())
        .map(|metrics| metrics.len() as u64)
        .sum();

    let builder = ReportBuilder::new();
    let key = name.unwrap_or_else(|| format!("metrics-{}", builder.run_id()));
    let mut sink = JsonFileSink::new(&config.export_path);
    sink.accept(&key, &snapshot)?;
    stats.record_metrics_exported(values);
    stats.record_run();
    stats.save()?;

    println!(
        "Archive lines: {} events, {} filtered, {} invalid",
        archive_stats.events, archive_stats.filtered, archive_stats.invalid_lines
    );
    match &run.selected {
        Some(selected) => println!("Repositories: {} (selected {})", snapshot.len(), selected.len()),
        None => println!("Repositories: {}", snapshot.len()),
    }
    println!("Metric values: {values}");
    println!("Partitions: {}", run.partitions);
    println!("Wrote {:?}", sink.path_for(&key));
    Ok(())
}

fn cmd_rollup(
    archive: Vec<PathBuf>,
    granularity: &str,
    period: Option<String>,
    overrides: &Overrides,
) -> Result<()> {
    let config = load_config(overrides)?;
    let granularity: Granularity = granularity.parse()?;

    let mut catalog = EventCatalog::new();
    let (events, report) = catalog.ingest(archive_events(archive, &config, SubjectScope::Repository));

    let mut rollup = Rollup::new(granularity, config.time_zone);
    if let Some(pattern) = period {
        rollup = rollup.with_period_filter(pattern);
    }
    let table = rollup.build(&events, &catalog);

    let mut sink = JsonFileSink::new(&config.export_path);
    for (period, rows) in &table {
        sink.accept(&format!("{granularity}-{period}"), rows)?;
        if let Some(top) = rows.first() {
            println!(
                "{period}: {} repositories, top {} ({} kinds, {} events)",
                rows.len(),
                top.subject,
                top.num_events,
                top.total_events
            );
        }
    }

    let stats = open_stats(&config);
    stats.record_ingest(&report);
    stats.record_run();
    stats.save()?;

    println!("Periods written: {}", table.len());
    Ok(())
}

fn cmd_trend(input: &Path, metric: &str, date: Option<&str>, subjects: Option<&str>) -> Result<()> {
    let metric: MetricName = metric.parse()?;
    let content = std::fs::read_to_string(input).with_context(|| format!("reading {input:?}"))?;
    let snapshot: MetricSnapshot =
        serde_json::from_str(&content).with_context(|| format!("parsing {input:?}"))?;

    let subjects: Option<Vec<String>> = subjects.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    });
    let subjects = subjects.as_deref();

    let summaries = match date {
        Some(date) => trend::summarize(&snapshot, date, metric, subjects)
            .map(|summary| vec![(date.to_string(), summary)])
            .unwrap_or_default(),
        None => trend::daily_trend(&snapshot, metric, subjects)
            .into_iter()
            .collect(),
    };

    if summaries.is_empty() {
        println!("No values for {metric}");
        return Ok(());
    }

    println!(
        "{:<12} {:>6} {:>10} {:>10} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "date", "count", "mean", "std", "min", "p25", "median", "p75", "max"
    );
    for (date, s) in summaries {
        let std = s.std.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
        println!(
            "{:<12} {:>6} {:>10.3} {:>10} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2}",
            date, s.count, s.mean, std, s.min, s.p25, s.median, s.p75, s.max
        );
    }
    Ok(())
}

fn cmd_keys(from: NaiveDate, to: NaiveDate, urls: bool) {
    let mut day = from;
    while day <= to {
        let range = ArchiveRange::day(day);
        let lines = if urls { range.urls() } else { range.hour_keys() };
        for line in lines {
            println!("{line}");
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
}

fn cmd_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("repo-pulse Status");
    println!("=================");
    println!();
    println!("Configuration:");
    println!(
        "  Window: {} day(s), stride {} ({})",
        config.window_size, config.stride, config.stride_convention
    );
    println!("  Time zone: {}", config.time_zone);
    println!(
        "  Lookback: {}",
        config
            .time_budget_months
            .map_or_else(|| "unlimited".to_string(), |m| format!("{m} month(s)"))
    );
    println!(
        "  Event types: {}",
        config.event_types.iter().collect::<Vec<_>>().join(", ")
    );
    println!("  Graph subjects: {}", config.subject_scope);
    match (config.repositories.is_empty(), config.top_k) {
        (true, None) => println!("  Metrics repositories: all"),
        (true, Some(k)) => println!("  Metrics repositories: top {k}"),
        (false, top_k) => println!(
            "  Metrics repositories: {}{}",
            config.repositories.join(", "),
            top_k.map_or_else(String::new, |k| format!(" (top {k})"))
        ),
    }
    println!("  Export path: {:?}", config.export_path);
    println!();

    let stats_path = config.data_path.join(STATS_FILE);
    if stats_path.exists() {
        println!("{}", RunStats::with_persistence(stats_path).summary());
    } else {
        println!("No previous runs found.");
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load().unwrap_or_default();
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file: {:?}", Config::config_path());
            println!();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load().unwrap_or_default();
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {key} = {value}");
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            config.ensure_directories()?;
            println!("Configuration reset to defaults.");
        }
    }
    Ok(())
}
