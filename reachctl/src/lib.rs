use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use reach_core::browser::ChromiumSurfaceProvider;
use reach_core::engage::{load_targets, RunCoordinator, RunError, RunSummary};
use reach_core::quota::{today, ActionKind, CsvActionLog, DailyCounters, LedgerError};
use reach_core::{EngageConfig, SessionError, SessionStore};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] reach_core::ConfigError),
    #[error("run failed: {0}")]
    Run(#[from] RunError),
    #[error("action log error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    CheckFailed(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Rate-limited engagement runner", long_about = None)]
pub struct Cli {
    /// Path to reach.toml; built-in defaults when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Environment file loaded before resolving configuration
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,
    /// Log at debug level
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs follow/like/comment over the target list
    Run(RunArgs),
    /// Shows today's usage against the daily limits
    Quota,
    /// Validates configuration, credentials and input files
    Check,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Alternative target list
    #[arg(long)]
    pub targets: Option<PathBuf>,
    /// Show the browser window
    #[arg(long, default_value_t = false)]
    pub headful: bool,
    /// Discard the persisted session and log in again
    #[arg(long, default_value_t = false)]
    pub fresh_login: bool,
}

/// Loads `KEY=value` pairs into the process environment. Variables that
/// are already set keep their value. A missing file is not an error.
pub fn load_env_file(path: &Path) -> usize {
    let Ok(content) = fs::read_to_string(path) else {
        return 0;
    };
    let mut applied = 0;
    for (key, value) in parse_env_file(&content) {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
            applied += 1;
        }
    }
    applied
}

pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = EngageConfig::resolve(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run(args) => {
            let summary = execute_run(config, args).await?;
            render(&summary, cli.format)?;
        }
        Commands::Quota => {
            let report = quota_report(&config, today())?;
            render(&report, cli.format)?;
        }
        Commands::Check => {
            let report = CheckReport(check(&config, cli.config.as_deref()));
            render(&report, cli.format)?;
            let failed = report
                .0
                .iter()
                .filter(|entry| matches!(entry.status, CheckStatus::Error))
                .count();
            if failed > 0 {
                return Err(AppError::CheckFailed(format!("{failed} check(s) failed")));
            }
        }
    }

    Ok(())
}

async fn execute_run(mut config: EngageConfig, args: &RunArgs) -> Result<RunSummary> {
    apply_run_args(&mut config, args);
    let coordinator = RunCoordinator::from_config(config);
    if args.fresh_login {
        info!(path = %coordinator.session_store().path().display(), "discarding persisted session");
        coordinator.session_store().clear()?;
    }
    let provider = ChromiumSurfaceProvider::from_config(coordinator.config());
    Ok(coordinator.run(&provider).await?)
}

fn apply_run_args(config: &mut EngageConfig, args: &RunArgs) {
    if let Some(targets) = &args.targets {
        config.paths.targets_file = targets.clone();
    }
    if args.headful {
        config.chromium.headless = false;
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RunSummary {
    fn display(&self) -> String {
        let mut text = self.to_string();
        for error in &self.counters.errors {
            text.push_str(&format!("\n  ! {error}"));
        }
        text
    }
}

#[derive(Debug, Serialize)]
pub struct QuotaReport {
    pub date: NaiveDate,
    pub log: PathBuf,
    pub entries: Vec<QuotaEntry>,
}

#[derive(Debug, Serialize)]
pub struct QuotaEntry {
    pub kind: ActionKind,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

pub fn quota_report(config: &EngageConfig, date: NaiveDate) -> Result<QuotaReport> {
    let log = CsvActionLog::new(&config.paths.action_log);
    let counters = DailyCounters::seed(&log, date)?;
    let entries = ActionKind::ALL
        .into_iter()
        .map(|kind| {
            let limit = match kind {
                ActionKind::Follow => config.limits.follow_daily,
                ActionKind::Like => config.limits.like_daily,
                ActionKind::Comment => config.limits.comment_daily,
            };
            let used = counters.get(kind);
            QuotaEntry {
                kind,
                used,
                limit,
                remaining: limit.saturating_sub(used),
            }
        })
        .collect();
    Ok(QuotaReport {
        date,
        log: config.paths.action_log.clone(),
        entries,
    })
}

impl DisplayFallback for QuotaReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("Quota for {} ({})", self.date, self.log.display())];
        for entry in &self.entries {
            lines.push(format!(
                "  - {:<8} {:>4}/{:<4} remaining {}",
                entry.kind.as_str(),
                entry.used,
                entry.limit,
                entry.remaining
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CheckEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl CheckEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Ok, detail)
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn, detail)
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Error, detail)
    }

    fn new(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct CheckReport(pub Vec<CheckEntry>);

impl DisplayFallback for CheckReport {
    fn display(&self) -> String {
        self.0
            .iter()
            .map(|entry| format!("[{}] {}: {}", entry.status, entry.name, entry.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Offline readiness checks; nothing here touches the browser.
pub fn check(config: &EngageConfig, config_path: Option<&Path>) -> Vec<CheckEntry> {
    let mut entries = Vec::new();

    entries.push(match config_path {
        Some(path) => CheckEntry::ok("config", format!("loaded {}", path.display())),
        None => CheckEntry::warn("config", "no file given, using defaults"),
    });

    let session = SessionStore::new(&config.paths.session_file).restore();
    let session_cookies = session.as_ref().map(|s| s.cookies().len()).unwrap_or(0);
    entries.push(if session_cookies > 0 {
        CheckEntry::ok("session", format!("{session_cookies} cookie(s) persisted"))
    } else {
        CheckEntry::warn("session", "no persisted session, a login will be needed")
    });

    entries.push(if config.account.has_credentials() {
        CheckEntry::ok("credentials", format!("account {}", config.account.username))
    } else if session_cookies > 0 {
        CheckEntry::warn("credentials", "not configured, relying on the persisted session")
    } else {
        CheckEntry::error("credentials", "INSTA_ID / INSTA_PASSWORD not set and no session")
    });

    entries.push(match load_targets(&config.paths.targets_file) {
        Ok(targets) if targets.is_empty() => CheckEntry::warn(
            "targets",
            format!("{} contains no usable targets", config.paths.targets_file.display()),
        ),
        Ok(targets) => CheckEntry::ok(
            "targets",
            format!("{} target(s) in {}", targets.len(), config.paths.targets_file.display()),
        ),
        Err(err) => CheckEntry::error("targets", err.to_string()),
    });

    entries.push(
        match CsvActionLog::new(&config.paths.action_log).entries() {
            Ok(rows) => CheckEntry::ok(
                "action_log",
                format!("{} row(s) in {}", rows.len(), config.paths.action_log.display()),
            ),
            Err(err) => CheckEntry::error("action_log", err.to_string()),
        },
    );

    entries.push(if config.comments.api_key().is_some() {
        CheckEntry::ok("comments", format!("generated with {}", config.comments.model))
    } else {
        CheckEntry::warn(
            "comments",
            format!("no API key, posting \"{}\"", config.comments.fallback()),
        )
    });

    entries.push(match &config.chromium.executable_path {
        Some(path) if !path.exists() => {
            CheckEntry::error("chromium", format!("{} does not exist", path.display()))
        }
        Some(path) => CheckEntry::ok("chromium", path.display().to_string()),
        None => CheckEntry::ok("chromium", "auto-detected executable"),
    });

    entries
}
