//! Daily action quotas derived from the append-only action log.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const LOG_HEADER: &str = "date,action,url,owner_url";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar date used for quota accounting.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Follow,
    Like,
    Comment,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [ActionKind::Follow, ActionKind::Like, ActionKind::Comment];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Follow => "follow",
            ActionKind::Like => "like",
            ActionKind::Comment => "comment",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "follow" => Ok(ActionKind::Follow),
            "like" => Ok(ActionKind::Like),
            "comment" => Ok(ActionKind::Comment),
            other => Err(LedgerError::InvalidRow(format!("unknown action {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLogEntry {
    pub date: NaiveDate,
    pub kind: ActionKind,
    pub target_url: String,
    pub owner_url: String,
}

impl ActionLogEntry {
    /// Builds the entry shape for a kind: follows never carry a target URL.
    pub fn new(date: NaiveDate, kind: ActionKind, target_url: &str, owner_url: &str) -> Self {
        let target_url = match kind {
            ActionKind::Follow => String::new(),
            ActionKind::Like | ActionKind::Comment => target_url.to_string(),
        };
        Self {
            date,
            kind,
            target_url,
            owner_url: owner_url.to_string(),
        }
    }

    pub fn to_row(&self) -> String {
        format!(
            "{},{},{},{}",
            self.date.format(DATE_FORMAT),
            self.kind,
            escape_field(&self.target_url),
            escape_field(&self.owner_url)
        )
    }

    pub fn parse_row(line: &str) -> Result<Self, LedgerError> {
        let parts: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if parts.len() < 2 {
            return Err(LedgerError::InvalidRow(line.to_string()));
        }
        let date = NaiveDate::parse_from_str(parts[0].trim(), DATE_FORMAT)
            .map_err(|_| LedgerError::InvalidRow(line.to_string()))?;
        let kind = parts[1].parse()?;
        Ok(Self {
            date,
            kind,
            target_url: parts.get(2).map(|s| s.to_string()).unwrap_or_default(),
            owner_url: parts.get(3).map(|s| s.to_string()).unwrap_or_default(),
        })
    }
}

/// Keeps one entry on one row: separators inside a field are percent-encoded.
fn escape_field(value: &str) -> String {
    if value.contains([',', '\n', '\r']) {
        value
            .replace(',', "%2C")
            .replace('\n', "%0A")
            .replace('\r', "%0D")
    } else {
        value.to_string()
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("action log io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("invalid action log row: {0}")]
    InvalidRow(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Durable record of executed actions; the only source of daily counts.
pub trait ActionLedger: Send + Sync {
    fn count_on(&self, kind: ActionKind, date: NaiveDate) -> LedgerResult<u32>;

    fn append(&self, entry: &ActionLogEntry) -> LedgerResult<()>;

    fn today_count(&self, kind: ActionKind) -> LedgerResult<u32> {
        self.count_on(kind, today())
    }

    fn record(
        &self,
        date: NaiveDate,
        kind: ActionKind,
        target_url: &str,
        owner_url: &str,
    ) -> LedgerResult<()> {
        self.append(&ActionLogEntry::new(date, kind, target_url, owner_url))
    }
}

/// CSV file with header `date,action,url,owner_url`, appended one row per
/// executed action and never rewritten.
#[derive(Debug, Clone)]
pub struct CsvActionLog {
    path: PathBuf,
}

impl CsvActionLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All parseable entries in file order; a missing file has none.
    pub fn entries(&self) -> LedgerResult<Vec<ActionLogEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };
        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed == LOG_HEADER {
                continue;
            }
            match ActionLogEntry::parse_row(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    debug!(path = %self.path.display(), line = idx + 1, error = %err, "skipping action log row")
                }
            }
        }
        Ok(entries)
    }

    /// Opens the log for appending so the next write starts a fresh row.
    ///
    /// Empty files get the header; a last row without a line break is
    /// terminated first.
    fn open_for_append(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{LOG_HEADER}")?;
            return Ok(file);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            debug!(path = %self.path.display(), "terminating unfinished action log row");
            file.write_all(b"\n")?;
        }
        Ok(file)
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            source,
            path: self.path.clone(),
        }
    }
}

impl ActionLedger for CsvActionLog {
    fn count_on(&self, kind: ActionKind, date: NaiveDate) -> LedgerResult<u32> {
        let count = self
            .entries()?
            .iter()
            .filter(|entry| entry.date == date && entry.kind == kind)
            .count();
        Ok(count as u32)
    }

    fn append(&self, entry: &ActionLogEntry) -> LedgerResult<()> {
        let mut file = self
            .open_for_append()
            .map_err(|source| self.io_error(source))?;
        writeln!(file, "{}", entry.to_row()).map_err(|source| self.io_error(source))?;
        file.flush().map_err(|source| self.io_error(source))?;
        Ok(())
    }
}

/// In-memory running totals for one run, seeded once from the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyCounters {
    follow: u32,
    like: u32,
    comment: u32,
}

impl DailyCounters {
    pub fn seed(ledger: &dyn ActionLedger, date: NaiveDate) -> LedgerResult<Self> {
        let counters = Self {
            follow: ledger.count_on(ActionKind::Follow, date)?,
            like: ledger.count_on(ActionKind::Like, date)?,
            comment: ledger.count_on(ActionKind::Comment, date)?,
        };
        debug!(
            %date,
            follow = counters.follow,
            like = counters.like,
            comment = counters.comment,
            "seeded daily counters"
        );
        Ok(counters)
    }

    pub fn get(&self, kind: ActionKind) -> u32 {
        match kind {
            ActionKind::Follow => self.follow,
            ActionKind::Like => self.like,
            ActionKind::Comment => self.comment,
        }
    }

    pub fn increment(&mut self, kind: ActionKind) {
        let slot = match kind {
            ActionKind::Follow => &mut self.follow,
            ActionKind::Like => &mut self.like,
            ActionKind::Comment => &mut self.comment,
        };
        *slot += 1;
    }

    pub fn reached(&self, kind: ActionKind, limit: u32) -> bool {
        self.get(kind) >= limit
    }
}
