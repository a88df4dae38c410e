use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::quota::ActionKind;

/// Result of one action step on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Executed,
    /// The target already reflects the desired end state.
    SkippedAlready,
    /// The daily quota for the action kind is exhausted.
    SkippedLimit,
    /// Step-local failure; the rest of the target still runs.
    Failed(String),
}

impl StepOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        StepOutcome::Failed(reason.into())
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Executed => f.write_str("executed"),
            StepOutcome::SkippedAlready => f.write_str("skipped (already)"),
            StepOutcome::SkippedLimit => f.write_str("skipped (limit)"),
            StepOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub url: String,
    pub follow: Option<StepOutcome>,
    pub like: Option<StepOutcome>,
    pub comment: Option<StepOutcome>,
    /// Why the target was given up before finishing, if it was.
    pub abandoned: Option<String>,
}

impl TargetReport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn abandon(&mut self, reason: impl Into<String>) {
        self.abandoned = Some(reason.into());
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_some()
    }

    pub fn outcome(&self, kind: ActionKind) -> Option<&StepOutcome> {
        match kind {
            ActionKind::Follow => self.follow.as_ref(),
            ActionKind::Like => self.like.as_ref(),
            ActionKind::Comment => self.comment.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindTally {
    pub follow: u32,
    pub like: u32,
    pub comment: u32,
}

impl KindTally {
    pub fn get(&self, kind: ActionKind) -> u32 {
        match kind {
            ActionKind::Follow => self.follow,
            ActionKind::Like => self.like,
            ActionKind::Comment => self.comment,
        }
    }

    pub fn bump(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Follow => self.follow += 1,
            ActionKind::Like => self.like += 1,
            ActionKind::Comment => self.comment += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.follow + self.like + self.comment
    }
}

/// Per-run tallies aggregated from [`TargetReport`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounters {
    pub executed: KindTally,
    pub skipped_already: KindTally,
    pub skipped_limit: KindTally,
    pub failed: KindTally,
    pub targets_processed: u32,
    pub targets_abandoned: u32,
    pub stopped_by_like_limit: bool,
    pub errors: Vec<String>,
}

impl RunCounters {
    pub fn absorb(&mut self, report: &TargetReport) {
        self.targets_processed += 1;
        for kind in ActionKind::ALL {
            match report.outcome(kind) {
                Some(StepOutcome::Executed) => self.executed.bump(kind),
                Some(StepOutcome::SkippedAlready) => self.skipped_already.bump(kind),
                Some(StepOutcome::SkippedLimit) => self.skipped_limit.bump(kind),
                Some(StepOutcome::Failed(reason)) => {
                    self.failed.bump(kind);
                    self.errors.push(format!("{} [{kind}]: {reason}", report.url));
                }
                None => {}
            }
        }
        if let Some(reason) = &report.abandoned {
            self.targets_abandoned += 1;
            self.errors.push(format!("{}: {reason}", report.url));
        }
    }
}

/// Persisted as `summary_YYYYMMDD.json` at the end of every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub date: NaiveDate,
    pub targets_total: u32,
    #[serde(flatten)]
    pub counters: RunCounters,
    pub total_wait_ms: u64,
    pub duration_secs: u64,
    /// Set when the run aborted before or while processing targets.
    pub fatal_error: Option<String>,
}

impl RunSummary {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            targets_total: 0,
            counters: RunCounters::default(),
            total_wait_ms: 0,
            duration_secs: 0,
            fatal_error: None,
        }
    }

    pub fn file_name(&self) -> String {
        format!("summary_{}.json", self.date.format("%Y%m%d"))
    }

    pub fn log_table(&self) {
        for line in self.to_string().lines() {
            info!(target: "summary", "{line}");
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        writeln!(f, "run summary {}", self.date)?;
        writeln!(
            f,
            "{:<10}{:>10}{:>16}{:>14}{:>8}",
            "action", "executed", "skipped-already", "skipped-limit", "failed"
        )?;
        for kind in ActionKind::ALL {
            writeln!(
                f,
                "{:<10}{:>10}{:>16}{:>14}{:>8}",
                kind.as_str(),
                c.executed.get(kind),
                c.skipped_already.get(kind),
                c.skipped_limit.get(kind),
                c.failed.get(kind)
            )?;
        }
        write!(
            f,
            "targets {}/{} processed, {} abandoned{}",
            c.targets_processed,
            self.targets_total,
            c.targets_abandoned,
            if c.stopped_by_like_limit {
                ", stopped by run like limit"
            } else {
                ""
            }
        )
    }
}
