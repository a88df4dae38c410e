use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::browser::{BrowserError, EngagementSurface, Pacer, SurfaceProvider};
use crate::config::EngageConfig;
use crate::quota::{today, ActionLedger, CsvActionLog, DailyCounters, LedgerError};
use crate::session::SessionStore;

use super::auth::{Authenticator, LoginError};
use super::outcome::RunSummary;
use super::pipeline::{ActionPipeline, RunContext};
use super::targets::{load_targets, Target, TargetListError};

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("target list unavailable: {0}")]
    Targets(#[from] TargetListError),
    #[error("failed to open automation surface: {0}")]
    Launch(#[source] BrowserError),
    #[error("authentication failed: {0}")]
    Login(#[from] LoginError),
    #[error("failed to read action log: {0}")]
    Ledger(#[from] LedgerError),
    #[error("failed to write run summary {path}: {source}")]
    SummaryIo { source: io::Error, path: PathBuf },
    #[error("failed to serialise run summary: {0}")]
    SummarySerde(#[from] serde_json::Error),
}

/// Drives the pipeline over the target list for one run.
pub struct RunCoordinator {
    config: EngageConfig,
    ledger: Arc<dyn ActionLedger>,
    store: SessionStore,
    pipeline: ActionPipeline,
    between_targets: Pacer,
}

impl RunCoordinator {
    pub fn new(config: EngageConfig, ledger: Arc<dyn ActionLedger>, pipeline: ActionPipeline) -> Self {
        let store = SessionStore::new(&config.paths.session_file);
        let between_targets = Pacer::from_bounds(config.pacing.between_targets_ms);
        Self {
            config,
            ledger,
            store,
            pipeline,
            between_targets,
        }
    }

    pub fn from_config(config: EngageConfig) -> Self {
        let ledger: Arc<dyn ActionLedger> = Arc::new(CsvActionLog::new(&config.paths.action_log));
        let pipeline = ActionPipeline::from_config(&config, Arc::clone(&ledger));
        Self::new(config, ledger, pipeline)
    }

    pub fn config(&self) -> &EngageConfig {
        &self.config
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// Runs to completion or the first run-fatal error. The surface is
    /// closed and a summary file written on every path.
    pub async fn run(&self, provider: &dyn SurfaceProvider) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let mut summary = RunSummary::new(today());

        let result = self.execute(provider, &mut summary).await;
        summary.duration_secs = started.elapsed().as_secs();
        if let Err(err) = &result {
            error!(error = %err, "run aborted");
            summary.fatal_error = Some(err.to_string());
        }
        summary.log_table();

        let written = self.write_summary(&summary);
        match (result, written) {
            (Ok(()), Ok(_)) => Ok(summary),
            (Ok(()), Err(err)) => Err(err),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(write_err)) => {
                warn!(error = %write_err, "failed to write summary after fatal error");
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        provider: &dyn SurfaceProvider,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        let targets = load_targets(&self.config.paths.targets_file)?;
        summary.targets_total = targets.len() as u32;

        let daily = DailyCounters::seed(self.ledger.as_ref(), summary.date)?;
        let mut run = RunContext::new(summary.date, daily);

        let mut surface = provider.open().await.map_err(RunError::Launch)?;
        let result = self.drive(surface.as_mut(), &targets, &mut run).await;
        if let Err(err) = surface.close().await {
            warn!(error = %err, "failed to close automation surface");
        }

        summary.counters = run.counters;
        summary.total_wait_ms = run.total_wait_ms;
        result
    }

    async fn drive(
        &self,
        surface: &mut dyn EngagementSurface,
        targets: &[Target],
        run: &mut RunContext,
    ) -> Result<(), RunError> {
        let method = Authenticator::new(&self.config, &self.store)
            .authenticate(surface)
            .await?;
        info!(?method, targets = targets.len(), "authenticated, starting targets");

        let like_run = self.config.limits.like_run;
        for (idx, target) in targets.iter().enumerate() {
            if run.likes_this_run >= like_run {
                info!(likes = run.likes_this_run, limit = like_run, "run like limit reached, stopping");
                run.counters.stopped_by_like_limit = true;
                break;
            }
            if idx > 0 {
                run.total_wait_ms += self.between_targets.wait().await;
            }
            self.pipeline.process(surface, target, run).await;
        }
        Ok(())
    }

    fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf, RunError> {
        let dir = &self.config.paths.summary_dir;
        let path = dir.join(summary.file_name());
        let io_error = |source: io::Error, path: &Path| RunError::SummaryIo {
            source,
            path: path.to_path_buf(),
        };
        fs::create_dir_all(dir).map_err(|source| io_error(source, dir))?;
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(&path, json).map_err(|source| io_error(source, &path))?;
        info!(path = %path.display(), "run summary written");
        Ok(path)
    }
}
