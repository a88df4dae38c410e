use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::browser::{BrowserResult, ElementQuery, ElementRef, EngagementSurface, Pacer};
use crate::config::{EngageConfig, LimitsSection, SelectorSection, SiteSection};
use crate::llm::CommentGenerator;
use crate::quota::{ActionKind, ActionLedger, DailyCounters};

use super::outcome::{RunCounters, StepOutcome, TargetReport};
use super::targets::Target;

/// Run-scoped mutable state threaded through every target.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub date: NaiveDate,
    pub daily: DailyCounters,
    pub likes_this_run: u32,
    pub counters: RunCounters,
    pub total_wait_ms: u64,
}

impl RunContext {
    pub fn new(date: NaiveDate, daily: DailyCounters) -> Self {
        Self {
            date,
            daily,
            likes_this_run: 0,
            counters: RunCounters::default(),
            total_wait_ms: 0,
        }
    }
}

/// What the follow scan found among the actionable elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowControl {
    AlreadyFollowing(ElementRef),
    Follow(ElementRef),
    Missing,
}

/// Scans elements in document order; the first element carrying either an
/// already-following label or a follow label decides. Already-following
/// labels win within one element.
pub fn classify_follow_controls(
    elements: &[ElementRef],
    selectors: &SelectorSection,
) -> FollowControl {
    let matches_any = |text: &str, labels: &[String]| {
        labels
            .iter()
            .any(|label| !label.is_empty() && text.contains(label.as_str()))
    };
    for element in elements {
        if matches_any(element.text(), &selectors.already_following_labels) {
            return FollowControl::AlreadyFollowing(element.clone());
        }
        if matches_any(element.text(), &selectors.follow_labels) {
            return FollowControl::Follow(element.clone());
        }
    }
    FollowControl::Missing
}

enum LikeFlow {
    /// Continue to the comment decision.
    Proceed(StepOutcome),
    /// Target is done; no comment attempt.
    Finish(StepOutcome),
    Abandon(String),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub selectors: SelectorSection,
    pub limits: LimitsSection,
    pub site: SiteSection,
    pub affordance_timeout: Duration,
    pub screenshot_dir: Option<PathBuf>,
    pub default_caption: String,
}

impl PipelineSettings {
    pub fn from_config(config: &EngageConfig) -> Self {
        Self {
            selectors: config.selectors.clone(),
            limits: config.limits.clone(),
            site: config.site.clone(),
            affordance_timeout: config.pacing.affordance_timeout(),
            screenshot_dir: config.paths.screenshot_dir.clone(),
            default_caption: config.comments.default_caption.clone(),
        }
    }
}

/// Per-target state machine: navigate, follow, like, comment.
///
/// Capability errors never escape [`ActionPipeline::process`]; they become
/// a [`StepOutcome::Failed`] or an abandoned target.
pub struct ActionPipeline {
    settings: PipelineSettings,
    pacer: Pacer,
    comments: CommentGenerator,
    ledger: Arc<dyn ActionLedger>,
}

impl ActionPipeline {
    pub fn new(
        settings: PipelineSettings,
        pacer: Pacer,
        comments: CommentGenerator,
        ledger: Arc<dyn ActionLedger>,
    ) -> Self {
        Self {
            settings,
            pacer,
            comments,
            ledger,
        }
    }

    pub fn from_config(config: &EngageConfig, ledger: Arc<dyn ActionLedger>) -> Self {
        Self::new(
            PipelineSettings::from_config(config),
            Pacer::from_bounds(config.pacing.action_delay_ms),
            CommentGenerator::from_config(&config.comments),
            ledger,
        )
    }

    pub async fn process(
        &self,
        surface: &mut dyn EngagementSurface,
        target: &Target,
        run: &mut RunContext,
    ) -> TargetReport {
        let mut report = TargetReport::new(&target.url);
        info!(url = %target.url, owner = %target.owner_handle, "processing target");
        self.drive(surface, target, run, &mut report).await;

        if let Some(reason) = &report.abandoned {
            warn!(url = %target.url, reason = %reason, "target abandoned");
            self.capture_failure(surface, "abandoned").await;
        }
        run.counters.absorb(&report);
        report
    }

    async fn drive(
        &self,
        surface: &mut dyn EngagementSurface,
        target: &Target,
        run: &mut RunContext,
        report: &mut TargetReport,
    ) {
        if let Err(err) = surface.navigate(&target.url).await {
            report.abandon(format!("navigation failed: {err}"));
            return;
        }

        let owner_url = self.settings.site.owner_url(&target.owner_handle);

        let follow = self.follow_step(surface, &owner_url, run).await;
        debug!(url = %target.url, step = "follow", outcome = %follow);
        report.follow = Some(follow);

        match self.like_step(surface, target, &owner_url, run).await {
            LikeFlow::Proceed(outcome) => {
                debug!(url = %target.url, step = "like", outcome = %outcome);
                report.like = Some(outcome);
            }
            LikeFlow::Finish(outcome) => {
                debug!(url = %target.url, step = "like", outcome = %outcome, "no comment attempt");
                report.like = Some(outcome);
                return;
            }
            LikeFlow::Abandon(reason) => {
                report.abandon(reason);
                return;
            }
        }

        let comment = self.comment_step(surface, target, &owner_url, run).await;
        debug!(url = %target.url, step = "comment", outcome = %comment);
        report.comment = Some(comment);
    }

    async fn follow_step(
        &self,
        surface: &mut dyn EngagementSurface,
        owner_url: &str,
        run: &mut RunContext,
    ) -> StepOutcome {
        let limit = self.settings.limits.follow_daily;
        if run.daily.reached(ActionKind::Follow, limit) {
            info!(kind = "follow", count = run.daily.get(ActionKind::Follow), limit, "daily limit reached");
            return StepOutcome::SkippedLimit;
        }

        let elements = match surface.actionable_elements().await {
            Ok(elements) => elements,
            Err(err) => {
                warn!(step = "follow", error = %err, "failed to scan follow controls");
                return StepOutcome::failed(err.to_string());
            }
        };

        match classify_follow_controls(&elements, &self.settings.selectors) {
            FollowControl::AlreadyFollowing(element) => {
                info!(step = "follow", label = %element.text(), "already following");
                StepOutcome::SkippedAlready
            }
            FollowControl::Missing => {
                info!(step = "follow", "no follow control found, treating as already following");
                StepOutcome::SkippedAlready
            }
            FollowControl::Follow(element) => {
                if let Err(err) = surface.activate(&element).await {
                    warn!(step = "follow", error = %err, "failed to activate follow control");
                    return StepOutcome::failed(err.to_string());
                }
                info!(step = "follow", owner = %owner_url, "followed");
                self.commit(run, ActionKind::Follow, "", owner_url).await;
                StepOutcome::Executed
            }
        }
    }

    async fn like_step(
        &self,
        surface: &mut dyn EngagementSurface,
        target: &Target,
        owner_url: &str,
        run: &mut RunContext,
    ) -> LikeFlow {
        match self.try_like(surface, target, owner_url, run).await {
            Ok(flow) => flow,
            Err(err) => LikeFlow::Abandon(format!("like step failed: {err}")),
        }
    }

    async fn try_like(
        &self,
        surface: &mut dyn EngagementSurface,
        target: &Target,
        owner_url: &str,
        run: &mut RunContext,
    ) -> BrowserResult<LikeFlow> {
        let selectors = &self.settings.selectors;

        let unlike = ElementQuery::css(&selectors.unlike_icon);
        if surface.locate(&unlike).await?.is_some() {
            info!(url = %target.url, step = "like", "already liked");
            return Ok(LikeFlow::Finish(StepOutcome::SkippedAlready));
        }

        let like = ElementQuery::css(&selectors.like_icon);
        if surface
            .wait_for(&like, self.settings.affordance_timeout)
            .await?
            .is_none()
        {
            info!(
                url = %target.url,
                step = "like",
                timeout_ms = self.settings.affordance_timeout.as_millis() as u64,
                "like control not visible, treating as already liked"
            );
            return Ok(LikeFlow::Finish(StepOutcome::SkippedAlready));
        }

        let Some(button) = surface
            .locate(&ElementQuery::actionable_ancestor(&selectors.like_icon))
            .await?
        else {
            return Ok(LikeFlow::Abandon(
                "like icon has no actionable ancestor".to_string(),
            ));
        };

        let limit = self.settings.limits.like_daily;
        if run.daily.reached(ActionKind::Like, limit) {
            info!(kind = "like", count = run.daily.get(ActionKind::Like), limit, "daily limit reached");
            return Ok(LikeFlow::Proceed(StepOutcome::SkippedLimit));
        }

        surface.activate(&button).await?;
        run.likes_this_run += 1;
        info!(url = %target.url, step = "like", run_total = run.likes_this_run, "liked");
        self.commit(run, ActionKind::Like, &target.url, owner_url)
            .await;
        Ok(LikeFlow::Proceed(StepOutcome::Executed))
    }

    async fn comment_step(
        &self,
        surface: &mut dyn EngagementSurface,
        target: &Target,
        owner_url: &str,
        run: &mut RunContext,
    ) -> StepOutcome {
        let limit = self.settings.limits.comment_daily;
        if run.daily.reached(ActionKind::Comment, limit) {
            info!(kind = "comment", count = run.daily.get(ActionKind::Comment), limit, "daily limit reached");
            return StepOutcome::SkippedLimit;
        }
        match self.try_comment(surface, target).await {
            Ok(Some(text)) => {
                info!(url = %target.url, step = "comment", comment = %text, "commented");
                self.commit(run, ActionKind::Comment, &target.url, owner_url)
                    .await;
                StepOutcome::Executed
            }
            Ok(None) => StepOutcome::failed("comment controls not found"),
            Err(err) => {
                warn!(url = %target.url, step = "comment", error = %err, "comment failed");
                StepOutcome::failed(err.to_string())
            }
        }
    }

    /// Returns the posted text, or `None` when the input or submit control
    /// never appeared.
    async fn try_comment(
        &self,
        surface: &mut dyn EngagementSurface,
        target: &Target,
    ) -> BrowserResult<Option<String>> {
        let selectors = &self.settings.selectors;
        let timeout = self.settings.affordance_timeout;
        let text = self
            .comments
            .generate(target.caption_or(&self.settings.default_caption))
            .await;

        let input = ElementQuery::css(&selectors.comment_input);
        let Some(input) = surface.wait_for(&input, timeout).await? else {
            warn!(url = %target.url, step = "comment", "comment input not found");
            return Ok(None);
        };
        surface.type_text(&input, &text).await?;

        let Some(submit) = surface
            .wait_for_text(&selectors.comment_submit_label, timeout)
            .await?
        else {
            warn!(url = %target.url, step = "comment", "comment submit control not found");
            return Ok(None);
        };
        surface.activate(&submit).await?;
        Ok(Some(text))
    }

    /// Counts an executed action, appends it to the ledger and paces.
    async fn commit(&self, run: &mut RunContext, kind: ActionKind, target_url: &str, owner_url: &str) {
        run.daily.increment(kind);
        if let Err(err) = self.ledger.record(run.date, kind, target_url, owner_url) {
            warn!(%kind, error = %err, "failed to append action log entry");
        }
        run.total_wait_ms += self.pacer.wait().await;
    }

    async fn capture_failure(&self, surface: &mut dyn EngagementSurface, name: &str) {
        let Some(dir) = &self.settings.screenshot_dir else {
            return;
        };
        let path = dir.join(format!("{}_{name}.png", Utc::now().format("%Y%m%d_%H%M%S")));
        match surface.screenshot(&path).await {
            Ok(()) => info!(path = %path.display(), "failure screenshot saved"),
            Err(err) => warn!(error = %err, "failed to capture screenshot"),
        }
    }
}
