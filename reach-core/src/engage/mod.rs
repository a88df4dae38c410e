mod auth;
mod coordinator;
mod outcome;
mod pipeline;
mod targets;

pub use auth::{AuthMethod, Authenticator, LoginError};
pub use coordinator::{RunCoordinator, RunError};
pub use outcome::{KindTally, RunCounters, RunSummary, StepOutcome, TargetReport};
pub use pipeline::{
    classify_follow_controls, ActionPipeline, FollowControl, PipelineSettings, RunContext,
};
pub use targets::{load_targets, parse_targets, Target, TargetListError};
