pub mod browser;
pub mod config;
pub mod engage;
pub mod error;
pub mod llm;
pub mod quota;
pub mod session;

pub use config::{load_engage_config, EngageConfig};
pub use engage::{
    ActionPipeline, RunCoordinator, RunError, RunSummary, StepOutcome, Target, TargetReport,
};
pub use error::{ConfigError, Result};
pub use llm::{CommentGenerator, CompletionBackend, LlmError};
pub use quota::{ActionKind, ActionLedger, CsvActionLog, DailyCounters, LedgerError};
pub use session::{SessionCookie, SessionCredentials, SessionError, SessionStore};
