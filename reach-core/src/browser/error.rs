use std::io;

use chromiumoxide::error::CdpError;
use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

/// Failures of the engagement surface.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to start chromium: {0}")]
    Launch(String),
    #[error("devtools protocol: {0}")]
    Cdp(#[from] CdpError),
    #[error("surface io: {0}")]
    Io(#[from] io::Error),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("invalid devtools parameters: {0}")]
    Configuration(String),
    #[error("element #{0} is no longer on the page")]
    StaleElement(usize),
    #[error("surface already closed")]
    Closed,
    #[error("browser event task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for BrowserError {
    fn from(err: tokio::task::JoinError) -> Self {
        BrowserError::Task(err.to_string())
    }
}
