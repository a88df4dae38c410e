use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// One remote content item eligible for engagement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub url: String,
    pub owner_handle: String,
    pub caption: Option<String>,
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            owner_handle: String::new(),
            caption: None,
        }
    }

    pub fn with_owner(mut self, handle: impl Into<String>) -> Self {
        self.owner_handle = handle.into();
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Caption text, falling back to `default` when absent or blank.
    pub fn caption_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.caption
            .as_deref()
            .filter(|caption| !caption.trim().is_empty())
            .unwrap_or(default)
    }
}

#[derive(Debug, Error)]
pub enum TargetListError {
    #[error("failed to read target list {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse target list: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("target list must be a JSON array")]
    NotAnArray,
}

pub fn load_targets<P: AsRef<Path>>(path: P) -> Result<Vec<Target>, TargetListError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| TargetListError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let targets = parse_targets(&content)?;
    info!(path = %path.display(), targets = targets.len(), "loaded target list");
    Ok(targets)
}

/// Parses `[{url, ownerUsername?, caption?}, ...]`. Entries without a
/// usable `url` are dropped.
pub fn parse_targets(content: &str) -> Result<Vec<Target>, TargetListError> {
    let value: Value = serde_json::from_str(content)?;
    let Value::Array(items) = value else {
        return Err(TargetListError::NotAnArray);
    };

    let mut targets = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let url = item
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if url.is_empty() {
            debug!(index = idx, "skipping target entry without url");
            continue;
        }
        let owner = item
            .get("ownerUsername")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut target = Target::new(url).with_owner(owner.trim());
        if let Some(caption) = item.get("caption").and_then(Value::as_str) {
            target = target.with_caption(caption);
        }
        targets.push(target);
    }
    Ok(targets)
}
