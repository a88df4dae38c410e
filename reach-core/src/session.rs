//! Persistence of the authenticated browser session between runs.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One authentication cookie, serialised in the same shape browsers
/// export them (`httpOnly`, `expires` in seconds since the epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCredentials {
    cookies: Vec<SessionCookie>,
}

impl SessionCredentials {
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self { cookies }
    }

    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to write session {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to serialise session: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted credentials. Missing, unreadable or corrupt
    /// files all yield `None`.
    pub fn restore(&self) -> Option<SessionCredentials> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted session");
                return None;
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read persisted session");
                return None;
            }
        };
        match serde_json::from_str::<SessionCredentials>(&content) {
            Ok(credentials) if credentials.is_empty() => {
                warn!(path = %self.path.display(), "persisted session holds no cookies");
                None
            }
            Ok(credentials) => {
                info!(
                    path = %self.path.display(),
                    cookies = credentials.cookies().len(),
                    "restored persisted session"
                );
                Some(credentials)
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "persisted session is corrupt");
                None
            }
        }
    }

    /// Replaces the stored credentials through a temp file + rename so a
    /// crash never leaves a truncated file behind.
    pub fn persist(&self, credentials: &SessionCredentials) -> SessionResult<()> {
        let json = serde_json::to_string_pretty(credentials)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| self.io_error(source))?;
        let mut file = NamedTempFile::new_in(&dir).map_err(|source| self.io_error(source))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|source| self.io_error(source))?;
        file.persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;
        info!(
            path = %self.path.display(),
            cookies = credentials.cookies().len(),
            "session persisted"
        );
        Ok(())
    }

    pub fn clear(&self) -> SessionResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: io::Error) -> SessionError {
        SessionError::Io {
            source,
            path: self.path.clone(),
        }
    }
}
