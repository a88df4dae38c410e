use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ConfigError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngageConfig {
    pub account: AccountSection,
    pub site: SiteSection,
    pub paths: PathsSection,
    pub limits: LimitsSection,
    pub pacing: PacingSection,
    pub chromium: ChromiumSection,
    pub selectors: SelectorSection,
    pub comments: CommentSection,
}

impl EngageConfig {
    /// Loads the TOML file when given (defaults otherwise) and applies
    /// overrides from the process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_engage_config(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the run cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if self.site.home_url.trim().is_empty() {
            return invalid("site.home_url", "must not be empty");
        }
        if !self.site.profile_url_template.contains("{owner}") {
            return invalid("site.profile_url_template", "must contain {owner}");
        }
        if self.chromium.window.contains(&0) {
            return invalid("chromium.window", "width and height must be positive");
        }
        if self.selectors.actionable.trim().is_empty() {
            return invalid("selectors.actionable", "must not be empty");
        }
        if self.selectors.like_icon.trim().is_empty() {
            return invalid("selectors.like_icon", "must not be empty");
        }
        if !self
            .selectors
            .follow_labels
            .iter()
            .any(|label| !label.trim().is_empty())
        {
            return invalid("selectors.follow_labels", "needs at least one label");
        }
        Ok(())
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = text("INSTA_ID") {
            self.account.username = value;
        }
        if let Some(value) = text("INSTA_PASSWORD") {
            self.account.password = value;
        }
        if let Some(value) = text("TARGET_URL") {
            self.site.home_url = value;
        }
        if let Some(value) = text("TARGETS_FILE") {
            self.paths.targets_file = PathBuf::from(value);
        }
        if let Some(value) = text("SCREENSHOT_DIR") {
            self.paths.screenshot_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = text("HEADLESS") {
            self.chromium.headless = value.trim() != "false";
        }
        if let Some(value) = text("CHROME_PATH") {
            self.chromium.executable_path = Some(PathBuf::from(value));
        }
        if let Some(value) = text("COMMENT_TEXT") {
            self.comments.fallback_text = value;
        }
        if let Some(value) = text("OPENAI_API_KEY") {
            self.comments.api_key = Some(value);
        }

        override_number(&lookup, "LIKE_LIMIT", &mut self.limits.like_run);
        override_number(&lookup, "FOLLOW_DAILY_LIMIT", &mut self.limits.follow_daily);
        override_number(&lookup, "LIKE_DAILY_LIMIT", &mut self.limits.like_daily);
        override_number(&lookup, "COMMENT_DAILY_LIMIT", &mut self.limits.comment_daily);
        for bounds in [
            &mut self.pacing.action_delay_ms,
            &mut self.pacing.between_targets_ms,
        ] {
            override_number(&lookup, "PACING_MIN_MS", &mut bounds[0]);
            override_number(&lookup, "PACING_MAX_MS", &mut bounds[1]);
        }
    }
}

fn override_number<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    match raw.parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => warn!(key, value = raw, current = %slot, "ignoring unparsable numeric override"),
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountSection {
    pub username: String,
    pub password: String,
}

impl AccountSection {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for AccountSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSection")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub home_url: String,
    pub profile_url_template: String,
}

impl SiteSection {
    /// Profile URL of a content owner, empty when the handle is unknown.
    pub fn owner_url(&self, handle: &str) -> String {
        let handle = handle.trim();
        if handle.is_empty() {
            String::new()
        } else {
            self.profile_url_template.replace("{owner}", handle)
        }
    }
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            home_url: "https://www.instagram.com/".into(),
            profile_url_template: "https://www.instagram.com/{owner}/".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub targets_file: PathBuf,
    pub session_file: PathBuf,
    pub action_log: PathBuf,
    pub summary_dir: PathBuf,
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            targets_file: PathBuf::from("data.json"),
            session_file: PathBuf::from("session.json"),
            action_log: PathBuf::from("action_log.csv"),
            summary_dir: PathBuf::from("."),
            screenshot_dir: Some(PathBuf::from("screenshots")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub follow_daily: u32,
    pub like_daily: u32,
    pub comment_daily: u32,
    /// Likes allowed in a single run across all targets.
    pub like_run: u32,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            follow_daily: 20,
            like_daily: 100,
            comment_daily: 10,
            like_run: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub action_delay_ms: [u64; 2],
    pub between_targets_ms: [u64; 2],
    pub affordance_timeout_ms: u64,
    pub login_timeout_ms: u64,
    pub typing_cadence_cpm: [u32; 2],
    pub typing_jitter_ms: [u32; 2],
}

impl PacingSection {
    pub fn affordance_timeout(&self) -> Duration {
        Duration::from_millis(self.affordance_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            action_delay_ms: [15_000, 45_000],
            between_targets_ms: [15_000, 45_000],
            affordance_timeout_ms: 5_000,
            login_timeout_ms: 30_000,
            typing_cadence_cpm: [220, 360],
            typing_jitter_ms: [10, 60],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    pub executable_path: Option<PathBuf>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub user_agent: String,
    pub window: [u32; 2],
    pub lang: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: false,
            user_agent: DEFAULT_USER_AGENT.into(),
            window: [1366, 768],
            lang: None,
            request_timeout_seconds: None,
        }
    }
}

/// Markers and labels of the remote surface. Defaults match the
/// Japanese-localised Instagram web UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub actionable: String,
    pub follow_labels: Vec<String>,
    pub already_following_labels: Vec<String>,
    pub like_icon: String,
    pub unlike_icon: String,
    pub comment_input: String,
    pub comment_submit_label: String,
    pub logged_in_marker: String,
    pub login_username: String,
    pub login_password: String,
    pub login_submit: String,
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            actionable: r#"[role="button"], button"#.into(),
            follow_labels: vec!["フォローする".into()],
            already_following_labels: vec!["フォロー中".into(), "メッセージ".into()],
            like_icon: r#"svg[aria-label="いいね！"]"#.into(),
            unlike_icon: r#"svg[aria-label="いいね！取り消し"]"#.into(),
            comment_input: r#"textarea[aria-label="コメントを追加…"]"#.into(),
            comment_submit_label: "投稿する".into(),
            logged_in_marker: r#"svg[aria-label="ホーム"]"#.into(),
            login_username: r#"input[name="username"]"#.into(),
            login_password: r#"input[name="password"]"#.into(),
            login_submit: r#"button[type="submit"]"#.into(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CommentSection {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub timeout_ms: u64,
    pub fallback_text: String,
    pub default_caption: String,
}

impl CommentSection {
    pub const BUILTIN_FALLBACK: &'static str = "素敵な投稿ですね！";

    /// Text posted whenever generation is unavailable.
    pub fn fallback(&self) -> String {
        if self.fallback_text.trim().is_empty() {
            Self::BUILTIN_FALLBACK.to_string()
        } else {
            self.fallback_text.clone()
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl Default for CommentSection {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            model: "gpt-4o-mini".into(),
            timeout_ms: 20_000,
            fallback_text: String::new(),
            default_caption: "素敵な投稿ですね!".into(),
        }
    }
}

impl fmt::Debug for CommentSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentSection")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout_ms", &self.timeout_ms)
            .field("fallback_text", &self.fallback_text)
            .field("default_caption", &self.default_caption)
            .finish()
    }
}

pub fn load_engage_config<P: AsRef<Path>>(path: P) -> Result<EngageConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
