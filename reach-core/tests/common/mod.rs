#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use async_trait::async_trait;
use tempfile::TempDir;

use reach_core::browser::{
    BrowserError, BrowserResult, ElementQuery, ElementRef, EngagementSurface, SurfaceProvider,
};
use reach_core::config::{EngageConfig, SelectorSection};
use reach_core::SessionCookie;

const LIKE_ICON: usize = 1;
const UNLIKE_ICON: usize = 2;
const LIKE_BUTTON: usize = 3;
const COMMENT_INPUT: usize = 4;
const SUBMIT_BUTTON: usize = 5;
const LOGGED_IN_MARKER: usize = 6;
const LOGIN_USERNAME: usize = 7;
const LOGIN_PASSWORD: usize = 8;
const LOGIN_SUBMIT: usize = 9;
const BUTTON_BASE: usize = 100;

/// Scripted content page.
#[derive(Debug, Clone)]
pub struct FakePage {
    pub buttons: Vec<String>,
    pub liked: bool,
    pub like_visible: bool,
    pub like_has_ancestor: bool,
    pub comment_box: bool,
    pub submit_button: bool,
}

impl FakePage {
    pub fn likeable() -> Self {
        Self {
            buttons: vec!["フォローする".into(), "その他".into()],
            liked: false,
            like_visible: true,
            like_has_ancestor: true,
            comment_box: true,
            submit_button: true,
        }
    }

    pub fn already_liked() -> Self {
        Self {
            liked: true,
            ..Self::likeable()
        }
    }

    pub fn following(mut self) -> Self {
        self.buttons = vec!["フォロー中".into(), "メッセージ".into()];
        self
    }
}

#[derive(Debug, Default)]
pub struct SurfaceState {
    pub pages: HashMap<String, FakePage>,
    pub failing_urls: HashSet<String>,
    /// Interactions that error instead of taking effect: `follow`, `like`,
    /// `type` or `comment`.
    pub failing_actions: HashSet<&'static str>,
    pub current: Option<String>,
    pub logged_in: bool,
    pub accept_login: bool,
    pub jar: Vec<SessionCookie>,
    pub typed: String,
    pub events: Vec<String>,
    pub opened: u32,
    pub closed: bool,
}

impl SurfaceState {
    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }

    pub fn has(&self, event: &str) -> bool {
        self.events.iter().any(|candidate| candidate == event)
    }
}

pub type Shared = Rc<RefCell<SurfaceState>>;

pub fn shared_state(pages: &[(&str, FakePage)]) -> Shared {
    let state = SurfaceState {
        pages: pages
            .iter()
            .map(|(url, page)| (url.to_string(), page.clone()))
            .collect(),
        accept_login: true,
        ..SurfaceState::default()
    };
    Rc::new(RefCell::new(state))
}

pub fn valid_cookie() -> SessionCookie {
    SessionCookie {
        name: "sessionid".into(),
        value: "valid".into(),
        domain: ".example.com".into(),
        path: "/".into(),
        expires: 0.0,
        http_only: true,
        secure: true,
    }
}

pub struct FakeSurface {
    state: Shared,
    selectors: SelectorSection,
}

impl FakeSurface {
    pub fn new(state: Shared, selectors: SelectorSection) -> Self {
        Self { state, selectors }
    }

    fn current_page(&self) -> Option<FakePage> {
        let state = self.state.borrow();
        state
            .current
            .as_ref()
            .and_then(|url| state.pages.get(url))
            .cloned()
    }

    fn current_url(&self) -> String {
        self.state.borrow().current.clone().unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl EngagementSurface for FakeSurface {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        let mut state = self.state.borrow_mut();
        state.events.push(format!("navigate {url}"));
        if state.failing_urls.contains(url) {
            return Err(BrowserError::Timeout(url.to_string()));
        }
        state.current = Some(url.to_string());
        state.typed.clear();
        Ok(())
    }

    async fn reload(&mut self) -> BrowserResult<()> {
        let mut state = self.state.borrow_mut();
        state.events.push("reload".into());
        let valid = valid_cookie();
        state.logged_in = state
            .jar
            .iter()
            .any(|cookie| cookie.name == valid.name && cookie.value == valid.value);
        Ok(())
    }

    async fn actionable_elements(&mut self) -> BrowserResult<Vec<ElementRef>> {
        let Some(page) = self.current_page() else {
            return Ok(Vec::new());
        };
        let mut elements: Vec<ElementRef> = page
            .buttons
            .iter()
            .enumerate()
            .map(|(idx, text)| ElementRef::new(BUTTON_BASE + idx, text.as_str()))
            .collect();
        if page.submit_button && !self.state.borrow().typed.is_empty() {
            elements.push(ElementRef::new(
                SUBMIT_BUTTON,
                self.selectors.comment_submit_label.as_str(),
            ));
        }
        Ok(elements)
    }

    async fn locate(&mut self, query: &ElementQuery) -> BrowserResult<Option<ElementRef>> {
        let page = self.current_page();
        let logged_in = self.state.borrow().logged_in;
        let s = &self.selectors;
        let found = match query {
            ElementQuery::Css(selector) => {
                let selector = selector.as_str();
                if selector == s.unlike_icon {
                    page.filter(|p| p.liked).map(|_| UNLIKE_ICON)
                } else if selector == s.like_icon {
                    page.filter(|p| p.like_visible && !p.liked).map(|_| LIKE_ICON)
                } else if selector == s.comment_input {
                    page.filter(|p| p.comment_box).map(|_| COMMENT_INPUT)
                } else if selector == s.logged_in_marker {
                    logged_in.then_some(LOGGED_IN_MARKER)
                } else if selector == s.login_username {
                    (!logged_in).then_some(LOGIN_USERNAME)
                } else if selector == s.login_password {
                    (!logged_in).then_some(LOGIN_PASSWORD)
                } else if selector == s.login_submit {
                    (!logged_in).then_some(LOGIN_SUBMIT)
                } else {
                    None
                }
            }
            ElementQuery::ActionableAncestor(selector) if *selector == s.like_icon => page
                .filter(|p| p.like_visible && p.like_has_ancestor)
                .map(|_| LIKE_BUTTON),
            ElementQuery::ActionableAncestor(_) => None,
        };
        Ok(found.map(|id| ElementRef::new(id, "")))
    }

    async fn activate(&mut self, element: &ElementRef) -> BrowserResult<()> {
        let url = self.current_url();
        let mut state = self.state.borrow_mut();
        let action = match element.id() {
            LIKE_BUTTON => "like",
            SUBMIT_BUTTON => "comment",
            LOGIN_SUBMIT => "login",
            id if id >= BUTTON_BASE => "follow",
            other => return Err(BrowserError::StaleElement(other)),
        };
        if state.failing_actions.contains(action) {
            state.events.push(format!("failed {action} {url}"));
            return Err(BrowserError::StaleElement(element.id()));
        }
        match action {
            "like" => {
                if let Some(page) = state.pages.get_mut(&url) {
                    page.liked = true;
                }
                state.events.push(format!("like {url}"));
            }
            "comment" => state.events.push(format!("comment {url}")),
            "login" => {
                state.events.push("login".into());
                if state.accept_login {
                    state.logged_in = true;
                    state.jar = vec![valid_cookie()];
                }
            }
            _ => state.events.push(format!("click {} {url}", element.text())),
        }
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> BrowserResult<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_actions.contains("type") {
            state.events.push("failed type".into());
            return Err(BrowserError::StaleElement(element.id()));
        }
        state.events.push(format!("type {text}"));
        if element.id() == COMMENT_INPUT {
            state.typed = text.to_string();
        }
        Ok(())
    }

    async fn wait_for_settle(&mut self) -> BrowserResult<()> {
        Ok(())
    }

    async fn cookies(&mut self) -> BrowserResult<Vec<SessionCookie>> {
        Ok(self.state.borrow().jar.clone())
    }

    async fn set_cookies(&mut self, cookies: &[SessionCookie]) -> BrowserResult<()> {
        let mut state = self.state.borrow_mut();
        state.events.push("set_cookies".into());
        state.jar = cookies.to_vec();
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> BrowserResult<()> {
        self.state
            .borrow_mut()
            .events
            .push(format!("screenshot {}", path.display()));
        Ok(())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        let mut state = self.state.borrow_mut();
        state.events.push("close".into());
        state.closed = true;
        Ok(())
    }
}

pub struct FakeProvider {
    pub state: Shared,
    pub selectors: SelectorSection,
    pub fail_open: bool,
}

impl FakeProvider {
    pub fn new(state: Shared) -> Self {
        Self {
            state,
            selectors: SelectorSection::default(),
            fail_open: false,
        }
    }
}

#[async_trait(?Send)]
impl SurfaceProvider for FakeProvider {
    async fn open(&self) -> BrowserResult<Box<dyn EngagementSurface>> {
        if self.fail_open {
            return Err(BrowserError::Launch("chromium not installed".into()));
        }
        self.state.borrow_mut().opened += 1;
        Ok(Box::new(FakeSurface::new(
            Rc::clone(&self.state),
            self.selectors.clone(),
        )))
    }
}

/// Configuration with every file inside `dir`, no pacing and zero
/// affordance timeouts.
pub fn test_config(dir: &TempDir) -> EngageConfig {
    let mut config = EngageConfig::default();
    config.account.username = "someone".into();
    config.account.password = "secret".into();
    config.paths.targets_file = dir.path().join("targets.json");
    config.paths.session_file = dir.path().join("session.json");
    config.paths.action_log = dir.path().join("action_log.csv");
    config.paths.summary_dir = dir.path().join("summaries");
    config.paths.screenshot_dir = Some(dir.path().join("screenshots"));
    config.pacing.action_delay_ms = [0, 0];
    config.pacing.between_targets_ms = [0, 0];
    config.pacing.affordance_timeout_ms = 0;
    config.pacing.login_timeout_ms = 0;
    config
}

pub fn write_targets(config: &EngageConfig, urls: &[&str]) -> PathBuf {
    let entries: Vec<serde_json::Value> = urls
        .iter()
        .map(|url| serde_json::json!({ "url": url, "ownerUsername": "owner" }))
        .collect();
    let path = config.paths.targets_file.clone();
    std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();
    path
}
