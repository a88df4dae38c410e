use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use crate::session::SessionCookie;

use super::error::BrowserResult;

/// Interval between polls while waiting for an element to appear.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to an element resolved on the current page.
///
/// References are only valid until the next navigation or reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    id: usize,
    text: String,
}

impl ElementRef {
    pub fn new(id: usize, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Trimmed visible text of the element.
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementQuery {
    /// First element matching a CSS selector.
    Css(String),
    /// Nearest actionable ancestor of the first element matching a CSS selector.
    ActionableAncestor(String),
}

impl ElementQuery {
    pub fn css(selector: impl Into<String>) -> Self {
        ElementQuery::Css(selector.into())
    }

    pub fn actionable_ancestor(selector: impl Into<String>) -> Self {
        ElementQuery::ActionableAncestor(selector.into())
    }
}

/// The page-automation capability the engagement pipeline drives.
#[async_trait(?Send)]
pub trait EngagementSurface {
    /// Navigates and waits for the page to settle.
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;
    async fn reload(&mut self) -> BrowserResult<()>;
    /// Actionable elements in document order.
    async fn actionable_elements(&mut self) -> BrowserResult<Vec<ElementRef>>;
    async fn locate(&mut self, query: &ElementQuery) -> BrowserResult<Option<ElementRef>>;
    /// Brings the element into view and clicks it.
    async fn activate(&mut self, element: &ElementRef) -> BrowserResult<()>;
    async fn type_text(&mut self, element: &ElementRef, text: &str) -> BrowserResult<()>;
    /// Waits for a navigation triggered by the last activation.
    async fn wait_for_settle(&mut self) -> BrowserResult<()>;
    async fn cookies(&mut self) -> BrowserResult<Vec<SessionCookie>>;
    async fn set_cookies(&mut self, cookies: &[SessionCookie]) -> BrowserResult<()>;
    async fn screenshot(&mut self, path: &Path) -> BrowserResult<()>;
    async fn close(&mut self) -> BrowserResult<()>;

    /// Polls [`locate`](Self::locate) until the element shows up or the
    /// timeout elapses, in which case `None` is returned.
    async fn wait_for(
        &mut self,
        query: &ElementQuery,
        timeout: Duration,
    ) -> BrowserResult<Option<ElementRef>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.locate(query).await? {
                return Ok(Some(element));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Polls the actionable elements for one whose text equals `text`.
    async fn wait_for_text(
        &mut self,
        text: &str,
        timeout: Duration,
    ) -> BrowserResult<Option<ElementRef>> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = self
                .actionable_elements()
                .await?
                .into_iter()
                .find(|element| element.text() == text);
            if found.is_some() {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait(?Send)]
pub trait SurfaceProvider {
    async fn open(&self) -> BrowserResult<Box<dyn EngagementSurface>>;
}
