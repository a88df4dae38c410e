use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::{EngageConfig, SelectorSection};
use crate::session::SessionCookie;

use super::automation::{BrowserAutomation, BrowserContext, BrowserLauncher};
use super::error::{BrowserError, BrowserResult};
use super::human::TypingCadence;
use super::surface::{ElementQuery, ElementRef, EngagementSurface, SurfaceProvider};

/// Attribute set on the ancestor resolved by [`mark_closest_script`].
const ANCESTOR_MARK: &str = "data-reach-ancestor";

/// Function body run on the indicator element: tags its closest match of
/// `actionable` with [`ANCESTOR_MARK`] and reports whether one exists.
/// Earlier marks are removed first so at most one element carries it.
pub fn mark_closest_script(actionable: &str) -> String {
    let selector = Value::String(actionable.to_string());
    format!(
        "function() {{ \
document.querySelectorAll('[{ANCESTOR_MARK}]').forEach((el) => el.removeAttribute('{ANCESTOR_MARK}')); \
const ancestor = this.closest({selector}); \
if (!ancestor) {{ return false; }} \
ancestor.setAttribute('{ANCESTOR_MARK}', ''); \
return true; }}"
    )
}

/// [`EngagementSurface`] backed by a single Chromium page.
pub struct ChromiumSurface {
    automation: Option<BrowserAutomation>,
    context: BrowserContext,
    actionable_selector: String,
    typing: TypingCadence,
    elements: Vec<Element>,
}

impl ChromiumSurface {
    pub fn new(
        automation: BrowserAutomation,
        context: BrowserContext,
        selectors: &SelectorSection,
        typing: TypingCadence,
    ) -> Self {
        Self {
            automation: Some(automation),
            context,
            actionable_selector: selectors.actionable.clone(),
            typing,
            elements: Vec::new(),
        }
    }

    /// Stores the handle once; a node seen again keeps its first id.
    fn remember(&mut self, element: Element, text: String) -> ElementRef {
        let id = match self
            .elements
            .iter()
            .position(|known| known.backend_node_id == element.backend_node_id)
        {
            Some(id) => id,
            None => {
                self.elements.push(element);
                self.elements.len() - 1
            }
        };
        ElementRef::new(id, text)
    }

    fn element(&self, reference: &ElementRef) -> BrowserResult<&Element> {
        self.elements
            .get(reference.id())
            .ok_or(BrowserError::StaleElement(reference.id()))
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.automation.is_some() {
            Ok(())
        } else {
            Err(BrowserError::Closed)
        }
    }

    async fn visible_text(element: &Element) -> String {
        element
            .inner_text()
            .await
            .ok()
            .flatten()
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }

    async fn first_match(&self, selector: &str) -> BrowserResult<Option<Element>> {
        let mut found = self.context.page().find_elements(selector).await?;
        if found.is_empty() {
            Ok(None)
        } else {
            Ok(Some(found.swap_remove(0)))
        }
    }

    async fn nearest_actionable_ancestor(
        &mut self,
        selector: &str,
    ) -> BrowserResult<Option<ElementRef>> {
        let Some(indicator) = self.first_match(selector).await? else {
            return Ok(None);
        };
        let marked = indicator
            .call_js_fn(mark_closest_script(&self.actionable_selector), false)
            .await?;
        if marked.result.value != Some(Value::Bool(true)) {
            trace!(selector, "indicator has no actionable ancestor");
            return Ok(None);
        }
        let mark = format!("[{ANCESTOR_MARK}]");
        match self.first_match(&mark).await? {
            Some(element) => {
                let text = Self::visible_text(&element).await;
                Ok(Some(self.remember(element, text)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait(?Send)]
impl EngagementSurface for ChromiumSurface {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        self.elements.clear();
        debug!(url, "navigating");
        self.context.goto(url).await
    }

    async fn reload(&mut self) -> BrowserResult<()> {
        self.ensure_open()?;
        self.elements.clear();
        self.context.reload().await
    }

    async fn actionable_elements(&mut self) -> BrowserResult<Vec<ElementRef>> {
        self.ensure_open()?;
        let found = self
            .context
            .page()
            .find_elements(self.actionable_selector.as_str())
            .await?;
        let mut references = Vec::with_capacity(found.len());
        for element in found {
            let text = Self::visible_text(&element).await;
            references.push(self.remember(element, text));
        }
        trace!(count = references.len(), "collected actionable elements");
        Ok(references)
    }

    async fn locate(&mut self, query: &ElementQuery) -> BrowserResult<Option<ElementRef>> {
        self.ensure_open()?;
        match query {
            ElementQuery::Css(selector) => match self.first_match(selector).await? {
                Some(element) => {
                    let text = Self::visible_text(&element).await;
                    Ok(Some(self.remember(element, text)))
                }
                None => Ok(None),
            },
            ElementQuery::ActionableAncestor(selector) => {
                self.nearest_actionable_ancestor(selector).await
            }
        }
    }

    async fn activate(&mut self, element: &ElementRef) -> BrowserResult<()> {
        self.ensure_open()?;
        let target = self.element(element)?;
        target.scroll_into_view().await?;
        target.click().await?;
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        let typing = self.typing;
        let target = self.element(element)?;
        target.click().await?;
        for ch in text.chars() {
            target.type_str(ch.to_string()).await?;
            sleep(typing.next_delay()).await;
        }
        Ok(())
    }

    async fn wait_for_settle(&mut self) -> BrowserResult<()> {
        self.ensure_open()?;
        self.elements.clear();
        self.context.page().wait_for_navigation().await?;
        Ok(())
    }

    async fn cookies(&mut self) -> BrowserResult<Vec<SessionCookie>> {
        self.ensure_open()?;
        let cookies = self.context.page().get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|cookie| SessionCookie {
                name: cookie.name,
                value: cookie.value,
                domain: cookie.domain,
                path: cookie.path,
                expires: cookie.expires,
                http_only: cookie.http_only,
                secure: cookie.secure,
            })
            .collect())
    }

    async fn set_cookies(&mut self, cookies: &[SessionCookie]) -> BrowserResult<()> {
        self.ensure_open()?;
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path(cookie.path.clone())
                .secure(cookie.secure)
                .http_only(cookie.http_only);
            if cookie.expires > 0.0 {
                builder = builder.expires(TimeSinceEpoch::new(cookie.expires));
            }
            params.push(builder.build().map_err(BrowserError::Configuration)?);
        }
        self.context.page().set_cookies(params).await?;
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> BrowserResult<()> {
        self.ensure_open()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.context
            .page()
            .save_screenshot(ScreenshotParams::builder().build(), path)
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.elements.clear();
        match self.automation.take() {
            Some(automation) => automation.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Launches Chromium and opens one page per run.
#[derive(Debug, Clone)]
pub struct ChromiumSurfaceProvider {
    launcher: BrowserLauncher,
    selectors: SelectorSection,
    typing: TypingCadence,
}

impl ChromiumSurfaceProvider {
    pub fn new(launcher: BrowserLauncher, selectors: SelectorSection, typing: TypingCadence) -> Self {
        Self {
            launcher,
            selectors,
            typing,
        }
    }

    pub fn from_config(config: &EngageConfig) -> Self {
        Self::new(
            BrowserLauncher::new(config.chromium.clone()),
            config.selectors.clone(),
            TypingCadence::from_pacing(&config.pacing),
        )
    }
}

#[async_trait(?Send)]
impl SurfaceProvider for ChromiumSurfaceProvider {
    async fn open(&self) -> BrowserResult<Box<dyn EngagementSurface>> {
        let automation = self.launcher.launch().await?;
        let context = match automation.open_page().await {
            Ok(context) => context,
            Err(err) => {
                automation.shutdown().await?;
                return Err(err);
            }
        };
        Ok(Box::new(ChromiumSurface::new(
            automation,
            context,
            &self.selectors,
            self.typing,
        )))
    }
}
