use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::handler::Handler;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::config::ChromiumSection;

use super::error::{BrowserError, BrowserResult};

/// Starts Chromium processes configured by a [`ChromiumSection`].
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    section: Arc<ChromiumSection>,
}

impl BrowserLauncher {
    pub fn new(section: ChromiumSection) -> Self {
        Self {
            section: Arc::new(section),
        }
    }

    pub async fn launch(&self) -> BrowserResult<BrowserAutomation> {
        let params = launch_config(&self.section)?;
        info!(
            headless = self.section.headless,
            sandbox = self.section.sandbox,
            executable = ?self.section.executable_path,
            window = ?self.section.window,
            "starting chromium"
        );
        let (browser, handler) = Browser::launch(params)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        Ok(BrowserAutomation {
            browser,
            events: Some(tokio::spawn(drain_events(handler))),
            section: Arc::clone(&self.section),
        })
    }
}

/// The devtools handler must be polled for the browser to make progress.
async fn drain_events(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if let Err(err) = event {
            trace!(error = %err, "devtools event error");
        }
    }
}

/// Translates the chromium section into launch parameters.
pub fn launch_config(section: &ChromiumSection) -> BrowserResult<LaunchConfig> {
    let [width, height] = section.window;
    let mut builder = LaunchConfig::builder()
        .window_size(width, height)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: width >= height,
            has_touch: false,
        })
        .args(launch_args(section));

    if let Some(path) = &section.executable_path {
        builder = builder.chrome_executable(path);
    }
    if !section.headless {
        builder = builder.with_head();
    }
    if !section.sandbox {
        builder = builder.no_sandbox();
    }
    if let Some(seconds) = section.request_timeout_seconds {
        builder = builder.request_timeout(Duration::from_secs(seconds));
    }
    builder.build().map_err(BrowserError::Configuration)
}

/// Extra command-line switches for the browser process.
pub fn launch_args(section: &ChromiumSection) -> Vec<String> {
    let mut args = vec![
        format!("--user-agent={}", section.user_agent),
        "--no-first-run".to_string(),
        "--password-store=basic".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
    ];
    if section.disable_gpu {
        args.push("--disable-gpu".to_string());
    }
    if let Some(lang) = section.lang.as_deref().filter(|lang| !lang.is_empty()) {
        args.push(format!("--lang={lang}"));
    }
    args
}

/// A running browser plus the task draining its devtools events.
#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    events: Option<JoinHandle<()>>,
    section: Arc<ChromiumSection>,
}

impl BrowserAutomation {
    /// Opens a blank page carrying the configured user agent.
    pub async fn open_page(&self) -> BrowserResult<BrowserContext> {
        let page = self
            .browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;
        let override_params = SetUserAgentOverrideParams::builder()
            .user_agent(self.section.user_agent.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(override_params).await?;
        Ok(BrowserContext { page })
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!("stopping chromium");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "chromium did not close cleanly");
        }
        if let Some(events) = self.events.take() {
            events.await?;
        }
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if self.events.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("chromium dropped without shutdown");
        }
    }
}

/// The page an engagement run works in.
#[derive(Debug)]
pub struct BrowserContext {
    page: Page,
}

impl BrowserContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn goto(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    pub async fn reload(&self) -> BrowserResult<()> {
        self.page.reload().await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }
}
