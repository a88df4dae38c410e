use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::browser::{BrowserError, ElementQuery, EngagementSurface};
use crate::config::{AccountSection, EngageConfig, SelectorSection};
use crate::session::{SessionCredentials, SessionError, SessionStore};

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("no credentials configured and no usable session")]
    MissingCredentials,
    #[error("login form not found within {0:?}")]
    FormNotFound(Duration),
    #[error("still logged out after submitting credentials")]
    Rejected,
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// How the surface ended up authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    RestoredSession,
    CredentialLogin,
}

pub struct Authenticator<'a> {
    home_url: &'a str,
    account: &'a AccountSection,
    selectors: &'a SelectorSection,
    store: &'a SessionStore,
    marker_timeout: Duration,
    login_timeout: Duration,
}

impl<'a> Authenticator<'a> {
    pub fn new(config: &'a EngageConfig, store: &'a SessionStore) -> Self {
        Self {
            home_url: &config.site.home_url,
            account: &config.account,
            selectors: &config.selectors,
            store,
            marker_timeout: config.pacing.affordance_timeout(),
            login_timeout: config.pacing.login_timeout(),
        }
    }

    /// Restores the persisted session when it still works, otherwise logs
    /// in with the configured credentials and persists the new cookies.
    pub async fn authenticate(
        &self,
        surface: &mut dyn EngagementSurface,
    ) -> Result<AuthMethod, LoginError> {
        surface.navigate(self.home_url).await?;

        if let Some(credentials) = self.store.restore() {
            surface.set_cookies(credentials.cookies()).await?;
            surface.reload().await?;
            if self.logged_in(surface, self.marker_timeout).await? {
                info!("session restored");
                return Ok(AuthMethod::RestoredSession);
            }
            warn!("persisted session no longer valid, logging in");
        }

        self.login(surface).await?;
        Ok(AuthMethod::CredentialLogin)
    }

    async fn login(&self, surface: &mut dyn EngagementSurface) -> Result<(), LoginError> {
        if !self.account.has_credentials() {
            return Err(LoginError::MissingCredentials);
        }
        info!(user = %self.account.username, "logging in with credentials");

        let username_query = ElementQuery::css(&self.selectors.login_username);
        let Some(username) = surface.wait_for(&username_query, self.login_timeout).await? else {
            return Err(LoginError::FormNotFound(self.login_timeout));
        };
        surface.type_text(&username, &self.account.username).await?;

        let password_query = ElementQuery::css(&self.selectors.login_password);
        let Some(password) = surface.locate(&password_query).await? else {
            return Err(LoginError::FormNotFound(self.login_timeout));
        };
        surface.type_text(&password, &self.account.password).await?;

        let submit_query = ElementQuery::css(&self.selectors.login_submit);
        let Some(submit) = surface.locate(&submit_query).await? else {
            return Err(LoginError::FormNotFound(self.login_timeout));
        };
        surface.activate(&submit).await?;
        surface.wait_for_settle().await?;

        if !self.logged_in(surface, self.login_timeout).await? {
            return Err(LoginError::Rejected);
        }

        let cookies = surface.cookies().await?;
        self.store.persist(&SessionCredentials::new(cookies))?;
        info!("login succeeded");
        Ok(())
    }

    async fn logged_in(
        &self,
        surface: &mut dyn EngagementSurface,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        let marker = ElementQuery::css(&self.selectors.logged_in_marker);
        Ok(surface.wait_for(&marker, timeout).await?.is_some())
    }
}
