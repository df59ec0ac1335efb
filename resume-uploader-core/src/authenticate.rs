//! Login state machine.
//!
//! ```text
//! NoSession ──────────────┐
//!                         v
//! HasSession ──(probe)──> FreshLogin ──> OtpPending ──> Authenticated
//!      │                      │                              ^
//!      └──────(probe ok)──────┴──────────────────────────────┘
//! ```
//!
//! A stored session gets exactly one probe; if the portal rejects it we fall
//! through to a single fresh login. `OtpPending` ends the run with an auth
//! failure when nobody is at the keyboard, and waits a bounded time for the
//! operator otherwise. A session obtained by logging in is persisted before
//! the machine reports `Authenticated`.

use tracing::{error, info, warn};

use crate::config::{RunConfig, RunMode};
use crate::contract::{first_present, Browser, CredentialStore, LaunchOptions, OtpPrompt};
use crate::error::{AuthError, AuthFailureReason, BrowserError};
use crate::session::{SessionState, SessionStore};
use crate::wait::poll_until;

/// How the active session came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    Restored,
    FreshLogin,
    ManualLogin,
}

/// A logged-in browser context, ready for the upload step.
pub struct ActiveSession<'a> {
    browser: &'a dyn Browser,
    origin: SessionOrigin,
}

impl<'a> ActiveSession<'a> {
    pub fn browser(&self) -> &'a dyn Browser {
        self.browser
    }

    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }
}

#[derive(Debug)]
enum AuthState {
    NoSession,
    HasSession,
    FreshLogin,
    OtpPending,
    Authenticated(SessionOrigin),
}

/// What the login form turned into after submitting it.
enum LoginOutcome {
    OtpPrompt,
    LeftLoginForm,
}

pub struct Authenticator<'a> {
    browser: &'a dyn Browser,
    credentials: &'a dyn CredentialStore,
    otp: &'a dyn OtpPrompt,
    store: &'a SessionStore,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        credentials: &'a dyn CredentialStore,
        otp: &'a dyn OtpPrompt,
        store: &'a SessionStore,
    ) -> Self {
        Authenticator {
            browser,
            credentials,
            otp,
            store,
        }
    }

    /// Opens the browser context and drives it to a logged-in state.
    pub async fn authenticate(
        &self,
        config: &RunConfig,
        stored: Option<SessionState>,
    ) -> Result<ActiveSession<'a>, AuthError> {
        let mut state = if stored.is_some() {
            AuthState::HasSession
        } else {
            AuthState::NoSession
        };

        self.browser
            .launch(LaunchOptions {
                display: config.display,
                page_load_timeout: config.timeouts.navigation,
                state: stored,
            })
            .await?;

        loop {
            info!(state = ?state, "[AUTH] Entering state");
            state = match state {
                AuthState::NoSession => AuthState::FreshLogin,
                AuthState::HasSession => {
                    if self.probe(config).await? {
                        AuthState::Authenticated(SessionOrigin::Restored)
                    } else {
                        warn!("[AUTH] Stored session rejected by the portal, falling back to login");
                        AuthState::FreshLogin
                    }
                }
                AuthState::FreshLogin => self.fresh_login(config).await?,
                AuthState::OtpPending => self.resolve_otp(config).await?,
                AuthState::Authenticated(origin) => {
                    if origin != SessionOrigin::Restored {
                        self.persist().await;
                    }
                    info!(origin = ?origin, "[AUTH] Authenticated");
                    return Ok(ActiveSession {
                        browser: self.browser,
                        origin,
                    });
                }
            };
        }
    }

    /// Setup helper: the operator logs in by hand in a headed window while we
    /// wait for the profile page to show up.
    pub async fn manual_login(&self, config: &RunConfig) -> Result<ActiveSession<'a>, AuthError> {
        self.browser
            .launch(LaunchOptions {
                display: config.display,
                page_load_timeout: config.timeouts.navigation,
                state: None,
            })
            .await?;
        self.browser
            .goto(&config.portal.profile_url, config.timeouts.navigation)
            .await?;
        info!(
            timeout = ?config.timeouts.otp,
            "[AUTH] Log in and complete any OTP/CAPTCHA in the browser window; the session is saved once the profile loads"
        );

        let marker = &config.portal.authenticated_marker;
        let browser = self.browser;
        let seen = poll_until(config.timeouts.otp, config.timeouts.poll_interval, || async move {
            match browser.exists(marker).await {
                Ok(true) => Some(()),
                // Page transitions during a manual login are expected.
                Ok(false) | Err(_) => None,
            }
        })
        .await;

        if seen.is_none() {
            error!("[AUTH] Timed out waiting for the profile page, session not saved");
            return Err(AuthError::Failure(AuthFailureReason::ManualLoginTimedOut));
        }

        self.persist().await;
        Ok(ActiveSession {
            browser: self.browser,
            origin: SessionOrigin::ManualLogin,
        })
    }

    /// Navigates to the profile page and looks for a logged-in signal.
    async fn probe(&self, config: &RunConfig) -> Result<bool, AuthError> {
        self.browser
            .goto(&config.portal.profile_url, config.timeouts.navigation)
            .await?;
        let found = self.wait_for_authenticated(config).await?;
        info!(authenticated = found, "[AUTH] Probed profile page");
        Ok(found)
    }

    async fn wait_for_authenticated(&self, config: &RunConfig) -> Result<bool, BrowserError> {
        let portal = &config.portal;
        let browser = self.browser;
        let outcome = poll_until(config.timeouts.probe, config.timeouts.poll_interval, || async move {
            match browser.exists(&portal.authenticated_marker).await {
                Ok(true) => return Some(Ok(())),
                Ok(false) => {}
                Err(e) => return Some(Err(e)),
            }
            match browser.content().await {
                Ok(page) if portal.authenticated_text.is_match(&page) => Some(Ok(())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })
        .await;

        match outcome {
            Some(Ok(())) => Ok(true),
            Some(Err(e)) => Err(e),
            None => Ok(false),
        }
    }

    async fn fresh_login(&self, config: &RunConfig) -> Result<AuthState, AuthError> {
        let creds = &config.credentials;
        if creds.username.is_empty() {
            error!("[AUTH] Login needed but no username is configured");
            return Err(AuthError::Failure(AuthFailureReason::MissingUsername));
        }
        let password = self
            .credentials
            .lookup(&creds.password, &creds.username)
            .await
            .map_err(|e| {
                error!(error = %e, "[AUTH] Password lookup failed");
                e
            })?;

        let portal = &config.portal;
        info!(url = %portal.login_url, "[AUTH] Opening login page");
        self.browser
            .goto(&portal.login_url, config.timeouts.navigation)
            .await?;

        let Some(user_field) = first_present(self.browser, &portal.username_inputs).await? else {
            error!("[AUTH] No username field on the login page");
            return Err(AuthError::Failure(AuthFailureReason::UnexpectedLoginPage));
        };
        self.browser.fill(&user_field, &creds.username).await?;

        let Some(pass_field) = first_present(self.browser, &portal.password_inputs).await? else {
            error!("[AUTH] No password field on the login page");
            return Err(AuthError::Failure(AuthFailureReason::UnexpectedLoginPage));
        };
        self.browser.fill(&pass_field, &password).await?;

        match first_present(self.browser, &portal.login_buttons).await? {
            Some(button) => self.browser.click(&button).await?,
            None => {
                info!("[AUTH] No login button found, submitting with Enter");
                self.browser.press_enter(&pass_field).await?;
            }
        }

        match self.wait_for_login_outcome(config).await? {
            Some(LoginOutcome::OtpPrompt) => {
                warn!("[AUTH] Portal asked for a one-time code");
                Ok(AuthState::OtpPending)
            }
            Some(LoginOutcome::LeftLoginForm) => {
                if self.probe(config).await? {
                    Ok(AuthState::Authenticated(SessionOrigin::FreshLogin))
                } else {
                    error!("[AUTH] Login form submitted but the profile page is not available");
                    Err(AuthError::Failure(AuthFailureReason::UnexpectedLoginPage))
                }
            }
            None => {
                error!("[AUTH] Still on the login form after submitting credentials");
                Err(AuthError::Failure(AuthFailureReason::BadCredentials))
            }
        }
    }

    /// Waits for the submitted form to turn into an OTP prompt or go away.
    async fn wait_for_login_outcome(
        &self,
        config: &RunConfig,
    ) -> Result<Option<LoginOutcome>, BrowserError> {
        let portal = &config.portal;
        let browser = self.browser;
        let outcome = poll_until(
            config.timeouts.login_settle,
            config.timeouts.poll_interval,
            || async move {
                let page = match browser.content().await {
                    Ok(page) => page,
                    Err(e) => return Some(Err(e)),
                };
                if portal.shows_otp_prompt(&page) {
                    return Some(Ok(LoginOutcome::OtpPrompt));
                }
                for field in portal.username_inputs.iter().chain(&portal.password_inputs) {
                    match browser.exists(field).await {
                        Ok(true) => return None,
                        Ok(false) => {}
                        Err(e) => return Some(Err(e)),
                    }
                }
                Some(Ok(LoginOutcome::LeftLoginForm))
            },
        )
        .await;

        outcome.transpose()
    }

    async fn resolve_otp(&self, config: &RunConfig) -> Result<AuthState, AuthError> {
        if config.mode == RunMode::Unattended {
            error!("[AUTH] One-time code required but this run is unattended; run `setup` to refresh the session");
            return Err(AuthError::Failure(AuthFailureReason::OtpRequired));
        }

        info!(timeout = ?config.timeouts.otp, "[AUTH] Waiting for the operator to supply the one-time code");
        let Some(code) = self.otp.prompt(config.timeouts.otp).await else {
            error!("[AUTH] No one-time code entered in time");
            return Err(AuthError::Failure(AuthFailureReason::OtpTimedOut));
        };

        let portal = &config.portal;
        if !code.is_empty() {
            let Some(field) = first_present(self.browser, &portal.otp_inputs).await? else {
                error!("[AUTH] No one-time code field on the page");
                return Err(AuthError::Failure(AuthFailureReason::UnexpectedLoginPage));
            };
            self.browser.fill(&field, &code).await?;
            match first_present(self.browser, &portal.otp_submit_buttons).await? {
                Some(button) => self.browser.click(&button).await?,
                None => self.browser.press_enter(&field).await?,
            }
        } else {
            info!("[AUTH] Operator reports the code was entered in the browser");
        }

        if self.probe(config).await? {
            Ok(AuthState::Authenticated(SessionOrigin::FreshLogin))
        } else {
            error!("[AUTH] Profile page still unavailable after the one-time code");
            Err(AuthError::Failure(AuthFailureReason::OtpRejected))
        }
    }

    /// A failed save only costs a login next run, so it is not fatal.
    async fn persist(&self) {
        match self.browser.storage_state().await {
            Ok(state) if state.is_empty() => {
                warn!("[AUTH] Browser returned no cookies, nothing to save")
            }
            Ok(state) => {
                if let Err(e) = self.store.save(&state) {
                    warn!(error = %e, path = %self.store.path().display(), "[AUTH] Could not save session state");
                }
            }
            Err(e) => warn!(error = %e, "[AUTH] Could not capture session state"),
        }
    }
}
