//! # contract: seams to everything outside the workflow
//!
//! The workflow never talks to a browser, keychain, notifier or terminal
//! directly. It goes through the traits below, so every collaborator can be
//! swapped for a deterministic mock in tests.
//!
//! ## Traits
//! - [`Browser`]: one browser context driven page by page.
//! - [`CredentialStore`]: resolves a [`PasswordRef`] to a password.
//! - [`Notifier`]: OS popup and email delivery.
//! - [`OtpPrompt`]: asks the operator for a one-time code.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the mocks are exported through the
//!   default `test-export-mocks` feature so integration tests can use them.
//!
//! ## Errors
//! - Browser calls return [`BrowserError`]; callers map it into their own
//!   phase error (login or upload).
//! - Notifier failures are reported back but never fail a run.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::{DisplayMode, PasswordRef};
use crate::error::{BrowserError, CredentialError, NotifyError};
use crate::portal::Locator;
use crate::session::SessionState;

/// How to open the browser context for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub display: DisplayMode,
    pub page_load_timeout: Duration,
    /// Stored cookies/localStorage to restore before the first navigation.
    pub state: Option<SessionState>,
}

/// A single browser context. Calls are sequential; implementations keep
/// their own connection state behind `&self`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open the context, restoring `options.state` when present.
    async fn launch(&self, options: LaunchOptions) -> Result<(), BrowserError>;

    /// Navigate and wait for the page load, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Whether at least one element matches on the current page.
    async fn exists(&self, locator: &Locator) -> Result<bool, BrowserError>;

    /// Replace the value of the first matching input.
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), BrowserError>;

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError>;

    /// Send the Enter key to the first matching element.
    async fn press_enter(&self, locator: &Locator) -> Result<(), BrowserError>;

    /// Attach a local file to the first matching `<input type="file">`.
    async fn set_file(&self, locator: &Locator, path: &Path) -> Result<(), BrowserError>;

    /// Current page source.
    async fn content(&self) -> Result<String, BrowserError>;

    /// Capture cookies and localStorage of the current context.
    async fn storage_state(&self) -> Result<SessionState, BrowserError>;

    /// Tear the context down. Safe to call when `launch` never succeeded.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Read-only access to wherever the password lives.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, reference: &PasswordRef, account: &str)
        -> Result<String, CredentialError>;
}

/// Outbound notification channels. Delivery is fire-and-forget.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short transient system popup.
    async fn popup(&self, title: &str, body: &str) -> Result<(), NotifyError>;

    async fn email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Operator input for a one-time code.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait OtpPrompt: Send + Sync {
    /// `Some(code)` as typed (empty if the operator finished in the browser),
    /// or `None` if nothing arrived before `timeout`.
    async fn prompt(&self, timeout: Duration) -> Option<String>;
}

/// First candidate that is present on the current page.
pub(crate) async fn first_present(
    browser: &dyn Browser,
    candidates: &[Locator],
) -> Result<Option<Locator>, BrowserError> {
    for locator in candidates {
        if browser.exists(locator).await? {
            return Ok(Some(locator.clone()));
        }
    }
    Ok(None)
}
