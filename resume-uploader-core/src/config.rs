use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::portal::PortalProfile;

/// Whether an operator is at the keyboard for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Scheduled run: a one-time-code prompt is a fatal auth failure.
    #[default]
    Unattended,
    /// Setup or operator-driven run: one-time codes are read from the operator.
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Headless,
    Headed,
    /// Headed browser with its window parked off-screen.
    Background,
}

/// Where the password comes from. The password itself is never stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRef {
    pub env_var: Option<String>,
    pub keychain_service: Option<String>,
}

impl PasswordRef {
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(var) = &self.env_var {
            parts.push(format!("env ${var}"));
        }
        if let Some(service) = &self.keychain_service {
            parts.push(format!("keychain service {service}"));
        }
        if parts.is_empty() {
            "no password source".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: PasswordRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub email_to: Option<String>,
    pub email_on_success: bool,
    /// Failure emails are opt-out.
    pub email_on_failure: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            email_to: None,
            email_on_success: false,
            email_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Page navigation (login page, profile page).
    pub navigation: Duration,
    /// How long to wait for the portal to react to a submitted login form.
    pub login_settle: Duration,
    /// How long to look for a logged-in signal on the profile page.
    pub probe: Duration,
    /// Operator one-time-code entry, and manual setup login.
    pub otp: Duration,
    pub upload_confirm: Duration,
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            navigation: Duration::from_secs(60),
            login_settle: Duration::from_secs(15),
            probe: Duration::from_secs(5),
            otp: Duration::from_secs(600),
            upload_confirm: Duration::from_secs(15),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Settings for one run, resolved once at start-up and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub mode: RunMode,
    pub display: DisplayMode,
    pub storage_path: PathBuf,
    /// A resume file, or a folder to pick the newest resume from.
    pub resume_path: PathBuf,
    pub credentials: Credentials,
    pub notify: NotifyConfig,
    pub timeouts: Timeouts,
    pub portal: PortalProfile,
}

impl RunConfig {
    pub fn trace_loaded(&self) {
        info!(
            mode = ?self.mode,
            display = ?self.display,
            storage_path = %self.storage_path.display(),
            resume_path = %self.resume_path.display(),
            username_set = !self.credentials.username.is_empty(),
            password_source = %self.credentials.password.describe(),
            email_to = self.notify.email_to.as_deref().unwrap_or("-"),
            email_on_success = self.notify.email_on_success,
            email_on_failure = self.notify.email_on_failure,
            portal = %self.portal.name,
            "Loaded RunConfig"
        );
        debug!(timeouts = ?self.timeouts, "RunConfig timeouts");
    }
}
