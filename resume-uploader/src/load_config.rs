//! `load_config`: turns the optional YAML file, the environment and the
//! command-line flags into one immutable [`RunConfig`].
//!
//! This is the only place where untrusted YAML is parsed. No secrets are
//! read from the file: the password is referenced by environment variable
//! name or keychain service and resolved by the core only when a login is
//! actually needed.
//!
//! # Precedence (lowest to highest)
//! 1. Built-in defaults (`~/naukri_job/resume`, `~/naukri_job/storage_state.json`)
//! 2. YAML config file (`--config`)
//! 3. Environment (`.env` is loaded by `main`): `NAUKRI_USERNAME`,
//!    `NAUKRI_NOTIFY_TO`, `RESUME_UPLOADER_WEBDRIVER_URL`
//! 4. Command-line flags
//!
//! # Errors
//! Unreadable or malformed config files are `anyhow::Error`s and surface at
//! the CLI boundary before any browser is started.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use resume_uploader_core::config::{
    Credentials, DisplayMode, NotifyConfig, PasswordRef, RunConfig, RunMode, Timeouts,
};
use resume_uploader_core::portal::PortalProfile;
use resume_uploader_core::webdriver::{BrowserKind, DEFAULT_WEBDRIVER_URL};
use serde::Deserialize;
use tracing::{error, info};

use crate::cli::RunArgs;

pub const USERNAME_ENV: &str = "NAUKRI_USERNAME";
pub const NOTIFY_TO_ENV: &str = "NAUKRI_NOTIFY_TO";
pub const WEBDRIVER_URL_ENV: &str = "RESUME_UPLOADER_WEBDRIVER_URL";
pub const DEFAULT_PASSWORD_ENV: &str = "NAUKRI_PASSWORD";
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.naukri.uploader.password";

const DEFAULT_HOME_DIR: &str = "naukri_job";

/// YAML side of the configuration. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub resume_path: Option<PathBuf>,
    pub storage_path: Option<PathBuf>,
    pub display: Option<DisplayMode>,
    pub browser: Option<BrowserKind>,
    pub webdriver_url: Option<String>,
    pub username: Option<String>,
    pub password_env: Option<String>,
    pub keychain_service: Option<String>,
    pub notify: NotifySection,
    pub timeouts: TimeoutsSection,
    /// Partial overrides are merged onto the built-in Naukri profile.
    pub portal: Option<PortalProfile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifySection {
    pub email_to: Option<String>,
    pub email_on_success: Option<bool>,
    pub email_on_failure: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutsSection {
    pub navigation_secs: Option<u64>,
    pub login_settle_secs: Option<u64>,
    pub probe_secs: Option<u64>,
    pub otp_secs: Option<u64>,
    pub upload_confirm_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

impl TimeoutsSection {
    fn apply(&self, mut timeouts: Timeouts) -> Timeouts {
        let secs = Duration::from_secs;
        if let Some(v) = self.navigation_secs {
            timeouts.navigation = secs(v);
        }
        if let Some(v) = self.login_settle_secs {
            timeouts.login_settle = secs(v);
        }
        if let Some(v) = self.probe_secs {
            timeouts.probe = secs(v);
        }
        if let Some(v) = self.otp_secs {
            timeouts.otp = secs(v);
        }
        if let Some(v) = self.upload_confirm_secs {
            timeouts.upload_confirm = secs(v);
        }
        if let Some(v) = self.poll_interval_ms {
            timeouts.poll_interval = Duration::from_millis(v.max(1));
        }
        timeouts
    }
}

/// Everything the CLI needs to start a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub run: RunConfig,
    pub browser: BrowserKind,
    pub webdriver_url: String,
}

/// Loads a YAML config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    // Locators are written as `css: ...` / `button_text: ...` maps.
    let file: FileConfig = serde_yaml::with::singleton_map_recursive::deserialize(
        serde_yaml::Deserializer::from_str(&content),
    )
    .map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path_ref)
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");
    Ok(file)
}

/// Merges defaults, the config file, the environment and `args`.
///
/// `setup` forces interactive mode and a visible browser (a `background`
/// display is kept as is).
pub fn resolve(args: &RunArgs, setup: bool) -> Result<Settings> {
    let file = match &args.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };
    let base = default_base_dir();

    let resume_path = args
        .resume
        .clone()
        .or_else(|| file.resume_path.clone())
        .map(|p| expand_home(&p))
        .unwrap_or_else(|| base.join("resume"));
    let storage_path = args
        .storage
        .clone()
        .or_else(|| file.storage_path.clone())
        .map(|p| expand_home(&p))
        .unwrap_or_else(|| base.join("storage_state.json"));

    let flag_display = if args.headed {
        Some(DisplayMode::Headed)
    } else if args.background {
        Some(DisplayMode::Background)
    } else {
        None
    };
    let mut display = flag_display.or(file.display).unwrap_or_default();
    let mode = if setup || args.interactive {
        RunMode::Interactive
    } else {
        RunMode::Unattended
    };
    if setup && display == DisplayMode::Headless {
        display = DisplayMode::Headed;
    }

    let username = args
        .username
        .clone()
        .or_else(|| env_nonempty(USERNAME_ENV))
        .or_else(|| file.username.clone())
        .unwrap_or_default();

    let password = PasswordRef {
        env_var: Some(
            args.password_env
                .clone()
                .or_else(|| file.password_env.clone())
                .unwrap_or_else(|| DEFAULT_PASSWORD_ENV.to_string()),
        ),
        keychain_service: Some(
            args.keychain_service
                .clone()
                .or_else(|| file.keychain_service.clone())
                .unwrap_or_else(|| DEFAULT_KEYCHAIN_SERVICE.to_string()),
        ),
    };

    let defaults = NotifyConfig::default();
    let notify = NotifyConfig {
        email_to: args
            .email_to
            .clone()
            .or_else(|| env_nonempty(NOTIFY_TO_ENV))
            .or_else(|| file.notify.email_to.clone())
            .or_else(|| username.contains('@').then(|| username.clone())),
        email_on_success: args.email_on_success
            || file.notify.email_on_success.unwrap_or(defaults.email_on_success),
        email_on_failure: !args.no_email_on_failure
            && file.notify.email_on_failure.unwrap_or(defaults.email_on_failure),
    };

    let mut timeouts = file.timeouts.apply(Timeouts::default());
    if let Some(secs) = args.otp_timeout {
        timeouts.otp = Duration::from_secs(secs);
    }

    let browser = args
        .browser
        .map(BrowserKind::from)
        .or(file.browser)
        .unwrap_or_default();
    let webdriver_url = args
        .webdriver_url
        .clone()
        .or_else(|| env_nonempty(WEBDRIVER_URL_ENV))
        .or_else(|| file.webdriver_url.clone())
        .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());

    let run = RunConfig {
        mode,
        display,
        storage_path,
        resume_path,
        credentials: Credentials { username, password },
        notify,
        timeouts,
        portal: file.portal.unwrap_or_default(),
    };

    Ok(Settings {
        run,
        browser,
        webdriver_url,
    })
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_HOME_DIR)
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
