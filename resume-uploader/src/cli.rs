//! # resume-uploader CLI
//!
//! Command parsing and wiring for the `resume-uploader` binary. The workflow
//! itself (session restore, login fallback, resume selection, verified upload
//! and reporting) lives in `resume-uploader-core`; this module only turns
//! flags and config into a [`RunConfig`](resume_uploader_core::config::RunConfig),
//! builds the concrete adapters and hands them to the workflow controller.
//!
//! ## Subcommands
//! - `run`: the scheduled, unattended upload. Exit code reflects the outcome.
//! - `setup`: headed, interactive login that saves the session for later
//!   unattended runs. `--manual` leaves the whole login to the operator.
//!
//! For programmatic and integration use, call [`run`] with a constructed [`Cli`].
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use resume_uploader_core::credentials::SystemCredentialStore;
use resume_uploader_core::notify::SystemNotifier;
use resume_uploader_core::otp::StdinOtpPrompt;
use resume_uploader_core::session::SessionStore;
use resume_uploader_core::webdriver::{BrowserKind, WebDriverBrowser};
use resume_uploader_core::workflow::{ExitStatus, Services, WorkflowController};

use crate::load_config::resolve;

/// Headroom for ordinary WebDriver commands on top of the navigation timeout.
const REQUEST_SLACK: Duration = Duration::from_secs(10);

/// Keeps a job-portal resume fresh by re-uploading the newest local copy.
#[derive(Parser, Debug)]
#[clap(
    name = "resume-uploader",
    version,
    about = "Re-upload the newest local resume to the job portal, reusing a saved login session"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload the newest resume (what the scheduler runs)
    Run {
        #[clap(flatten)]
        args: RunArgs,
    },
    /// Log in interactively in a visible browser and save the session
    Setup {
        /// Do not fill the login form; wait while you log in by hand
        #[clap(long)]
        manual: bool,
        #[clap(flatten)]
        args: RunArgs,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserArg {
    Chrome,
    Firefox,
}

impl From<BrowserArg> for BrowserKind {
    fn from(arg: BrowserArg) -> Self {
        match arg {
            BrowserArg::Chrome => BrowserKind::Chrome,
            BrowserArg::Firefox => BrowserKind::Firefox,
        }
    }
}

/// Flags shared by `run` and `setup`. Every flag overrides the config file
/// and the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Optional YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Resume file, or a folder to pick the newest pdf/doc/docx/rtf from
    #[clap(long)]
    pub resume: Option<PathBuf>,

    /// Where the browser session is stored between runs
    #[clap(long)]
    pub storage: Option<PathBuf>,

    /// Show the browser window
    #[clap(long, conflicts_with = "background")]
    pub headed: bool,

    /// Run a real browser window parked off-screen
    #[clap(long)]
    pub background: bool,

    #[clap(long, value_enum)]
    pub browser: Option<BrowserArg>,

    /// WebDriver endpoint (chromedriver/geckodriver)
    #[clap(long)]
    pub webdriver_url: Option<String>,

    /// Portal login (email or username)
    #[clap(long)]
    pub username: Option<String>,

    /// Environment variable holding the password
    #[clap(long)]
    pub password_env: Option<String>,

    /// Keychain service name holding the password
    #[clap(long)]
    pub keychain_service: Option<String>,

    /// Recipient for email reports
    #[clap(long)]
    pub email_to: Option<String>,

    /// Also email on success
    #[clap(long)]
    pub email_on_success: bool,

    /// Do not email on failure
    #[clap(long)]
    pub no_email_on_failure: bool,

    /// Seconds to wait for a one-time code or a manual login
    #[clap(long)]
    pub otp_timeout: Option<u64>,

    /// Prompt for a one-time code instead of failing the run
    #[clap(long)]
    pub interactive: bool,
}

/// Async CLI entrypoint for main() and integration tests.
///
/// Configuration errors surface as `Err`; everything after that is reported
/// through the returned [`ExitStatus`].
pub async fn run(cli: Cli) -> Result<ExitStatus> {
    tracing::info!("trace_initialised");

    let (args, setup, manual) = match cli.command {
        Commands::Run { args } => (args, false, false),
        Commands::Setup { manual, args } => (args, true, manual),
    };

    let settings = resolve(&args, setup)?;
    let config = &settings.run;
    config.trace_loaded();
    tracing::info!(
        command = if setup { "setup" } else { "run" },
        browser = ?settings.browser,
        webdriver = %settings.webdriver_url,
        "Starting"
    );

    let store = SessionStore::new(&config.storage_path);
    let browser = WebDriverBrowser::new(
        &settings.webdriver_url,
        settings.browser,
        &config.portal.origin,
        config.timeouts.navigation + REQUEST_SLACK,
    )?;
    let credentials = SystemCredentialStore;
    let notifier = SystemNotifier;
    let otp = StdinOtpPrompt;
    let controller = WorkflowController::new(
        config,
        &store,
        Services {
            browser: &browser,
            credentials: &credentials,
            notifier: &notifier,
            otp: &otp,
        },
    );

    let status = if setup {
        controller.setup(manual).await
    } else {
        controller.run().await
    };

    let span = tracing::info_span!("exit", code = status.code());
    let _entered = span.enter();
    tracing::info!(status = ?status, "exit");
    Ok(status)
}
