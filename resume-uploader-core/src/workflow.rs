//! High-level run: session → login → resume → upload → report.
//!
//! This module owns the order of operations for one scheduled run and the
//! mapping from whatever happened to a single report and an exit status.
//!
//! # Sequence
//!   1. [`SessionStore::load`] the previous browser session (absent is fine)
//!   2. [`Authenticator::authenticate`] restores it or logs in again
//!   3. [`resume::select`] picks the newest resume
//!   4. [`UploadExecutor::upload`] submits it and waits for confirmation
//!   5. [`NotificationDispatcher::report`] emits exactly one report
//!
//! # Error Handling
//! Every terminal error short-circuits to step 5 as a failed [`UploadResult`]
//! carrying the error kind. Nothing is retried here; the only fallback in a
//! run is the restore → fresh-login step inside the authenticator.
//!
//! # Concurrency
//! One run, one browser context, strictly sequential. Overlapping runs are
//! the scheduler's problem: the session file is not locked.

use std::process::ExitCode;

use tracing::{error, info, warn};

use crate::authenticate::Authenticator;
use crate::config::RunConfig;
use crate::contract::{Browser, CredentialStore, Notifier, OtpPrompt};
use crate::error::{ErrorKind, WorkflowError};
use crate::notify::NotificationDispatcher;
use crate::resume;
use crate::session::{SessionState, SessionStore};
use crate::upload::{UploadExecutor, UploadResult};

/// Process outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Resume could not be selected.
    ResumeUnavailable,
    /// The portal's upload control was not found.
    UploadControlMissing,
    Failure,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::ResumeUnavailable => 2,
            ExitStatus::UploadControlMissing => 3,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == ExitStatus::Success
    }
}

impl From<&UploadResult> for ExitStatus {
    fn from(result: &UploadResult) -> Self {
        if result.is_success() {
            return ExitStatus::Success;
        }
        match result.failure_kind() {
            Some(ErrorKind::FileNotFound) | Some(ErrorKind::NoResumeFound) => {
                ExitStatus::ResumeUnavailable
            }
            Some(ErrorKind::UiElementNotFound) => ExitStatus::UploadControlMissing,
            _ => ExitStatus::Failure,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// The external collaborators a run talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub browser: &'a dyn Browser,
    pub credentials: &'a dyn CredentialStore,
    pub notifier: &'a dyn Notifier,
    pub otp: &'a dyn OtpPrompt,
}

pub struct WorkflowController<'a> {
    config: &'a RunConfig,
    store: &'a SessionStore,
    services: Services<'a>,
}

impl<'a> WorkflowController<'a> {
    pub fn new(config: &'a RunConfig, store: &'a SessionStore, services: Services<'a>) -> Self {
        WorkflowController {
            config,
            store,
            services,
        }
    }

    /// One scheduled run. Always emits exactly one report.
    pub async fn run(&self) -> ExitStatus {
        info!(
            storage = %self.store.path().display(),
            resume = %self.config.resume_path.display(),
            "[RUN] Starting resume upload run"
        );

        let stored = self.store.load();
        let result = match self.execute(stored).await {
            Ok(result) => result,
            Err(e) => {
                error!(kind = %e.kind(), error = %e, "[RUN] Run aborted");
                UploadResult::failure(e.kind(), e.to_string())
            }
        };
        self.close_browser().await;

        NotificationDispatcher::new(self.services.notifier)
            .report(&result, self.config)
            .await;

        let status = ExitStatus::from(&result);
        info!(status = ?status, code = status.code(), "[RUN] Finished");
        status
    }

    async fn execute(&self, stored: Option<SessionState>) -> Result<UploadResult, WorkflowError> {
        let authenticator = Authenticator::new(
            self.services.browser,
            self.services.credentials,
            self.services.otp,
            self.store,
        );
        let session = authenticator.authenticate(self.config, stored).await?;

        let resume = resume::select(&self.config.resume_path)?;
        info!(
            file = %resume.path.display(),
            extension = resume.extension.as_str(),
            "[RUN] Resume selected"
        );

        Ok(UploadExecutor::new(self.config, self.store)
            .upload(&session, &resume)
            .await)
    }

    /// Interactive setup: log in (or confirm the stored session) and save the
    /// session. No upload, no notification.
    pub async fn setup(&self, manual: bool) -> ExitStatus {
        info!(manual, "[SETUP] Starting interactive session setup");
        let authenticator = Authenticator::new(
            self.services.browser,
            self.services.credentials,
            self.services.otp,
            self.store,
        );

        let outcome = if manual {
            authenticator.manual_login(self.config).await
        } else {
            authenticator
                .authenticate(self.config, self.store.load())
                .await
        };
        let status = match outcome {
            Ok(session) => {
                info!(origin = ?session.origin(), path = %self.store.path().display(), "[SETUP] Session ready");
                ExitStatus::Success
            }
            Err(e) => {
                error!(kind = %e.kind(), error = %e, "[SETUP] Could not establish a session");
                ExitStatus::Failure
            }
        };
        self.close_browser().await;
        status
    }

    async fn close_browser(&self) {
        if let Err(e) = self.services.browser.close().await {
            warn!(error = %e, "[RUN] Browser did not close cleanly");
        }
    }
}
