use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use tracing::{error, info, warn};

use crate::authenticate::ActiveSession;
use crate::config::RunConfig;
use crate::contract::{first_present, Browser};
use crate::error::{ErrorKind, UploadError};
use crate::portal::{upload_date, Locator, PortalProfile};
use crate::resume::ResumeFile;
use crate::session::SessionStore;
use crate::wait::poll_until;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: ErrorKind,
    pub detail: String,
}

/// Outcome of one run. Reported once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub status: UploadStatus,
    pub reason: Option<FailureReason>,
    pub timestamp: DateTime<Utc>,
    /// The resume that was submitted, when the run got that far.
    pub file: Option<PathBuf>,
}

impl UploadResult {
    pub fn success(file: PathBuf) -> Self {
        UploadResult {
            status: UploadStatus::Success,
            reason: None,
            timestamp: Utc::now(),
            file: Some(file),
        }
    }

    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        UploadResult {
            status: UploadStatus::Failure,
            reason: Some(FailureReason {
                kind,
                detail: detail.into(),
            }),
            timestamp: Utc::now(),
            file: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UploadStatus::Success
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.reason.as_ref().map(|r| r.kind)
    }
}

/// Replaces the resume stored on the portal and verifies the portal took it.
pub struct UploadExecutor<'a> {
    config: &'a RunConfig,
    store: &'a SessionStore,
}

impl<'a> UploadExecutor<'a> {
    pub fn new(config: &'a RunConfig, store: &'a SessionStore) -> Self {
        UploadExecutor { config, store }
    }

    pub async fn upload(&self, session: &ActiveSession<'_>, resume: &ResumeFile) -> UploadResult {
        let browser = session.browser();
        match self.submit_and_confirm(browser, resume).await {
            Ok(confirmation) => {
                info!(file = %resume.file_name(), confirmation = %confirmation, "[UPLOAD] Portal confirmed the new resume");
                // A working upload proves the session is still good.
                match browser.storage_state().await {
                    Ok(state) if state.is_empty() => {
                        warn!("[UPLOAD] Browser returned no cookies, keeping the stored session")
                    }
                    Ok(state) => {
                        if let Err(e) = self.store.save(&state) {
                            warn!(error = %e, "[UPLOAD] Could not refresh stored session");
                        }
                    }
                    Err(e) => warn!(error = %e, "[UPLOAD] Could not capture session state"),
                }
                UploadResult::success(resume.path.clone())
            }
            Err(e) => {
                error!(file = %resume.file_name(), kind = %e.kind(), error = %e, "[UPLOAD] Upload failed");
                let mut result = UploadResult::failure(e.kind(), e.to_string());
                result.file = Some(resume.path.clone());
                result
            }
        }
    }

    /// Returns the confirmation snippet that appeared after submitting.
    async fn submit_and_confirm(
        &self,
        browser: &dyn Browser,
        resume: &ResumeFile,
    ) -> Result<String, UploadError> {
        let portal = &self.config.portal;
        let timeouts = &self.config.timeouts;

        info!(url = %portal.profile_url, "[UPLOAD] Opening profile page");
        browser.goto(&portal.profile_url, timeouts.navigation).await?;

        // Anything already on the page (e.g. the previous "Uploaded on" date)
        // cannot count as confirmation for this upload, unless it is dated
        // today: a same-day re-upload leaves the date unchanged.
        let baseline: HashSet<String> = portal
            .confirmation_snippets(&browser.content().await?)
            .into_iter()
            .collect();
        let today = Local::now().date_naive();

        let input = self.locate_upload_input(browser, portal).await?;
        info!(file = %resume.file_name(), control = %input, "[UPLOAD] Submitting resume");
        browser.set_file(&input, &resume.path).await?;

        let baseline = &baseline;
        let confirmed = poll_until(timeouts.upload_confirm, timeouts.poll_interval, || async move {
            match browser.content().await {
                Ok(page) => portal
                    .confirmation_snippets(&page)
                    .into_iter()
                    .find(|snippet| {
                        !baseline.contains(snippet) || upload_date(snippet) == Some(today)
                    })
                    .map(Ok),
                Err(e) => Some(Err(e)),
            }
        })
        .await;

        match confirmed {
            Some(Ok(snippet)) => Ok(snippet),
            Some(Err(e)) => Err(e.into()),
            None => Err(UploadError::NotConfirmed(timeouts.upload_confirm)),
        }
    }

    /// Finds the file input, clicking the upload trigger once if the input is
    /// only injected on demand.
    async fn locate_upload_input(
        &self,
        browser: &dyn Browser,
        portal: &PortalProfile,
    ) -> Result<Locator, UploadError> {
        if let Some(input) = first_present(browser, &portal.upload_inputs).await? {
            return Ok(input);
        }

        if !browser.exists(&portal.upload_trigger).await? {
            return Err(UploadError::UiElementNotFound(format!(
                "no file input and no {}",
                portal.upload_trigger
            )));
        }
        info!(trigger = %portal.upload_trigger, "[UPLOAD] No file input yet, clicking the upload button");
        browser.click(&portal.upload_trigger).await?;

        let timeouts = &self.config.timeouts;
        let found = poll_until(timeouts.probe, timeouts.poll_interval, || async move {
            first_present(browser, &portal.upload_inputs).await.transpose()
        })
        .await;

        match found {
            Some(Ok(input)) => Ok(input),
            Some(Err(e)) => Err(e.into()),
            None => Err(UploadError::UiElementNotFound(
                "file input did not appear after clicking the upload button".to_string(),
            )),
        }
    }
}
