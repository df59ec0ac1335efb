//! Run reporting: one popup per run, plus email according to the notify
//! settings. Delivery problems are logged and otherwise ignored.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::Local;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::contract::Notifier;
use crate::error::{ErrorKind, NotifyError};
use crate::upload::{UploadResult, UploadStatus};

/// Title, body and email subject for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub title: String,
    pub body: String,
    pub subject: String,
}

impl Report {
    pub fn from_result(result: &UploadResult) -> Self {
        let at = result
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S");
        match result.status {
            UploadStatus::Success => {
                let file = result
                    .file
                    .as_ref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "resume".to_string());
                Report {
                    title: "Resume uploader succeeded".to_string(),
                    body: format!("{file} uploaded at {at}."),
                    subject: "Resume upload: success".to_string(),
                }
            }
            UploadStatus::Failure => {
                let (kind, detail) = match &result.reason {
                    Some(reason) => (Some(reason.kind), reason.detail.as_str()),
                    None => (None, "unknown error"),
                };
                let label = kind.map(|k| k.as_str()).unwrap_or("Failure");
                let mut body = format!("{label}: {detail}.");
                if let Some(hint) = kind.and_then(hint_for) {
                    body.push(' ');
                    body.push_str(hint);
                }
                Report {
                    title: "Resume uploader failed".to_string(),
                    body,
                    subject: "Resume upload: failed".to_string(),
                }
            }
        }
    }
}

fn hint_for(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::FileNotFound | ErrorKind::NoResumeFound => Some(
            "Check the resume path, grant the uploader disk access, or move the resume out of protected folders.",
        ),
        ErrorKind::AuthFailure => Some("Re-run `resume-uploader setup` to refresh the login session."),
        ErrorKind::UiElementNotFound => {
            Some("You may need to re-run setup, or the portal layout changed.")
        }
        ErrorKind::UploadNotConfirmed => Some("Please verify the resume on the portal."),
        ErrorKind::CredentialNotFound => {
            Some("Set the password environment variable or keychain entry.")
        }
        ErrorKind::NetworkTimeout => None,
    }
}

pub struct NotificationDispatcher<'a> {
    notifier: &'a dyn Notifier,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(notifier: &'a dyn Notifier) -> Self {
        NotificationDispatcher { notifier }
    }

    /// Emits the run report. Never fails.
    pub async fn report(&self, result: &UploadResult, config: &RunConfig) {
        let report = Report::from_result(result);
        info!(status = ?result.status, title = %report.title, body = %report.body, "[NOTIFY] Reporting run outcome");

        if let Err(e) = self.notifier.popup(&report.title, &report.body).await {
            warn!(error = %e, "[NOTIFY] Popup delivery failed");
        }

        let notify = &config.notify;
        let wants_email = match result.status {
            UploadStatus::Success => notify.email_on_success,
            UploadStatus::Failure => notify.email_on_failure,
        };
        match (&notify.email_to, wants_email) {
            (Some(to), true) => {
                if let Err(e) = self.notifier.email(to, &report.subject, &report.body).await {
                    warn!(error = %e, to = %to, "[NOTIFY] Email delivery failed");
                }
            }
            (None, true) => debug!("[NOTIFY] Email wanted but no recipient configured"),
            (_, false) => debug!("[NOTIFY] Email not enabled for this outcome"),
        }
    }
}

/// Escapes a string for embedding in an AppleScript string literal.
pub fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Desktop notifications via `osascript` on macOS and `notify-send`
/// elsewhere; email via Mail.app on macOS and `sendmail -t` elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNotifier;

impl SystemNotifier {
    async fn run(program: &'static str, args: &[String]) -> Result<(), NotifyError> {
        let status = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| NotifyError::Spawn { program, source })?;
        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::Exit { program, status })
        }
    }

    async fn sendmail(message: &str) -> Result<(), NotifyError> {
        let program = "sendmail";
        let mut child = Command::new(program)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| NotifyError::Spawn { program, source })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(|source| NotifyError::Spawn { program, source })?;
        }
        let status = child
            .wait()
            .await
            .map_err(|source| NotifyError::Spawn { program, source })?;
        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::Exit { program, status })
        }
    }
}

#[async_trait]
impl Notifier for SystemNotifier {
    async fn popup(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                applescript_escape(body),
                applescript_escape(title)
            );
            Self::run("osascript", &["-e".to_string(), script]).await
        } else {
            Self::run("notify-send", &[title.to_string(), body.to_string()]).await
        }
    }

    async fn email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if cfg!(target_os = "macos") {
            let lines = [
                "tell application \"Mail\"".to_string(),
                format!(
                    "set newMessage to make new outgoing message with properties {{subject:\"{}\", content:\"{}\\n\", visible:false}}",
                    applescript_escape(subject),
                    applescript_escape(body)
                ),
                format!(
                    "tell newMessage to make new to recipient at end of to recipients with properties {{address:\"{}\"}}",
                    applescript_escape(to)
                ),
                "send newMessage".to_string(),
                "end tell".to_string(),
            ];
            let args: Vec<String> = lines
                .into_iter()
                .flat_map(|line| ["-e".to_string(), line])
                .collect();
            Self::run("osascript", &args).await
        } else {
            let message = format!("To: {to}\nSubject: {subject}\n\n{body}\n");
            Self::sendmail(&message).await
        }
    }
}
