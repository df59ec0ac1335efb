//! Error taxonomy for a single upload run.
//!
//! Every phase has its own error type; [`WorkflowError`] unifies the ones that
//! can abort a run before the upload step, and [`ErrorKind`] is the stable,
//! human-readable name carried into the failure report.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Stable failure names surfaced in notifications and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileNotFound,
    NoResumeFound,
    AuthFailure,
    NetworkTimeout,
    UiElementNotFound,
    UploadNotConfirmed,
    CredentialNotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::NoResumeFound => "NoResumeFound",
            ErrorKind::AuthFailure => "AuthFailure",
            ErrorKind::NetworkTimeout => "NetworkTimeout",
            ErrorKind::UiElementNotFound => "UIElementNotFound",
            ErrorKind::UploadNotConfirmed => "UploadNotConfirmed",
            ErrorKind::CredentialNotFound => "CredentialNotFound",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("resume file not found or not a pdf/doc/docx/rtf file: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("no pdf/doc/docx/rtf resume found in {}", dir.display())]
    NoResumeFound { dir: PathBuf },

    #[error("cannot read resume location {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SelectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SelectError::NoResumeFound { .. } => ErrorKind::NoResumeFound,
            SelectError::FileNotFound { .. } | SelectError::Unreadable { .. } => {
                ErrorKind::FileNotFound
            }
        }
    }
}

/// Failures raised by a [`crate::contract::Browser`] implementation.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("webdriver error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no password available from {reference}")]
    NotFound { reference: String },
}

/// Why the portal refused to give us an authenticated page.
///
/// All of these are reported as [`ErrorKind::AuthFailure`]; the sub-reason only
/// enriches the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    BadCredentials,
    MissingUsername,
    OtpRequired,
    OtpTimedOut,
    OtpRejected,
    ManualLoginTimedOut,
    UnexpectedLoginPage,
}

impl fmt::Display for AuthFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AuthFailureReason::BadCredentials => "portal rejected the username or password",
            AuthFailureReason::MissingUsername => "no username configured for login",
            AuthFailureReason::OtpRequired => {
                "portal requires a one-time code and no operator is present"
            }
            AuthFailureReason::OtpTimedOut => "no one-time code entered before the timeout",
            AuthFailureReason::OtpRejected => "portal did not accept the one-time code",
            AuthFailureReason::ManualLoginTimedOut => {
                "profile page did not appear before the manual login timeout"
            }
            AuthFailureReason::UnexpectedLoginPage => "login page did not look as expected",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    Failure(AuthFailureReason),

    #[error("portal did not respond: {0}")]
    NetworkTimeout(String),

    #[error("browser error during login: {0}")]
    Browser(BrowserError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Failure(_) | AuthError::Browser(_) => ErrorKind::AuthFailure,
            AuthError::NetworkTimeout(_) => ErrorKind::NetworkTimeout,
            AuthError::Credential(_) => ErrorKind::CredentialNotFound,
        }
    }
}

impl From<BrowserError> for AuthError {
    fn from(e: BrowserError) -> Self {
        match e {
            BrowserError::Timeout(_) | BrowserError::Transport(_) => {
                AuthError::NetworkTimeout(e.to_string())
            }
            other => AuthError::Browser(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload control not found: {0}")]
    UiElementNotFound(String),

    #[error("no upload confirmation within {0:?}")]
    NotConfirmed(Duration),

    #[error("portal did not respond: {0}")]
    NetworkTimeout(String),

    #[error("browser error during upload: {0}")]
    Browser(String),
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::UiElementNotFound(_) => ErrorKind::UiElementNotFound,
            UploadError::NotConfirmed(_) => ErrorKind::UploadNotConfirmed,
            // Browser crashes and local file errors are not layout problems.
            UploadError::NetworkTimeout(_) | UploadError::Browser(_) => ErrorKind::NetworkTimeout,
        }
    }
}

impl From<BrowserError> for UploadError {
    fn from(e: BrowserError) -> Self {
        match e {
            BrowserError::Timeout(_) | BrowserError::Transport(_) => {
                UploadError::NetworkTimeout(e.to_string())
            }
            BrowserError::ElementNotFound(what) => UploadError::UiElementNotFound(what),
            BrowserError::Protocol(msg) => UploadError::Browser(msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session state could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit {
        program: &'static str,
        status: std::process::ExitStatus,
    },
}

/// Anything that aborts a run before the upload step produces its own result.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Select(e) => e.kind(),
            WorkflowError::Auth(e) => e.kind(),
        }
    }
}
