#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use resume_uploader_core::config::{
    Credentials, DisplayMode, NotifyConfig, PasswordRef, RunConfig, RunMode, Timeouts,
};
use resume_uploader_core::contract::{LaunchOptions, MockBrowser};
use resume_uploader_core::error::BrowserError;
use resume_uploader_core::portal::{Locator, PortalProfile};
use resume_uploader_core::session::{Cookie, SessionState};

pub const GOOD_OTP: &str = "123456";

/// Short timeouts so failure paths finish in milliseconds.
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        navigation: Duration::from_secs(1),
        login_settle: Duration::from_millis(60),
        probe: Duration::from_millis(40),
        otp: Duration::from_secs(1),
        upload_confirm: Duration::from_millis(60),
        poll_interval: Duration::from_millis(5),
    }
}

pub fn test_config(storage: &Path, resume: &Path, mode: RunMode) -> RunConfig {
    RunConfig {
        mode,
        display: DisplayMode::Headless,
        storage_path: storage.to_path_buf(),
        resume_path: resume.to_path_buf(),
        credentials: Credentials {
            username: "jobseeker@example.com".to_string(),
            password: PasswordRef {
                env_var: Some("TEST_PORTAL_PASSWORD".to_string()),
                keychain_service: None,
            },
        },
        notify: NotifyConfig {
            email_to: Some("jobseeker@example.com".to_string()),
            email_on_success: false,
            email_on_failure: true,
        },
        timeouts: fast_timeouts(),
        portal: PortalProfile::default(),
    }
}

pub fn stored_session(token: &str) -> SessionState {
    SessionState::new(
        vec![Cookie {
            name: "nauk_at".to_string(),
            value: token.to_string(),
            domain: Some(".naukri.com".to_string()),
            path: Some("/".to_string()),
            secure: Some(true),
            http_only: Some(true),
            expiry: None,
            same_site: None,
        }],
        vec![],
    )
}

/// Writes `name` into `dir` with the given modification time.
pub fn write_resume(dir: &Path, name: &str, modified: SystemTime) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"resume").expect("write resume");
    File::options()
        .write(true)
        .open(&path)
        .expect("open resume")
        .set_modified(modified)
        .expect("set mtime");
    path
}

pub fn days_ago(days: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadControl {
    #[default]
    Direct,
    BehindButton,
    Missing,
}

/// How the simulated portal behaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalScript {
    pub stored_session_valid: bool,
    pub credentials_valid: bool,
    pub otp_required: bool,
    pub upload_control: UploadControl,
    pub confirms_upload: bool,
    pub navigation_times_out: bool,
    /// The profile already shows an upload from earlier today.
    pub previous_upload_today: bool,
    pub empty_session_capture: bool,
    pub browser_crashes_on_upload: bool,
}

/// What the simulated portal saw.
#[derive(Debug, Default)]
pub struct PortalLog {
    pub launches: AtomicUsize,
    pub launched_with_state: AtomicBool,
    pub login_submits: AtomicUsize,
    pub otp_submits: AtomicUsize,
    pub uploads: AtomicUsize,
    pub closes: AtomicUsize,
    pub uploaded_file: Mutex<Option<PathBuf>>,
}

impl PortalLog {
    pub fn login_submits(&self) -> usize {
        self.login_submits.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn otp_submits(&self) -> usize {
        self.otp_submits.load(Ordering::SeqCst)
    }

    pub fn uploaded_file(&self) -> Option<PathBuf> {
        self.uploaded_file.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Blank,
    Login,
    Profile,
    Other,
}

#[derive(Debug)]
struct PortalState {
    page: Page,
    logged_in: bool,
    otp_pending: bool,
    otp_code: Option<String>,
    upload_input_revealed: bool,
    uploaded: bool,
}

const LOGIN_FORM: &str = r#"<form><input name="email"><input type="password" name="password"><button>Login</button></form>"#;
const OTP_FORM: &str = r#"<h2>Enter OTP sent to +91 98xxxxxx10</h2><input name="otp"><button>Verify</button>"#;
const PREVIOUS_UPLOAD: &str = "Jan 02, 2024";
const TOAST: &str = r#"<div class="toast">Resume has been uploaded successfully</div>"#;

pub fn today_label() -> String {
    chrono::Local::now().format("%b %d, %Y").to_string()
}

fn profile_page(uploaded_on: &str, toast: &str) -> String {
    format!(r#"<a>Logout</a><button>Update resume</button><span>Uploaded on {uploaded_on}</span>{toast}"#)
}

/// A `MockBrowser` that behaves like the portal described by `script`.
pub fn scripted_portal(script: PortalScript) -> (MockBrowser, Arc<PortalLog>) {
    let portal = Arc::new(PortalProfile::default());
    let state = Arc::new(Mutex::new(PortalState {
        page: Page::Blank,
        logged_in: false,
        otp_pending: false,
        otp_code: None,
        upload_input_revealed: false,
        uploaded: false,
    }));
    let log = Arc::new(PortalLog::default());
    let mut browser = MockBrowser::new();

    {
        let state = state.clone();
        let log = log.clone();
        browser.expect_launch().returning(move |options: LaunchOptions| {
            log.launches.fetch_add(1, Ordering::SeqCst);
            if options.state.is_some() {
                log.launched_with_state.store(true, Ordering::SeqCst);
                state.lock().unwrap().logged_in = script.stored_session_valid;
            }
            Ok(())
        });
    }

    {
        let state = state.clone();
        let portal = portal.clone();
        browser
            .expect_goto()
            .returning(move |url: &str, _timeout: Duration| {
                if script.navigation_times_out {
                    return Err(BrowserError::Timeout(format!("navigating to {url}")));
                }
                let mut s = state.lock().unwrap();
                s.page = if url == portal.login_url {
                    Page::Login
                } else if url == portal.profile_url {
                    Page::Profile
                } else {
                    Page::Other
                };
                Ok(())
            });
    }

    {
        let state = state.clone();
        let portal = portal.clone();
        browser.expect_exists().returning(move |locator: &Locator| {
            let s = state.lock().unwrap();
            let on_login_form = s.page == Page::Login && !s.logged_in && !s.otp_pending;
            let on_profile = s.page == Page::Profile && s.logged_in;
            let present = if *locator == portal.authenticated_marker {
                on_profile
            } else if *locator == portal.username_inputs[0]
                || *locator == portal.password_inputs[0]
                || *locator == portal.login_buttons[0]
            {
                on_login_form
            } else if *locator == portal.otp_inputs[1] || *locator == portal.otp_submit_buttons[0] {
                s.otp_pending
            } else if *locator == portal.upload_inputs[0] {
                on_profile
                    && match script.upload_control {
                        UploadControl::Direct => true,
                        UploadControl::BehindButton => s.upload_input_revealed,
                        UploadControl::Missing => false,
                    }
            } else {
                false
            };
            Ok(present)
        });
    }

    {
        let state = state.clone();
        let portal = portal.clone();
        browser
            .expect_fill()
            .returning(move |locator: &Locator, text: &str| {
                if *locator == portal.otp_inputs[1] {
                    state.lock().unwrap().otp_code = Some(text.to_string());
                }
                Ok(())
            });
    }

    {
        let state = state.clone();
        let portal = portal.clone();
        let log = log.clone();
        browser.expect_click().returning(move |locator: &Locator| {
            let mut s = state.lock().unwrap();
            if *locator == portal.login_buttons[0] {
                log.login_submits.fetch_add(1, Ordering::SeqCst);
                if script.credentials_valid {
                    if script.otp_required {
                        s.otp_pending = true;
                    } else {
                        s.logged_in = true;
                    }
                }
            } else if *locator == portal.otp_submit_buttons[0] {
                log.otp_submits.fetch_add(1, Ordering::SeqCst);
                if s.otp_code.as_deref() == Some(GOOD_OTP) {
                    s.otp_pending = false;
                    s.logged_in = true;
                }
            } else if *locator == portal.upload_trigger
                && script.upload_control == UploadControl::BehindButton
            {
                s.upload_input_revealed = true;
            }
            Ok(())
        });
    }

    browser
        .expect_press_enter()
        .returning(|_locator: &Locator| Ok(()));

    {
        let state = state.clone();
        let log = log.clone();
        browser
            .expect_set_file()
            .returning(move |_locator: &Locator, path: &Path| {
                if script.browser_crashes_on_upload {
                    return Err(BrowserError::Protocol(
                        "invalid session id: session deleted as the browser has closed the connection"
                            .to_string(),
                    ));
                }
                log.uploads.fetch_add(1, Ordering::SeqCst);
                *log.uploaded_file.lock().unwrap() = Some(path.to_path_buf());
                state.lock().unwrap().uploaded = true;
                Ok(())
            });
    }

    {
        let state = state.clone();
        browser.expect_content().returning(move || {
            let s = state.lock().unwrap();
            let before = if script.previous_upload_today {
                today_label()
            } else {
                PREVIOUS_UPLOAD.to_string()
            };
            let page = match s.page {
                Page::Blank | Page::Other => String::new(),
                Page::Login if s.otp_pending => OTP_FORM.to_string(),
                Page::Login if s.logged_in => "<p>Redirecting to your profile</p>".to_string(),
                Page::Login => LOGIN_FORM.to_string(),
                Page::Profile if !s.logged_in => "<p>Please sign in to continue</p>".to_string(),
                // Same-day re-uploads keep the date and show no toast.
                Page::Profile if s.uploaded && script.confirms_upload && script.previous_upload_today => {
                    profile_page(&before, "")
                }
                Page::Profile if s.uploaded && script.confirms_upload => {
                    profile_page(&today_label(), TOAST)
                }
                Page::Profile => profile_page(&before, ""),
            };
            Ok(page)
        });
    }

    browser.expect_storage_state().returning(move || {
        if script.empty_session_capture {
            Ok(SessionState::new(vec![], vec![]))
        } else {
            Ok(stored_session("fresh-token"))
        }
    });

    {
        let log = log.clone();
        browser.expect_close().returning(move || {
            log.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    (browser, log)
}
