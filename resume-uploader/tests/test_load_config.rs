use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;

use resume_uploader::cli::{BrowserArg, RunArgs};
use resume_uploader::load_config::{
    expand_home, load_config, resolve, DEFAULT_KEYCHAIN_SERVICE, DEFAULT_PASSWORD_ENV,
};
use resume_uploader_core::config::{DisplayMode, RunMode};
use resume_uploader_core::portal::Locator;
use resume_uploader_core::webdriver::{BrowserKind, DEFAULT_WEBDRIVER_URL};
use serial_test::serial;
use tempfile::NamedTempFile;

fn clear_env() {
    for var in [
        "NAUKRI_USERNAME",
        "NAUKRI_NOTIFY_TO",
        "RESUME_UPLOADER_WEBDRIVER_URL",
    ] {
        env::remove_var(var);
    }
}

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

#[test]
#[serial]
fn defaults_without_config_file() {
    clear_env();
    let settings = resolve(&RunArgs::default(), false).expect("defaults should resolve");
    let run = &settings.run;

    assert!(run.resume_path.ends_with("naukri_job/resume"), "{:?}", run.resume_path);
    assert!(run.storage_path.ends_with("naukri_job/storage_state.json"));
    assert_eq!(run.mode, RunMode::Unattended);
    assert_eq!(run.display, DisplayMode::Headless);
    assert_eq!(run.credentials.username, "");
    assert_eq!(run.credentials.password.env_var.as_deref(), Some(DEFAULT_PASSWORD_ENV));
    assert_eq!(
        run.credentials.password.keychain_service.as_deref(),
        Some(DEFAULT_KEYCHAIN_SERVICE)
    );
    assert_eq!(run.notify.email_to, None);
    assert!(!run.notify.email_on_success);
    assert!(run.notify.email_on_failure);
    assert_eq!(run.timeouts.otp, Duration::from_secs(600));
    assert_eq!(run.timeouts.upload_confirm, Duration::from_secs(15));
    assert_eq!(settings.browser, BrowserKind::Chrome);
    assert_eq!(settings.webdriver_url, DEFAULT_WEBDRIVER_URL);
    assert_eq!(run.portal.name, "naukri");
}

#[test]
#[serial]
fn config_file_values_are_used() {
    clear_env();
    let file = config_file(
        r#"
resume_path: /data/resumes
storage_path: /data/state.json
display: background
browser: firefox
username: jobseeker@example.com
password_env: MY_PORTAL_PASSWORD
notify:
  email_on_success: true
timeouts:
  upload_confirm_secs: 30
  poll_interval_ms: 250
"#,
    );
    let args = RunArgs {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let settings = resolve(&args, false).unwrap();
    let run = &settings.run;

    assert_eq!(run.resume_path, PathBuf::from("/data/resumes"));
    assert_eq!(run.storage_path, PathBuf::from("/data/state.json"));
    assert_eq!(run.display, DisplayMode::Background);
    assert_eq!(settings.browser, BrowserKind::Firefox);
    assert_eq!(run.credentials.password.env_var.as_deref(), Some("MY_PORTAL_PASSWORD"));
    // Email recipient falls back to an email-shaped username.
    assert_eq!(run.notify.email_to.as_deref(), Some("jobseeker@example.com"));
    assert!(run.notify.email_on_success);
    assert_eq!(run.timeouts.upload_confirm, Duration::from_secs(30));
    assert_eq!(run.timeouts.poll_interval, Duration::from_millis(250));
    assert_eq!(run.timeouts.navigation, Duration::from_secs(60));
}

#[test]
#[serial]
fn environment_overrides_file_and_flags_override_environment() {
    clear_env();
    let file = config_file(
        "username: from-file\nwebdriver_url: http://file:4444\nnotify:\n  email_to: file@example.com\n",
    );
    env::set_var("NAUKRI_USERNAME", "from-env@example.com");
    env::set_var("NAUKRI_NOTIFY_TO", "env@example.com");
    env::set_var("RESUME_UPLOADER_WEBDRIVER_URL", "http://env:4444");

    let args = RunArgs {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let settings = resolve(&args, false).unwrap();
    assert_eq!(settings.run.credentials.username, "from-env@example.com");
    assert_eq!(settings.run.notify.email_to.as_deref(), Some("env@example.com"));
    assert_eq!(settings.webdriver_url, "http://env:4444");

    let args = RunArgs {
        config: Some(file.path().to_path_buf()),
        username: Some("from-flag".to_string()),
        email_to: Some("flag@example.com".to_string()),
        webdriver_url: Some("http://flag:4444".to_string()),
        browser: Some(BrowserArg::Firefox),
        no_email_on_failure: true,
        otp_timeout: Some(120),
        ..Default::default()
    };
    let settings = resolve(&args, false).unwrap();
    assert_eq!(settings.run.credentials.username, "from-flag");
    assert_eq!(settings.run.notify.email_to.as_deref(), Some("flag@example.com"));
    assert_eq!(settings.webdriver_url, "http://flag:4444");
    assert_eq!(settings.browser, BrowserKind::Firefox);
    assert!(!settings.run.notify.email_on_failure);
    assert_eq!(settings.run.timeouts.otp, Duration::from_secs(120));

    clear_env();
}

#[test]
#[serial]
fn setup_is_interactive_and_visible() {
    clear_env();
    let settings = resolve(&RunArgs::default(), true).unwrap();
    assert_eq!(settings.run.mode, RunMode::Interactive);
    assert_eq!(settings.run.display, DisplayMode::Headed);

    let args = RunArgs {
        background: true,
        ..Default::default()
    };
    let settings = resolve(&args, true).unwrap();
    assert_eq!(settings.run.display, DisplayMode::Background);

    let args = RunArgs {
        interactive: true,
        ..Default::default()
    };
    let settings = resolve(&args, false).unwrap();
    assert_eq!(settings.run.mode, RunMode::Interactive);
    assert_eq!(settings.run.display, DisplayMode::Headless);
}

#[test]
#[serial]
fn portal_overrides_merge_onto_builtin_profile() {
    clear_env();
    let file = config_file(
        r#"
portal:
  profile_url: https://portal.example/profile
  upload_inputs:
    - css: "input#attachCV"
  upload_trigger:
    button_text: "attach cv"
  confirmations:
    - "cv\\s+updated"
"#,
    );
    let config = load_config(file.path()).unwrap();
    let portal = config.portal.expect("portal section");

    assert_eq!(portal.profile_url, "https://portal.example/profile");
    assert_eq!(portal.upload_inputs, vec![Locator::css("input#attachCV")]);
    assert_eq!(portal.upload_trigger, Locator::button("attach cv"));
    assert_eq!(portal.confirmation_snippets("Your CV  updated today").len(), 1);
    // Untouched fields keep the built-in values.
    assert_eq!(portal.login_url, "https://www.naukri.com/nlogin/login");
    assert_eq!(portal.authenticated_marker, Locator::button("update resume"));
}

#[test]
#[serial]
fn unknown_keys_and_bad_patterns_are_rejected() {
    clear_env();
    let typo = config_file("resme_path: /tmp\n");
    let err = load_config(typo.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"), "{err}");

    let bad_regex = config_file("portal:\n  confirmations:\n    - \"(unclosed\"\n");
    assert!(load_config(bad_regex.path()).is_err());

    let args = RunArgs {
        config: Some(PathBuf::from("/definitely/not/here.yaml")),
        ..Default::default()
    };
    let err = resolve(&args, false).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"), "{err}");
}

#[test]
fn tilde_paths_expand_to_home() {
    let expanded = expand_home(&PathBuf::from("~/naukri_job/resume"));
    assert!(!expanded.starts_with("~"));
    assert!(expanded.ends_with("naukri_job/resume"));
    assert_eq!(expand_home(&PathBuf::from("/abs/path")), PathBuf::from("/abs/path"));
}
