use std::fs::write;
use std::sync::{Arc, Mutex};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

use resume_uploader::cli::{run, Cli, Commands, RunArgs};

/// A binary invocation with the portal environment cleared.
fn uploader() -> Command {
    let mut cmd = Command::cargo_bin("resume-uploader").expect("Binary exists");
    for var in [
        "NAUKRI_USERNAME",
        "NAUKRI_PASSWORD",
        "NAUKRI_NOTIFY_TO",
        "RESUME_UPLOADER_WEBDRIVER_URL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_both_subcommands() {
    uploader()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run").and(predicate::str::contains("setup")));
}

#[test]
fn run_help_documents_resume_and_storage_flags() {
    uploader()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--resume")
                .and(predicate::str::contains("--storage"))
                .and(predicate::str::contains("--background")),
        );
}

#[test]
fn headed_and_background_conflict() {
    uploader()
        .args(["run", "--headed", "--background"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn malformed_config_fails_before_starting_a_browser() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("uploader.yaml");
    write(&config, "resume_path: [unterminated\n").unwrap();

    uploader()
        .args(["run", "--config"])
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config YAML"));
}

#[test]
fn unreachable_webdriver_is_reported_as_network_timeout() {
    let dir = tempdir().unwrap();
    let resumes = dir.path().join("resume");
    std::fs::create_dir(&resumes).unwrap();
    write(resumes.join("cv.pdf"), b"resume").unwrap();

    // Port 9 (discard) refuses connections on any sane test host.
    uploader()
        .args(["run", "--webdriver-url", "http://127.0.0.1:9", "--resume"])
        .arg(&resumes)
        .arg("--storage")
        .arg(dir.path().join("storage_state.json"))
        .arg("--no-email-on-failure")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("NetworkTimeout").and(predicate::str::contains("exit")));

    assert!(!dir.path().join("storage_state.json").exists());
}

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    // A missing config file stops the run right after start-up.
    let cli = Cli {
        command: Commands::Run {
            args: RunArgs {
                config: Some(std::path::PathBuf::from("does-not-exist.yaml")),
                ..Default::default()
            },
        },
    };

    let result = run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
