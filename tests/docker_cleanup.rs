#![cfg(unix)]

use docker_push::artifact::{DOCKER_TAG_BUILDER_ID, DOCKER_TAGS_KEY};
use docker_push::{Config, FileArtifact, PostProcessor, PushError, StateValue, Ui};
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCRATCH_CREATED: &str = "Creating temporary Docker configuration directory";
const SCRATCH_REMOVED: &str = "Removing temporary Docker configuration directory";

#[derive(Default)]
struct RecordingUi {
    messages: Mutex<Vec<String>>,
}

impl RecordingUi {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    fn position(&self, message: &str) -> usize {
        self.messages()
            .iter()
            .position(|m| m == message)
            .unwrap_or_else(|| panic!("missing message: {}", message))
    }
}

impl Ui for RecordingUi {
    fn message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn say(&self, message: &str) {
        self.message(message);
    }

    fn error(&self, message: &str) {
        self.message(&format!("error: {}", message));
    }
}

/// Fake docker executable: logs each invocation, prefixed with whether the
/// `--config` directory existed at that moment. `push v2` exits with code 3.
fn write_fake_docker(dir: &Path, log: &Path) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "--config" ]; then
  if [ -d "$2" ]; then state=exists; else state=missing; fi
else
  state=noconfig
fi
echo "$state $*" >> "{log}"
case " $* " in
  *" login "*) cat > /dev/null ;;
  *" push v2 ") exit 3 ;;
esac
exit 0
"#,
        log = log.display()
    );

    let path = dir.join("fake-docker");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn read_log(log: &Path) -> Vec<String> {
    let lines = std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect();
    std::fs::remove_file(log).ok();
    lines
}

/// Directory passed as `--config` in a logged invocation
fn config_dir_of(line: &str) -> PathBuf {
    let mut words = line.split_whitespace();
    words.find(|w| *w == "--config").expect("no --config option");
    PathBuf::from(words.next().expect("no --config value"))
}

fn image(tags: &[&str]) -> FileArtifact {
    FileArtifact::new(DOCKER_TAG_BUILDER_ID, "myimage").with_state(
        DOCKER_TAGS_KEY,
        StateValue::Strings(tags.iter().map(|t| t.to_string()).collect()),
    )
}

fn processor(docker: &Path, shared: Option<OsString>) -> PostProcessor {
    let config = Config {
        executable: docker.display().to_string(),
        login: true,
        login_username: "ci".to_string(),
        login_password: "hunter2".to_string(),
        login_server: "reg".to_string(),
        ..Default::default()
    };
    PostProcessor::configure(config)
        .unwrap()
        .with_shared_config_dir(shared)
}

fn assert_logout_before_removal(ui: &RecordingUi, lines: &[String]) {
    let logout = lines
        .iter()
        .find(|line| line.ends_with("logout reg"))
        .expect("logout was not invoked");
    assert!(logout.starts_with("exists --config "), "{}", logout);
    assert!(!config_dir_of(logout).exists());
    assert!(lines.iter().all(|line| line.starts_with("exists ")));

    assert!(ui.position("Logging out...") < ui.position(SCRATCH_REMOVED));
}

// All scenarios share one script and run sequentially in a single test
#[tokio::test]
async fn test_scratch_config_dir_outlives_logout() {
    let work = tempfile::tempdir().unwrap();
    let log = work.path().join("calls.log");
    let docker = write_fake_docker(work.path(), &log);

    // Successful push
    let ui = RecordingUi::default();
    let output = processor(&docker, None)
        .post_process(&ui, &image(&["v1"]))
        .await
        .unwrap();
    assert_eq!(output.artifact.id, "myimage");

    let lines = read_log(&log);
    assert!(lines[0].ends_with("login -u ci --password-stdin reg"));
    assert!(lines.iter().any(|line| line.ends_with("push v1")));
    assert_eq!(ui.position(SCRATCH_CREATED), 0);
    assert_logout_before_removal(&ui, &lines);

    // Failing push
    let ui = RecordingUi::default();
    let err = processor(&docker, None)
        .post_process(&ui, &image(&["v1", "v2", "v3"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PushError::Command { exit_code: 3, .. }));

    let lines = read_log(&log);
    assert!(lines.iter().any(|line| line.ends_with("push v2")));
    assert!(!lines.iter().any(|line| line.ends_with("push v3")));
    assert_logout_before_removal(&ui, &lines);

    // Externally managed config directory
    let ui = RecordingUi::default();
    processor(&docker, Some(OsString::from(work.path())))
        .post_process(&ui, &image(&["v1"]))
        .await
        .unwrap();

    let lines = read_log(&log);
    assert!(lines.iter().all(|line| line.starts_with("noconfig ")));
    assert!(lines.iter().any(|line| line.ends_with("logout reg")));
    let messages = ui.messages();
    assert!(!messages.iter().any(|m| m == SCRATCH_CREATED || m == SCRATCH_REMOVED));
}
