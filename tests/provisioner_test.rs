mod helpers;

use anyhow::Result;
use camino::Utf8PathBuf;
use helpers::{Event, Fixture, RecordingExecutor, RecordingUi};
use rssalt::SaltError;
use rssalt::config::Config;
use rssalt::executor::{ExecutionResult, RemoteExecutor};
use rssalt::provisioner::{GeneratedData, Provisioner};
use tokio_util::sync::CancellationToken;

const STATES: &str = "/tmp/packer-provisioner-salt/states";
const PILLAR: &str = "/tmp/packer-provisioner-salt/pillar";

fn provision(config: &Config, executor: &dyn RemoteExecutor) -> (Result<()>, RecordingUi) {
    let mut provisioner = Provisioner::new();
    provisioner.prepare(config).expect("config should be valid");
    let ui = RecordingUi::default();
    let result =
        provisioner.provision(&CancellationToken::new(), &ui, executor, &GeneratedData::new());
    (result, ui)
}

fn paths(declared: &[&str]) -> Vec<Utf8PathBuf> {
    declared.iter().map(Utf8PathBuf::from).collect()
}

fn mkdir(path: &str) -> Event {
    Event::Run(format!("mkdir -p '{}'", path))
}

// =============================================================================
// Successful runs
// =============================================================================

#[test]
fn test_single_state_file_with_env() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "pkg.installed: []\n");
    let config = Config {
        state_files: paths(&["site.sls"]),
        environment_vars: vec!["FOO=bar".to_string()],
        ..fixture.config()
    };

    let executor = RecordingExecutor::new();
    let (result, ui) = provision(&config, &executor);
    result.unwrap();

    assert_eq!(
        executor.events(),
        vec![
            mkdir(STATES),
            mkdir(STATES),
            Event::UploadFile {
                remote: format!("{}/site.sls", STATES),
                content: "pkg.installed: []\n".to_string(),
            },
            Event::Run(format!(
                "sudo FOO='bar' salt-call --local --file-root={} state.apply site",
                STATES
            )),
        ]
    );
    assert!(!executor.commands().iter().any(|c| c.contains("pillar")));
    assert_eq!(ui.lines().first().map(String::as_str), Some("==> Provisioning with Salt..."));
}

#[test]
fn test_state_files_are_applied_in_order() {
    let fixture = Fixture::new();
    fixture.file("base.sls", "");
    fixture.file("web/nginx.sls", "");
    let config = Config {
        state_files: paths(&["base.sls", "web/nginx.sls"]),
        ..fixture.config()
    };

    let executor = RecordingExecutor::new();
    provision(&config, &executor).0.unwrap();

    let applies: Vec<String> = executor
        .commands()
        .into_iter()
        .filter(|c| c.contains("salt-call"))
        .collect();
    assert_eq!(
        applies,
        vec![
            format!("sudo salt-call --local --file-root={} state.apply base", STATES),
            format!("sudo salt-call --local --file-root={} state.apply web/nginx", STATES),
        ]
    );

    // Nested files get their parent directory created before the upload.
    let events = executor.events();
    let upload = events
        .iter()
        .position(|e| matches!(e, Event::UploadFile { remote, .. } if remote.ends_with("web/nginx.sls")))
        .expect("nested file should be uploaded");
    assert_eq!(events[upload - 1], mkdir(&format!("{}/web", STATES)));
}

#[test]
fn test_state_tree_applies_highstate_and_cleans_up() {
    let fixture = Fixture::new();
    fixture.file("salt/top.sls", "base: {'*': [site]}\n");
    let config = Config {
        state_tree: Some("salt".into()),
        clean: true,
        ..fixture.config()
    };

    let executor = RecordingExecutor::new();
    provision(&config, &executor).0.unwrap();

    assert_eq!(
        executor.events(),
        vec![
            mkdir(STATES),
            Event::UploadDir {
                remote: STATES.to_string(),
                local: format!("{}/", fixture.root().join("salt")),
            },
            Event::Run(format!("sudo salt-call --local --file-root={} state.apply", STATES)),
            Event::Run(format!("rm -rf '{}'", STATES)),
        ]
    );
}

#[test]
fn test_no_cleanup_without_clean() {
    let fixture = Fixture::new();
    fixture.dir("salt");
    let config = Config {
        state_tree: Some("salt".into()),
        ..fixture.config()
    };

    let executor = RecordingExecutor::new();
    provision(&config, &executor).0.unwrap();

    assert!(!executor.commands().iter().any(|c| c.starts_with("rm -rf")));
}

#[test]
fn test_cleanup_failure_does_not_fail_run() {
    let fixture = Fixture::new();
    fixture.dir("salt");
    fixture.dir("pillar");
    let config = Config {
        state_tree: Some("salt".into()),
        pillar_tree: Some("pillar".into()),
        clean: true,
        ..fixture.config()
    };

    let executor = RecordingExecutor::new().exit_with(format!("rm -rf '{}'", STATES), 1);
    let (result, ui) = provision(&config, &executor);
    result.unwrap();

    // The pillar directory is still removed after the state removal fails.
    let commands = executor.commands();
    let removals: Vec<&String> = commands.iter().filter(|c| c.starts_with("rm -rf")).collect();
    assert_eq!(
        removals,
        vec![&format!("rm -rf '{}'", STATES), &format!("rm -rf '{}'", PILLAR)]
    );
    assert!(
        ui.lines()
            .iter()
            .any(|l| l.starts_with("Warning:") && l.contains("non-zero exit status: 1")),
        "expected a cleanup warning, got: {:?}",
        ui.lines()
    );
}

#[test]
fn test_pillar_tree_with_state_files() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "");
    fixture.file("pillar/top.sls", "");
    let config = Config {
        state_files: paths(&["site.sls"]),
        pillar_tree: Some("pillar".into()),
        ..fixture.config()
    };

    let executor = RecordingExecutor::new();
    provision(&config, &executor).0.unwrap();

    let events = executor.events();
    assert_eq!(events[0], mkdir(STATES));
    assert_eq!(events[1], mkdir(PILLAR));
    assert_eq!(
        events[2],
        Event::UploadDir {
            remote: PILLAR.to_string(),
            local: format!("{}/", fixture.root().join("pillar")),
        }
    );
    assert_eq!(
        events.last(),
        Some(&Event::Run(format!(
            "sudo salt-call --local --file-root={} --pillar-root={} state.apply site",
            STATES, PILLAR
        )))
    );
}

#[test]
fn test_pillar_files_uploaded_after_state_files() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "state");
    fixture.file("data.sls", "pillar");
    let config = Config {
        state_files: paths(&["site.sls"]),
        pillar_files: paths(&["data.sls"]),
        remote_pillar_dir: Some("/srv/pillar".to_string()),
        ..fixture.config()
    };

    let executor = RecordingExecutor::new();
    provision(&config, &executor).0.unwrap();

    let uploads: Vec<String> = executor
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::UploadFile { remote, .. } => Some(remote),
            _ => None,
        })
        .collect();
    assert_eq!(uploads, vec![format!("{}/site.sls", STATES), "/srv/pillar/data.sls".to_string()]);
    assert!(
        executor
            .commands()
            .last()
            .is_some_and(|c| c.contains("--pillar-root=/srv/pillar"))
    );
}

#[test]
fn test_windows_target() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "");
    let config = Config {
        target_os: "Windows".to_string(),
        state_files: paths(&["site.sls"]),
        environment_vars: vec!["FOO=bar".to_string()],
        clean: true,
        ..fixture.config()
    };

    let executor = RecordingExecutor::new();
    provision(&config, &executor).0.unwrap();

    let dir = "C:/Windows/Temp/packer-provisioner-salt/states";
    let powershell = "PowerShell -ExecutionPolicy Bypass -OutputFormat Text -Command";
    assert_eq!(
        executor.commands(),
        vec![
            format!("{} {{New-Item -ItemType Directory -Path {} -Force}}", powershell, dir),
            format!("{} {{New-Item -ItemType Directory -Path {} -Force}}", powershell, dir),
            format!("FOO='bar' salt-call --local --file-root={} state.apply site", dir),
            format!("{} {{Remove-Item -Recurse -Force {}}}", powershell, dir),
        ]
    );
}

#[test]
fn test_provisioner_is_reusable_across_targets() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "");
    let config = Config {
        state_files: paths(&["site.sls"]),
        ..fixture.config()
    };
    let mut provisioner = Provisioner::new();
    provisioner.prepare(&config).unwrap();

    let first = RecordingExecutor::new();
    let second = RecordingExecutor::new();
    for executor in [&first, &second] {
        provisioner
            .provision(
                &CancellationToken::new(),
                &RecordingUi::default(),
                executor,
                &GeneratedData::new(),
            )
            .unwrap();
    }
    assert_eq!(first.events(), second.events());
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_salt_call_not_found_aborts_remaining_states() {
    let fixture = Fixture::new();
    fixture.file("first.sls", "");
    fixture.file("second.sls", "");
    let config = Config {
        state_files: paths(&["first.sls", "second.sls"]),
        clean: true,
        ..fixture.config()
    };

    let executor = RecordingExecutor::new().exit_with("state.apply first", 127);
    let err = provision(&config, &executor).0.unwrap_err();

    let typed = err.downcast_ref::<SaltError>();
    assert!(
        matches!(typed, Some(SaltError::CommandNotFound { .. })),
        "expected CommandNotFound, got: {:#}",
        err
    );
    assert!(format!("{:#}", err).contains("PATH"));

    let commands = executor.commands();
    assert!(!commands.iter().any(|c| c.contains("state.apply second")));
    assert!(!commands.iter().any(|c| c.starts_with("rm -rf")));
}

#[test]
fn test_salt_call_failure_reports_exit_code() {
    let fixture = Fixture::new();
    fixture.dir("salt");
    let config = Config {
        state_tree: Some("salt".into()),
        ..fixture.config()
    };

    let executor = RecordingExecutor::new().exit_with("salt-call", 42);
    let err = provision(&config, &executor).0.unwrap_err();

    assert!(matches!(err.downcast_ref::<SaltError>(), Some(SaltError::Execution { .. })));
    let msg = format!("{:#}", err);
    assert!(msg.contains("failed to apply highstate"), "got: {}", msg);
    assert!(msg.contains("non-zero exit status: 42"), "got: {}", msg);
}

#[test]
fn test_create_dir_failure_stops_before_upload() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "");
    let config = Config {
        state_files: paths(&["site.sls"]),
        ..fixture.config()
    };

    let executor = RecordingExecutor::new().exit_with("mkdir", 1);
    let err = provision(&config, &executor).0.unwrap_err();

    assert!(format!("{:#}", err).contains("failed to create state directory"));
    assert_eq!(executor.events(), vec![mkdir(STATES)]);
}

#[test]
fn test_transport_error_is_propagated() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "");
    let config = Config {
        state_files: paths(&["site.sls"]),
        ..fixture.config()
    };

    let executor = RecordingExecutor::new().disconnect_on("salt-call");
    let err = provision(&config, &executor).0.unwrap_err();

    assert!(format!("{:#}", err).contains("connection reset by peer"));
    assert!(
        err.downcast_ref::<SaltError>().is_none(),
        "transport errors should not be reinterpreted: {:?}",
        err
    );
}

#[test]
fn test_upload_failure_names_local_path() {
    let fixture = Fixture::new();
    let local = fixture.file("site.sls", "");
    let config = Config {
        state_files: paths(&["site.sls"]),
        ..fixture.config()
    };
    let mut provisioner = Provisioner::new();
    provisioner.prepare(&config).unwrap();

    // The file disappears between validation and upload.
    std::fs::remove_file(&local).unwrap();

    let executor = RecordingExecutor::new();
    let err = provisioner
        .provision(
            &CancellationToken::new(),
            &RecordingUi::default(),
            &executor,
            &GeneratedData::new(),
        )
        .unwrap_err();

    match err.downcast_ref::<SaltError>() {
        Some(SaltError::Upload { path, message }) => {
            assert!(path.ends_with("site.sls"), "got path: {}", path);
            assert!(message.contains("not found"), "got message: {}", message);
        }
        other => panic!("expected Upload error, got: {:?}", other),
    }
    assert!(!executor.commands().iter().any(|c| c.contains("salt-call")));
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_cancelled_before_start_runs_nothing() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "");
    let config = Config {
        state_files: paths(&["site.sls"]),
        ..fixture.config()
    };
    let mut provisioner = Provisioner::new();
    provisioner.prepare(&config).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let executor = RecordingExecutor::new();
    let err = provisioner
        .provision(&cancel, &RecordingUi::default(), &executor, &GeneratedData::new())
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<SaltError>(), Some(SaltError::Cancelled(_))));
    assert!(executor.events().is_empty());
}

/// Cancels the token as soon as a matching command has run.
struct CancellingExecutor {
    inner: RecordingExecutor,
    trigger: &'static str,
    cancel: CancellationToken,
}

impl RemoteExecutor for CancellingExecutor {
    fn run(&self, command: &str) -> Result<ExecutionResult> {
        let result = self.inner.run(command);
        if command.contains(self.trigger) {
            self.cancel.cancel();
        }
        result
    }

    fn upload_file(&self, remote_path: &str, source: &mut dyn std::io::Read) -> Result<()> {
        self.inner.upload_file(remote_path, source)
    }

    fn upload_dir(&self, remote_path: &str, local_path: &str) -> Result<()> {
        self.inner.upload_dir(remote_path, local_path)
    }
}

#[test]
fn test_cancelled_mid_run_stops_before_next_command() {
    let fixture = Fixture::new();
    fixture.file("first.sls", "");
    fixture.file("second.sls", "");
    let config = Config {
        state_files: paths(&["first.sls", "second.sls"]),
        clean: true,
        ..fixture.config()
    };
    let mut provisioner = Provisioner::new();
    provisioner.prepare(&config).unwrap();

    let cancel = CancellationToken::new();
    let executor = CancellingExecutor {
        inner: RecordingExecutor::new(),
        trigger: "state.apply first",
        cancel: cancel.clone(),
    };
    let err = provisioner
        .provision(&cancel, &RecordingUi::default(), &executor, &GeneratedData::new())
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<SaltError>(), Some(SaltError::Cancelled(_))));
    let commands = executor.inner.commands();
    assert!(commands.last().is_some_and(|c| c.ends_with("state.apply first")));
    assert!(!commands.iter().any(|c| c.starts_with("rm -rf")));
}

// =============================================================================
// Preparation
// =============================================================================

#[test]
fn test_failed_prepare_discards_previous_request() {
    let fixture = Fixture::new();
    fixture.file("site.sls", "");
    let mut provisioner = Provisioner::new();
    provisioner
        .prepare(&Config {
            state_files: paths(&["site.sls"]),
            ..fixture.config()
        })
        .unwrap();
    assert!(provisioner.request().is_some());

    let err = provisioner.prepare(&fixture.config()).unwrap_err();
    assert!(matches!(err, SaltError::InvalidConfig(_)));
    assert!(provisioner.request().is_none());

    let executor = RecordingExecutor::new();
    let err = provisioner
        .provision(
            &CancellationToken::new(),
            &RecordingUi::default(),
            &executor,
            &GeneratedData::new(),
        )
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<SaltError>(), Some(SaltError::Validation(_))));
    assert!(executor.events().is_empty());
}
