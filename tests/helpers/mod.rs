use std::fs;
use std::io::Read;
use std::sync::Mutex;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use rssalt::config::Config;
use rssalt::executor::{ExecutionResult, RemoteExecutor};
use rssalt::ui::Ui;
use tempfile::TempDir;

/// One interaction with the target, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Event {
    Run(String),
    UploadFile { remote: String, content: String },
    UploadDir { remote: String, local: String },
}

/// Executor that records every call and answers from a script.
///
/// Commands containing a scripted substring exit with the scripted code;
/// everything else exits 0.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingExecutor {
    events: Mutex<Vec<Event>>,
    exit_codes: Vec<(String, i32)>,
    transport_failure: Option<String>,
}

#[allow(dead_code)]
impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` exit with `code`.
    pub fn exit_with(mut self, pattern: impl Into<String>, code: i32) -> Self {
        self.exit_codes.push((pattern.into(), code));
        self
    }

    /// Commands containing `pattern` fail at the transport level.
    pub fn disconnect_on(mut self, pattern: impl Into<String>) -> Self {
        self.transport_failure = Some(pattern.into());
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Only the commands that were run, in order.
    pub fn commands(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Run(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl RemoteExecutor for RecordingExecutor {
    fn run(&self, command: &str) -> Result<ExecutionResult> {
        self.record(Event::Run(command.to_string()));

        if let Some(pattern) = &self.transport_failure
            && command.contains(pattern.as_str())
        {
            anyhow::bail!("connection reset by peer");
        }
        let code = self
            .exit_codes
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map_or(0, |(_, code)| *code);
        Ok(ExecutionResult::exited(code))
    }

    fn upload_file(&self, remote_path: &str, source: &mut dyn Read) -> Result<()> {
        let mut content = String::new();
        source.read_to_string(&mut content)?;
        self.record(Event::UploadFile {
            remote: remote_path.to_string(),
            content,
        });
        Ok(())
    }

    fn upload_dir(&self, remote_path: &str, local_path: &str) -> Result<()> {
        self.record(Event::UploadDir {
            remote: remote_path.to_string(),
            local: local_path.to_string(),
        });
        Ok(())
    }
}

/// Ui that keeps every line it was given.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingUi {
    lines: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingUi {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("==> {}", message));
    }

    fn message(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// Temporary directory holding local state and pillar content.
#[allow(dead_code)]
pub struct Fixture {
    dir: TempDir,
}

#[allow(dead_code)]
impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        Utf8Path::from_path(self.dir.path()).expect("temp dir path should be UTF-8")
    }

    /// Writes `content` to `relative` under the fixture root, creating parents.
    pub fn file(&self, relative: &str, content: &str) -> Utf8PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directory");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }

    pub fn dir(&self, relative: &str) -> Utf8PathBuf {
        let path = self.root().join(relative);
        fs::create_dir_all(&path).expect("failed to create fixture directory");
        path
    }

    /// A config whose relative paths resolve against the fixture root.
    pub fn config(&self) -> Config {
        Config::default().with_base_dir(self.root())
    }
}
