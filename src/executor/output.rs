//! Relays the output of a local command to a [`Ui`] while it runs.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ExitStatus};
use std::thread::{self, Scope, ScopedJoinHandle};

use crate::ui::Ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Waits for `child`, forwarding each stdout and stderr line to `sink` as
/// it arrives.
///
/// stderr lines are prefixed with `stderr: `. If a reader cannot be started
/// or the wait fails, the child is killed so that no reader stays blocked on
/// an open pipe.
pub(super) fn relay(child: &mut Child, sink: &dyn Ui) -> io::Result<ExitStatus> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    thread::scope(|scope| {
        let mut readers = Vec::with_capacity(2);
        let status = spawn_reader(scope, stdout, Stream::Stdout, sink)
            .and_then(|reader| {
                readers.extend(reader);
                spawn_reader(scope, stderr, Stream::Stderr, sink)
            })
            .and_then(|reader| {
                readers.extend(reader);
                child.wait()
            });

        if status.is_err() {
            stop(child);
        }
        for reader in readers {
            if reader.join().is_err() {
                tracing::warn!("output relay thread panicked, some output was lost");
            }
        }
        status
    })
}

fn spawn_reader<'scope, 'env, R>(
    scope: &'scope Scope<'scope, 'env>,
    pipe: Option<R>,
    stream: Stream,
    sink: &'env dyn Ui,
) -> io::Result<Option<ScopedJoinHandle<'scope, ()>>>
where
    R: Read + Send + 'scope,
{
    let Some(pipe) = pipe else {
        tracing::debug!(stream = stream.name(), "output was not captured");
        return Ok(None);
    };
    thread::Builder::new()
        .name(format!("{}-relay", stream.name()))
        .spawn_scoped(scope, move || forward(pipe, stream, sink))
        .map(Some)
}

fn stop(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill failed, the process may have exited: {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to reap killed process: {}", e);
    }
}

fn forward<R: Read>(pipe: R, stream: Stream, sink: &dyn Ui) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\n', '\r']);
                match stream {
                    Stream::Stdout => sink.message(line),
                    Stream::Stderr => sink.message(&format!("stderr: {}", line)),
                }
            }
            Err(e) => {
                tracing::warn!(stream = stream.name(), "stopped reading command output: {}", e);
                break;
            }
        }
    }
}
