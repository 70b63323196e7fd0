//! Blocking shell execution with a timeout, shared by the unit executor and
//! signal commands.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use crate::error::{EngineError, EngineResult};

/// How long to wait for a pipe to close once the child is gone. A
/// grandchild can keep it open after the shell was killed.
const PIPE_GRACE: Duration = Duration::from_secs(5);

/// Bytes kept per stream; the rest is read and dropped.
const CAPTURE_LIMIT: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Output of one pipe, read on its own thread.
struct Capture(Receiver<String>);

impl Capture {
    fn start(stream: Option<impl Read + Send + 'static>) -> Self {
        let (tx, rx) = mpsc::channel();
        match stream {
            Some(stream) => {
                thread::spawn(move || {
                    let _ = tx.send(read_capped(stream, CAPTURE_LIMIT));
                });
            }
            None => {
                let _ = tx.send(String::new());
            }
        }
        Capture(rx)
    }

    fn finish(self) -> String {
        self.0
            .recv_timeout(PIPE_GRACE)
            .unwrap_or_else(|_| "[output still open, not collected]".to_string())
    }
}

/// Run `command` with `sh -c` and wait at most `timeout`.
///
/// Both pipes are drained while the child runs. A child that outlives the
/// timeout is killed and reported as failed.
pub fn run_shell(
    command: &str,
    working_dir: Option<&Path>,
    env: &[(String, String)],
    timeout: Duration,
) -> EngineResult<CommandOutcome> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| EngineError::io(command, e))?;
    let stdout = Capture::start(child.stdout.take());
    let stderr = Capture::start(child.stderr.take());

    let status = child
        .wait_timeout(timeout)
        .map_err(|e| EngineError::io(command, e))?;
    if status.is_none() {
        let _ = child.kill();
        let _ = child.wait();
    }

    let mut outcome = CommandOutcome {
        success: status.is_some_and(|s| s.success()),
        exit_code: status.and_then(|s| s.code()),
        stdout: stdout.finish(),
        stderr: stderr.finish(),
        timed_out: status.is_none(),
        duration: started.elapsed(),
    };
    if outcome.timed_out {
        outcome
            .stderr
            .push_str(&format!("\n[killed after {}s timeout]", timeout.as_secs()));
    }

    tracing::debug!(
        command,
        success = outcome.success,
        exit_code = ?outcome.exit_code,
        timed_out = outcome.timed_out,
        elapsed_ms = outcome.duration.as_millis() as u64,
        "shell command finished"
    );
    Ok(outcome)
}

/// Read `stream` to the end, keeping the first `limit` bytes.
fn read_capped(stream: impl Read, limit: u64) -> String {
    let mut kept = Vec::new();
    let mut stream = stream.take(limit);
    if stream.read_to_end(&mut kept).is_err() && kept.is_empty() {
        return "[error reading output]".to_string();
    }

    let mut rest = stream.into_inner();
    let dropped = io::copy(&mut rest, &mut io::sink()).unwrap_or(0);
    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if dropped > 0 {
        text.push_str(&format!("\n[{dropped} more bytes dropped]"));
    }
    text
}
