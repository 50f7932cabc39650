//! Command runners.
//!
//! A [`CommandRunner`] executes one expanded command and reports how it ended. The
//! scheduler treats anything other than [`CommandStatus::Success`] as a failure of the
//! target the command belongs to.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// Non-zero exit, or killed by a signal (`None`), or could not be started.
    Failed(Option<i32>),
    TimedOut,
}

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    /// Captured stdout followed by stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            output: output.into(),
        }
    }

    pub fn failed(code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failed(code),
            output: output.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Executes commands on behalf of the scheduler. Called from several worker threads.
pub trait CommandRunner: Send + Sync {
    fn run(&self, tokens: &[String], timeout: Option<Duration>) -> CommandOutput;
}

// ============================================================================
// PROCESS RUNNER
// ============================================================================

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long output readers may lag behind a command that exited at its deadline.
const READ_GRACE: Duration = Duration::from_millis(100);

/// Runs commands as child processes.
///
/// With a shell configured the tokens are joined with spaces and passed to
/// `<shell> -c`, so redirections and globs work; without one the first token is
/// executed directly with the rest as arguments.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: Option<String>,
    workdir: Option<PathBuf>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            shell: Some("sh".to_string()),
            workdir: None,
        }
    }
}

impl ProcessRunner {
    pub fn new(shell: Option<String>) -> Self {
        Self {
            shell,
            workdir: None,
        }
    }

    /// Executes tokens without a shell.
    pub fn direct() -> Self {
        Self::new(None)
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    fn command(&self, tokens: &[String]) -> Option<Command> {
        let mut command = match &self.shell {
            Some(shell) => {
                let mut c = Command::new(shell);
                c.arg("-c").arg(tokens.join(" "));
                c
            }
            None => {
                let (program, args) = tokens.split_first()?;
                let mut c = Command::new(program);
                c.args(args);
                c
            }
        };
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Some(command)
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, tokens: &[String], timeout: Option<Duration>) -> CommandOutput {
        let Some(mut command) = self.command(tokens) else {
            return CommandOutput::success("");
        };

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %tokens.join(" "), error = %e, "could not start command");
                return CommandOutput::failed(None, format!("could not start command: {e}"));
            }
        };

        let deadline = timeout.map(|limit| Instant::now() + limit);
        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        match wait(&mut child, deadline) {
            Ok(Some(code)) => {
                let output = collect(stdout, deadline) + &collect(stderr, deadline);
                if code == Some(0) {
                    CommandOutput::success(output)
                } else {
                    CommandOutput::failed(code, output)
                }
            }
            Ok(None) => {
                // Grandchildren may still hold the pipes open; leave the readers detached.
                debug!(command = %tokens.join(" "), "command timed out");
                CommandOutput {
                    status: CommandStatus::TimedOut,
                    output: String::new(),
                }
            }
            Err(e) => CommandOutput::failed(None, format!("could not wait for command: {e}")),
        }
    }
}

/// Waits for `child`. Returns `Ok(None)` after killing it at the deadline.
fn wait(child: &mut Child, deadline: Option<Instant>) -> std::io::Result<Option<Option<i32>>> {
    let Some(deadline) = deadline else {
        return child.wait().map(|status| Some(status.code()));
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status.code()));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Output read so far from one pipe, plus a signal sent when the pipe reaches EOF.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Capture> {
    pipe.map(|mut pipe| {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            while let Ok(n) = pipe.read(&mut chunk) {
                if n == 0 {
                    break;
                }
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]);
            }
            let _ = tx.send(());
        });
        Capture { buffer, done }
    })
}

/// Waits for EOF on the pipe, but never past the command's deadline: a background
/// process that inherited the pipe must not hold the worker. Whatever was read by
/// then is returned.
fn collect(capture: Option<Capture>, deadline: Option<Instant>) -> String {
    let Some(capture) = capture else {
        return String::new();
    };
    match deadline {
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            if capture.done.recv_timeout(left.max(READ_GRACE)).is_err() {
                debug!("output pipe still open after the command exited");
            }
        }
        None => {
            let _ = capture.done.recv();
        }
    }
    let bytes = capture.buffer.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}

// ============================================================================
// DRY RUN
// ============================================================================

/// Prints each command instead of running it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(&self, tokens: &[String], _timeout: Option<Duration>) -> CommandOutput {
        println!("{}", tokens.join(" "));
        CommandOutput::success("")
    }
}
