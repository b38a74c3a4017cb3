//! Command executor - runs a tool backend as a child process
//!
//! Every run is bounded: the child gets `timeout`, then its process group is
//! killed, and the pipe readers get a short grace period on top. Each stream
//! keeps at most `max_output_bytes`. Nothing here returns an error; failures
//! come back inside the [`ExecutionReport`].

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::{ExecutionReport, FailureKind};

/// Time allowed for output readers to drain (and for a killed child to be
/// reaped) once the main wait is over.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs `<program> <leading_args..> <command_text>` with captured output
pub struct CommandExecutor {
    program: String,
    leading_args: Vec<String>,
    max_output_bytes: usize,
}

impl CommandExecutor {
    /// Create an executor for `program`, e.g. `("bash", ["-c"])`
    pub fn new<I, S>(program: impl Into<String>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
            max_output_bytes: 64 * 1024,
        }
    }

    /// Cap each captured stream at `bytes`
    pub fn with_output_cap(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run `command_text` and wait at most `timeout` for it
    pub async fn execute(&self, command_text: &str, timeout: Duration) -> ExecutionReport {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg(command_text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so a timeout can take down everything the command started
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("'{}' not found. Is it installed and on PATH?", self.program)
                } else {
                    format!("Failed to run '{}': {}", self.program, e)
                };
                warn!(program = %self.program, error = %e, "tool backend failed to spawn");
                return ExecutionReport::spawn_error(message);
            }
        };

        let pid = child.id();
        debug!(program = %self.program, pid = ?pid, "tool backend started");

        let (stdout_tx, mut stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, mut stderr_rx) = mpsc::unbounded_channel();
        let stdout_reader = spawn_reader(child.stdout.take(), stdout_tx, self.max_output_bytes);
        let stderr_reader = spawn_reader(child.stderr.take(), stderr_tx, self.max_output_bytes);

        let (exit_status, failure) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code(), None),
            Ok(Err(e)) => (
                None,
                Some(FailureKind::SpawnError(format!(
                    "Failed waiting for '{}': {}",
                    self.program, e
                ))),
            ),
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout = ?timeout,
                    "tool run timed out, killing its process group"
                );
                kill_group(pid);
                let _ = child.start_kill();
                let _ = tokio::time::timeout(DRAIN_GRACE, child.wait()).await;
                (None, Some(FailureKind::Timeout))
            }
        };

        tokio::join!(drain(stdout_reader), drain(stderr_reader));

        ExecutionReport {
            stdout: collect(&mut stdout_rx).finish(self.max_output_bytes),
            stderr: collect(&mut stderr_rx).finish(self.max_output_bytes),
            exit_status,
            failure,
            timeout,
        }
    }
}

/// SIGKILL the group led by `pid`
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created at spawn
    let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// What a pipe reader hands back
#[derive(Debug)]
enum Output {
    Data(Vec<u8>),
    /// The stream went past the cap; later bytes were discarded
    Truncated,
}

/// Forward what `pipe` produces into `tx`, keeping at most `limit` bytes.
///
/// Past the cap the pipe is still read to EOF so the child never blocks on a
/// full pipe.
fn spawn_reader<R>(
    pipe: Option<R>,
    tx: mpsc::UnboundedSender<Output>,
    limit: usize,
) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            let mut stored = 0usize;
            let mut truncated = false;
            loop {
                let n = match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if truncated {
                    continue;
                }

                let room = limit - stored;
                let keep = n.min(room);
                if keep > 0 && tx.send(Output::Data(chunk[..keep].to_vec())).is_err() {
                    break;
                }
                stored += keep;
                if n > room {
                    truncated = true;
                    if tx.send(Output::Truncated).is_err() {
                        break;
                    }
                }
            }
        })
    })
}

/// Wait briefly for a reader; a grandchild may still hold the pipe open
async fn drain(reader: Option<JoinHandle<()>>) {
    if let Some(mut handle) = reader {
        if tokio::time::timeout(DRAIN_GRACE, &mut handle).await.is_err() {
            handle.abort();
        }
    }
}

/// Bytes captured from one stream
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    /// Decode, dropping a multi-byte char split by the cap, and note truncation
    fn finish(mut self, limit: usize) -> String {
        if !self.truncated && self.bytes.len() <= limit {
            return String::from_utf8_lossy(&self.bytes).into_owned();
        }
        self.bytes.truncate(limit);
        if let Err(e) = std::str::from_utf8(&self.bytes) {
            if e.error_len().is_none() {
                self.bytes.truncate(e.valid_up_to());
            }
        }
        format!(
            "{}\n... output truncated at {} bytes",
            String::from_utf8_lossy(&self.bytes),
            limit
        )
    }
}

fn collect(rx: &mut mpsc::UnboundedReceiver<Output>) -> Captured {
    let mut captured = Captured::default();
    while let Ok(output) = rx.try_recv() {
        match output {
            Output::Data(chunk) => captured.bytes.extend_from_slice(&chunk),
            Output::Truncated => captured.truncated = true,
        }
    }
    captured
}
