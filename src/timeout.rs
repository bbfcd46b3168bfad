//! Bounded execution for in-process work and external tools.
//!
//! Nothing in the crate waits without a limit: encoding attempts and file
//! I/O go through [`run_with_timeout`], subprocesses through [`run_tool`].

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::error::{Error, Result};

/// Poll interval while waiting for a child process.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Run `f` on a worker thread and wait at most `limit` for its result.
///
/// On expiry the worker is detached and its eventual result dropped; the
/// caller gets [`Error::Timeout`]. A zero `limit` fails without running `f`.
pub fn run_with_timeout<T, F>(operation: &str, limit: Duration, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    if limit.is_zero() {
        return Err(Error::Timeout {
            operation: operation.to_string(),
            limit,
        });
    }
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name(format!("pdfeditz-{}", operation))
        .spawn(move || {
            let _ = tx.send(f());
        })?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(Error::Timeout {
            operation: operation.to_string(),
            limit,
        }),
        Err(RecvTimeoutError::Disconnected) => {
            Err(Error::Other(format!("{} worker exited without a result", operation)))
        }
    }
}

/// An absolute point in time that work must finish by.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    end: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            end: start + budget,
        }
    }

    /// Time left, or `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.end
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// Time since the deadline was set.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Exit status and captured stderr of an external tool.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

/// Spawn `command` and wait at most `limit` for it to exit.
///
/// A binary that cannot be found maps to [`Error::ToolUnavailable`]; any
/// other spawn failure to [`Error::ConversionFailed`]. On expiry the
/// process is killed and [`Error::Timeout`] returned.
pub fn run_tool(mut command: Command, tool: &str, limit: Duration) -> Result<ToolOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            Error::ToolUnavailable {
                tool: tool.to_string(),
                message: e.to_string(),
            }
        }
        _ => Error::ConversionFailed {
            tool: tool.to_string(),
            message: e.to_string(),
        },
    })?;

    let stderr = child.stderr.take();
    let reader = thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut text);
        }
        text
    });

    let status = wait_child(&mut child, tool, limit)?;
    let stderr = reader.join().unwrap_or_default();
    Ok(ToolOutput { status, stderr })
}

/// Poll `child` until it exits or `limit` passes, killing it on expiry.
pub fn wait_child(child: &mut Child, tool: &str, limit: Duration) -> Result<ExitStatus> {
    let deadline = Deadline::after(limit);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        match deadline.remaining() {
            Some(left) => thread::sleep(left.min(POLL_INTERVAL)),
            None => {
                log::warn!("{} exceeded {:?}, killing pid {}", tool, limit, child.id());
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Timeout {
                    operation: tool.to_string(),
                    limit,
                });
            }
        }
    }
}
