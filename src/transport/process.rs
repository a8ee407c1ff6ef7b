//! Subprocess transport: each worker is a child running `jobherd worker`
//!
//! Requests go to the child's stdin and responses come back on its stdout,
//! one JSON object per line. A reader thread per child turns stdout lines
//! into inbound events and reports the slot as exited on EOF. The child
//! logs to stderr, which is inherited.

use crate::agent::AgentSettings;
use crate::config::WorkerArgs;
use crate::error::{ChannelError, Result, WorkerError};
use crate::protocol::{Request, Response};
use crate::transport::{Inbound, SpawnSpec, Spawner, WorkerHandle};
use crossbeam_channel::Sender;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Spawns workers as child processes of the current executable
pub struct ProcessSpawner {
    program: PathBuf,
    settings: AgentSettings,
}

impl ProcessSpawner {
    /// Re-execute the running binary
    pub fn new(settings: AgentSettings) -> Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            settings,
        })
    }

    /// Use a specific `jobherd` binary
    pub fn with_program(program: impl Into<PathBuf>, settings: AgentSettings) -> Self {
        Self {
            program: program.into(),
            settings,
        }
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, spec: SpawnSpec, inbound: Sender<Inbound>) -> Result<Box<dyn WorkerHandle>> {
        let argv = WorkerArgs::for_slot(spec.slot, spec.role, &self.settings).to_argv();
        let mut child = Command::new(&self.program)
            .args(&argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| WorkerError::SpawnFailed {
                id: spec.slot,
                reason: e.to_string(),
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| WorkerError::SpawnFailed {
            id: spec.slot,
            reason: "child stdout not captured".into(),
        })?;

        let slot = spec.slot;
        thread::Builder::new()
            .name(format!("{}-{}-reader", spec.role, slot))
            .spawn(move || read_responses(slot, stdout, inbound))
            .map_err(|e| WorkerError::SpawnFailed {
                id: slot,
                reason: e.to_string(),
            })?;

        debug!(slot, role = %spec.role, pid = child.id(), "Spawned worker process");
        Ok(Box::new(ProcessHandle {
            slot,
            child,
            stdin,
            reaped: false,
        }))
    }
}

/// Forward every response line of one child until EOF
fn read_responses(slot: usize, stdout: ChildStdout, inbound: Sender<Inbound>) {
    let reader = BufReader::new(stdout);
    let mut reason = "stdout closed".to_string();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                reason = format!("read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Response::from_line(&line) {
            Ok(response) => {
                if inbound.send(Inbound::message(slot, response)).is_err() {
                    return;
                }
            }
            Err(e) => warn!(slot, error = %e, "Ignoring malformed worker response"),
        }
    }

    // The coordinator may already be gone at shutdown.
    let _ = inbound.send(Inbound::exited(slot, reason));
}

/// Coordinator-side handle to a worker process
pub struct ProcessHandle {
    slot: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    reaped: bool,
}

impl ProcessHandle {
    fn try_wait(&mut self) -> bool {
        if self.reaped {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(slot = self.slot, %status, "Worker process exited");
                self.reaped = true;
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(slot = self.slot, error = %e, "try_wait failed");
                self.reaped = true;
                true
            }
        }
    }

    fn kill(&mut self) {
        if self.reaped {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.reaped = true;
    }
}

impl WorkerHandle for ProcessHandle {
    fn send(&mut self, request: Request) -> std::result::Result<(), ChannelError> {
        let slot = self.slot;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(ChannelError::Disconnected { slot })?;
        let line = request.to_line().map_err(|e| ChannelError::SendFailed {
            slot,
            reason: e.to_string(),
        })?;

        stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| ChannelError::SendFailed {
                slot,
                reason: e.to_string(),
            })
    }

    fn stop(&mut self, timeout: Duration) -> std::result::Result<(), WorkerError> {
        if self.reaped {
            return Ok(());
        }

        let _ = self.send(Request::Exit);
        // Closing stdin ends the worker's read loop even if exit was lost.
        self.stdin = None;

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.try_wait() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }

        warn!(slot = self.slot, "Worker process did not exit in time; killing it");
        self.kill();
        Err(WorkerError::StopTimeout {
            id: self.slot,
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stdin = None;
        if !self.try_wait() {
            self.kill();
        }
    }
}
