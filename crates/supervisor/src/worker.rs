use crate::socket::LISTEN_FD_ENV;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use uuid::Uuid;
use wharfd_models::{EntryPoint, WharfError};

/// Line a worker prints on stdout once its entry point has resolved. Anything
/// else the worker writes is forwarded to the supervisor's log.
pub const READY_LINE: &str = "wharfd: application loaded";

/// Bootstrap run by every Python worker: resolve the entry point (exit 1 on
/// failure, before serving anything), announce readiness, then serve requests
/// on the inherited socket until SIGTERM. The drain loop finishes the
/// in-flight request before checking the flag, so a mid-request TERM never
/// drops a response.
const WORKER_BOOTSTRAP: &str = r#"
import importlib
import os
import signal
import socket
import sys

reference = os.environ.get("WHARFD_APP", "")
module_name, _, attr_path = reference.partition(":")
try:
    target = importlib.import_module(module_name)
    for attr in attr_path.split("."):
        target = getattr(target, attr)
except Exception as exc:
    sys.stderr.write("wharfd: failed to load %r: %s\n" % (reference, exc))
    sys.exit(1)

print("wharfd: application loaded", flush=True)

from wsgiref.simple_server import WSGIRequestHandler, WSGIServer


class InheritedSocketServer(WSGIServer):
    def server_bind(self):
        # The supervisor already bound the socket; only fill in the
        # environ-facing fields.
        self.server_address = self.socket.getsockname()[:2]
        self.server_name, self.server_port = self.server_address
        self.setup_environ()


inherited = socket.socket(fileno=int(os.environ["WHARFD_FD"]))
server = InheritedSocketServer(
    inherited.getsockname()[:2], WSGIRequestHandler, bind_and_activate=False
)
server.socket.close()
server.socket = inherited
server.server_bind()
server.set_app(target)
server.timeout = 1.0

draining = False


def _terminate(signum, frame):
    global draining
    draining = True


signal.signal(signal.SIGTERM, _terminate)

while not draining:
    server.handle_request()

sys.exit(0)
"#;

/// Per-worker lifecycle. `LoadingApp -> Crashed` is terminal: a worker that
/// cannot resolve its entry point is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    LoadingApp,
    Serving,
    ShuttingDown,
    Crashed,
    Exited,
}

impl WorkerState {
    pub fn can_advance_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Starting, LoadingApp)
                | (Starting, Crashed)
                | (LoadingApp, Serving)
                | (LoadingApp, Crashed)
                | (Serving, ShuttingDown)
                | (Serving, Crashed)
                | (Serving, Exited)
                | (ShuttingDown, Exited)
                | (ShuttingDown, Crashed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Crashed | WorkerState::Exited)
    }
}

/// What the pool execs for each worker slot. Production workers run the
/// embedded Python bootstrap; tests substitute their own commands.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Worker command for a WSGI entry point. The bytecode-cache and
    /// unbuffered-stdio flags are set unconditionally so runtime behavior
    /// matches the image the build stage produces.
    pub fn for_wsgi(
        python_bin: &str,
        entry_point: &EntryPoint,
        extra_env: &HashMap<String, String>,
    ) -> Self {
        let mut command = Self::new(
            python_bin,
            vec!["-c".to_string(), WORKER_BOOTSTRAP.to_string()],
        )
        .env("WHARFD_APP", entry_point.to_string())
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .env("PYTHONUNBUFFERED", "1");
        for (key, value) in extra_env {
            command = command.env(key, value);
        }
        command
    }
}

pub(crate) struct SpawnedWorker {
    pub id: Uuid,
    pub pid: u32,
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

pub(crate) fn spawn(command: &WorkerCommand, listen_fd: RawFd) -> Result<SpawnedWorker, WharfError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env(LISTEN_FD_ENV, listen_fd.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &command.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|e| WharfError::WorkerSpawnError {
        reason: format!("{}: {e}", command.program),
    })?;

    let pid = child.id().ok_or_else(|| WharfError::WorkerSpawnError {
        reason: "worker exited before its pid could be read".to_string(),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| WharfError::WorkerSpawnError {
        reason: "worker stdout was not captured".to_string(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| WharfError::WorkerSpawnError {
        reason: "worker stderr was not captured".to_string(),
    })?;

    Ok(SpawnedWorker {
        id: Uuid::new_v4(),
        pid,
        child,
        stdout,
        stderr,
    })
}
