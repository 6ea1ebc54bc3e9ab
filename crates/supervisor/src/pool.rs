use crate::worker::{self, WorkerCommand, WorkerState, READY_LINE};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::os::fd::AsRawFd;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use wharfd_models::WharfError;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Number of worker processes. Fixed for the life of the pool; there is
    /// no elasticity and no respawn of exited workers.
    pub workers: usize,
    /// Bound on the graceful drain; workers alive past it are SIGKILLed.
    pub graceful_timeout: Duration,
}

/// How each worker ended up, tallied when the pool winds down.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub exited_clean: usize,
    pub crashed: usize,
    pub killed: usize,
}

enum WorkerEvent {
    Ready(Uuid),
    Exited(Uuid, std::process::ExitStatus),
}

/// Fixed-size pre-fork worker pool. Owns the shared listening socket for its
/// whole lifetime; every worker inherits the descriptor and the kernel
/// distributes connections. The pool never respawns a worker: restart policy
/// belongs to the orchestrator running the container.
pub struct WorkerPool {
    settings: PoolSettings,
    listener: std::net::TcpListener,
    command: WorkerCommand,
}

impl WorkerPool {
    pub fn new(settings: PoolSettings, listener: std::net::TcpListener, command: WorkerCommand) -> Self {
        Self {
            settings,
            listener,
            command,
        }
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, WharfError> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawn every worker and supervise until either `shutdown` resolves (a
    /// termination signal) or the pool empties on its own. An empty pool
    /// without a shutdown request is a failure: with no respawn policy there
    /// is nothing left serving the socket.
    #[instrument(skip(self, shutdown), fields(workers = self.settings.workers))]
    pub async fn run<F>(self, shutdown: F) -> Result<PoolReport, WharfError>
    where
        F: Future<Output = ()>,
    {
        let listen_fd = self.listener.as_raw_fd();
        let total = self.settings.workers;
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let mut states: HashMap<Uuid, WorkerState> = HashMap::new();
        let mut pids: HashMap<Uuid, u32> = HashMap::new();

        for slot in 0..total {
            let spawned = match worker::spawn(&self.command, listen_fd) {
                Ok(spawned) => spawned,
                Err(e) => {
                    // Partial pools are not served; take down what already
                    // started and fail the launch.
                    for pid in pids.values() {
                        signal_worker(*pid, libc::SIGKILL);
                    }
                    return Err(e);
                }
            };
            info!(worker = %spawned.id, pid = spawned.pid, slot, "Spawned worker");
            states.insert(spawned.id, WorkerState::LoadingApp);
            pids.insert(spawned.id, spawned.pid);

            forward_lines(spawned.id, spawned.stdout, events_tx.clone(), false);
            forward_lines(spawned.id, spawned.stderr, events_tx.clone(), true);

            let exit_tx = events_tx.clone();
            let id = spawned.id;
            let mut child = spawned.child;
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => {
                        let _ = exit_tx.send(WorkerEvent::Exited(id, status));
                    }
                    Err(e) => error!(worker = %id, "Failed to wait on worker: {e}"),
                }
            });
        }
        drop(events_tx);

        let mut report = PoolReport::default();
        let mut draining = false;
        let mut force_killed: HashSet<Uuid> = HashSet::new();
        let mut deadline: Option<Pin<Box<Sleep>>> = None;
        tokio::pin!(shutdown);

        enum Action {
            Shutdown,
            DrainDeadline,
            Event(Option<WorkerEvent>),
        }

        while !pids.is_empty() {
            let drain_deadline = async {
                match deadline.as_mut() {
                    Some(sleep) => sleep.await,
                    None => std::future::pending().await,
                }
            };

            let action = tokio::select! {
                _ = &mut shutdown, if !draining => Action::Shutdown,
                _ = drain_deadline, if draining => Action::DrainDeadline,
                event = events.recv() => Action::Event(event),
            };

            match action {
                Action::Shutdown => {
                    draining = true;
                    deadline = Some(Box::pin(tokio::time::sleep(self.settings.graceful_timeout)));
                    info!(workers = pids.len(), "Termination signal received; draining workers");
                    for (id, pid) in &pids {
                        states.insert(*id, WorkerState::ShuttingDown);
                        signal_worker(*pid, libc::SIGTERM);
                    }
                }
                Action::DrainDeadline => {
                    warn!(workers = pids.len(), "Graceful drain deadline passed; killing remaining workers");
                    for (id, pid) in &pids {
                        force_killed.insert(*id);
                        signal_worker(*pid, libc::SIGKILL);
                    }
                    deadline = None;
                }
                Action::Event(Some(WorkerEvent::Ready(id))) => {
                    if states.get(&id) == Some(&WorkerState::LoadingApp) {
                        states.insert(id, WorkerState::Serving);
                        info!(worker = %id, "Worker serving");
                    }
                }
                Action::Event(Some(WorkerEvent::Exited(id, status))) => {
                    pids.remove(&id);
                    let prior = states.get(&id).copied().unwrap_or(WorkerState::Starting);
                    let outcome =
                        classify_exit(id, prior, status, force_killed.contains(&id), &mut report);
                    states.insert(id, outcome);
                }
                Action::Event(None) => break,
            }
        }

        if !draining {
            return Err(WharfError::WorkersFailed {
                crashed: report.crashed,
                total,
            });
        }
        Ok(report)
    }
}

fn classify_exit(
    id: Uuid,
    prior: WorkerState,
    status: std::process::ExitStatus,
    was_force_killed: bool,
    report: &mut PoolReport,
) -> WorkerState {
    if was_force_killed {
        report.killed += 1;
        warn!(worker = %id, "Worker killed after drain deadline");
        return WorkerState::Crashed;
    }
    match prior {
        WorkerState::ShuttingDown if status.success() => {
            report.exited_clean += 1;
            info!(worker = %id, "Worker drained cleanly");
            WorkerState::Exited
        }
        WorkerState::ShuttingDown => {
            report.crashed += 1;
            warn!(worker = %id, ?status, "Worker exited non-zero during drain");
            WorkerState::Crashed
        }
        WorkerState::Serving if status.success() => {
            report.exited_clean += 1;
            warn!(worker = %id, "Worker exited while serving; not respawning");
            WorkerState::Exited
        }
        WorkerState::Serving => {
            report.crashed += 1;
            error!(worker = %id, ?status, "Worker crashed while serving; not respawning");
            WorkerState::Crashed
        }
        _ => {
            report.crashed += 1;
            error!(worker = %id, ?status, "Worker exited before loading the application");
            WorkerState::Crashed
        }
    }
}

/// Forward a worker's output into the supervisor log, watching stdout for the
/// readiness announcement.
fn forward_lines<R>(id: Uuid, stream: R, tx: mpsc::UnboundedSender<WorkerEvent>, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !is_stderr && line.trim() == READY_LINE {
                let _ = tx.send(WorkerEvent::Ready(id));
            } else if is_stderr {
                warn!(worker = %id, "{line}");
            } else {
                info!(worker = %id, "{line}");
            }
        }
    });
}

fn signal_worker(pid: u32, signum: i32) {
    // ESRCH just means the worker exited before the signal landed.
    unsafe {
        libc::kill(pid as libc::pid_t, signum);
    }
}
