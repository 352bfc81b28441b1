// ── Process supervisor ──
//
// Launches scripts and registration requests as detached child processes and
// tracks them until they are reaped. Every child gets a watcher task that
// owns the `Child`, waits for it, and posts a `Completion` on a channel the
// reactor selects on -- so completion is just another readiness event and the
// reactor never blocks on a child.
//
// The table of supervised processes is owned here and only touched from the
// reactor. Watchers run on the same current-thread runtime.

use std::collections::HashMap;
use std::net::IpAddr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a child gets to exit after SIGTERM during drain before SIGKILL.
pub const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Supervisor-assigned handle of one child.
pub type ProcessId = u64;

/// What a supervised process was launched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessKind {
    /// A user script answering a button press.
    Script { sequence: String },
    /// A registration request towards a device.
    Registration { device: IpAddr },
}

/// How a supervised process ended.
#[derive(Debug)]
pub enum ExitOutcome {
    /// The child exited on its own.
    Exited(ExitStatus),
    /// The child was stopped by the supervisor during drain.
    Terminated(ExitStatus),
    /// Drain cancelled the child before its launch delay ran out.
    Cancelled,
    /// The command could not be started.
    SpawnFailed(std::io::Error),
    /// The child could not be observed any more; it was force-killed.
    Orphaned(std::io::Error),
}

/// Posted by a watcher when its child is done.
#[derive(Debug)]
pub struct Completion {
    pub id: ProcessId,
    pub outcome: ExitOutcome,
}

/// A child that has been reaped: what it was, and how it ended.
#[derive(Debug)]
pub struct Reaped {
    pub kind: ProcessKind,
    pub outcome: ExitOutcome,
}

#[derive(Debug)]
struct SupervisedProcess {
    kind: ProcessKind,
    program: String,
    cancel: CancellationToken,
}

pub struct ProcessSupervisor {
    next_id: ProcessId,
    table: HashMap<ProcessId, SupervisedProcess>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            next_id: 0,
            table: HashMap::new(),
            completion_tx,
            completion_rx,
        }
    }

    /// Launch `argv` after `delay` and return its handle immediately.
    ///
    /// Must be called from within a tokio runtime. Launch failures are not
    /// reported here but as an [`ExitOutcome::SpawnFailed`] completion.
    pub fn spawn(&mut self, kind: ProcessKind, argv: Vec<String>, delay: Duration) -> ProcessId {
        self.next_id += 1;
        let id = self.next_id;
        let cancel = CancellationToken::new();
        let program = argv.first().cloned().unwrap_or_default();

        debug!(id, ?kind, program = %program, "spawning supervised process");
        tokio::spawn(watch(
            id,
            argv,
            delay,
            cancel.clone(),
            self.completion_tx.clone(),
        ));

        self.table.insert(
            id,
            SupervisedProcess {
                kind,
                program,
                cancel,
            },
        );
        id
    }

    /// Wait for the next child to finish. Pending forever while nothing runs.
    pub async fn next_completion(&mut self) -> Completion {
        match self.completion_rx.recv().await {
            Some(completion) => completion,
            // The supervisor holds a sender, so the channel never closes.
            None => std::future::pending().await,
        }
    }

    /// Remove a finished child from the table and log how it ended.
    ///
    /// Returns `None` for an id that is not (or no longer) supervised.
    pub fn reap(&mut self, completion: Completion) -> Option<Reaped> {
        let Completion { id, outcome } = completion;
        let Some(process) = self.table.remove(&id) else {
            warn!(id, "completion for unknown process");
            return None;
        };

        let program = process.program.as_str();
        match &outcome {
            ExitOutcome::Exited(status) if status.success() => {
                debug!(id, program, "process finished");
            }
            ExitOutcome::Exited(status) => {
                warn!(id, program, %status, "process exited unsuccessfully");
            }
            ExitOutcome::Terminated(status) => {
                info!(id, program, %status, "process terminated");
            }
            ExitOutcome::Cancelled => {
                info!(id, program, "process cancelled before launch");
            }
            ExitOutcome::SpawnFailed(e) => {
                error!(id, program, error = %e, "failed to launch process");
            }
            ExitOutcome::Orphaned(e) => {
                error!(
                    id,
                    program,
                    error = %e,
                    "lost track of process, killed it; the external command is misbehaving"
                );
            }
        }

        Some(Reaped {
            kind: process.kind,
            outcome,
        })
    }

    /// Terminate every supervised child and wait for all of them.
    ///
    /// Used only on shutdown. Never fails; per-process outcomes are logged
    /// and returned.
    pub async fn drain_all(&mut self) -> Vec<Reaped> {
        if self.table.is_empty() {
            return Vec::new();
        }
        info!(outstanding = self.table.len(), "draining supervised processes");

        for process in self.table.values() {
            process.cancel.cancel();
        }

        let mut reaped = Vec::with_capacity(self.table.len());
        while !self.table.is_empty() {
            let completion = self.next_completion().await;
            reaped.extend(self.reap(completion));
        }
        reaped
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Kinds of all currently supervised processes, in no particular order.
    pub fn kinds(&self) -> impl Iterator<Item = &ProcessKind> {
        self.table.values().map(|process| &process.kind)
    }
}

// ── Watcher ──────────────────────────────────────────────────────────

/// Owns one child from launch to exit and reports the outcome.
async fn watch(
    id: ProcessId,
    argv: Vec<String>,
    delay: Duration,
    cancel: CancellationToken,
    completion_tx: mpsc::UnboundedSender<Completion>,
) {
    let outcome = run_child(&argv, delay, &cancel).await;
    // The receiver lives as long as the supervisor; a send error means the
    // reactor is gone and nobody is left to care.
    let _ = completion_tx.send(Completion { id, outcome });
}

async fn run_child(argv: &[String], delay: Duration, cancel: &CancellationToken) -> ExitOutcome {
    if !delay.is_zero() {
        tokio::select! {
            () = cancel.cancelled() => return ExitOutcome::Cancelled,
            () = tokio::time::sleep(delay) => {}
        }
    }

    let mut child = match launch(argv) {
        Ok(child) => child,
        Err(e) => return ExitOutcome::SpawnFailed(e),
    };

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        () = cancel.cancelled() => None,
    };

    match exited {
        Some(Ok(status)) => ExitOutcome::Exited(status),
        Some(Err(e)) => {
            let _ = child.start_kill();
            ExitOutcome::Orphaned(e)
        }
        None => terminate(&mut child).await,
    }
}

fn launch(argv: &[String]) -> std::io::Result<Child> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line")
    })?;
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(false)
        .spawn()
}

/// SIGTERM, then SIGKILL once [`DRAIN_GRACE`] has passed.
async fn terminate(child: &mut Child) -> ExitOutcome {
    let pid = child.id().and_then(|pid| i32::try_from(pid).ok());
    let signalled = pid.is_some_and(|pid| kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok());
    if !signalled {
        let _ = child.start_kill();
    }

    let status = match tokio::time::timeout(DRAIN_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(?pid, "process ignored SIGTERM, killing");
            let _ = child.start_kill();
            child.wait().await
        }
    };

    match status {
        Ok(status) => ExitOutcome::Terminated(status),
        Err(e) => ExitOutcome::Orphaned(e),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
