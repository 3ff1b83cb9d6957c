//! TriggerGate - cross-process rendezvous for triggered tasks
//!
//! Tasks tagged `Triggered` must not execute until an external harness (for
//! example a load-test driver) declares "now" by writing a signal file on the
//! target host. The gate runs one background poller that watches this file
//! through the `CommandRunner` and wakes every waiter on the same transition.
//!
//! ## Status State Machine
//!
//! ```text
//! Waiting ──signal file seen──▶ Triggered   (terminal)
//!    │
//!    └──timeout / stop()──────▶ Close       (terminal)
//! ```
//!
//! Both terminal states are single-assignment: the first transition wins and
//! later attempts are no-ops. Waiters never observe `Waiting` after any other
//! waiter has observed a terminal state (watch-channel broadcast, no lost
//! wakeup).
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → read signal file → consume + Triggered → [all waiters wake]
//!     ↑
//!     └─── Commands (Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval};
use tracing::{debug, instrument, trace, warn};

use crate::config::TriggerConfig;
use crate::executor::CommandRunner;

/// How long `stop()` waits for the poller to wind down before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tri-state status of the trigger gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    /// No signal yet; triggered tasks must keep waiting.
    Waiting,

    /// The external signal arrived; triggered tasks may run.
    Triggered,

    /// The gate gave up (timeout or shutdown); skip triggered tasks.
    Close,
}

impl TriggerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TriggerStatus::Waiting)
    }
}

/// Commands accepted by the gate's background poller
#[derive(Debug)]
enum GateCommand {
    /// Stop polling; resolves the gate to `Close` if still waiting.
    Shutdown,
}

/// Trigger gate ready to be started.
///
/// `spawn` consumes the gate, so a second start of the same poller is
/// unrepresentable - the handle is the only way to interact afterwards.
pub struct TriggerGate {
    config: TriggerConfig,
}

impl TriggerGate {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    /// Start the background poller and hand out the waiter handle.
    pub fn spawn(self, runner: Arc<dyn CommandRunner>) -> TriggerHandle {
        let (status_tx, status_rx) = watch::channel(TriggerStatus::Waiting);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = GateActor {
            config: self.config,
            runner,
            status_tx,
            command_rx: cmd_rx,
        };

        tokio::spawn(actor.run());

        TriggerHandle {
            status_rx,
            sender: cmd_tx,
        }
    }
}

struct GateActor {
    config: TriggerConfig,
    runner: Arc<dyn CommandRunner>,
    status_tx: watch::Sender<TriggerStatus>,
    command_rx: mpsc::Receiver<GateCommand>,
}

impl GateActor {
    /// Run the polling loop until the gate reaches a terminal status.
    #[instrument(skip(self), fields(signal = %self.config.signal_path))]
    async fn run(mut self) {
        debug!(
            "starting trigger gate poller (poll every {:?}, timeout {:?})",
            self.config.poll_interval(),
            self.config.timeout()
        );

        let started = Instant::now();
        let mut ticker = interval(self.config.poll_interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if started.elapsed() >= self.config.timeout() {
                        warn!(
                            "no trigger signal within {:?}, closing gate",
                            self.config.timeout()
                        );
                        self.transition(TriggerStatus::Close);
                        break;
                    }

                    if self.poll_signal().await {
                        self.transition(TriggerStatus::Triggered);
                        break;
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(GateCommand::Shutdown) => {
                            debug!("received shutdown command");
                            self.transition(TriggerStatus::Close);
                            break;
                        }

                        // Channel closed - every handle is gone, nobody
                        // can wait on us anymore.
                        None => {
                            debug!("all gate handles dropped, shutting down");
                            self.transition(TriggerStatus::Close);
                            break;
                        }
                    }
                }
            }
        }

        debug!("trigger gate poller stopped");
    }

    /// Read the remote signal file once.
    ///
    /// Returns true when the trimmed content matches the trigger value; the
    /// consumed signal file is deleted best-effort (failures only logged).
    /// Read failures are not fatal - the file usually does not exist yet and
    /// the next tick retries.
    async fn poll_signal(&self) -> bool {
        let read = self
            .runner
            .run_cmd(&format!("cat {}", self.config.signal_path))
            .await;

        if !read.is_success() {
            trace!("signal file not readable yet: {}", read.err_msg);
            return false;
        }

        if read.output.trim() != self.config.trigger_value {
            trace!(
                "signal file present but content {:?} does not match",
                read.output.trim()
            );
            return false;
        }

        let removed = self
            .runner
            .run_cmd(&format!("rm -f {}", self.config.signal_path))
            .await;
        if !removed.is_success() {
            warn!("failed to delete consumed signal file: {}", removed.err_msg);
        }

        true
    }

    /// First `Waiting -> terminal` transition wins; later attempts are no-ops.
    fn transition(&self, next: TriggerStatus) {
        let changed = self.status_tx.send_if_modified(|status| {
            if *status == TriggerStatus::Waiting && next.is_terminal() {
                *status = next;
                true
            } else {
                false
            }
        });

        if changed {
            debug!("gate transitioned to {next:?}");
        } else {
            trace!("ignoring transition to {next:?}, gate already terminal");
        }
    }
}

/// Handle for waiting on and controlling a running trigger gate.
///
/// Cloneable; every clone observes the same status. All concurrent `wait`
/// callers are released by the same transition.
#[derive(Clone)]
pub struct TriggerHandle {
    status_rx: watch::Receiver<TriggerStatus>,
    sender: mpsc::Sender<GateCommand>,
}

impl TriggerHandle {
    /// Current status without blocking.
    pub fn status(&self) -> TriggerStatus {
        *self.status_rx.borrow()
    }

    /// Block until the gate leaves `Waiting` or `timeout` elapses.
    ///
    /// Returns the status current at that moment - immediately when the gate
    /// is already terminal, and still `Waiting` when the caller's own timeout
    /// fired first.
    pub async fn wait(&self, timeout: Option<Duration>) -> TriggerStatus {
        let mut rx = self.status_rx.clone();

        let current = *rx.borrow_and_update();
        if current.is_terminal() {
            return current;
        }

        let until_terminal = async {
            // An Err from changed() means the poller is gone; the channel
            // keeps its last value, which is then the final answer.
            while rx.changed().await.is_ok() {
                if rx.borrow_and_update().is_terminal() {
                    break;
                }
            }
            *rx.borrow()
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, until_terminal)
                .await
                .unwrap_or_else(|_| self.status()),
            None => until_terminal.await,
        }
    }

    /// Ask the poller to exit and wait (bounded) until it has.
    ///
    /// A gate stopped while still `Waiting` resolves to `Close` so that no
    /// waiter stays blocked.
    pub async fn stop(&self) {
        let _ = self.sender.send(GateCommand::Shutdown).await;

        let mut rx = self.status_rx.clone();
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
            // Drain until the poller drops its sender.
            while rx.changed().await.is_ok() {}
        })
        .await;
    }
}
