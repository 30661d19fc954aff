//! Poll Coordinator - fan-out over hosts, fan-in into a Snapshot
//!
//! Each cycle spawns one task per host and waits for all of them before
//! building the snapshot. Cycles may overlap (e.g. a manual refresh during a
//! scheduled one); the in-flight counter reflects the overlap.
//!
//! Single-writer rule: only the coordinator replaces the published snapshot.
//! Observers subscribe through watch channels and never see a partially
//! populated snapshot.

use crate::application::host_poller::HostPoller;
use crate::domain::{HostId, HostResult, RemoteCommand, Snapshot};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, RemoteCommandRunner, TimeProvider};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shared cycle bookkeeping (in-flight count + published snapshot)
struct CycleState {
    in_flight: watch::Sender<usize>,
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
}

impl CycleState {
    /// Swap in a completed snapshot and return the published copy
    ///
    /// Completion order is the order of calls. The snapshot gets the next
    /// sequence number, and its `completed_at` is raised to the previous
    /// one if the wall clock stepped back since.
    fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let mut snapshot = Arc::new(snapshot);
        self.snapshot.send_modify(|current| {
            let next = Arc::make_mut(&mut snapshot);
            match current {
                Some(previous) => {
                    next.sequence = previous.sequence + 1;
                    if next.completed_at < previous.completed_at {
                        warn!(
                            cycle_id = %next.cycle_id,
                            completed_at = next.completed_at,
                            previous_completed_at = previous.completed_at,
                            "Wall clock went backwards, keeping completion time monotonic"
                        );
                        next.completed_at = previous.completed_at;
                    }
                }
                None => next.sequence = 1,
            }
            *current = Some(Arc::clone(&snapshot));
        });
        snapshot
    }
}

/// Decrements the in-flight counter on drop, so an aborted cycle still
/// releases its slot
struct InFlightGuard {
    state: Arc<CycleState>,
}

impl InFlightGuard {
    fn enter(state: &Arc<CycleState>) -> Self {
        state.in_flight.send_modify(|n| *n += 1);
        Self {
            state: Arc::clone(state),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.state
            .in_flight
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Poll Coordinator
pub struct PollCoordinator {
    poller: RwLock<HostPoller>,
    state: Arc<CycleState>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl PollCoordinator {
    /// Create a new coordinator
    ///
    /// # Arguments
    /// * `runner` - Remote shell transport
    /// * `command` - Listing command run on every host
    /// * `time_provider` - Clock used to stamp `Snapshot::completed_at`
    /// * `id_provider` - Cycle id generator (log correlation)
    pub fn new(
        runner: Arc<dyn RemoteCommandRunner>,
        command: RemoteCommand,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        let (snapshot, _) = watch::channel(None);

        Self {
            poller: RwLock::new(HostPoller::new(runner, command)),
            state: Arc::new(CycleState {
                in_flight,
                snapshot,
            }),
            time_provider,
            id_provider,
        }
    }

    /// Replace the remote command for subsequent cycles
    pub fn set_command(&self, command: RemoteCommand) {
        let mut poller = self.poller.write().unwrap_or_else(|e| e.into_inner());
        if poller.command() != &command {
            info!(program = %command.program, args = ?command.args, "Remote command updated");
            *poller = HostPoller::new(poller.runner(), command);
        }
    }

    /// Start a poll cycle over `hosts`
    ///
    /// The in-flight counter is incremented before this returns. The cycle
    /// itself runs on a spawned task; once every host has finished, the
    /// snapshot is published, the counter decremented, and `on_complete`
    /// invoked. Duplicate host entries are polled once.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run_cycle<F>(&self, hosts: &[HostId], on_complete: F) -> JoinHandle<Arc<Snapshot>>
    where
        F: FnOnce(Arc<Snapshot>) + Send + 'static,
    {
        let guard = InFlightGuard::enter(&self.state);
        let hosts = dedup_hosts(hosts);
        let cycle_id = self.id_provider.generate_id();
        let poller = self.poller.read().unwrap_or_else(|e| e.into_inner()).clone();
        let time_provider = Arc::clone(&self.time_provider);
        let state = Arc::clone(&self.state);

        info!(cycle_id = %cycle_id, hosts = hosts.len(), "Poll cycle started");
        let started_at = time_provider.now_millis();

        tokio::spawn(async move {
            let results = fan_out(&poller, hosts).await;

            let completed_at = time_provider.now_millis();
            let errors = results.iter().filter(|r| r.is_error()).count();
            let snapshot = state.publish(Snapshot::new(cycle_id, completed_at, results));
            drop(guard);

            info!(
                cycle_id = %snapshot.cycle_id,
                sequence = snapshot.sequence,
                hosts = snapshot.len(),
                errors = errors,
                duration_ms = completed_at - started_at,
                "Poll cycle completed"
            );

            on_complete(Arc::clone(&snapshot));
            snapshot
        })
    }

    /// Run a cycle and wait for its snapshot (CLI one-shot use)
    pub async fn run_cycle_and_wait(&self, hosts: &[HostId]) -> Result<Arc<Snapshot>> {
        self.run_cycle(hosts, |_| {})
            .await
            .map_err(|e| AppError::Internal(format!("Poll cycle task failed: {}", e)))
    }

    /// Number of cycles currently running
    pub fn in_flight(&self) -> usize {
        *self.state.in_flight.borrow()
    }

    pub fn is_updating(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.state.snapshot.borrow().clone()
    }

    /// Observe published snapshots
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.state.snapshot.subscribe()
    }

    /// Observe the in-flight cycle count (`> 0` means "updating")
    pub fn subscribe_cycle_state(&self) -> watch::Receiver<usize> {
        self.state.in_flight.subscribe()
    }
}

/// Poll every host concurrently; resolves only when all have finished
///
/// A host task that panics is reported as that host's error.
async fn fan_out(poller: &HostPoller, hosts: Vec<HostId>) -> Vec<HostResult> {
    let handles: Vec<JoinHandle<HostResult>> = hosts
        .iter()
        .map(|host| {
            let poller = poller.clone();
            let host = host.clone();
            tokio::spawn(async move { poller.poll(&host).await })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .zip(hosts)
        .map(|(joined, host)| match joined {
            Ok(result) => result,
            Err(join_err) => {
                error!(host = %host, error = %join_err, "Host poll task failed");
                HostResult::failure(host, format!("Poll task failed: {}", join_err))
            }
        })
        .collect()
}

/// Drop repeated entries, keeping first-occurrence order
fn dedup_hosts(hosts: &[HostId]) -> Vec<HostId> {
    let mut seen = HashSet::new();
    hosts
        .iter()
        .filter(|h| seen.insert(h.as_str()))
        .cloned()
        .collect()
}
