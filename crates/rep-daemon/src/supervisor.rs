//! The sharded daemon supervisor (spec.md §4.6).
//!
//! Actor supervision from the source material is replaced with
//! message-passing: a command channel per worker, grounded in the
//! teacher's `forwarder_command_senders: HashMap<String,
//! mpsc::Sender<ForwarderCommand>>` (`services/server/src/state.rs`),
//! generalized from one entry per connected device to one entry per
//! slice-range worker.

use crate::membership::ClusterMembership;
use async_trait::async_trait;
use rep_core::{slice_ranges, SliceRange};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One long-lived unit of work, pinned to a slice range for its
/// lifetime until rebalanced. Implemented by `rep-producer`'s stream
/// server loop or `rep-consumer`'s `ProjectionRuntime::run`, depending
/// on which side of the replication link this daemon supervises.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn run(&self, range: SliceRange, shutdown: watch::Receiver<bool>);
}

enum WorkerCommand {
    Stop,
    Rebalance(SliceRange),
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("no worker at index {0}")]
    UnknownWorker(u32),
    #[error("worker {0}'s supervising task is gone")]
    WorkerGone(u32),
}

struct WorkerHandle {
    command_tx: Option<mpsc::Sender<WorkerCommand>>,
    lifecycle: JoinHandle<()>,
}

/// Maintains exactly `N` long-lived workers, one per computed slice
/// range, for as long as this node owns them (spec.md §4.6).
pub struct Supervisor {
    workers: Vec<WorkerHandle>,
}

impl Supervisor {
    /// Computes `slice_ranges(n)` and starts one worker per range this
    /// node owns per `membership`. Workers not owned by this node are
    /// left unstarted (another node is responsible for them).
    pub fn start<W: Worker>(n: u32, worker: Arc<W>, membership: Arc<dyn ClusterMembership>) -> Self {
        let ranges = slice_ranges(n);
        let mut workers = Vec::with_capacity(ranges.len());
        for (index, range) in ranges.into_iter().enumerate() {
            let index = index as u32;
            if !membership.owns(index) {
                workers.push(WorkerHandle { command_tx: None, lifecycle: tokio::spawn(async {}) });
                continue;
            }
            let (command_tx, command_rx) = mpsc::channel(4);
            let lifecycle = tokio::spawn(run_lifecycle(index, range, worker.clone(), command_rx));
            workers.push(WorkerHandle { command_tx: Some(command_tx), lifecycle });
        }
        Supervisor { workers }
    }

    /// Stops every live worker and waits for each to finish its
    /// in-flight handoff (spec.md §7 "split-brain during rebalance").
    pub async fn stop_all(self) {
        for handle in &self.workers {
            if let Some(tx) = &handle.command_tx {
                let _ = tx.send(WorkerCommand::Stop).await;
            }
        }
        for handle in self.workers {
            let _ = handle.lifecycle.await;
        }
    }

    /// Requests that `worker_index` move to `new_range`. The supervisor
    /// stops the worker at its current range and completes that stop
    /// (including its final offset commit) before starting it again at
    /// `new_range` — `Rebalance = stop then start` (spec.md §9).
    pub async fn rebalance(&self, worker_index: u32, new_range: SliceRange) -> Result<(), DaemonError> {
        let handle = self
            .workers
            .get(worker_index as usize)
            .ok_or(DaemonError::UnknownWorker(worker_index))?;
        let tx = handle.command_tx.as_ref().ok_or(DaemonError::UnknownWorker(worker_index))?;
        tx.send(WorkerCommand::Rebalance(new_range))
            .await
            .map_err(|_| DaemonError::WorkerGone(worker_index))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

async fn run_lifecycle<W: Worker>(
    index: u32,
    mut range: SliceRange,
    worker: Arc<W>,
    mut commands: mpsc::Receiver<WorkerCommand>,
) {
    let (mut shutdown_tx, _shutdown_rx0) = watch::channel(false);
    let mut current: JoinHandle<()> = spawn_run(&worker, range, &shutdown_tx);

    loop {
        match commands.recv().await {
            Some(WorkerCommand::Stop) | None => {
                let _ = shutdown_tx.send(true);
                let _ = current.await;
                break;
            }
            Some(WorkerCommand::Rebalance(new_range)) => {
                tracing::info!(worker = index, "rebalancing: stopping at current range");
                let _ = shutdown_tx.send(true);
                let _ = current.await;
                range = new_range;
                let (new_tx, _new_rx0) = watch::channel(false);
                shutdown_tx = new_tx;
                current = spawn_run(&worker, range, &shutdown_tx);
                tracing::info!(worker = index, min = range.min, max = range.max, "rebalanced: started at new range");
            }
        }
    }
}

fn spawn_run<W: Worker>(worker: &Arc<W>, range: SliceRange, shutdown_tx: &watch::Sender<bool>) -> JoinHandle<()> {
    let worker = worker.clone();
    let shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move { worker.run(range, shutdown_rx).await })
}
