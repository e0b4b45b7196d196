//! Boundary between the request bridge and whatever produces proxies

use crate::relay::filter::FilterSpec;
use crate::relay::staging::StagingSender;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Whether discovered proxies are verified before being handed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Discover and verify
    Find,
    /// Discover only; records carry no metrics
    Grab,
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryMode::Find => write!(f, "find"),
            DiscoveryMode::Grab => write!(f, "grab"),
        }
    }
}

/// One engine invocation
#[derive(Debug, Clone)]
pub struct DiscoveryJob {
    pub mode: DiscoveryMode,
    pub filter: FilterSpec,
}

impl DiscoveryJob {
    pub fn new(mode: DiscoveryMode, filter: FilterSpec) -> Self {
        Self { mode, filter }
    }
}

/// Counters an engine reports when its task ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Unique candidates seen
    pub candidates: usize,
    /// Records pushed to the staging channel
    pub accepted: usize,
    /// Stopped by cancellation rather than running out of work
    pub cancelled: bool,
}

/// A source of proxy records.
///
/// `start` must return immediately; the work runs on a background task that
/// pushes into `sink` until it runs out of work, reaches the job's limit,
/// sees the sink detach, or `cancel` fires.
pub trait DiscoveryEngine: Send + Sync + 'static {
    fn start(&self, job: DiscoveryJob, sink: StagingSender, cancel: CancellationToken) -> DiscoveryHandle;
}

/// How an engine task ended from the waiter's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Completed(DiscoveryReport),
    /// The task returned an error or panicked
    Failed(String),
    /// Still running at the ceiling; it was asked to stop and left detached
    Overran,
}

/// Handle to a running engine task
pub struct DiscoveryHandle {
    task: JoinHandle<anyhow::Result<DiscoveryReport>>,
    cancel: CancellationToken,
}

impl DiscoveryHandle {
    /// Spawn `work` so that firing `cancel` ends it with a cancelled report
    pub fn spawn<F>(cancel: CancellationToken, work: F) -> Self
    where
        F: Future<Output = anyhow::Result<DiscoveryReport>> + Send + 'static,
    {
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Ok(DiscoveryReport {
                    cancelled: true,
                    ..Default::default()
                }),
                result = work => result,
            }
        });
        Self { task, cancel }
    }

    /// Request best-effort early termination
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task, but no longer than `ceiling`
    pub async fn wait(mut self, ceiling: Duration) -> DiscoveryOutcome {
        match tokio::time::timeout(ceiling, &mut self.task).await {
            Ok(Ok(Ok(report))) => DiscoveryOutcome::Completed(report),
            Ok(Ok(Err(e))) => DiscoveryOutcome::Failed(format!("{e:#}")),
            Ok(Err(join_error)) => DiscoveryOutcome::Failed(join_error.to_string()),
            Err(_) => {
                // Dropping the JoinHandle detaches; the task keeps running
                // until it notices the cancellation.
                self.stop();
                DiscoveryOutcome::Overran
            }
        }
    }
}
