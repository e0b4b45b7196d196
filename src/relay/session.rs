//! Process-wide discovery state and its lifecycle

use crate::error::{ServiceError, ServiceResult};
use crate::relay::engine::DiscoveryEngine;
use crate::relay::window::DEFAULT_ITEM_WAIT;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default bound on waiting for an engine task after collection
pub const DEFAULT_TASK_CEILING: Duration = Duration::from_secs(60);

/// Default upper bound on a request's target count
pub const DEFAULT_MAX_LIMIT: usize = 1000;

const STATE_CREATED: u8 = 0;
const STATE_READY: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Time and size bounds applied to every request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionLimits {
    /// Wait for each record before declaring a stall
    pub item_wait: Duration,
    /// Wait for the engine task once the batch is collected
    pub task_ceiling: Duration,
    /// Largest target count a caller may ask for
    pub max_limit: usize,
}

impl Default for CollectionLimits {
    fn default() -> Self {
        Self {
            item_wait: DEFAULT_ITEM_WAIT,
            task_ceiling: DEFAULT_TASK_CEILING,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

/// Holds the discovery engine for the lifetime of the process.
///
/// Requests never share buffers through the session: each one gets its own
/// staging channel and engine invocation, and only borrows the engine and a
/// child of the shutdown token from here.
pub struct Session {
    engine: Arc<dyn DiscoveryEngine>,
    limits: CollectionLimits,
    shutdown: CancellationToken,
    state: AtomicU8,
    active: AtomicUsize,
}

impl Session {
    /// Create an uninitialized session
    pub fn new(engine: Arc<dyn DiscoveryEngine>, limits: CollectionLimits) -> Self {
        Self {
            engine,
            limits,
            shutdown: CancellationToken::new(),
            state: AtomicU8::new(STATE_CREATED),
            active: AtomicUsize::new(0),
        }
    }

    /// Mark the session ready to serve; allowed exactly once
    pub fn init(&self) -> ServiceResult<()> {
        self.state
            .compare_exchange(STATE_CREATED, STATE_READY, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ServiceError::AlreadyInitialized)?;
        tracing::info!(
            item_wait = ?self.limits.item_wait,
            task_ceiling = ?self.limits.task_ceiling,
            max_limit = self.limits.max_limit,
            "Discovery session started"
        );
        Ok(())
    }

    /// Refuse new requests and cancel every running engine task.
    ///
    /// Does not wait for tasks to finish; in-flight network calls end when
    /// they next observe cancellation.
    pub fn stop(&self) {
        let previous = self.state.swap(STATE_STOPPED, Ordering::AcqRel);
        self.shutdown.cancel();
        if previous != STATE_STOPPED {
            tracing::info!(
                active_requests = self.active_requests(),
                "Discovery session stopped"
            );
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_READY
    }

    pub fn ensure_ready(&self) -> ServiceResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ServiceError::Unavailable)
        }
    }

    pub fn limits(&self) -> &CollectionLimits {
        &self.limits
    }

    pub fn engine(&self) -> &dyn DiscoveryEngine {
        self.engine.as_ref()
    }

    /// Requests currently between validation and response
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Token for one request's engine task; fires on session stop
    pub(crate) fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub(crate) fn track_request(&self) -> ActiveRequest<'_> {
        self.active.fetch_add(1, Ordering::Relaxed);
        ActiveRequest {
            active: &self.active,
        }
    }
}

/// Counts a request as active until dropped
pub(crate) struct ActiveRequest<'a> {
    active: &'a AtomicUsize,
}

impl Drop for ActiveRequest<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}
