//! Bounded, per-item timed collection of one batch

use crate::proxy::ProxyRecord;
use crate::relay::staging::{PopError, StagingReceiver};
use std::time::Duration;

/// Default wait for each individual record
pub const DEFAULT_ITEM_WAIT: Duration = Duration::from_secs(30);

/// Why a window stopped collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEnd {
    /// Target count reached
    Filled,
    /// No record arrived within the per-item budget
    Stalled,
    /// The producer finished and the buffer ran dry
    StreamEnded,
}

/// Records gathered by one window, in arrival order
#[derive(Debug)]
pub struct Batch {
    pub records: Vec<ProxyRecord>,
    pub end: WindowEnd,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Pulls up to `target` records, giving each one `item_wait` to show up.
///
/// The budget restarts after every record, so a slow but steady producer
/// can take longer than `item_wait` in total.
#[derive(Debug, Clone, Copy)]
pub struct CollectionWindow {
    target: usize,
    item_wait: Duration,
}

impl CollectionWindow {
    pub fn new(target: usize, item_wait: Duration) -> Self {
        Self { target, item_wait }
    }

    pub async fn collect(&self, rx: &mut StagingReceiver) -> Batch {
        let mut records = Vec::with_capacity(self.target.min(64));

        let end = loop {
            if records.len() >= self.target {
                break WindowEnd::Filled;
            }
            match rx.pop(self.item_wait).await {
                Ok(record) => records.push(record),
                Err(PopError::WaitTimeout(budget)) => {
                    tracing::warn!(
                        collected = records.len(),
                        target = self.target,
                        wait = ?budget,
                        "Timeout waiting for proxies"
                    );
                    break WindowEnd::Stalled;
                }
                Err(PopError::Closed) => {
                    tracing::debug!(collected = records.len(), "Discovery stream ended");
                    break WindowEnd::StreamEnded;
                }
            }
        };

        Batch { records, end }
    }
}
