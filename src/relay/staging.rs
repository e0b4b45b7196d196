//! FIFO hand-off between a discovery producer and a collecting request

use crate::proxy::ProxyRecord;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Why a `pop` returned without a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing arrived within the wait budget; the producer may still be running
    WaitTimeout(Duration),
    /// Every producer handle is gone and the buffer is empty
    Closed,
}

impl fmt::Display for PopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopError::WaitTimeout(budget) => write!(f, "no record within {budget:?}"),
            PopError::Closed => write!(f, "staging channel closed"),
        }
    }
}

impl std::error::Error for PopError {}

/// Create a connected producer/consumer pair with unbounded capacity
pub fn staging_channel() -> (StagingSender, StagingReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StagingSender { tx }, StagingReceiver { rx })
}

/// Producer half, handed to the discovery engine
#[derive(Clone)]
pub struct StagingSender {
    tx: mpsc::UnboundedSender<ProxyRecord>,
}

impl StagingSender {
    /// Append a record to the tail without blocking.
    ///
    /// Returns `false` once the consumer has detached; the record is then
    /// dropped and the producer should stop.
    pub fn push(&self, record: ProxyRecord) -> bool {
        self.tx.send(record).is_ok()
    }

    /// Whether the consumer has detached
    pub fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the request collecting a batch
pub struct StagingReceiver {
    rx: mpsc::UnboundedReceiver<ProxyRecord>,
}

impl StagingReceiver {
    /// Take the head record, waiting at most `budget` for one to arrive
    pub async fn pop(&mut self, budget: Duration) -> Result<ProxyRecord, PopError> {
        match tokio::time::timeout(budget, self.rx.recv()).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(PopError::Closed),
            Err(_) => Err(PopError::WaitTimeout(budget)),
        }
    }

    /// Discard everything currently buffered; returns how many were dropped
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Detach from producers; their later pushes report non-delivery.
    /// Records already buffered stay readable until drained.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Whether no more records can ever arrive (buffered ones may remain)
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
