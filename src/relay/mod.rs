//! Request bridge between the discovery engine and callers
//!
//! Each request gets its own staging channel and engine invocation:
//! - `staging`: unbounded FIFO with an explicit closed state
//! - `engine`: the producer boundary and task handle
//! - `window`: per-item timed batch collection
//! - `coordinator`: validation, racing and outcome mapping
//! - `session`: process-wide engine ownership and lifecycle

pub mod coordinator;
pub mod engine;
pub mod filter;
pub mod session;
pub mod staging;
pub mod window;

pub use coordinator::RequestCoordinator;
pub use engine::{
    DiscoveryEngine, DiscoveryHandle, DiscoveryJob, DiscoveryMode, DiscoveryOutcome,
    DiscoveryReport,
};
pub use filter::{FilterSpec, FindRequest, GrabRequest};
pub use session::{CollectionLimits, Session};
pub use staging::{staging_channel, PopError, StagingReceiver, StagingSender};
pub use window::{Batch, CollectionWindow, WindowEnd};
