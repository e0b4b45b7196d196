//! Proxy Broker - on-demand public proxy discovery
//!
//! A request/response service in front of an open-ended discovery engine.
//! Each request races a per-item timed collection window against its own
//! engine invocation and returns whatever batch it managed to gather.

pub mod api;
pub mod config;
pub mod error;
pub mod proxy;
pub mod relay;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use proxy::*;
pub use relay::{RequestCoordinator, Session};

/// Application result type
pub type Result<T> = anyhow::Result<T>;
