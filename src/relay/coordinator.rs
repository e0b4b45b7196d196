//! Runs one caller request from validation to response

use crate::error::{ServiceError, ServiceResult};
use crate::proxy::ProxyRecord;
use crate::relay::engine::{DiscoveryJob, DiscoveryMode, DiscoveryOutcome};
use crate::relay::filter::{FilterSpec, FindRequest, GrabRequest};
use crate::relay::session::Session;
use crate::relay::staging::staging_channel;
use crate::relay::window::CollectionWindow;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Bridges a session's engine to bounded request/response batches
#[derive(Clone)]
pub struct RequestCoordinator {
    session: Arc<Session>,
}

impl RequestCoordinator {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Discover and verify proxies
    pub async fn find(&self, request: FindRequest) -> ServiceResult<Vec<ProxyRecord>> {
        self.session.ensure_ready()?;
        let filter = request.validate(self.session.limits().max_limit)?;
        self.run(DiscoveryMode::Find, filter).await
    }

    /// Discover proxies without verifying them
    pub async fn grab(&self, request: GrabRequest) -> ServiceResult<Vec<ProxyRecord>> {
        self.session.ensure_ready()?;
        let filter = request.validate(self.session.limits().max_limit)?;
        self.run(DiscoveryMode::Grab, filter).await
    }

    async fn run(&self, mode: DiscoveryMode, filter: FilterSpec) -> ServiceResult<Vec<ProxyRecord>> {
        let span = tracing::info_span!(
            "discovery",
            request_id = %Uuid::new_v4(),
            %mode,
            limit = filter.limit
        );
        self.collect(DiscoveryJob::new(mode, filter))
            .instrument(span)
            .await
    }

    async fn collect(&self, job: DiscoveryJob) -> ServiceResult<Vec<ProxyRecord>> {
        let _active = self.session.track_request();
        let limits = *self.session.limits();
        let window = CollectionWindow::new(job.filter.limit, limits.item_wait);

        // A fresh channel per request: nothing from another request can be
        // buffered here, and the engine task dies with the request.
        let (tx, mut rx) = staging_channel();
        let cancel = self.session.request_token();
        let _cancel_on_exit = cancel.clone().drop_guard();

        tracing::debug!(types = ?job.filter.types, countries = ?job.filter.countries, "Starting discovery");
        let handle = self.session.engine().start(job, tx, cancel);

        let batch = window.collect(&mut rx).await;

        rx.close();
        let discarded = rx.drain();
        if discarded > 0 {
            tracing::debug!(discarded, "Dropped records that arrived after collection");
        }

        let failure = match handle.wait(limits.task_ceiling).await {
            DiscoveryOutcome::Completed(report) => {
                tracing::debug!(
                    candidates = report.candidates,
                    accepted = report.accepted,
                    cancelled = report.cancelled,
                    "Discovery task finished"
                );
                None
            }
            DiscoveryOutcome::Failed(reason) => {
                tracing::error!(error = %reason, "Error in discovery task");
                Some(reason)
            }
            DiscoveryOutcome::Overran => {
                tracing::warn!(
                    ceiling = ?limits.task_ceiling,
                    "Discovery task timed out, but returning collected proxies"
                );
                None
            }
        };

        if batch.is_empty() {
            return Err(match failure {
                Some(reason) => ServiceError::DiscoveryFailed(reason),
                None => ServiceError::NotFound,
            });
        }

        tracing::info!(returned = batch.len(), end = ?batch.end, "Returning proxies");
        Ok(batch.records)
    }
}
