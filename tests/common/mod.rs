#![allow(dead_code)]

use proxy_broker::relay::{
    CollectionLimits, DiscoveryEngine, DiscoveryHandle, DiscoveryJob, DiscoveryReport,
    StagingSender,
};
use proxy_broker::{
    GeoLocation, ProxyCandidate, ProxyMetrics, ProxyRecord, ProxyType, RequestCoordinator,
    Session,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a scripted run does after its last record
#[derive(Debug, Clone)]
pub enum Tail {
    Finish,
    Hang,
    Fail(String),
}

/// Records pushed at fixed delays, then a tail
#[derive(Debug, Clone)]
pub struct Script {
    pub steps: Vec<(Duration, ProxyRecord)>,
    pub tail: Tail,
}

impl Script {
    pub fn new(tail: Tail) -> Self {
        Self {
            steps: Vec::new(),
            tail,
        }
    }

    pub fn push_every(mut self, delay: Duration, records: Vec<ProxyRecord>) -> Self {
        self.steps
            .extend(records.into_iter().map(|record| (delay, record)));
        self
    }
}

/// Engine that plays back one queued script per `start`
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<VecDeque<Script>>,
    starts: AtomicUsize,
    jobs: Mutex<Vec<DiscoveryJob>>,
}

impl ScriptedEngine {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<DiscoveryJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl DiscoveryEngine for ScriptedEngine {
    fn start(
        &self,
        job: DiscoveryJob,
        sink: StagingSender,
        cancel: CancellationToken,
    ) -> DiscoveryHandle {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().push(job);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::new(Tail::Finish));

        DiscoveryHandle::spawn(cancel, async move {
            let mut report = DiscoveryReport::default();
            for (delay, record) in script.steps {
                tokio::time::sleep(delay).await;
                report.candidates += 1;
                if !sink.push(record) {
                    return Ok(report);
                }
                report.accepted += 1;
            }
            match script.tail {
                Tail::Finish => Ok(report),
                Tail::Hang => {
                    futures::future::pending::<()>().await;
                    Ok(report)
                }
                Tail::Fail(reason) => Err(anyhow::anyhow!(reason)),
            }
        })
    }
}

pub fn unverified(host: &str, port: u16) -> ProxyRecord {
    ProxyCandidate::new(host.to_string(), port, ProxyType::Http).into_record(GeoLocation::default())
}

pub fn verified_us(host: &str, port: u16) -> ProxyRecord {
    ProxyCandidate::new(host.to_string(), port, ProxyType::Http)
        .into_record(GeoLocation::with_country(
            Some("US".to_string()),
            Some("United States".to_string()),
        ))
        .with_metrics(ProxyMetrics {
            is_working: true,
            avg_resp_time: 0.5,
            error_rate: 0.0,
        })
}

pub fn hosts(prefix: &str, count: usize) -> Vec<ProxyRecord> {
    (1..=count)
        .map(|i| unverified(&format!("{prefix}.{i}"), 8080))
        .collect()
}

pub fn ready_session(engine: Arc<ScriptedEngine>) -> Arc<Session> {
    let session = Arc::new(Session::new(engine, CollectionLimits::default()));
    session.init().unwrap();
    session
}

pub fn coordinator(engine: Arc<ScriptedEngine>) -> RequestCoordinator {
    RequestCoordinator::new(ready_session(engine))
}
