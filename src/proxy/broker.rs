//! Discovery engine that crawls public listings and verifies candidates
//!
//! Candidates stream out of the crawler as each source completes; in `find`
//! mode they are verified with bounded concurrency and pushed as soon as a
//! check passes, in `grab` mode they are pushed straight away.

use crate::proxy::checker::{CheckerConfig, ProxyChecker, VerifyPlan};
use crate::proxy::crawler::{CrawlerConfig, ProxyCrawler, ProxySource};
use crate::proxy::geo::{GeoLocation, GeoResolver};
use crate::proxy::models::{ProxyCandidate, ProxyRecord};
use crate::relay::engine::{
    DiscoveryEngine, DiscoveryHandle, DiscoveryJob, DiscoveryMode, DiscoveryReport,
};
use crate::relay::filter::FilterSpec;
use crate::relay::staging::StagingSender;
use crate::Result;
use anyhow::bail;
use futures::stream::{self, FuturesUnordered, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Default number of candidates verified at once
const DEFAULT_MAX_CONN: usize = 200;

/// Default number of listing sources fetched at once
const DEFAULT_SOURCE_CONCURRENCY: usize = 4;

/// Configuration for the discovery engine
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Concurrent verifications
    pub max_conn: usize,
    /// Concurrent source fetches
    pub source_concurrency: usize,
    pub checker: CheckerConfig,
    pub crawler: CrawlerConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_conn: DEFAULT_MAX_CONN,
            source_concurrency: DEFAULT_SOURCE_CONCURRENCY,
            checker: CheckerConfig::default(),
            crawler: CrawlerConfig::default(),
        }
    }
}

impl BrokerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_conn(mut self, max_conn: usize) -> Self {
        self.max_conn = max_conn.max(1);
        self
    }

    pub fn with_source_concurrency(mut self, concurrency: usize) -> Self {
        self.source_concurrency = concurrency.max(1);
        self
    }

    pub fn with_checker(mut self, checker: CheckerConfig) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_crawler(mut self, crawler: CrawlerConfig) -> Self {
        self.crawler = crawler;
        self
    }
}

struct BrokerInner {
    config: BrokerConfig,
    crawler: ProxyCrawler,
    geo: GeoResolver,
    sources: Vec<ProxySource>,
    real_ip: OnceCell<String>,
}

/// Crawl-and-verify implementation of [`DiscoveryEngine`]
#[derive(Clone)]
pub struct ProxyBroker {
    inner: Arc<BrokerInner>,
}

impl ProxyBroker {
    pub fn new(config: BrokerConfig, sources: Vec<ProxySource>, geo: GeoResolver) -> Result<Self> {
        let crawler = ProxyCrawler::with_config(config.crawler.clone())?;
        Ok(Self {
            inner: Arc::new(BrokerInner {
                config,
                crawler,
                geo,
                sources,
                real_ip: OnceCell::new(),
            }),
        })
    }

    pub fn sources(&self) -> &[ProxySource] {
        &self.inner.sources
    }

    /// Our public address as seen by the judge.
    ///
    /// Only a successful lookup is kept; after a failure the next job asks again.
    async fn real_ip(&self) -> Option<String> {
        let detected = self
            .inner
            .real_ip
            .get_or_try_init(|| async {
                let checker = ProxyChecker::with_config(self.inner.config.checker.clone());
                let ip = checker.detect_real_ip().await?;
                tracing::info!(ip = %ip, "Detected external address");
                Ok::<_, anyhow::Error>(ip)
            })
            .await;

        match detected {
            Ok(ip) => Some(ip.clone()),
            Err(e) => {
                tracing::warn!(error = %e, "Could not detect external address; transparency checks use headers only");
                None
            }
        }
    }

    fn checker_for(&self, filter: &FilterSpec) -> ProxyChecker {
        let mut config = self.inner.config.checker.clone();
        if let Some(timeout) = filter.timeout {
            config = config.with_timeout(timeout);
        }
        ProxyChecker::with_config(config)
    }

    fn plan_for(filter: &FilterSpec) -> VerifyPlan {
        VerifyPlan {
            types: filter.types.clone(),
            levels: filter.levels.clone(),
            strict: filter.strict,
            dnsbl: filter.dnsbl.clone(),
            post: filter.post,
        }
    }

    async fn run(&self, job: DiscoveryJob, sink: StagingSender) -> Result<DiscoveryReport> {
        let filter = &job.filter;
        let sources: Vec<ProxySource> = self
            .inner
            .sources
            .iter()
            .filter(|s| s.serves(&filter.types))
            .cloned()
            .collect();
        if sources.is_empty() {
            bail!("no configured source serves {:?}", filter.types);
        }

        let verifier = match job.mode {
            DiscoveryMode::Find => {
                let checker = self.checker_for(filter).with_real_ip(self.real_ip().await);
                Some(Arc::new((checker, Self::plan_for(filter))))
            }
            DiscoveryMode::Grab => None,
        };

        let crawler = self.inner.crawler.clone();
        let mut crawls = pin!(stream::iter(sources)
            .map(move |source| {
                let crawler = crawler.clone();
                async move {
                    let result = crawler.crawl_source(&source).await;
                    (source, result)
                }
            })
            .buffer_unordered(self.inner.config.source_concurrency));
        let mut crawls_done = false;

        let mut pending: VecDeque<(ProxyCandidate, GeoLocation)> = VecDeque::new();
        let mut checks = FuturesUnordered::new();
        let mut seen = HashSet::new();
        let mut report = DiscoveryReport::default();

        loop {
            if let Some(verifier) = &verifier {
                while checks.len() < self.inner.config.max_conn {
                    let Some((candidate, geo)) = pending.pop_front() else {
                        break;
                    };
                    let verifier = Arc::clone(verifier);
                    checks.push(async move {
                        let (checker, plan) = verifier.as_ref();
                        checker.verify(candidate, plan, geo).await
                    });
                }
            }

            if crawls_done && checks.is_empty() {
                break;
            }

            tokio::select! {
                crawled = crawls.next(), if !crawls_done => match crawled {
                    Some((source, Ok(candidates))) => {
                        tracing::debug!(source = %source.name, found = candidates.len(), "Crawled source");
                        for candidate in candidates {
                            if !seen.insert(candidate.key()) {
                                continue;
                            }
                            report.candidates += 1;

                            let geo = self.inner.geo.locate(&candidate.host);
                            if !geo.matches_countries(&filter.countries) {
                                continue;
                            }

                            if verifier.is_some() {
                                pending.push_back((candidate, geo));
                            } else if !deliver(&sink, candidate.into_record(geo), &mut report, filter.limit) {
                                return Ok(report);
                            }
                        }
                    }
                    Some((source, Err(e))) => {
                        tracing::warn!(source = %source.name, error = %e, "Error crawling source");
                    }
                    None => crawls_done = true,
                },
                Some(verified) = checks.next(), if !checks.is_empty() => {
                    if let Some(record) = verified {
                        if !deliver(&sink, record, &mut report, filter.limit) {
                            return Ok(report);
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Push one record; `false` means the engine should stop
fn deliver(sink: &StagingSender, record: ProxyRecord, report: &mut DiscoveryReport, limit: usize) -> bool {
    tracing::trace!(proxy = %record, "Accepted proxy");
    if !sink.push(record) {
        tracing::debug!(accepted = report.accepted, "Consumer detached, stopping discovery");
        return false;
    }
    report.accepted += 1;
    report.accepted < limit
}

impl DiscoveryEngine for ProxyBroker {
    fn start(&self, job: DiscoveryJob, sink: StagingSender, cancel: CancellationToken) -> DiscoveryHandle {
        let broker = self.clone();
        DiscoveryHandle::spawn(cancel, async move { broker.run(job, sink).await })
    }
}
