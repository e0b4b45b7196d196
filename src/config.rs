//! Service configuration
//!
//! Defaults suit a public deployment; every field can be overridden from the
//! environment and then from command-line flags.

use crate::proxy::{BrokerConfig, GeoResolver, ProxyBroker, ProxyCrawler, ProxySource};
use crate::relay::{CollectionLimits, Session};
use crate::Result;
use anyhow::Context;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default HTTP listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8008";

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen address (env: BIND_ADDR)
    pub bind_addr: String,
    /// Per-request collection bounds
    /// (env: PROXY_ITEM_WAIT_SECS, PROXY_TASK_CEILING_SECS, PROXY_MAX_LIMIT)
    pub limits: CollectionLimits,
    /// Engine tuning (env: BROKER_MAX_CONN, BROKER_MAX_TRIES, BROKER_TIMEOUT_SECS,
    /// PROXY_JUDGE_URL, CRAWLER_USER_AGENT)
    pub broker: BrokerConfig,
    /// MaxMind City database (env: GEOIP_MMDB_PATH)
    pub mmdb_path: Option<PathBuf>,
    /// Extra listing sources, one `URL [TYPE]` per line (env: PROXY_SOURCES_FILE)
    pub sources_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            limits: CollectionLimits::default(),
            broker: BrokerConfig::default(),
            mmdb_path: None,
            sources_file: None,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "PROXY_ITEM_WAIT_SECS")? {
            config.limits.item_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "PROXY_TASK_CEILING_SECS")? {
            config.limits.task_ceiling = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<usize, _>(&lookup, "PROXY_MAX_LIMIT")? {
            config.limits.max_limit = max.max(1);
        }
        if let Some(max_conn) = parse_var::<usize, _>(&lookup, "BROKER_MAX_CONN")? {
            config.broker = config.broker.with_max_conn(max_conn);
        }
        if let Some(tries) = parse_var::<u32, _>(&lookup, "BROKER_MAX_TRIES")? {
            config.broker.checker = config.broker.checker.with_max_tries(tries);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "BROKER_TIMEOUT_SECS")? {
            config.broker.checker = config.broker.checker.with_timeout(Duration::from_secs(secs));
        }
        if let Some(url) = lookup("PROXY_JUDGE_URL") {
            config.broker.checker = config.broker.checker.with_judge_url(url);
        }
        if let Some(agent) = lookup("CRAWLER_USER_AGENT") {
            config.broker.crawler = config.broker.crawler.with_user_agent(agent);
        }
        config.mmdb_path = lookup("GEOIP_MMDB_PATH").map(PathBuf::from);
        config.sources_file = lookup("PROXY_SOURCES_FILE").map(PathBuf::from);

        Ok(config)
    }

    pub fn with_bind_addr(mut self, addr: String) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_mmdb_path(mut self, path: PathBuf) -> Self {
        self.mmdb_path = Some(path);
        self
    }

    pub fn with_sources_file(mut self, path: PathBuf) -> Self {
        self.sources_file = Some(path);
        self
    }

    /// Built-in sources plus any listed in `sources_file`
    pub fn load_sources(&self) -> Result<Vec<ProxySource>> {
        let mut sources = ProxyCrawler::get_common_sources();
        if let Some(path) = &self.sources_file {
            let extra = ProxySource::load_file(path)?;
            tracing::info!(path = %path.display(), count = extra.len(), "Loaded extra proxy sources");
            sources.extend(extra);
        }
        let mut seen = std::collections::HashSet::new();
        sources.retain(|s| seen.insert(s.url.clone()));
        Ok(sources)
    }

    /// Assemble the engine and wrap it in an uninitialized session
    pub fn build_session(&self) -> Result<Arc<Session>> {
        let geo = GeoResolver::from_optional_path(self.mmdb_path.as_deref());
        let broker = ProxyBroker::new(self.broker.clone(), self.load_sources()?, geo)
            .context("building discovery engine")?;
        tracing::debug!(sources = broker.sources().len(), "Discovery engine ready");
        Ok(Arc::new(Session::new(Arc::new(broker), self.limits)))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
