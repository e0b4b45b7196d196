//! Proxy checker module for verifying candidates per protocol

use crate::proxy::geo::GeoLocation;
use crate::proxy::models::{
    AnonymityLevel, ProbeStats, ProtocolSupport, ProxyCandidate, ProxyRecord, ProxyType,
};
use crate::proxy::negotiate;
use crate::Result;
use anyhow::{anyhow, bail};
use reqwest::{Client, Proxy as ReqwestProxy, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 8;

/// Default number of attempts per protocol
const DEFAULT_MAX_TRIES: u32 = 3;

/// Default judge echoing origin and headers for any method
const DEFAULT_JUDGE_URL: &str = "http://httpbin.org/anything";

/// Default judge reached through an HTTPS tunnel
const DEFAULT_HTTPS_JUDGE_URL: &str = "https://httpbin.org/anything";

/// Default SMTP server used for `CONNECT:25` probes
const DEFAULT_SMTP_TARGET: (&str, u16) = ("smtp.gmail.com", 25);

/// Headers that give a proxy away
const PROXY_HEADERS: [&str; 6] = [
    "via",
    "x-forwarded-for",
    "x-real-ip",
    "forwarded",
    "proxy-connection",
    "x-proxy-id",
];

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each probe attempt
    pub timeout: Duration,
    /// Attempts per protocol before giving up on it
    pub max_tries: u32,
    /// Plain HTTP judge URL
    pub judge_url: String,
    /// Judge URL requested through HTTPS tunnels
    pub https_judge_url: String,
    /// SMTP host and port for `CONNECT:25` probes
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_tries: DEFAULT_MAX_TRIES,
            judge_url: DEFAULT_JUDGE_URL.to_string(),
            https_judge_url: DEFAULT_HTTPS_JUDGE_URL.to_string(),
            smtp_host: DEFAULT_SMTP_TARGET.0.to_string(),
            smtp_port: DEFAULT_SMTP_TARGET.1,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    pub fn with_judge_url(mut self, url: String) -> Self {
        self.judge_url = url;
        self
    }

    pub fn with_https_judge_url(mut self, url: String) -> Self {
        self.https_judge_url = url;
        self
    }

    pub fn with_smtp_target(mut self, host: String, port: u16) -> Self {
        self.smtp_host = host;
        self.smtp_port = port;
        self
    }
}

/// What a single verification must establish
#[derive(Debug, Clone, Default)]
pub struct VerifyPlan {
    /// Protocols to probe; a record needs at least one to pass
    pub types: Vec<ProxyType>,
    /// HTTP anonymity levels asked for; empty accepts any
    pub levels: Vec<AnonymityLevel>,
    /// Require the HTTP level to be one of `levels` exactly
    pub strict: bool,
    /// DNSBL zones the proxy must not be listed in
    pub dnsbl: Vec<String>,
    /// Probe judges with POST instead of GET
    pub post: bool,
}

impl VerifyPlan {
    /// Whether an observed HTTP anonymity level satisfies the plan.
    ///
    /// Strict plans need an exact match; otherwise anything at least as
    /// anonymous as the weakest requested level passes.
    pub fn accepts_level(&self, level: AnonymityLevel) -> bool {
        if self.levels.is_empty() {
            return true;
        }
        if self.strict {
            self.levels.contains(&level)
        } else {
            self.levels.iter().min().is_some_and(|min| level >= *min)
        }
    }
}

#[derive(Debug, Deserialize)]
struct JudgeEcho {
    origin: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Whether a comma-separated address list (origin, `X-Forwarded-For`,
/// `Forwarded: for=...`) names `ip`
fn lists_address(value: &str, ip: IpAddr) -> bool {
    value
        .split([',', ';'])
        .map(|part| {
            let part = part.trim();
            let part = part
                .strip_prefix("for=")
                .or_else(|| part.strip_prefix("For="))
                .unwrap_or(part);
            part.trim_matches('"')
        })
        .any(|part| part.parse::<IpAddr>().is_ok_and(|addr| addr == ip))
}

/// Classify anonymity from a judge response body
pub fn classify_anonymity(body: &str, real_ip: Option<&str>) -> Result<AnonymityLevel> {
    let echo: JudgeEcho =
        serde_json::from_str(body).map_err(|e| anyhow!("judge response is not an echo: {e}"))?;

    if let Some(ip) = real_ip.and_then(|raw| raw.trim().parse::<IpAddr>().ok()) {
        let leaked = lists_address(&echo.origin, ip)
            || echo.headers.values().any(|v| lists_address(v, ip));
        if leaked {
            return Ok(AnonymityLevel::Transparent);
        }
    }

    let announces_proxy = echo
        .headers
        .keys()
        .any(|name| PROXY_HEADERS.contains(&name.to_lowercase().as_str()));
    if announces_proxy {
        Ok(AnonymityLevel::Anonymous)
    } else {
        Ok(AnonymityLevel::High)
    }
}

/// Proxy checker for validating proxies
#[derive(Clone, Default)]
pub struct ProxyChecker {
    config: CheckerConfig,
    real_ip: Option<String>,
}

impl ProxyChecker {
    /// Create a new proxy checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Self {
        Self {
            config,
            real_ip: None,
        }
    }

    /// Our own public address, used to spot transparent proxies
    pub fn with_real_ip(mut self, real_ip: Option<String>) -> Self {
        self.real_ip = real_ip;
        self
    }

    /// Ask the judge for our public address without a proxy
    pub async fn detect_real_ip(&self) -> Result<String> {
        let client = Client::builder().timeout(self.config.timeout).build()?;
        let body = client
            .get(&self.config.judge_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let echo: JudgeEcho = serde_json::from_str(&body)?;
        // httpbin reports "client, proxy1, ..." when forwarded
        let ip = echo.origin.split(',').next().unwrap_or_default().trim();
        if ip.is_empty() {
            bail!("judge did not report an origin");
        }
        Ok(ip.to_string())
    }

    /// Verify a candidate against `plan`.
    ///
    /// Returns `None` when the proxy is DNSBL-listed, passes no requested
    /// protocol, or fails the anonymity requirement.
    pub async fn verify(
        &self,
        candidate: ProxyCandidate,
        plan: &VerifyPlan,
        geo: GeoLocation,
    ) -> Option<ProxyRecord> {
        if !plan.dnsbl.is_empty() {
            if let Ok(ip) = candidate.host.parse::<Ipv4Addr>() {
                for zone in &plan.dnsbl {
                    if negotiate::dnsbl_listed(ip, zone, self.config.timeout).await {
                        tracing::debug!(proxy = %candidate.key(), zone = %zone, "Proxy is DNSBL-listed");
                        return None;
                    }
                }
            }
        }

        let mut stats = ProbeStats::default();
        let mut supported = Vec::new();

        for proxy_type in &plan.types {
            let Some(support) = self
                .probe(&candidate, *proxy_type, plan.post, &mut stats)
                .await
            else {
                continue;
            };
            if let Some(level) = support.level {
                if !plan.accepts_level(level) {
                    tracing::trace!(proxy = %candidate.key(), level = %level, "Anonymity level rejected");
                    continue;
                }
            }
            supported.push(support);
        }

        if supported.is_empty() {
            return None;
        }

        let metrics = stats.metrics()?;
        Some(
            ProxyRecord::new(candidate.host, candidate.port, supported, geo).with_metrics(metrics),
        )
    }

    /// Probe one protocol up to `max_tries` times
    async fn probe(
        &self,
        candidate: &ProxyCandidate,
        proxy_type: ProxyType,
        post: bool,
        stats: &mut ProbeStats,
    ) -> Option<ProtocolSupport> {
        for attempt in 1..=self.config.max_tries {
            let start = Instant::now();
            let outcome = tokio::time::timeout(
                self.config.timeout,
                self.probe_once(candidate, proxy_type, post),
            )
            .await;

            match outcome {
                Ok(Ok(level)) => {
                    stats.record_success(start.elapsed().as_secs_f64());
                    return Some(ProtocolSupport::new(proxy_type, level));
                }
                Ok(Err(e)) => {
                    tracing::trace!(proxy = %candidate.key(), %proxy_type, attempt, error = %e, "Probe failed");
                    stats.record_error();
                }
                Err(_) => {
                    tracing::trace!(proxy = %candidate.key(), %proxy_type, attempt, "Probe timed out");
                    stats.record_error();
                }
            }
        }
        None
    }

    async fn probe_once(
        &self,
        candidate: &ProxyCandidate,
        proxy_type: ProxyType,
        post: bool,
    ) -> Result<Option<AnonymityLevel>> {
        match proxy_type {
            ProxyType::Http => {
                let body = self.fetch_judge(candidate, proxy_type, post).await?;
                classify_anonymity(&body, self.real_ip.as_deref()).map(Some)
            }
            ProxyType::Https | ProxyType::Socks5 => {
                let body = self.fetch_judge(candidate, proxy_type, post).await?;
                serde_json::from_str::<JudgeEcho>(&body)
                    .map_err(|e| anyhow!("judge response is not an echo: {e}"))?;
                Ok(None)
            }
            ProxyType::Socks4 => {
                let proxy = self.proxy_addr(candidate).await?;
                let (host, port) = judge_host_port(&self.config.judge_url)?;
                let target = negotiate::resolve_ipv4(&host, port).await?;
                negotiate::socks4_connect(proxy, target).await?;
                Ok(None)
            }
            ProxyType::Connect80 => {
                let proxy = self.proxy_addr(candidate).await?;
                let (host, _) = judge_host_port(&self.config.judge_url)?;
                negotiate::http_connect(proxy, &host, 80).await?;
                Ok(None)
            }
            ProxyType::Connect25 => {
                let proxy = self.proxy_addr(candidate).await?;
                negotiate::smtp_over_connect(proxy, &self.config.smtp_host, self.config.smtp_port)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn fetch_judge(
        &self,
        candidate: &ProxyCandidate,
        proxy_type: ProxyType,
        post: bool,
    ) -> Result<String> {
        let client = self.create_client(candidate, proxy_type)?;
        let url = match proxy_type {
            ProxyType::Https => &self.config.https_judge_url,
            _ => &self.config.judge_url,
        };
        let request = if post {
            client.post(url).body("")
        } else {
            client.get(url)
        };
        let response = request.send().await?;
        if !response.status().is_success() {
            bail!("HTTP status: {}", response.status());
        }
        Ok(response.text().await?)
    }

    async fn proxy_addr(&self, candidate: &ProxyCandidate) -> Result<SocketAddr> {
        negotiate::resolve_ipv4(&candidate.host, candidate.port).await
    }

    /// Create a reqwest client routed through the candidate
    fn create_client(&self, candidate: &ProxyCandidate, proxy_type: ProxyType) -> Result<Client> {
        let reqwest_proxy = match proxy_type {
            ProxyType::Http => {
                ReqwestProxy::http(format!("http://{}", candidate.key()))?
            }
            ProxyType::Https => ReqwestProxy::all(format!("http://{}", candidate.key()))?,
            ProxyType::Socks5 => ReqwestProxy::all(format!("socks5://{}", candidate.key()))?,
            other => bail!("{other} is not probed over reqwest"),
        };

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .timeout(self.config.timeout)
            .build()?;

        Ok(client)
    }
}

fn judge_host_port(judge_url: &str) -> Result<(String, u16)> {
    let url = Url::parse(judge_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("judge URL has no host: {judge_url}"))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    Ok((host, port))
}
