//! Proxy data models

use crate::proxy::geo::GeoLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Protocol types a proxy can be probed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProxyType {
    Http,
    Https,
    Socks4,
    Socks5,
    Connect80,
    Connect25,
}

impl ProxyType {
    /// Every supported type, in canonical order
    pub const ALL: [ProxyType; 6] = [
        ProxyType::Http,
        ProxyType::Https,
        ProxyType::Socks4,
        ProxyType::Socks5,
        ProxyType::Connect80,
        ProxyType::Connect25,
    ];

    /// Canonical upper-case name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Http => "HTTP",
            ProxyType::Https => "HTTPS",
            ProxyType::Socks4 => "SOCKS4",
            ProxyType::Socks5 => "SOCKS5",
            ProxyType::Connect80 => "CONNECT:80",
            ProxyType::Connect25 => "CONNECT:25",
        }
    }

    /// Names of every supported type
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_str()).collect()
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a protocol name is outside the fixed enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProxyType(pub String);

impl fmt::Display for UnknownProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown proxy type: {}", self.0)
    }
}

impl std::error::Error for UnknownProxyType {}

impl FromStr for ProxyType {
    type Err = UnknownProxyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HTTP" => Ok(ProxyType::Http),
            "HTTPS" => Ok(ProxyType::Https),
            "SOCKS4" => Ok(ProxyType::Socks4),
            "SOCKS5" => Ok(ProxyType::Socks5),
            "CONNECT:80" => Ok(ProxyType::Connect80),
            "CONNECT:25" => Ok(ProxyType::Connect25),
            other => Err(UnknownProxyType(other.to_string())),
        }
    }
}

/// How much of the client a proxy reveals to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnonymityLevel {
    /// Forwards the client address
    Transparent,
    /// Hides the address but announces itself as a proxy
    Anonymous,
    /// Indistinguishable from a direct client
    High,
}

impl fmt::Display for AnonymityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnonymityLevel::Transparent => write!(f, "Transparent"),
            AnonymityLevel::Anonymous => write!(f, "Anonymous"),
            AnonymityLevel::High => write!(f, "High"),
        }
    }
}

impl FromStr for AnonymityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transparent" => Ok(AnonymityLevel::Transparent),
            "anonymous" => Ok(AnonymityLevel::Anonymous),
            "high" | "elite" => Ok(AnonymityLevel::High),
            other => Err(format!("unknown anonymity level: {other}")),
        }
    }
}

/// One protocol a proxy speaks, with the anonymity level seen for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolSupport {
    pub proxy_type: ProxyType,
    pub level: Option<AnonymityLevel>,
}

impl ProtocolSupport {
    pub fn new(proxy_type: ProxyType, level: Option<AnonymityLevel>) -> Self {
        Self { proxy_type, level }
    }
}

/// Measurements taken while verifying a proxy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProxyMetrics {
    pub is_working: bool,
    /// Average response time in seconds
    pub avg_resp_time: f64,
    /// Failed requests over total requests
    pub error_rate: f64,
}

/// Accumulates request outcomes while probing a single proxy
#[derive(Debug, Clone, Default)]
pub struct ProbeStats {
    requests: u32,
    errors: u32,
    total_secs: f64,
    successes: u32,
}

impl ProbeStats {
    pub fn record_success(&mut self, elapsed_secs: f64) {
        self.requests += 1;
        self.successes += 1;
        self.total_secs += elapsed_secs;
    }

    pub fn record_error(&mut self) {
        self.requests += 1;
        self.errors += 1;
    }

    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// Collapse into metrics; `None` until at least one request was made
    pub fn metrics(&self) -> Option<ProxyMetrics> {
        if self.requests == 0 {
            return None;
        }
        let avg_resp_time = if self.successes == 0 {
            0.0
        } else {
            self.total_secs / self.successes as f64
        };
        Some(ProxyMetrics {
            is_working: self.successes > 0,
            avg_resp_time,
            error_rate: self.errors as f64 / self.requests as f64,
        })
    }
}

/// A proxy address scraped from a listing, not yet verified
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u16,
    /// Protocol the listing advertised for this address
    pub hint: ProxyType,
}

impl ProxyCandidate {
    pub fn new(host: String, port: u16, hint: ProxyType) -> Self {
        Self { host, port, hint }
    }

    /// Deduplication key in IP:PORT format
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Promote to an unverified record carrying only the advertised type
    pub fn into_record(self, geo: GeoLocation) -> ProxyRecord {
        ProxyRecord::new(
            self.host,
            self.port,
            vec![ProtocolSupport::new(self.hint, None)],
            geo,
        )
    }
}

/// A discovered proxy endpoint
///
/// Produced by a discovery engine and moved through the staging channel to
/// the request that collects it. `metrics` is only present on verified
/// records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub host: String,
    pub port: u16,
    pub types: Vec<ProtocolSupport>,
    pub geo: GeoLocation,
    pub metrics: Option<ProxyMetrics>,
}

impl ProxyRecord {
    /// Create an unverified record
    pub fn new(host: String, port: u16, types: Vec<ProtocolSupport>, geo: GeoLocation) -> Self {
        let mut types = types;
        types.sort();
        types.dedup_by_key(|t| t.proxy_type);
        Self {
            host,
            port,
            types,
            geo,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ProxyMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get the proxy string in IP:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Flattened protocol names, without levels
    pub fn type_names(&self) -> Vec<String> {
        self.types
            .iter()
            .map(|t| t.proxy_type.as_str().to_string())
            .collect()
    }

    pub fn supports(&self, proxy_type: ProxyType) -> bool {
        self.types.iter().any(|t| t.proxy_type == proxy_type)
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.to_simple_string(),
            self.type_names().join(", "),
            self.geo.short_display()
        )
    }
}
