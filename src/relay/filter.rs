//! Request filters and their validation

use crate::error::{ServiceError, ServiceResult};
use crate::proxy::{AnonymityLevel, ProxyType};
use serde::Deserialize;
use std::time::Duration;

/// Default number of proxies asked for
pub const DEFAULT_LIMIT: usize = 10;

/// Bounds on the per-request timeout override, in seconds
pub const TIMEOUT_OVERRIDE_RANGE: (u64, u64) = (1, 60);

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Raw `find` parameters as received from a caller
#[derive(Debug, Clone, Deserialize)]
pub struct FindRequest {
    /// Proxy types to find (HTTP, HTTPS, SOCKS4, SOCKS5, CONNECT:80, CONNECT:25)
    pub types: Vec<String>,
    /// ISO country codes filter
    #[serde(default)]
    pub countries: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Use POST instead of GET when checking proxies
    #[serde(default)]
    pub post: bool,
    /// Anonymity levels must match exactly
    #[serde(default)]
    pub strict: bool,
    /// Spam databases for proxy checking
    #[serde(default)]
    pub dnsbl: Option<Vec<String>>,
    /// Timeout in seconds, overriding the engine default
    #[serde(default)]
    pub timeout: Option<u64>,
    /// HTTP anonymity levels to accept
    #[serde(default)]
    pub levels: Option<Vec<String>>,
}

impl FindRequest {
    pub fn new(types: Vec<String>) -> Self {
        Self {
            types,
            countries: None,
            limit: DEFAULT_LIMIT,
            post: false,
            strict: false,
            dnsbl: None,
            timeout: None,
            levels: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_countries(mut self, countries: Vec<String>) -> Self {
        self.countries = Some(countries);
        self
    }

    /// Check every field and produce a filter the engine can trust
    pub fn validate(self, max_limit: usize) -> ServiceResult<FilterSpec> {
        if self.types.is_empty() {
            return Err(ServiceError::InvalidFilter(
                "At least one proxy type is required".to_string(),
            ));
        }

        let mut types = Vec::with_capacity(self.types.len());
        let mut invalid = Vec::new();
        for raw in &self.types {
            match raw.parse::<ProxyType>() {
                Ok(t) => types.push(t),
                Err(_) => invalid.push(raw.trim().to_uppercase()),
            }
        }
        if !invalid.is_empty() {
            return Err(ServiceError::InvalidFilter(format!(
                "Invalid proxy types: {:?}. Valid types: {:?}",
                invalid,
                ProxyType::names()
            )));
        }
        types.sort();
        types.dedup();

        let levels = self
            .levels
            .unwrap_or_default()
            .iter()
            .map(|raw| raw.parse::<AnonymityLevel>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ServiceError::InvalidFilter)?;

        let timeout = match self.timeout {
            None => None,
            Some(secs) if (TIMEOUT_OVERRIDE_RANGE.0..=TIMEOUT_OVERRIDE_RANGE.1).contains(&secs) => {
                Some(Duration::from_secs(secs))
            }
            Some(secs) => {
                return Err(ServiceError::InvalidFilter(format!(
                    "timeout must be between {} and {} seconds, got {secs}",
                    TIMEOUT_OVERRIDE_RANGE.0, TIMEOUT_OVERRIDE_RANGE.1
                )))
            }
        };

        Ok(FilterSpec {
            types,
            countries: normalize_countries(self.countries),
            limit: validate_limit(self.limit, max_limit)?,
            strict: self.strict,
            dnsbl: self
                .dnsbl
                .unwrap_or_default()
                .into_iter()
                .map(|zone| zone.trim().to_string())
                .filter(|zone| !zone.is_empty())
                .collect(),
            timeout,
            post: self.post,
            levels,
        })
    }
}

/// Raw `grab` parameters as received from a caller
#[derive(Debug, Clone, Deserialize)]
pub struct GrabRequest {
    #[serde(default)]
    pub countries: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl GrabRequest {
    pub fn new(limit: usize) -> Self {
        Self {
            countries: None,
            limit,
        }
    }

    /// Grab ignores protocol filters, so every type is requested
    pub fn validate(self, max_limit: usize) -> ServiceResult<FilterSpec> {
        Ok(FilterSpec {
            types: ProxyType::ALL.to_vec(),
            countries: normalize_countries(self.countries),
            limit: validate_limit(self.limit, max_limit)?,
            strict: false,
            dnsbl: Vec::new(),
            timeout: None,
            post: false,
            levels: Vec::new(),
        })
    }
}

/// Validated discovery criteria
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// Non-empty, sorted, deduplicated
    pub types: Vec<ProxyType>,
    /// Upper-case ISO codes; empty means any country
    pub countries: Vec<String>,
    /// Always within `1..=max_limit`
    pub limit: usize,
    pub strict: bool,
    pub dnsbl: Vec<String>,
    /// Per-request probe timeout
    pub timeout: Option<Duration>,
    pub post: bool,
    pub levels: Vec<AnonymityLevel>,
}

fn validate_limit(limit: usize, max_limit: usize) -> ServiceResult<usize> {
    if limit == 0 || limit > max_limit {
        return Err(ServiceError::InvalidFilter(format!(
            "limit must be between 1 and {max_limit}, got {limit}"
        )));
    }
    Ok(limit)
}

fn normalize_countries(countries: Option<Vec<String>>) -> Vec<String> {
    let mut countries: Vec<String> = countries
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();
    countries.sort();
    countries.dedup();
    countries
}
