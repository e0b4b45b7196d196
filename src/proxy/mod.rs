//! Proxy module for discovering and verifying public proxies
//!
//! This module provides functionality for:
//! - Parsing proxy listings in various formats (IP:PORT, scheme://IP:PORT, HTML tables)
//! - Crawling proxy websites to extract candidates
//! - Verifying candidates per protocol, with anonymity and DNSBL checks
//! - Geolocating proxies from an MMDB database
//! - Running all of the above as a discovery engine

pub mod broker;
pub mod checker;
pub mod crawler;
pub mod geo;
pub mod models;
pub mod negotiate;
pub mod parser;

pub use broker::{BrokerConfig, ProxyBroker};
pub use checker::{CheckerConfig, ProxyChecker, VerifyPlan};
pub use crawler::{CrawlerConfig, ProxyCrawler, ProxySource};
pub use geo::{GeoLocation, GeoLocator, GeoResolver};
pub use models::{
    AnonymityLevel, ProbeStats, ProtocolSupport, ProxyCandidate, ProxyMetrics, ProxyRecord,
    ProxyType,
};
pub use parser::ProxyParser;
