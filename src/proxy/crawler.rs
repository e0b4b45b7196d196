//! Proxy crawler module for fetching proxies from websites
//!
//! This module provides functionality for:
//! - Crawling proxy websites to extract proxy lists
//! - Parsing HTML/text content to find proxy entries
//! - Loading extra listing sources from a file

use crate::proxy::models::{ProxyCandidate, ProxyType};
use crate::proxy::parser::ProxyParser;
use crate::Result;
use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Regex pattern to match IP:PORT patterns in text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

/// Regex pattern to match `<td>IP</td><td>PORT</td>` table rows
static TABLE_ROW_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<td[^>]*>\s*(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\s*</td>\s*<td[^>]*>\s*(\d{1,5})\s*</td>")
        .expect("Invalid table row regex")
});

/// Configuration for proxy crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Proxy source representing a website that provides proxy lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySource {
    /// Name of the proxy source
    pub name: String,
    /// URL to fetch proxies from
    pub url: String,
    /// Proxy type advertised by this source
    pub proxy_type: ProxyType,
}

impl ProxySource {
    pub fn new(name: &str, url: &str, proxy_type: ProxyType) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            proxy_type,
        }
    }

    /// Whether proxies from this source are worth probing for any of `types`.
    ///
    /// HTTP listings regularly contain proxies that also tunnel, so they
    /// serve every HTTP-family type.
    pub fn serves(&self, types: &[ProxyType]) -> bool {
        types.iter().any(|wanted| match self.proxy_type {
            ProxyType::Http | ProxyType::Https => matches!(
                wanted,
                ProxyType::Http | ProxyType::Https | ProxyType::Connect80 | ProxyType::Connect25
            ),
            own => *wanted == own,
        })
    }

    /// Parse one `URL [TYPE]` line; the type defaults to HTTP
    pub fn parse_line(line: &str) -> Option<Result<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let mut fields = trimmed.split_whitespace();
        let url = fields.next()?;
        let proxy_type = match fields.next() {
            Some(raw) => match raw.parse::<ProxyType>() {
                Ok(t) => t,
                Err(e) => return Some(Err(anyhow!("{e} in source line: {trimmed}"))),
            },
            None => ProxyType::Http,
        };
        if !url.starts_with("http") {
            return Some(Err(anyhow!("source URL must be http(s): {url}")));
        }
        Some(Ok(Self::new(url, url, proxy_type)))
    }

    /// Load sources from a file containing one `URL [TYPE]` per line
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading sources file {}", path.display()))?;
        content.lines().filter_map(Self::parse_line).collect()
    }
}

/// Proxy crawler for fetching proxies from websites
#[derive(Clone)]
pub struct ProxyCrawler {
    client: Client,
}

impl ProxyCrawler {
    /// Create a new proxy crawler with custom configuration
    pub fn with_config(config: CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch and parse proxies from a single URL
    pub async fn crawl_url(&self, url: &str, proxy_type: ProxyType) -> Result<Vec<ProxyCandidate>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content = response.text().await?;
        Ok(Self::parse_proxies_from_text(&content, proxy_type))
    }

    /// Fetch and parse proxies from a ProxySource
    pub async fn crawl_source(&self, source: &ProxySource) -> Result<Vec<ProxyCandidate>> {
        self.crawl_url(&source.url, source.proxy_type).await
    }

    /// Parse proxies from raw text content
    ///
    /// This method tries multiple parsing strategies:
    /// 1. Line-by-line parsing using ProxyParser
    /// 2. HTML table rows and regex-based IP:PORT extraction
    pub fn parse_proxies_from_text(content: &str, proxy_type: ProxyType) -> Vec<ProxyCandidate> {
        let mut proxies: Vec<ProxyCandidate> = ProxyParser::parse_string(content, proxy_type)
            .into_iter()
            .filter(|p| p.host.parse::<Ipv4Addr>().is_ok())
            .collect();

        if proxies.is_empty() {
            proxies = Self::extract_proxies_with_regex(content, proxy_type);
        }

        let mut seen = std::collections::HashSet::new();
        proxies.retain(|p| seen.insert(p.key()));
        proxies
    }

    /// Extract proxies from table rows and inline IP:PORT mentions
    fn extract_proxies_with_regex(content: &str, proxy_type: ProxyType) -> Vec<ProxyCandidate> {
        TABLE_ROW_REGEX
            .captures_iter(content)
            .chain(IP_PORT_REGEX.captures_iter(content))
            .filter_map(|cap| {
                let host = cap.get(1)?.as_str();
                let port: u16 = cap.get(2)?.as_str().parse().ok()?;

                if host.parse::<Ipv4Addr>().is_err() || port == 0 {
                    return None;
                }

                Some(ProxyCandidate::new(host.to_string(), port, proxy_type))
            })
            .collect()
    }

    /// Get a list of common free proxy sources
    pub fn get_common_sources() -> Vec<ProxySource> {
        vec![
            ProxySource::new(
                "free-proxy-list.net",
                "https://free-proxy-list.net/",
                ProxyType::Http,
            ),
            ProxySource::new(
                "sslproxies",
                "https://www.sslproxies.org/",
                ProxyType::Https,
            ),
            ProxySource::new("us-proxy.org", "https://www.us-proxy.org/", ProxyType::Http),
            ProxySource::new(
                "socks-proxy.net",
                "https://www.socks-proxy.net/",
                ProxyType::Socks4,
            ),
            ProxySource::new(
                "speedx-http",
                "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
                ProxyType::Http,
            ),
            ProxySource::new(
                "speedx-socks4",
                "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/socks4.txt",
                ProxyType::Socks4,
            ),
            ProxySource::new(
                "speedx-socks5",
                "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/socks5.txt",
                ProxyType::Socks5,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawler_config_builder() {
        let config = CrawlerConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("Custom Agent".to_string());

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "Custom Agent");
        assert_eq!(
            CrawlerConfig::default().timeout,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_parse_proxies_from_text_simple() {
        let content = r#"
192.168.1.1:8080
192.168.1.2:3128
# Another comment
10.0.0.1:1080
"#;
        let proxies = ProxyCrawler::parse_proxies_from_text(content, ProxyType::Http);
        assert_eq!(proxies.len(), 3);
    }

    #[test]
    fn test_parse_proxies_from_html_table() {
        let content = r#"
<table>
<tr><td>192.168.1.1</td><td>8080</td><td>US</td></tr>
<tr><td class="ip"> 192.168.1.2 </td> <td>3128</td></tr>
</table>
Some text with 10.0.0.1:3128 embedded
"#;
        let proxies = ProxyCrawler::parse_proxies_from_text(content, ProxyType::Https);
        assert_eq!(proxies.len(), 3);
        assert!(proxies.iter().all(|p| p.hint == ProxyType::Https));
        assert!(proxies.iter().any(|p| p.key() == "192.168.1.2:3128"));
        assert!(proxies.iter().any(|p| p.key() == "10.0.0.1:3128"));
    }

    #[test]
    fn test_parse_proxies_deduplication() {
        let content = r#"
192.168.1.1:8080
192.168.1.1:8080
192.168.1.2:3128
192.168.1.1:8080
"#;
        let proxies = ProxyCrawler::parse_proxies_from_text(content, ProxyType::Http);
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].key(), "192.168.1.1:8080");
    }

    #[test]
    fn test_extract_proxies_rejects_invalid() {
        let content = "Invalid IP: 999.999.999.999:8080 and zero port 192.168.1.1:0";
        let proxies = ProxyCrawler::extract_proxies_with_regex(content, ProxyType::Http);
        assert!(proxies.is_empty());
    }

    #[test]
    fn test_source_serves() {
        let http = ProxySource::new("a", "https://a", ProxyType::Http);
        assert!(http.serves(&[ProxyType::Https]));
        assert!(http.serves(&[ProxyType::Connect25]));
        assert!(!http.serves(&[ProxyType::Socks5]));

        let socks = ProxySource::new("b", "https://b", ProxyType::Socks5);
        assert!(socks.serves(&[ProxyType::Socks5, ProxyType::Http]));
        assert!(!socks.serves(&[ProxyType::Socks4]));
    }

    #[test]
    fn test_source_parse_line() {
        assert!(ProxySource::parse_line("# comment").is_none());
        let source = ProxySource::parse_line("https://example.com/list.txt socks5")
            .unwrap()
            .unwrap();
        assert_eq!(source.proxy_type, ProxyType::Socks5);

        let source = ProxySource::parse_line("https://example.com/list.txt")
            .unwrap()
            .unwrap();
        assert_eq!(source.proxy_type, ProxyType::Http);

        assert!(ProxySource::parse_line("https://example.com ftp").unwrap().is_err());
        assert!(ProxySource::parse_line("example.com").unwrap().is_err());
    }

    #[test]
    fn test_get_common_sources() {
        let sources = ProxyCrawler::get_common_sources();
        assert!(!sources.is_empty());
        for source in &sources {
            assert!(!source.name.is_empty());
            assert!(source.url.starts_with("http"));
        }
    }
}
