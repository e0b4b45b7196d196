//! Proxy parser module for parsing proxy listings into candidates

use crate::proxy::models::{ProxyCandidate, ProxyRecord, ProxyType};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static URL_FORMAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(https?|socks[45])://(?:[^:@/]+:[^@/]+@)?([^:/@]+):(\d+)/?$")
        .expect("Invalid URL format regex")
});

/// Proxy parser for parsing proxies from strings and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats:
    /// - IP:PORT
    /// - scheme://IP:PORT
    /// - scheme://USER:PASS@IP:PORT (credentials are dropped)
    ///
    /// The scheme, when present, overrides `default_type`.
    pub fn parse_line(line: &str, default_type: ProxyType) -> Option<ProxyCandidate> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        Self::parse_url_format(line).or_else(|| Self::parse_colon_format(line, default_type))
    }

    fn parse_url_format(line: &str) -> Option<ProxyCandidate> {
        let caps = URL_FORMAT_REGEX.captures(line)?;

        let proxy_type = match caps[1].to_lowercase().as_str() {
            "http" => ProxyType::Http,
            "https" => ProxyType::Https,
            "socks4" => ProxyType::Socks4,
            "socks5" => ProxyType::Socks5,
            _ => return None,
        };

        let port = Self::parse_port(&caps[3])?;
        Some(ProxyCandidate::new(caps[2].to_string(), port, proxy_type))
    }

    fn parse_colon_format(line: &str, default_type: ProxyType) -> Option<ProxyCandidate> {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 2 {
            return None;
        }

        let host = parts[0].trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return None;
        }
        let port = Self::parse_port(parts[1].trim())?;
        Some(ProxyCandidate::new(host.to_string(), port, default_type))
    }

    fn parse_port(raw: &str) -> Option<u16> {
        match raw.parse::<u16>() {
            Ok(0) | Err(_) => None,
            Ok(port) => Some(port),
        }
    }

    /// Parse proxies from a string (multiple lines)
    pub fn parse_string(content: &str, default_type: ProxyType) -> Vec<ProxyCandidate> {
        content
            .lines()
            .filter_map(|line| Self::parse_line(line, default_type))
            .collect()
    }

    /// Save records to a file, one IP:PORT per line
    pub fn save_to_file<P: AsRef<Path>>(records: &[ProxyRecord], path: P) -> Result<()> {
        let content: String = records
            .iter()
            .map(|r| r.to_simple_string())
            .collect::<Vec<_>>()
            .join("\n");

        fs::write(path, content)?;
        Ok(())
    }
}
