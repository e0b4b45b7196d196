//! Raw protocol handshakes for probe types reqwest cannot drive directly
//!
//! SOCKS4 and `CONNECT` tunnels are negotiated over a plain TCP stream, and
//! DNSBL zones are queried through the system resolver.

use crate::Result;
use anyhow::{anyhow, bail, Context};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{lookup_host, TcpStream};

/// SOCKS4 reply code for "request granted"
const SOCKS4_GRANTED: u8 = 0x5A;

/// Upper bound on a CONNECT response header block
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Resolve `host:port` to the first IPv4 address
pub async fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr> {
    lookup_host((host, port))
        .await
        .with_context(|| format!("resolving {host}"))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| anyhow!("no IPv4 address for {host}"))
}

/// Perform a SOCKS4 CONNECT through `proxy` to `target`
pub async fn socks4_connect(proxy: SocketAddr, target: SocketAddr) -> Result<TcpStream> {
    let IpAddr::V4(ip) = target.ip() else {
        bail!("SOCKS4 needs an IPv4 target, got {}", target.ip());
    };

    let mut stream = TcpStream::connect(proxy).await?;

    let mut request = Vec::with_capacity(9);
    request.push(0x04);
    request.push(0x01);
    request.extend_from_slice(&target.port().to_be_bytes());
    request.extend_from_slice(&ip.octets());
    request.push(0x00);
    stream.write_all(&request).await?;

    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).await?;
    if reply[1] != SOCKS4_GRANTED {
        bail!("SOCKS4 request rejected with code {:#04x}", reply[1]);
    }
    Ok(stream)
}

/// Issue an HTTP `CONNECT` through `proxy` and return the open tunnel
pub async fn http_connect(
    proxy: SocketAddr,
    target_host: &str,
    target_port: u16,
) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect(proxy).await?;
    let request = format!(
        "CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await?;
    let status = parse_status_code(&status_line)
        .ok_or_else(|| anyhow!("malformed CONNECT response: {}", status_line.trim()))?;
    if status != 200 {
        bail!("CONNECT refused with status {status}");
    }

    // Consume the remaining header block so the tunnel starts clean
    let mut consumed = status_line.len();
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        consumed += read;
        if read == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if consumed > MAX_CONNECT_RESPONSE {
            bail!("CONNECT response headers too large");
        }
    }
    Ok(reader)
}

/// Open a `CONNECT` tunnel to an SMTP server and expect its `220` greeting
pub async fn smtp_over_connect(proxy: SocketAddr, smtp_host: &str, smtp_port: u16) -> Result<()> {
    let mut tunnel = http_connect(proxy, smtp_host, smtp_port).await?;
    let mut banner = String::new();
    tunnel.read_line(&mut banner).await?;
    if !banner.starts_with("220") {
        bail!("unexpected SMTP greeting: {}", banner.trim());
    }
    Ok(())
}

fn parse_status_code(status_line: &str) -> Option<u16> {
    let mut parts = status_line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// DNSBL query name for an IPv4 address: reversed octets under `zone`
pub fn dnsbl_query_name(ip: Ipv4Addr, zone: &str) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{d}.{c}.{b}.{a}.{}", zone.trim_end_matches('.'))
}

/// Whether `ip` is listed in the DNSBL `zone`.
///
/// Any resolution counts as listed; a lookup that fails or outlasts
/// `budget` does not.
pub async fn dnsbl_listed(ip: Ipv4Addr, zone: &str, budget: Duration) -> bool {
    let name = dnsbl_query_name(ip, zone);
    let listed = match tokio::time::timeout(budget, lookup_host((name.as_str(), 0))).await {
        Ok(Ok(mut addrs)) => addrs.next().is_some(),
        Ok(Err(_)) => false,
        Err(_) => {
            tracing::debug!(query = %name, "DNSBL lookup timed out");
            false
        }
    };
    listed
}
