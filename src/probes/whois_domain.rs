//! Domain WHOIS probe: registrar and expiration date.
//!
//! Chases the IANA referral for the TLD, queries the referred registry
//! server over port 43 and extracts the two fields the exporter cares
//! about. Hard failures surface as errors so the pipeline can bucket them;
//! they are never retried within a scrape.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::{DEFAULT_WHOIS_PORT, IANA_WHOIS_SERVER, WHOIS_TIMEOUT_SECONDS};

/// Seam used by the pipeline; the live implementation is [`DomainWhoisProbe`].
#[async_trait]
pub trait DomainWhois: Send + Sync {
    /// Returns `(registrar, expires_at)`. Both may be absent when the
    /// registry answered but omitted the field; a transport or referral
    /// failure is an `Err`.
    async fn lookup(&self, domain: &str) -> Result<(Option<String>, Option<DateTime<Utc>>)>;
}

pub struct DomainWhoisProbe;

impl DomainWhoisProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DomainWhoisProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainWhois for DomainWhoisProbe {
    async fn lookup(&self, domain: &str) -> Result<(Option<String>, Option<DateTime<Utc>>)> {
        let response = query_with_iana_referral(domain).await?;
        Ok(parse_whois_response(&response))
    }
}

/// Query IANA for the TLD's registry WHOIS server, then query that server.
pub async fn query_with_iana_referral(domain: &str) -> Result<String> {
    debug!("Querying IANA referral for: {}", domain);

    let iana_response = query_whois(domain, IANA_WHOIS_SERVER, DEFAULT_WHOIS_PORT).await?;
    match extract_whois_server(&iana_response) {
        Some(server) => {
            debug!("IANA referred server: {}", server);
            query_whois(domain, &server, DEFAULT_WHOIS_PORT).await
        }
        None => {
            warn!("No WHOIS referral for {}, using IANA response directly", domain);
            Ok(iana_response)
        }
    }
}

/// Raw WHOIS query over TCP with connect/write/read timeouts.
pub async fn query_whois(query: &str, server: &str, port: u16) -> Result<String> {
    let address = format!("{}:{}", server, port);
    debug!("Querying WHOIS server: {}", address);

    let timeout = Duration::from_secs(WHOIS_TIMEOUT_SECONDS);

    let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(anyhow::anyhow!("cannot connect to WHOIS server {}: {}", address, e));
        }
        Err(_) => return Err(anyhow::anyhow!("connection to WHOIS server timed out: {}", address)),
    };

    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }

    // WHOIS protocol expects a CRLF-terminated query
    let query_str = format!("{}\r\n", query);
    match tokio::time::timeout(timeout, stream.write_all(query_str.as_bytes())).await {
        Ok(Ok(())) => stream.flush().await?,
        Ok(Err(e)) => return Err(anyhow::anyhow!("failed to write WHOIS query: {}", e)),
        Err(_) => return Err(anyhow::anyhow!("WHOIS query write timed out")),
    }

    let mut response = String::new();
    let mut buffer = [0u8; 8192];
    let read_start = std::time::Instant::now();
    let mut total_bytes = 0usize;

    loop {
        match tokio::time::timeout(timeout, stream.read(&mut buffer)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                response.push_str(&String::from_utf8_lossy(&buffer[0..n]));
                total_bytes += n;

                // 1MB cap against runaway responses
                if total_bytes > 1_000_000 {
                    debug!("WHOIS response exceeded size limit, truncating");
                    break;
                }
                if read_start.elapsed() > timeout {
                    debug!("WHOIS read deadline reached after {} bytes", total_bytes);
                    break;
                }
            }
            Ok(Err(e)) => return Err(anyhow::anyhow!("failed to read WHOIS response: {}", e)),
            Err(_) => {
                debug!("Timeout reading WHOIS response after {} bytes", total_bytes);
                break;
            }
        }
    }

    debug!("Received {} bytes from {}", total_bytes, address);
    if response.is_empty() {
        return Err(anyhow::anyhow!("empty response from WHOIS server {}", address));
    }
    Ok(response)
}

/// Extract the referral target from an IANA response (`whois:` or `refer:`).
pub fn extract_whois_server(response: &str) -> Option<String> {
    for line in response.lines() {
        let line = line.trim();
        for field in ["whois:", "refer:"] {
            if let Some(rest) = line.strip_prefix(field) {
                let server = rest.trim();
                if !server.is_empty() {
                    return Some(server.to_string());
                }
            }
        }
    }
    None
}

static REGISTRAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^\s*(?:sponsoring registrar|registrar name|registrar)\s*:\s*(.+?)\s*$")
        .unwrap()
});

static EXPIRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^\s*(?:registry expiry date|registrar registration expiration date|expiration date|expiry date|expire date|expires|expire|paid-till|renewal date)\s*:\s*(.+?)\s*$",
    )
    .unwrap()
});

/// Pull registrar and the first expiration date out of a raw WHOIS response.
pub fn parse_whois_response(response: &str) -> (Option<String>, Option<DateTime<Utc>>) {
    let registrar = REGISTRAR_RE
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty());

    // Registries frequently repeat the expiry field; the first one wins.
    let expires_at = EXPIRY_RE
        .captures_iter(response)
        .filter_map(|c| parse_whois_date(c[1].trim()))
        .next();

    (registrar, expires_at)
}

/// Parse the date formats seen across registry WHOIS servers.
fn parse_whois_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S", "%Y.%m.%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%Y.%m.%d", "%d-%b-%Y", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    debug!("Unparseable WHOIS date: {}", value);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_extract_whois_server() {
        let response = "domain: COM\nwhois: whois.verisign-grs.com\nstatus: ACTIVE\n";
        assert_eq!(
            extract_whois_server(response),
            Some("whois.verisign-grs.com".to_string())
        );

        let response = "domain: DEV\nrefer: whois.nic.google\n";
        assert_eq!(extract_whois_server(response), Some("whois.nic.google".to_string()));

        assert_eq!(extract_whois_server("domain: X\nstatus: ACTIVE\n"), None);
    }

    #[test]
    fn test_parse_verisign_style() {
        let response = "\
Domain Name: EXAMPLE.COM
Registry Domain ID: 2336799_DOMAIN_COM-VRSN
Registrar: RESERVED-Internet Assigned Numbers Authority
Registry Expiry Date: 2031-08-13T04:00:00Z
Name Server: A.IANA-SERVERS.NET
";
        let (registrar, expires) = parse_whois_response(response);
        assert_eq!(
            registrar.as_deref(),
            Some("RESERVED-Internet Assigned Numbers Authority")
        );
        let expires = expires.unwrap();
        assert_eq!((expires.year(), expires.month(), expires.day()), (2031, 8, 13));
    }

    #[test]
    fn test_first_expiry_wins() {
        let response = "\
Registrar: Example Registrar
Expiry Date: 2027-01-01T00:00:00Z
Expiration Date: 2030-06-15T00:00:00Z
";
        let (_, expires) = parse_whois_response(response);
        assert_eq!(expires, Some(Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_paid_till_format() {
        let response = "registrar: RU-CENTER-RU\npaid-till: 2026-03-31\n";
        let (registrar, expires) = parse_whois_response(response);
        assert_eq!(registrar.as_deref(), Some("RU-CENTER-RU"));
        assert_eq!(expires.unwrap().year(), 2026);
    }

    #[test]
    fn test_missing_fields() {
        let (registrar, expires) = parse_whois_response("No match for domain \"X.INVALID\".\n");
        assert!(registrar.is_none());
        assert!(expires.is_none());
    }

    #[test]
    fn test_date_formats() {
        assert!(parse_whois_date("2031-08-13T04:00:00Z").is_some());
        assert!(parse_whois_date("2026-03-31").is_some());
        assert!(parse_whois_date("2026.03.31").is_some());
        assert!(parse_whois_date("31-Mar-2026").is_some());
        assert!(parse_whois_date("not a date").is_none());
    }
}
