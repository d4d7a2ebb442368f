//! HTTPS probe: status code, `Server` header and TLS certificate expiry.
//!
//! The stage runs two independent probes: an HTTP GET for status and the
//! `Server` header, and a raw TLS connection on port 443 for the
//! certificate's `notAfter`. A TLS extraction failure is tolerated when the
//! GET succeeded, but a failed GET fails the stage: status 0 must always go
//! hand in hand with a recorded `https` stage error.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use tracing::debug;
use x509_parser::prelude::*;

/// Seam used by the pipeline; the live implementation is [`HttpsProbe`].
#[async_trait]
pub trait HttpsCheck: Send + Sync {
    /// Returns `(status, server_header, tls_not_after)`. A failed GET is an
    /// `Err` even when the TLS endpoint answered; status 0 never appears in
    /// an `Ok`.
    async fn check(
        &self,
        domain: &str,
    ) -> Result<(u16, Option<String>, Option<DateTime<Utc>>)>;
}

pub struct HttpsProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpsProbe {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn fetch_status(&self, domain: &str) -> Result<(u16, Option<String>)> {
        let url = format!("https://{}", domain);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let server_header = response
            .headers()
            .get(reqwest::header::SERVER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        Ok((status, server_header))
    }

    async fn fetch_tls_expiry(&self, domain: &str) -> Result<DateTime<Utc>> {
        let domain = domain.to_string();
        let timeout = self.timeout;
        // Socket-level timeouts bound the blocking handshake.
        tokio::task::spawn_blocking(move || tls_not_after(&domain, timeout)).await?
    }
}

#[async_trait]
impl HttpsCheck for HttpsProbe {
    async fn check(
        &self,
        domain: &str,
    ) -> Result<(u16, Option<String>, Option<DateTime<Utc>>)> {
        // The two probes are independent; run them side by side.
        let (get_result, tls_result) =
            tokio::join!(self.fetch_status(domain), self.fetch_tls_expiry(domain));
        combine_probe_results(domain, get_result, tls_result)
    }
}

/// Fold the two probe outcomes into the stage result.
///
/// Any GET failure is a stage failure, even with a certificate in hand:
/// reporting status 0 as `Ok` would leave the unreachable domain without an
/// `https` entry in the error map.
fn combine_probe_results(
    domain: &str,
    get_result: Result<(u16, Option<String>)>,
    tls_result: Result<DateTime<Utc>>,
) -> Result<(u16, Option<String>, Option<DateTime<Utc>>)> {
    match (get_result, tls_result) {
        (Ok((status, server)), Ok(expiry)) => Ok((status, server, Some(expiry))),
        (Ok((status, server)), Err(e)) => {
            debug!("TLS expiry extraction failed for {}: {}", domain, e);
            Ok((status, server, None))
        }
        (Err(get_err), tls_result) => {
            if tls_result.is_ok() {
                debug!("HTTPS GET failed for {} although TLS answered", domain);
            }
            Err(get_err.context("https probe failed"))
        }
    }
}

/// Open a TLS connection and pull `notAfter` from the leaf certificate.
///
/// Certificate validation is disabled so expired or mis-issued certificates
/// can still be inspected.
fn tls_not_after(domain: &str, timeout: Duration) -> Result<DateTime<Utc>> {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier))
        .with_no_client_auth();

    let server_name = rustls::ServerName::try_from(domain)?;
    let conn = ClientConnection::new(Arc::new(config), server_name)?;

    let addr = format!("{}:443", domain);
    let tcp_stream = TcpStream::connect_timeout(
        &addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("unable to resolve {}", domain))?,
        timeout,
    )?;
    tcp_stream.set_read_timeout(Some(timeout))?;
    tcp_stream.set_write_timeout(Some(timeout))?;

    let mut tls_stream = StreamOwned::new(conn, tcp_stream);

    // Drive the handshake far enough for peer certificates to arrive.
    let request = format!("HEAD / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", domain);
    tls_stream.write_all(request.as_bytes())?;
    tls_stream.flush()?;

    let peer_certs = tls_stream
        .conn
        .peer_certificates()
        .ok_or_else(|| anyhow::anyhow!("no peer certificates available"))?;
    let cert_der = peer_certs
        .first()
        .ok_or_else(|| anyhow::anyhow!("empty certificate chain"))?;

    let (_, cert) = X509Certificate::from_der(cert_der.as_ref())?;
    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid notAfter timestamp: {}", timestamp))
}

/// Accepts every certificate so that expired chains remain inspectable.
struct AcceptAllVerifier;

impl rustls::client::ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn get_ok() -> Result<(u16, Option<String>)> {
        Ok((200, Some("ECS".to_string())))
    }

    #[test]
    fn test_both_probes_succeed() {
        let result = combine_probe_results("example.com", get_ok(), Ok(expiry())).unwrap();
        assert_eq!(result, (200, Some("ECS".to_string()), Some(expiry())));
    }

    #[test]
    fn test_tls_failure_tolerated_when_get_succeeds() {
        let result = combine_probe_results(
            "example.com",
            get_ok(),
            Err(anyhow::anyhow!("no peer certificates available")),
        )
        .unwrap();
        assert_eq!(result, (200, Some("ECS".to_string()), None));
    }

    #[test]
    fn test_get_failure_is_stage_failure_even_with_certificate() {
        // status 0 must never surface as Ok, or the pipeline would record
        // an unreachable domain without an https stage error
        let result = combine_probe_results(
            "example.com",
            Err(anyhow::anyhow!("connection reset by peer")),
            Ok(expiry()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_both_probes_fail() {
        let err = combine_probe_results(
            "example.com",
            Err(anyhow::anyhow!("connection refused")),
            Err(anyhow::anyhow!("handshake timed out")),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
    }
}
