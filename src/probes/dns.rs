//! Forward (A/AAAA) and NS resolution with wall-clock timing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use tracing::debug;

/// Per-query timeout for every resolver round trip.
const DNS_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the resolver shared by the DNS probe and the traceroute driver.
pub fn build_resolver() -> TokioResolver {
    let mut builder = hickory_resolver::Resolver::builder_with_config(
        ResolverConfig::default(),
        TokioConnectionProvider::default(),
    );
    builder.options_mut().timeout = DNS_QUERY_TIMEOUT;
    builder.build()
}

/// Seam used by the pipeline; the live implementation is [`DnsProbe`].
#[async_trait]
pub trait DnsResolve: Send + Sync {
    /// Resolve a domain. Never fails: resolver-level failures collapse the
    /// affected record set to empty, and an empty IP list signals
    /// "unresolved". The duration spans the full resolution.
    async fn resolve(&self, domain: &str) -> (f64, Vec<String>, Vec<String>);
}

pub struct DnsProbe {
    resolver: Arc<TokioResolver>,
}

impl DnsProbe {
    pub fn new(resolver: Arc<TokioResolver>) -> Self {
        Self { resolver }
    }

    async fn lookup_ipv4(&self, domain: &str) -> Vec<String> {
        match tokio::time::timeout(DNS_QUERY_TIMEOUT, self.resolver.ipv4_lookup(domain)).await {
            Ok(Ok(lookup)) => lookup.iter().map(|a| a.0.to_string()).collect(),
            Ok(Err(e)) => {
                debug!("A lookup failed for {}: {}", domain, e);
                Vec::new()
            }
            Err(_) => {
                debug!("A lookup timed out for {}", domain);
                Vec::new()
            }
        }
    }

    async fn lookup_ipv6(&self, domain: &str) -> Vec<String> {
        match tokio::time::timeout(DNS_QUERY_TIMEOUT, self.resolver.ipv6_lookup(domain)).await {
            Ok(Ok(lookup)) => lookup.iter().map(|aaaa| aaaa.0.to_string()).collect(),
            Ok(Err(e)) => {
                debug!("AAAA lookup failed for {}: {}", domain, e);
                Vec::new()
            }
            Err(_) => {
                debug!("AAAA lookup timed out for {}", domain);
                Vec::new()
            }
        }
    }

    async fn lookup_ns(&self, domain: &str) -> Vec<String> {
        match tokio::time::timeout(DNS_QUERY_TIMEOUT, self.resolver.ns_lookup(domain)).await {
            Ok(Ok(lookup)) => lookup
                .iter()
                .map(|ns| strip_trailing_dot(&ns.0.to_string()))
                .collect(),
            Ok(Err(e)) => {
                debug!("NS lookup failed for {}: {}", domain, e);
                Vec::new()
            }
            Err(_) => {
                debug!("NS lookup timed out for {}", domain);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DnsResolve for DnsProbe {
    async fn resolve(&self, domain: &str) -> (f64, Vec<String>, Vec<String>) {
        let start = Instant::now();

        // A first; AAAA only when no A record came back.
        let mut ips = self.lookup_ipv4(domain).await;
        if ips.is_empty() {
            ips = self.lookup_ipv6(domain).await;
        }
        let nameservers = self.lookup_ns(domain).await;

        let duration = start.elapsed().as_secs_f64();
        debug!(
            "Resolved {} in {:.3}s: {} addresses, {} nameservers",
            domain,
            duration,
            ips.len(),
            nameservers.len()
        );
        (duration, ips, nameservers)
    }
}

fn strip_trailing_dot(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_trailing_dot() {
        assert_eq!(strip_trailing_dot("a.iana-servers.net."), "a.iana-servers.net");
        assert_eq!(strip_trailing_dot("a.iana-servers.net"), "a.iana-servers.net");
    }
}
