//! # Douro
//!
//! Hosting-infrastructure probe and Prometheus exporter. For every
//! configured domain, Douro produces a structured fact sheet:
//! - DNS timing, addresses and nameservers
//! - domain registration metadata (registrar, expiry)
//! - IP ownership (ASN, organisation, country)
//! - hosting provider and region, fused from IP ranges, ownership data
//!   and traceroute hop chains
//! - HTTP reachability, `Server` header and TLS certificate expiry
//! - CDN classification
//!
//! Results are published as `douro_*` gauges on a `/metrics` scrape
//! endpoint, with `/health`, `/ready` and `/live` probes on a second port.
//!
//! ## Quick start
//!
//! Add to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! douro = "1"
//! tokio = { version = "1.48", features = ["full"] }
//! anyhow = "1.0"
//! ```
//!
//! One-shot analysis:
//! ```no_run
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let info = douro::analyze("example.com").await?;
//!     println!("{}", info.to_json());
//!     Ok(())
//! }
//! ```
//!
//! The `douro` binary runs the periodic exporter; see the configuration
//! section of the README for the JSON schema and `DOURO_*` environment
//! overrides.

pub mod config;
pub mod core;
pub mod probes;
pub mod region;
pub mod web;

use std::sync::Arc;
use std::time::Duration;

pub use crate::core::analyzer::{Analyzer, DomainInfo};

use probes::{DnsProbe, DomainWhoisProbe, HttpsProbe, IpWhoisProbe, TracerouteDriver};
use region::{GeoApiClient, RegionDetector};

/// Build a pipeline with default components.
///
/// This is the library entry point for callers that do not need the
/// exporter loop. All probes use their default timeouts.
pub fn default_analyzer() -> anyhow::Result<Analyzer> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(concat!("douro/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let resolver = Arc::new(probes::build_resolver());
    let hop_source = Arc::new(TracerouteDriver::new(resolver.clone()));
    let region = RegionDetector::new(hop_source, Some(GeoApiClient::new(client.clone())));

    Ok(Analyzer::new(
        Arc::new(DnsProbe::new(resolver)),
        Arc::new(DomainWhoisProbe::new()),
        Arc::new(IpWhoisProbe::new(client.clone())),
        Arc::new(region),
        Arc::new(HttpsProbe::new(
            client,
            Duration::from_secs(config::DEFAULT_TIMEOUT_SECONDS),
        )),
    ))
}

/// Analyse a single domain with default components.
///
/// # Examples
///
/// ```no_run
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let info = douro::analyze("example.com").await?;
///     println!("provider: {:?}", info.hosting_provider);
///     Ok(())
/// }
/// ```
pub async fn analyze(domain: &str) -> anyhow::Result<DomainInfo> {
    let analyzer = default_analyzer()?;
    Ok(analyzer.analyze_domain(domain).await)
}
