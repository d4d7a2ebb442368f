/*
 * Douro - Hosting Infrastructure Exporter
 * Copyright (C) 2025 Douro Contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Per-domain analysis pipeline.
//!
//! Runs the probes in a fixed order (DNS, WHOIS domain, WHOIS IP, region
//! detection, HTTPS), buckets every stage failure under its stage name and
//! never aborts a domain because one stage failed. The only early return is
//! an empty resolver result, which leaves the downstream stages untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::probes::{DnsResolve, DomainWhois, HttpsCheck, IpWhois, IpWhoisInfo};
use crate::region::{PATTERNS, RegionDetect};

/// Stage names used for error bucketing and the `scrape_error` gauge.
pub mod stage {
    pub const DNS: &str = "dns";
    pub const WHOIS_DOMAIN: &str = "whois_domain";
    pub const WHOIS_IP: &str = "whois_ip";
    pub const REGION_DETECTION: &str = "region_detection";
    pub const HTTPS: &str = "https";

    pub const ALL: &[&str] = &[DNS, WHOIS_DOMAIN, WHOIS_IP, REGION_DETECTION, HTTPS];
}

/// Everything one scrape learns about a domain. Built empty, populated by
/// the pipeline stages, read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct DomainInfo {
    pub domain: String,
    pub dns_resolve_duration: f64,
    pub ip_addresses: Vec<String>,
    pub ns_records: Vec<String>,
    pub registrar: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub asn: Option<String>,
    pub asn_org: Option<String>,
    pub country: Option<String>,
    pub hosting_provider: Option<String>,
    pub hosting_region: Option<String>,
    /// 0 means unreachable.
    pub http_status: u16,
    pub server_header: Option<String>,
    pub tls_expiration: Option<DateTime<Utc>>,
    pub cdn_detected: bool,
    /// stage name -> short failure message
    pub errors: BTreeMap<String, String>,
}

impl DomainInfo {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            dns_resolve_duration: 0.0,
            ip_addresses: Vec::new(),
            ns_records: Vec::new(),
            registrar: None,
            expiration_date: None,
            asn: None,
            asn_org: None,
            country: None,
            hosting_provider: None,
            hosting_region: None,
            http_status: 0,
            server_header: None,
            tls_expiration: None,
            cdn_detected: false,
            errors: BTreeMap::new(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// CDN classification: a known CDN ASN or a CDN token in the organisation.
pub fn is_cdn_ip(asn: Option<&str>, asn_org: Option<&str>) -> bool {
    if asn.is_some_and(|asn| PATTERNS.is_cdn_asn(asn)) {
        return true;
    }
    asn_org.is_some_and(|org| PATTERNS.has_cdn_org_token(org))
}

/// Keep stage messages short enough for a metric label or log line.
fn short_error(error: &anyhow::Error) -> String {
    let message = error.to_string();
    let first_line = message.lines().next().unwrap_or("");
    if first_line.len() > 120 {
        format!("{}...", &first_line[..117])
    } else {
        first_line.to_string()
    }
}

pub struct Analyzer {
    dns: Arc<dyn DnsResolve>,
    whois_domain: Arc<dyn DomainWhois>,
    whois_ip: Arc<dyn IpWhois>,
    region: Arc<dyn RegionDetect>,
    https: Arc<dyn HttpsCheck>,
}

impl Analyzer {
    pub fn new(
        dns: Arc<dyn DnsResolve>,
        whois_domain: Arc<dyn DomainWhois>,
        whois_ip: Arc<dyn IpWhois>,
        region: Arc<dyn RegionDetect>,
        https: Arc<dyn HttpsCheck>,
    ) -> Self {
        Self { dns, whois_domain, whois_ip, region, https }
    }

    pub async fn analyze_domain(&self, domain: &str) -> DomainInfo {
        let mut info = DomainInfo::new(domain);

        let (duration, ips, ns_records) = self.dns.resolve(domain).await;
        info.dns_resolve_duration = duration;
        info.ip_addresses = ips;
        info.ns_records = ns_records;

        // Without an address nothing downstream can run.
        if info.ip_addresses.is_empty() {
            info.errors
                .insert(stage::DNS.to_string(), "no A or AAAA records resolved".to_string());
            return info;
        }

        match self.whois_domain.lookup(domain).await {
            Ok((registrar, expiration_date)) => {
                info.registrar = registrar;
                info.expiration_date = expiration_date;
            }
            Err(e) => {
                info.errors.insert(stage::WHOIS_DOMAIN.to_string(), short_error(&e));
            }
        }

        let ip = info.ip_addresses[0].clone();
        let mut insight = IpWhoisInfo::default();
        match self.whois_ip.lookup(&ip).await {
            Ok(result) => {
                info.asn = result.asn.clone();
                info.asn_org = result.asn_org.clone();
                info.country = result.country.clone();
                insight = result;
            }
            Err(e) => {
                info.errors.insert(stage::WHOIS_IP.to_string(), short_error(&e));
            }
        }

        info.cdn_detected = is_cdn_ip(insight.asn.as_deref(), insight.asn_org.as_deref());

        match self.region.detect(&ip, &insight).await {
            Ok(result) => {
                info.hosting_provider = result.provider;
                info.hosting_region = result.region;
            }
            Err(e) => {
                info.errors
                    .insert(stage::REGION_DETECTION.to_string(), short_error(&e));
            }
        }

        match self.https.check(domain).await {
            Ok((status, server_header, tls_expiration)) => {
                info.http_status = status;
                info.server_header = server_header;
                info.tls_expiration = tls_expiration;
            }
            Err(e) => {
                info.errors.insert(stage::HTTPS.to_string(), short_error(&e));
            }
        }

        debug!("Analysis of {}: {}", domain, info.to_json());
        info
    }

    pub async fn analyze_domains(&self, domains: &[String]) -> Vec<DomainInfo> {
        let mut results = Vec::with_capacity(domains.len());
        for domain in domains {
            results.push(self.analyze_domain(domain).await);
        }
        results
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned probes for pipeline and scheduler tests.

    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;

    use crate::probes::traceroute::HopSource;
    use crate::region::RegionDetector;

    pub struct StaticDns(pub f64, pub Vec<String>, pub Vec<String>);

    #[async_trait]
    impl DnsResolve for StaticDns {
        async fn resolve(&self, _domain: &str) -> (f64, Vec<String>, Vec<String>) {
            (self.0, self.1.clone(), self.2.clone())
        }
    }

    pub struct StaticDomainWhois(pub Option<String>, pub Option<DateTime<Utc>>);

    #[async_trait]
    impl DomainWhois for StaticDomainWhois {
        async fn lookup(&self, _: &str) -> Result<(Option<String>, Option<DateTime<Utc>>)> {
            Ok((self.0.clone(), self.1))
        }
    }

    pub struct FailingDomainWhois;

    #[async_trait]
    impl DomainWhois for FailingDomainWhois {
        async fn lookup(&self, _: &str) -> Result<(Option<String>, Option<DateTime<Utc>>)> {
            Err(anyhow::anyhow!("rate limited by registry"))
        }
    }

    pub struct StaticIpWhois(pub IpWhoisInfo);

    #[async_trait]
    impl IpWhois for StaticIpWhois {
        async fn lookup(&self, _: &str) -> Result<IpWhoisInfo> {
            Ok(self.0.clone())
        }
    }

    pub struct StaticHttps(pub u16, pub Option<String>, pub Option<DateTime<Utc>>);

    #[async_trait]
    impl HttpsCheck for StaticHttps {
        async fn check(&self, _: &str) -> Result<(u16, Option<String>, Option<DateTime<Utc>>)> {
            Ok((self.0, self.1.clone(), self.2))
        }
    }

    pub struct FailingHttps;

    #[async_trait]
    impl HttpsCheck for FailingHttps {
        async fn check(&self, _: &str) -> Result<(u16, Option<String>, Option<DateTime<Utc>>)> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    pub struct StaticHops(pub Vec<String>);

    #[async_trait]
    impl HopSource for StaticHops {
        async fn hops(&self, _: &str, _: u32) -> Vec<String> {
            self.0.clone()
        }
    }

    /// Pipeline with canned answers around the real region engine.
    pub fn analyzer(
        dns: StaticDns,
        whois_domain: Arc<dyn DomainWhois>,
        ip_whois: IpWhoisInfo,
        hops: Vec<String>,
        https: Arc<dyn HttpsCheck>,
    ) -> Analyzer {
        let region = RegionDetector::new(Arc::new(StaticHops(hops)), None);
        Analyzer::new(
            Arc::new(dns),
            whois_domain,
            Arc::new(StaticIpWhois(ip_whois)),
            Arc::new(region),
            https,
        )
    }

}
