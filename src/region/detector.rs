//! Hosting-region detection engine.
//!
//! Fuses three evidence sources under a fixed priority: bit-exact IP-range
//! matches on the target, IP-ownership data (ASN, organisation, country),
//! and traceroute hop-chain pattern matches. Hop-chain matching runs last
//! because trailing hops can traverse transit that falsely matches another
//! provider's patterns; hops are only fetched once the cheaper sources have
//! failed.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::IP_API_BASE;
use crate::probes::traceroute::HopSource;
use crate::probes::whois_ip::IpWhoisInfo;
use crate::region::patterns::PATTERNS;
use crate::region::ranges::{match_ip_ranges, ovh_fr_ipv4_region};

const DEFAULT_MAX_HOPS: u32 = 15;

/// What the engine hands back to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionResult {
    pub provider: Option<String>,
    pub region: Option<String>,
    pub hops: Vec<String>,
}

/// Seam used by the pipeline; the live implementation is [`RegionDetector`].
#[async_trait]
pub trait RegionDetect: Send + Sync {
    async fn detect(&self, target: &str, insight: &IpWhoisInfo) -> Result<RegionResult>;
}

pub struct RegionDetector {
    hop_source: Arc<dyn HopSource>,
    geo_api: Option<GeoApiClient>,
}

impl RegionDetector {
    pub fn new(hop_source: Arc<dyn HopSource>, geo_api: Option<GeoApiClient>) -> Self {
        Self { hop_source, geo_api }
    }

    /// E1: provider from ASN number or description, region from the
    /// country table, with the OVH France IPv4 refinement. Falls back to
    /// the geolocation API when IP-WHOIS produced nothing usable.
    async fn evidence_ip(
        &self,
        target: &str,
        insight: &IpWhoisInfo,
    ) -> (Option<&'static str>, Option<&'static str>) {
        let mut provider = insight
            .asn
            .as_deref()
            .and_then(|asn| PATTERNS.provider_for_asn(asn));
        if provider.is_none() {
            provider = insight
                .asn_org
                .as_deref()
                .and_then(|org| PATTERNS.identify_provider(org));
        }

        if let Some(provider) = provider {
            let region = insight
                .country
                .as_deref()
                .and_then(|country| self.region_from_country(provider, country, target));
            return (Some(provider), region);
        }

        // No ownership data: consult the geolocation API when available.
        if let Some(geo) = &self.geo_api {
            match geo.lookup(target).await {
                Ok(answer) => return self.evidence_from_geo(target, &answer),
                Err(e) => debug!("Geolocation lookup failed for {}: {}", target, e),
            }
        }
        (None, None)
    }

    fn evidence_from_geo(
        &self,
        target: &str,
        answer: &GeoApiAnswer,
    ) -> (Option<&'static str>, Option<&'static str>) {
        let org_text = format!(
            "{} {} {}",
            answer.org.as_deref().unwrap_or(""),
            answer.isp.as_deref().unwrap_or(""),
            answer.as_info.as_deref().unwrap_or("")
        );
        let Some(provider) = PATTERNS.identify_provider(&org_text) else {
            return (None, None);
        };

        // City/region tokens first, country table second.
        let location_text = format!(
            "{} {}",
            answer.region_name.as_deref().unwrap_or(""),
            answer.city.as_deref().unwrap_or("")
        );
        let region = PATTERNS
            .region_for_location(provider, &location_text)
            .or_else(|| {
                answer
                    .country_code
                    .as_deref()
                    .and_then(|cc| self.region_from_country(provider, cc, target))
            });
        (Some(provider), region)
    }

    fn region_from_country(
        &self,
        provider: &'static str,
        country: &str,
        target: &str,
    ) -> Option<&'static str> {
        // OVH hosts France out of three datacenters; the address range
        // disambiguates where the country table cannot.
        if provider == "ovh" && country.eq_ignore_ascii_case("FR") {
            if let Ok(IpAddr::V4(ip)) = target.parse::<IpAddr>() {
                return Some(ovh_fr_ipv4_region(&ip));
            }
        }
        PATTERNS.region_for_country(provider, country)
    }

    /// E3: walk the hop chain; the first hop yielding both provider and
    /// region wins. A provider seen without a region is remembered for the
    /// provider-only fallback.
    fn evidence_hops(
        &self,
        hops: &[String],
    ) -> (Option<(&'static str, &'static str)>, Option<&'static str>) {
        let mut partial = None;
        for hop in hops {
            if let Some(provider) = PATTERNS.identify_provider(hop) {
                if let Some(region) = PATTERNS.identify_region(provider, hop) {
                    return (Some((provider, region)), partial);
                }
                partial.get_or_insert(provider);
            }
        }
        (None, partial)
    }
}

#[async_trait]
impl RegionDetect for RegionDetector {
    async fn detect(&self, target: &str, insight: &IpWhoisInfo) -> Result<RegionResult> {
        // 1. Range match on the target itself: bit-exact for anycast CDNs.
        let range = match_ip_ranges(target);
        if let Some(matched) = &range {
            if let Some(region) = matched.region {
                debug!("{}: range match {}/{}", target, matched.provider, region);
                return Ok(RegionResult {
                    provider: Some(matched.provider.to_string()),
                    region: Some(region.to_string()),
                    hops: Vec::new(),
                });
            }
        }

        // 2. IP ownership, reliable for single-region providers.
        let (e1_provider, e1_region) = self.evidence_ip(target, insight).await;
        if let (Some(provider), Some(region)) = (e1_provider, e1_region) {
            debug!("{}: ownership match {}/{}", target, provider, region);
            return Ok(RegionResult {
                provider: Some(provider.to_string()),
                region: Some(region.to_string()),
                hops: Vec::new(),
            });
        }

        // 3+4. Hop chain, fetched lazily only now.
        let hops = self.hop_source.hops(target, DEFAULT_MAX_HOPS).await;
        let (full, e3_partial) = self.evidence_hops(&hops);
        if let Some((provider, region)) = full {
            debug!("{}: hop-chain match {}/{}", target, provider, region);
            return Ok(RegionResult {
                provider: Some(provider.to_string()),
                region: Some(region.to_string()),
                hops,
            });
        }
        for hop in &hops {
            if let Some(matched) = match_ip_ranges(hop) {
                if let Some(region) = matched.region {
                    debug!("{}: hop range match {}/{}", target, matched.provider, region);
                    return Ok(RegionResult {
                        provider: Some(matched.provider.to_string()),
                        region: Some(region.to_string()),
                        hops,
                    });
                }
            }
        }

        // 5. Provider-only: the range match pins the operator even when no
        // region emerged, then ownership, then the hop chain.
        let provider = range
            .map(|m| m.provider)
            .or(e1_provider)
            .or(e3_partial)
            .map(|p| p.to_string());
        Ok(RegionResult { provider, region: None, hops })
    }
}

// ─── ip-api.com client ─────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GeoApiAnswer {
    pub status: String,
    pub org: Option<String>,
    pub isp: Option<String>,
    #[serde(rename = "as")]
    pub as_info: Option<String>,
    #[serde(rename = "countryCode")]
    pub country_code: Option<String>,
    #[serde(rename = "regionName")]
    pub region_name: Option<String>,
    pub city: Option<String>,
}

pub struct GeoApiClient {
    client: reqwest::Client,
}

impl GeoApiClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn lookup(&self, ip: &str) -> Result<GeoApiAnswer> {
        let url = format!(
            "{}/{}?fields=status,org,isp,as,country,countryCode,regionName,city",
            IP_API_BASE, ip
        );
        let response = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("ip-api HTTP error: {}", response.status()));
        }
        let answer: GeoApiAnswer = response.json().await?;
        if answer.status != "success" {
            return Err(anyhow::anyhow!("ip-api returned status {}", answer.status));
        }
        Ok(answer)
    }
}
