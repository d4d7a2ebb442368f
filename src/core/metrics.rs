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

//! Projection of pipeline results onto Prometheus metrics.
//!
//! The registry is owned, not global. After every iteration the projection
//! re-renders the full text exposition under a lock and swaps it in one
//! step, so a scraper always reads the output of some fully-completed
//! iteration.

use std::sync::RwLock;

use anyhow::Result;
use prometheus::{Encoder, Gauge, GaugeVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::core::analyzer::{DomainInfo, stage};

const UNKNOWN: &str = "unknown";

pub struct DouroMetrics {
    registry: Registry,
    domain_info: IntGaugeVec,
    http_status: IntGaugeVec,
    dns_resolve_duration: GaugeVec,
    domain_expiration: GaugeVec,
    tls_expiration: GaugeVec,
    scrape_duration: Gauge,
    scrape_error: IntGaugeVec,
    rendered: RwLock<String>,
}

impl DouroMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let domain_info = IntGaugeVec::new(
            Opts::new("douro_domain_info", "Static information about the domain"),
            &[
                "domain",
                "registrar",
                "asn",
                "asn_org",
                "country",
                "hosting_provider",
                "hosting_region",
                "cdn",
            ],
        )?;
        let http_status = IntGaugeVec::new(
            Opts::new("douro_http_status_code", "HTTP status code, 0 when unreachable"),
            &["domain"],
        )?;
        let dns_resolve_duration = GaugeVec::new(
            Opts::new(
                "douro_dns_resolve_duration_seconds",
                "DNS resolution time in seconds",
            ),
            &["domain"],
        )?;
        let domain_expiration = GaugeVec::new(
            Opts::new(
                "douro_domain_expiration_timestamp",
                "Unix timestamp of the domain registration expiry",
            ),
            &["domain"],
        )?;
        let tls_expiration = GaugeVec::new(
            Opts::new(
                "douro_tls_cert_expiration_timestamp",
                "Unix timestamp of the TLS certificate expiry",
            ),
            &["domain"],
        )?;
        let scrape_duration = Gauge::new(
            "douro_scrape_duration_seconds",
            "Total duration of the last scrape in seconds",
        )?;
        let scrape_error = IntGaugeVec::new(
            Opts::new("douro_scrape_error", "Per-stage error indicator (0=OK, 1=error)"),
            &["domain", "stage"],
        )?;

        registry.register(Box::new(domain_info.clone()))?;
        registry.register(Box::new(http_status.clone()))?;
        registry.register(Box::new(dns_resolve_duration.clone()))?;
        registry.register(Box::new(domain_expiration.clone()))?;
        registry.register(Box::new(tls_expiration.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(scrape_error.clone()))?;

        Ok(Self {
            registry,
            domain_info,
            http_status,
            dns_resolve_duration,
            domain_expiration,
            tls_expiration,
            scrape_duration,
            scrape_error,
            rendered: RwLock::new(String::new()),
        })
    }

    /// Project one full iteration and publish the new exposition text.
    pub fn update_metrics(&self, domain_infos: &[DomainInfo], scrape_duration: f64) {
        // Reset the vectors so domains removed from the config (and stale
        // label sets) disappear from the output.
        self.domain_info.reset();
        self.http_status.reset();
        self.dns_resolve_duration.reset();
        self.domain_expiration.reset();
        self.tls_expiration.reset();
        self.scrape_error.reset();

        for info in domain_infos {
            self.domain_info
                .with_label_values(&[
                    &info.domain,
                    info.registrar.as_deref().unwrap_or(UNKNOWN),
                    info.asn.as_deref().unwrap_or(UNKNOWN),
                    info.asn_org.as_deref().unwrap_or(UNKNOWN),
                    info.country.as_deref().unwrap_or(UNKNOWN),
                    info.hosting_provider.as_deref().unwrap_or(UNKNOWN),
                    info.hosting_region.as_deref().unwrap_or(UNKNOWN),
                    if info.cdn_detected { "true" } else { "false" },
                ])
                .set(1);

            self.http_status
                .with_label_values(&[&info.domain])
                .set(i64::from(info.http_status));
            self.dns_resolve_duration
                .with_label_values(&[&info.domain])
                .set(info.dns_resolve_duration);

            if let Some(expiration) = &info.expiration_date {
                self.domain_expiration
                    .with_label_values(&[&info.domain])
                    .set(expiration.timestamp() as f64);
            }
            if let Some(expiration) = &info.tls_expiration {
                self.tls_expiration
                    .with_label_values(&[&info.domain])
                    .set(expiration.timestamp() as f64);
            }

            for stage_name in stage::ALL {
                let value = i64::from(info.errors.contains_key(*stage_name));
                self.scrape_error
                    .with_label_values(&[&info.domain, stage_name])
                    .set(value);
            }
        }

        self.scrape_duration.set(scrape_duration);

        let text = self.encode();
        *self.rendered.write().expect("metrics snapshot lock poisoned") = text;
    }

    /// The exposition text of the last fully-completed iteration.
    pub fn render(&self) -> String {
        self.rendered
            .read()
            .expect("metrics snapshot lock poisoned")
            .clone()
    }

    fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_info() -> DomainInfo {
        let mut info = DomainInfo::new("example.com");
        info.dns_resolve_duration = 0.5;
        info.ip_addresses = vec!["93.184.216.34".to_string()];
        info.registrar = Some("IANA".to_string());
        info.expiration_date = Some(Utc.with_ymd_and_hms(2031, 8, 13, 0, 0, 0).unwrap());
        info.asn = Some("15133".to_string());
        info.asn_org = Some("Edgecast".to_string());
        info.country = Some("US".to_string());
        info.http_status = 200;
        info.tls_expiration = Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        info.cdn_detected = true;
        info
    }

    #[test]
    fn test_complete_projection() {
        let metrics = DouroMetrics::new().unwrap();
        metrics.update_metrics(&[sample_info()], 1.25);
        let text = metrics.render();

        assert!(text.contains("douro_http_status_code{domain=\"example.com\"} 200"));
        assert!(text.contains("douro_dns_resolve_duration_seconds{domain=\"example.com\"} 0.5"));
        assert!(text.contains("douro_scrape_duration_seconds 1.25"));
        assert!(text.contains("registrar=\"IANA\""));
        assert!(text.contains("asn_org=\"Edgecast\""));
        assert!(text.contains("cdn=\"true\""));
        assert!(text.contains("hosting_provider=\"unknown\""));
        assert!(text.contains("hosting_region=\"unknown\""));
        // timestamps present
        assert!(text.contains("douro_domain_expiration_timestamp{domain=\"example.com\"}"));
        assert!(text.contains("douro_tls_cert_expiration_timestamp{domain=\"example.com\"}"));
    }

    #[test]
    fn test_stage_error_gauges() {
        let mut info = sample_info();
        info.errors
            .insert("whois_domain".to_string(), "rate limited".to_string());
        let metrics = DouroMetrics::new().unwrap();
        metrics.update_metrics(&[info], 0.1);
        let text = metrics.render();

        assert!(text.contains(
            "douro_scrape_error{domain=\"example.com\",stage=\"whois_domain\"} 1"
        ));
        for clean_stage in ["dns", "whois_ip", "region_detection", "https"] {
            assert!(text.contains(&format!(
                "douro_scrape_error{{domain=\"example.com\",stage=\"{clean_stage}\"}} 0"
            )));
        }
    }

    #[test]
    fn test_missing_expirations_absent() {
        let mut info = sample_info();
        info.expiration_date = None;
        info.tls_expiration = None;
        let metrics = DouroMetrics::new().unwrap();
        metrics.update_metrics(&[info], 0.1);
        let text = metrics.render();

        assert!(!text.contains("douro_domain_expiration_timestamp{domain=\"example.com\"}"));
        assert!(!text.contains("douro_tls_cert_expiration_timestamp{domain=\"example.com\"}"));
    }

    #[test]
    fn test_removed_domains_disappear() {
        let metrics = DouroMetrics::new().unwrap();
        metrics.update_metrics(&[sample_info()], 0.1);
        assert!(metrics.render().contains("example.com"));

        let other = DomainInfo::new("example.org");
        metrics.update_metrics(&[other], 0.1);
        let text = metrics.render();
        assert!(!text.contains("example.com"));
        assert!(text.contains("douro_http_status_code{domain=\"example.org\"} 0"));
    }

    #[test]
    fn test_render_before_first_scrape_is_empty() {
        let metrics = DouroMetrics::new().unwrap();
        assert!(metrics.render().is_empty());
    }
}
