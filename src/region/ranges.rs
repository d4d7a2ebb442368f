//! IP-range heuristics for anycast CDNs and provider address hints.
//!
//! Unlike the declarative pattern store, these two refinements cannot be
//! expressed as token or regex tables: the Cloudflare IPv6 sub-block split
//! and the OVH France IPv4 ranges. Both sit behind named predicates so they
//! stay auditable in one place.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use cidr::{Ipv4Cidr, Ipv6Cidr};
use once_cell::sync::Lazy;

use crate::region::patterns::PATTERNS;

/// Outcome of a range match: a provider, possibly with a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMatch {
    pub provider: &'static str,
    pub region: Option<&'static str>,
}

static CLOUDFLARE_V4: Lazy<Vec<Ipv4Cidr>> = Lazy::new(|| {
    ["104.16.0.0/12", "172.64.0.0/13"]
        .iter()
        .map(|c| c.parse().unwrap())
        .collect()
});
static CLOUDFLARE_V6: Lazy<Ipv6Cidr> = Lazy::new(|| "2606:4700::/32".parse().unwrap());
static AKAMAI_V6: Lazy<Ipv6Cidr> = Lazy::new(|| "2a02:26f0::/32".parse().unwrap());
static AKAMAI_V6_AMS: Lazy<Ipv6Cidr> = Lazy::new(|| "2a02:26f0:2b80::/48".parse().unwrap());

// OVH France datacenter ranges
static OVH_GRA: Lazy<Ipv4Cidr> = Lazy::new(|| "54.39.0.0/16".parse().unwrap());
static OVH_RBX: Lazy<Ipv4Cidr> = Lazy::new(|| "151.80.0.0/16".parse().unwrap());
static OVH_SBG: Lazy<Ipv4Cidr> = Lazy::new(|| "51.38.0.0/16".parse().unwrap());

/// Match a raw target (IP literal or hostname) against the anycast tables.
pub fn match_ip_ranges(target: &str) -> Option<RangeMatch> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => match_ipv4(&v4),
            IpAddr::V6(v6) => match_ipv6(&v6),
        };
    }
    akamai_host_region(target)
}

fn match_ipv4(ip: &Ipv4Addr) -> Option<RangeMatch> {
    if CLOUDFLARE_V4.iter().any(|cidr| cidr.contains(ip)) {
        // Anycast: the v4 prefix says nothing about the serving location.
        return Some(RangeMatch { provider: "cloudflare", region: None });
    }
    None
}

fn match_ipv6(ip: &Ipv6Addr) -> Option<RangeMatch> {
    if CLOUDFLARE_V6.contains(ip) {
        return Some(RangeMatch {
            provider: "cloudflare",
            region: Some(cloudflare_ipv6_region(ip)),
        });
    }
    if AKAMAI_V6.contains(ip) {
        let region = AKAMAI_V6_AMS.contains(ip).then_some("ams");
        return Some(RangeMatch { provider: "akamai", region });
    }
    None
}

/// Empirical sub-block split inside 2606:4700::/32.
///
/// The third group selects the PoP block (0x3xxx hosts the European
/// deployments); the last group then selects the site. Unclassified
/// sub-blocks fall back to cdg for the European block and iad otherwise.
pub fn cloudflare_ipv6_region(ip: &Ipv6Addr) -> &'static str {
    let segments = ip.segments();
    let european = segments[2] & 0xf000 == 0x3000;
    let site = segments[7];
    if european {
        match site {
            0x0000..=0x3fff => "cdg",
            0x4000..=0x7fff => "ams",
            0x8000..=0xbfff => "lhr",
            _ => "cdg",
        }
    } else {
        match site {
            0x0000..=0x7fff => "iad",
            _ => "lax",
        }
    }
}

/// Akamai edge hostnames embed the IATA code of the serving site.
pub fn akamai_host_region(hostname: &str) -> Option<RangeMatch> {
    let hostname = hostname.to_lowercase();
    if !hostname.contains("akamaitechnologies.com") && !hostname.contains("akamaiedge.net") {
        return None;
    }
    PATTERNS
        .akamai_iata_codes()
        .iter()
        .find(|code| hostname.contains(**code))
        .map(|code| RangeMatch { provider: "akamai", region: Some(code) })
}

/// OVH France hosts out of three datacenters; the /16 selects the site,
/// with Gravelines as the default for unlisted FR ranges.
pub fn ovh_fr_ipv4_region(ip: &Ipv4Addr) -> &'static str {
    if OVH_GRA.contains(ip) {
        "gra7"
    } else if OVH_RBX.contains(ip) {
        "rbx8"
    } else if OVH_SBG.contains(ip) {
        "sbg5"
    } else {
        "gra7"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloudflare_ipv4_prefixes() {
        assert_eq!(
            match_ip_ranges("104.16.132.229"),
            Some(RangeMatch { provider: "cloudflare", region: None })
        );
        assert_eq!(
            match_ip_ranges("172.64.1.1"),
            Some(RangeMatch { provider: "cloudflare", region: None })
        );
        // 104.32.0.0 is outside 104.16.0.0/12
        assert_eq!(match_ip_ranges("104.32.0.1"), None);
        assert_eq!(match_ip_ranges("140.82.121.4"), None);
    }

    #[test]
    fn test_cloudflare_ipv6_sub_blocks() {
        // European block, per-site split on the last group
        assert_eq!(cloudflare_ipv6_region(&"2606:4700:3030::1".parse().unwrap()), "cdg");
        assert_eq!(cloudflare_ipv6_region(&"2606:4700:3030::4001".parse().unwrap()), "ams");
        assert_eq!(cloudflare_ipv6_region(&"2606:4700:3030::9000".parse().unwrap()), "lhr");
        assert_eq!(cloudflare_ipv6_region(&"2606:4700:3030::f000".parse().unwrap()), "cdg");
        // US block
        assert_eq!(cloudflare_ipv6_region(&"2606:4700:1000::1".parse().unwrap()), "iad");
        assert_eq!(cloudflare_ipv6_region(&"2606:4700:1000::9000".parse().unwrap()), "lax");

        let matched = match_ip_ranges("2606:4700:3030::6815:84e5").unwrap();
        assert_eq!(matched.provider, "cloudflare");
        assert!(matched.region.is_some());
    }

    #[test]
    fn test_akamai_ipv6() {
        assert_eq!(
            match_ip_ranges("2a02:26f0:2b80::1"),
            Some(RangeMatch { provider: "akamai", region: Some("ams") })
        );
        assert_eq!(
            match_ip_ranges("2a02:26f0:100::1"),
            Some(RangeMatch { provider: "akamai", region: None })
        );
        assert_eq!(match_ip_ranges("2a02:26f1::1"), None);
    }

    #[test]
    fn test_akamai_hostnames() {
        assert_eq!(
            match_ip_ranges("a96-6-1-1.fra2.deploy.static.akamaitechnologies.com"),
            Some(RangeMatch { provider: "akamai", region: Some("fra") })
        );
        assert_eq!(
            match_ip_ranges("e1234.dsca.ams.akamaiedge.net"),
            Some(RangeMatch { provider: "akamai", region: Some("ams") })
        );
        // No IATA code in the name: no match
        assert_eq!(match_ip_ranges("a23-1-1-1.deploy.static.akamaitechnologies.com"), None);
        assert_eq!(match_ip_ranges("edge.example.com"), None);
    }

    #[test]
    fn test_ovh_fr_ranges() {
        assert_eq!(ovh_fr_ipv4_region(&"54.39.17.7".parse().unwrap()), "gra7");
        assert_eq!(ovh_fr_ipv4_region(&"151.80.4.2".parse().unwrap()), "rbx8");
        assert_eq!(ovh_fr_ipv4_region(&"51.38.9.9".parse().unwrap()), "sbg5");
        // Any other FR range defaults to Gravelines
        assert_eq!(ovh_fr_ipv4_region(&"91.121.0.1".parse().unwrap()), "gra7");
    }
}
