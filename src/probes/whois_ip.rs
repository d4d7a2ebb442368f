//! IP ownership probe: ASN, ASN organisation and country.
//!
//! Primary path is RDAP (through the rdap.org bootstrap redirector) combined
//! with RIPEstat prefix-overview for the announcing ASN; legacy port-43
//! WHOIS is the fallback when RDAP is unreachable. Country extraction walks
//! a fixed precedence ladder over the RDAP document before resorting to an
//! organisation-name heuristic.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{RDAP_IP_API_BASE, RIPE_PREFIX_OVERVIEW_API};
use crate::probes::whois_domain::query_with_iana_referral;
use crate::region::patterns::country_from_org;

/// What the pipeline gets out of the IP WHOIS stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpWhoisInfo {
    pub asn: Option<String>,
    pub asn_org: Option<String>,
    pub country: Option<String>,
}

/// Seam used by the pipeline; the live implementation is [`IpWhoisProbe`].
#[async_trait]
pub trait IpWhois: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<IpWhoisInfo>;
}

pub struct IpWhoisProbe {
    client: reqwest::Client,
}

impl IpWhoisProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_rdap(&self, ip: &str) -> Result<RdapIpNetwork> {
        let url = format!("{}/{}", RDAP_IP_API_BASE, ip);
        debug!("RDAP query: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("RDAP HTTP error: {}", response.status()));
        }
        Ok(response.json().await?)
    }

    async fn fetch_prefix_overview(&self, ip: &str) -> Result<(Option<String>, Option<String>)> {
        let url = format!("{}?resource={}", RIPE_PREFIX_OVERVIEW_API, ip);
        debug!("RIPEstat prefix-overview query: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("RIPEstat HTTP error: {}", response.status()));
        }
        let overview: PrefixOverviewResponse = response.json().await?;
        if overview.status != "ok" {
            return Err(anyhow::anyhow!("RIPEstat error: status={}", overview.status));
        }

        let first = overview.data.and_then(|d| d.asns.into_iter().next());
        Ok(match first {
            Some(entry) => (Some(entry.asn.to_string()), entry.holder),
            None => (None, None),
        })
    }

    async fn lookup_rdap(&self, ip: &str) -> Result<IpWhoisInfo> {
        let network = self.fetch_rdap(ip).await?;

        // RIPEstat is best-effort on top of a successful RDAP answer.
        let (mut asn, asn_org) = match self.fetch_prefix_overview(ip).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("prefix-overview failed for {}: {}", ip, e);
                (None, None)
            }
        };
        if asn.is_none() {
            // ARIN publishes the originating ASN inline.
            asn = network
                .origin_autnums
                .as_ref()
                .and_then(|list| list.first())
                .map(|n| n.to_string());
        }

        let country = extract_country(&network, asn_org.as_deref());
        Ok(IpWhoisInfo { asn, asn_org, country })
    }

    async fn lookup_legacy(&self, ip: &str) -> Result<IpWhoisInfo> {
        let response = query_with_iana_referral(ip).await?;
        let info = parse_legacy_whois(&response);
        if info == IpWhoisInfo::default() {
            return Err(anyhow::anyhow!("legacy WHOIS yielded no usable fields for {}", ip));
        }
        Ok(info)
    }
}

#[async_trait]
impl IpWhois for IpWhoisProbe {
    async fn lookup(&self, ip: &str) -> Result<IpWhoisInfo> {
        match self.lookup_rdap(ip).await {
            Ok(info) => Ok(info),
            Err(e) => {
                debug!("RDAP failed for {}, falling back to legacy WHOIS: {}", ip, e);
                self.lookup_legacy(ip).await
            }
        }
    }
}

// ─── RDAP document model ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RdapIpNetwork {
    #[allow(dead_code)]
    pub handle: Option<String>,
    #[allow(dead_code)]
    pub name: Option<String>,
    pub country: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "parentHandle")]
    pub parent_handle: Option<String>,
    #[serde(default)]
    pub entities: Vec<RdapEntity>,
    #[serde(rename = "arin_originas0_originautnums")]
    pub origin_autnums: Option<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
pub struct RdapEntity {
    #[allow(dead_code)]
    pub handle: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(rename = "vcardArray")]
    pub vcard_array: Option<Value>,
    #[serde(default)]
    pub entities: Vec<RdapEntity>,
}

#[derive(Debug, Deserialize)]
struct PrefixOverviewResponse {
    status: String,
    data: Option<PrefixOverviewData>,
}

#[derive(Debug, Deserialize)]
struct PrefixOverviewData {
    #[serde(default)]
    asns: Vec<PrefixAsn>,
}

#[derive(Debug, Deserialize)]
struct PrefixAsn {
    asn: u64,
    holder: Option<String>,
}

// ─── Country extraction ladder ─────────────────────────────

static TRAILING_COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{2})\b\s*$").unwrap());

/// Precedence: network country, contact addresses, parent-network contacts,
/// then the organisation-name heuristic. First hit wins.
pub fn extract_country(network: &RdapIpNetwork, asn_org: Option<&str>) -> Option<String> {
    if let Some(country) = &network.country {
        if !country.is_empty() {
            return Some(country.to_uppercase());
        }
    }

    for entity in &network.entities {
        if let Some(country) = country_from_vcard(entity) {
            return Some(country);
        }
    }

    // Parent-allocation contacts sit one level down in bootstrap-merged
    // responses.
    for entity in &network.entities {
        for nested in &entity.entities {
            if let Some(country) = country_from_vcard(nested) {
                return Some(country);
            }
        }
    }

    asn_org.and_then(country_from_org)
}

/// Scan an entity's vCard `adr` properties for an address ending in a
/// two-letter ISO code.
fn country_from_vcard(entity: &RdapEntity) -> Option<String> {
    let properties = entity.vcard_array.as_ref()?.as_array()?.get(1)?.as_array()?;

    for property in properties {
        let fields = property.as_array()?;
        if fields.first()?.as_str() != Some("adr") {
            continue;
        }

        // Address text lives either in the label parameter or in the
        // structured value array.
        let mut address_text = fields
            .get(1)
            .and_then(|params| params.get("label"))
            .and_then(Value::as_str)
            .map(|s| s.replace('\n', " "))
            .unwrap_or_default();
        if address_text.is_empty() {
            if let Some(parts) = fields.get(3).and_then(Value::as_array) {
                address_text = parts
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
            }
        }

        if let Some(captures) = TRAILING_COUNTRY_RE.captures(address_text.trim()) {
            return Some(captures[1].to_string());
        }
    }
    None
}

// ─── Legacy WHOIS fallback ─────────────────────────────────

static LEGACY_ASN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*(?:originas|origin)\s*:\s*(?:AS)?(\d+)").unwrap());
static LEGACY_ORG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^\s*(?:orgname|org-name|owner|descr)\s*:\s*(.+?)\s*$").unwrap()
});
static LEGACY_COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*country\s*:\s*([A-Za-z]{2})\s*$").unwrap());

pub fn parse_legacy_whois(response: &str) -> IpWhoisInfo {
    IpWhoisInfo {
        asn: LEGACY_ASN_RE.captures(response).map(|c| c[1].to_string()),
        asn_org: LEGACY_ORG_RE.captures(response).map(|c| c[1].trim().to_string()),
        country: LEGACY_COUNTRY_RE
            .captures(response)
            .map(|c| c[1].to_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_from_json(json: &str) -> RdapIpNetwork {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_country_from_network_field() {
        let network = network_from_json(r#"{"handle": "X", "country": "fr"}"#);
        assert_eq!(extract_country(&network, None), Some("FR".to_string()));
    }

    #[test]
    fn test_country_from_contact_address() {
        let network = network_from_json(
            r#"{
                "handle": "NET-104-16-0-0-1",
                "entities": [{
                    "handle": "CLOUD14",
                    "roles": ["registrant"],
                    "vcardArray": ["vcard", [
                        ["version", {}, "text", "4.0"],
                        ["fn", {}, "text", "Cloudflare, Inc."],
                        ["adr", {"label": "101 Townsend Street\nSan Francisco\nCA\n94107\nUnited States\nUS"}, "text", ["", "", "", "", "", "", ""]]
                    ]]
                }]
            }"#,
        );
        assert_eq!(extract_country(&network, None), Some("US".to_string()));
    }

    #[test]
    fn test_country_from_parent_contacts() {
        let network = network_from_json(
            r#"{
                "handle": "CHILD",
                "entities": [{
                    "handle": "OUTER",
                    "entities": [{
                        "handle": "PARENT-CONTACT",
                        "vcardArray": ["vcard", [
                            ["adr", {}, "text", ["", "", "1 Rue Example", "Paris", "", "75001", "FR"]]
                        ]]
                    }]
                }]
            }"#,
        );
        assert_eq!(extract_country(&network, None), Some("FR".to_string()));
    }

    #[test]
    fn test_country_from_org_heuristic() {
        let network = network_from_json(r#"{"handle": "X"}"#);
        assert_eq!(
            extract_country(&network, Some("OVH SAS, FR")),
            Some("FR".to_string())
        );
        assert_eq!(extract_country(&network, Some("Opaque Networks")), None);
    }

    #[test]
    fn test_ladder_precedence() {
        // network.country beats the contact address
        let network = network_from_json(
            r#"{
                "handle": "X",
                "country": "DE",
                "entities": [{
                    "vcardArray": ["vcard", [
                        ["adr", {"label": "Somewhere US"}, "text", ["", "", "", "", "", "", ""]]
                    ]]
                }]
            }"#,
        );
        assert_eq!(extract_country(&network, Some("Org, FR")), Some("DE".to_string()));
    }

    #[test]
    fn test_arin_origin_autnums_deserialises() {
        let network = network_from_json(
            r#"{"handle": "NET-93-184-216-0-1", "arin_originas0_originautnums": [15133]}"#,
        );
        assert_eq!(network.origin_autnums, Some(vec![15133]));
    }

    #[test]
    fn test_parse_legacy_whois() {
        let response = "\
inetnum:        93.184.216.0 - 93.184.216.255
netname:        EDGECAST-NETBLK-03
descr:          NETBLK-03-EU-93-184-216-0-24
country:        EU
origin:         AS15133
org-name:       Edgecast Inc.
";
        let info = parse_legacy_whois(response);
        assert_eq!(info.asn.as_deref(), Some("15133"));
        // descr appears later than org-name in the alternation but earlier in
        // the text; the first matching line wins
        assert_eq!(info.asn_org.as_deref(), Some("NETBLK-03-EU-93-184-216-0-24"));
        assert_eq!(info.country.as_deref(), Some("EU"));
    }

    #[test]
    fn test_parse_legacy_whois_empty() {
        assert_eq!(parse_legacy_whois("% no entries found\n"), IpWhoisInfo::default());
    }
}
