//! Static pattern store: provider indicators, per-provider region tables,
//! country and location fallbacks, CDN hints.
//!
//! The store is declarative (tokens, regexes, lookup tables) and immutable
//! for the process lifetime. Lists are evaluated in declared order and the
//! first match wins, so more-specific regions must be listed before
//! more-general ones (`gra9` before `gra7`, for example).

use once_cell::sync::Lazy;
use regex::Regex;

pub struct PatternStore {
    /// provider -> ordered substring tokens matched against hostnames and
    /// ASN descriptions (case-insensitive).
    provider_indicators: Vec<(&'static str, Vec<&'static str>)>,
    /// ASN number -> provider, for operators whose ASN is unambiguous.
    provider_asns: Vec<(&'static str, &'static str)>,
    /// provider -> ordered (region, ordered regex list).
    region_patterns: Vec<(&'static str, Vec<(&'static str, Vec<Regex>)>)>,
    /// provider -> ISO-3166 alpha-2 country -> default region.
    country_to_region: Vec<(&'static str, Vec<(&'static str, &'static str)>)>,
    /// provider -> lowercase city/geo token -> region.
    location_to_region: Vec<(&'static str, Vec<(&'static str, &'static str)>)>,
    /// Substring tokens identifying CDN-class operators in an ASN org.
    cdn_org_tokens: Vec<&'static str>,
    /// ASNs considered CDN-class.
    cdn_asns: Vec<&'static str>,
    /// IATA codes Akamai embeds in its edge hostnames.
    akamai_iata: Vec<&'static str>,
    /// ISO country -> tokens found in ASN organisation strings.
    org_country_tokens: Vec<(&'static str, Vec<&'static str>)>,
}

/// Process-lifetime pattern store.
pub static PATTERNS: Lazy<PatternStore> = Lazy::new(PatternStore::builtin);

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

impl PatternStore {
    /// Identify a provider from a hostname or ASN description.
    pub fn identify_provider(&self, text: &str) -> Option<&'static str> {
        let text = text.to_lowercase();
        for (provider, tokens) in &self.provider_indicators {
            if tokens.iter().any(|token| text.contains(token)) {
                return Some(provider);
            }
        }
        None
    }

    /// Identify a provider from a bare ASN number.
    pub fn provider_for_asn(&self, asn: &str) -> Option<&'static str> {
        self.provider_asns
            .iter()
            .find(|(number, _)| *number == asn)
            .map(|(_, provider)| *provider)
    }

    /// First region whose pattern matches the hostname, in declared order.
    pub fn identify_region(&self, provider: &str, hostname: &str) -> Option<&'static str> {
        let hostname = hostname.to_lowercase();
        let (_, regions) = self
            .region_patterns
            .iter()
            .find(|(p, _)| *p == provider)?;
        for (region, patterns) in regions {
            if patterns.iter().any(|re| re.is_match(&hostname)) {
                return Some(region);
            }
        }
        None
    }

    pub fn region_for_country(&self, provider: &str, country: &str) -> Option<&'static str> {
        let country = country.to_uppercase();
        let (_, table) = self
            .country_to_region
            .iter()
            .find(|(p, _)| *p == provider)?;
        table
            .iter()
            .find(|(cc, _)| *cc == country)
            .map(|(_, region)| *region)
    }

    /// Match city/geo tokens against a free-form location string.
    pub fn region_for_location(&self, provider: &str, location_text: &str) -> Option<&'static str> {
        let location_text = location_text.to_lowercase();
        let (_, table) = self
            .location_to_region
            .iter()
            .find(|(p, _)| *p == provider)?;
        table
            .iter()
            .find(|(token, _)| location_text.contains(token))
            .map(|(_, region)| *region)
    }

    pub fn is_cdn_asn(&self, asn: &str) -> bool {
        self.cdn_asns.contains(&asn)
    }

    pub fn has_cdn_org_token(&self, org: &str) -> bool {
        let org = org.to_lowercase();
        self.cdn_org_tokens.iter().any(|token| org.contains(token))
    }

    pub fn akamai_iata_codes(&self) -> &[&'static str] {
        &self.akamai_iata
    }

    pub fn providers_with_regions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.region_patterns.iter().map(|(p, _)| *p)
    }

    #[cfg(test)]
    fn region_ids(&self, provider: &str) -> Vec<&'static str> {
        self.region_patterns
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, regions)| regions.iter().map(|(r, _)| *r).collect())
            .unwrap_or_default()
    }

    fn builtin() -> Self {
        Self {
            provider_indicators: vec![
                ("aws", vec!["amazonaws.com", "aws.com", "cloudfront", "ec2", "amazon", "aws"]),
                ("gcp", vec![
                    "googleapis.com", "googleusercontent.com", "1e100.net", "googlers.com",
                    "google", "gcp",
                ]),
                ("azure", vec!["azureedge.net", "azure.com", "microsoft.com", "azure", "microsoft", "msft"]),
                ("ovh", vec![
                    "ovh.net", "ovh.com", "ovh.fr", "kimsufi.com", "soyoustart.com",
                    "gra-g", "rbx-", "sbg-", "bhs-", "ovh", "kimsufi", "soyoustart",
                ]),
                ("cloudflare", vec!["cloudflare.com", "cloudflare.net", "cf-dns.com", "cloudflare"]),
                ("akamai", vec![
                    "akamaitechnologies.com", "akamaiedge.net", "akamai.com", "akamai.net",
                    "akam.net", "akamai",
                ]),
                ("hetzner", vec!["hetzner.de", "hetzner.com", "your-server.de", "hetzner"]),
                ("digitalocean", vec!["digitalocean.com", "digitalocean", "digital ocean"]),
                ("github", vec!["github.com", "github.io", "githubassets.com", "github"]),
            ],
            provider_asns: vec![
                ("13335", "cloudflare"),
                ("16509", "aws"),
                ("14618", "aws"),
                ("16625", "akamai"),
                ("20940", "akamai"),
                ("15169", "gcp"),
                ("396982", "gcp"),
                ("8075", "azure"),
                ("16276", "ovh"),
                ("36459", "github"),
                ("24940", "hetzner"),
                ("14061", "digitalocean"),
            ],
            region_patterns: vec![
                ("aws", vec![
                    ("us-east-1", compile(&[r"us-east-1", r"iad\d*", r"virginia", r"use1"])),
                    ("us-east-2", compile(&[r"us-east-2", r"cmh\d*", r"ohio", r"use2"])),
                    ("us-west-1", compile(&[r"us-west-1", r"sfo\d*", r"california", r"usw1"])),
                    ("us-west-2", compile(&[r"us-west-2", r"pdx\d*", r"oregon", r"usw2"])),
                    ("eu-west-1", compile(&[r"eu-west-1", r"dub\d*", r"ireland", r"euw1"])),
                    ("eu-west-2", compile(&[r"eu-west-2", r"lhr\d*", r"london", r"euw2"])),
                    ("eu-west-3", compile(&[r"eu-west-3", r"cdg\d*", r"paris", r"euw3"])),
                    ("eu-central-1", compile(&[r"eu-central-1", r"fra\d*", r"frankfurt", r"euc1"])),
                    ("ap-southeast-1", compile(&[r"ap-southeast-1", r"sin\d*", r"singapore", r"apse1"])),
                    ("ap-southeast-2", compile(&[r"ap-southeast-2", r"syd\d*", r"sydney", r"apse2"])),
                    ("ap-northeast-1", compile(&[r"ap-northeast-1", r"nrt\d*", r"tokyo", r"apne1"])),
                    ("ap-northeast-2", compile(&[r"ap-northeast-2", r"icn\d*", r"seoul", r"apne2"])),
                    ("ap-south-1", compile(&[r"ap-south-1", r"bom\d*", r"mumbai", r"aps1"])),
                    ("ca-central-1", compile(&[r"ca-central-1", r"yul\d*", r"montreal", r"cac1"])),
                    ("sa-east-1", compile(&[r"sa-east-1", r"gru\d*", r"sao.paulo", r"sae1"])),
                ]),
                ("gcp", vec![
                    ("us-central1", compile(&[r"us-central1", r"uc1", r"iowa", r"central"])),
                    ("us-east1", compile(&[r"us-east1", r"ue1", r"south.carolina", r"eastern"])),
                    ("us-west1", compile(&[r"us-west1", r"uw1", r"oregon", r"western"])),
                    ("us-west2", compile(&[r"us-west2", r"uw2", r"los.angeles"])),
                    ("us-west3", compile(&[r"us-west3", r"uw3", r"salt.lake"])),
                    ("us-west4", compile(&[r"us-west4", r"uw4", r"las.vegas"])),
                    ("europe-west1", compile(&[r"europe-west1", r"ew1", r"belgium", r"st.ghislain"])),
                    ("europe-west2", compile(&[r"europe-west2", r"ew2", r"london", r"lhr\d*"])),
                    ("europe-west3", compile(&[r"europe-west3", r"ew3", r"frankfurt", r"fra\d*"])),
                    ("europe-west4", compile(&[r"europe-west4", r"ew4", r"netherlands", r"eemshaven", r"ams\d*"])),
                    ("europe-west9", compile(&[r"europe-west9", r"ew9", r"paris", r"par\d+s\d+", r"cdg\d*"])),
                    ("asia-southeast1", compile(&[r"asia-southeast1", r"as1", r"singapore", r"sin\d*"])),
                    ("asia-northeast1", compile(&[r"asia-northeast1", r"an1", r"tokyo", r"nrt\d*"])),
                    ("asia-northeast3", compile(&[r"asia-northeast3", r"an3", r"seoul", r"icn\d*"])),
                    ("asia-south1", compile(&[r"asia-south1", r"as1-in", r"mumbai", r"bom\d*"])),
                    ("northamerica-northeast1", compile(&[r"northamerica-northeast1", r"nane1", r"montreal", r"yul\d*"])),
                    ("australia-southeast1", compile(&[r"australia-southeast1", r"ause1", r"sydney", r"syd\d*"])),
                    ("southamerica-east1", compile(&[r"southamerica-east1", r"sae1", r"sao.paulo", r"gru\d*"])),
                ]),
                ("azure", vec![
                    ("eastus2", compile(&[r"eastus2", r"east.us.2", r"virginia2"])),
                    ("eastus", compile(&[r"eastus", r"east.us", r"virginia"])),
                    ("westus2", compile(&[r"westus2", r"west.us.2", r"washington"])),
                    ("westus", compile(&[r"westus", r"west.us", r"california"])),
                    ("northeurope", compile(&[r"northeurope", r"north.europe", r"ireland"])),
                    ("westeurope", compile(&[r"westeurope", r"west.europe", r"netherlands"])),
                    ("uksouth", compile(&[r"uksouth", r"uk.south", r"london"])),
                    ("francecentral", compile(&[r"francecentral", r"france.central", r"paris"])),
                    ("germanywestcentral", compile(&[r"germanywestcentral", r"germany.west", r"frankfurt"])),
                    ("eastasia", compile(&[r"eastasia", r"east.asia", r"hong.kong"])),
                    ("southeastasia", compile(&[r"southeastasia", r"southeast.asia", r"singapore"])),
                    ("japaneast", compile(&[r"japaneast", r"japan.east", r"tokyo"])),
                    ("koreacentral", compile(&[r"koreacentral", r"korea.central", r"seoul"])),
                    ("centralindia", compile(&[r"centralindia", r"central.india", r"pune"])),
                    ("canadacentral", compile(&[r"canadacentral", r"canada.central", r"toronto"])),
                    ("australiaeast", compile(&[r"australiaeast", r"australia.east", r"sydney"])),
                    ("brazilsouth", compile(&[r"brazilsouth", r"brazil.south", r"sao.paulo"])),
                ]),
                ("ovh", vec![
                    ("gra9", compile(&[r"gra9", r"gravelines9"])),
                    ("gra7", compile(&[r"gra\d*", r"gravelines", r"\.gra-", r"gra-g\d+"])),
                    ("rbx8", compile(&[r"rbx\d*", r"roubaix", r"\.rbx-"])),
                    ("sbg5", compile(&[r"sbg\d*", r"strasbourg", r"\.sbg-"])),
                    ("bhs5", compile(&[r"bhs\d*", r"beauharnois", r"montreal", r"\.bhs-"])),
                    ("waw1", compile(&[r"waw\d*", r"warsaw", r"poland", r"\.waw-"])),
                    ("lon1", compile(&[r"lon\d*", r"london", r"\.lon-"])),
                    ("fra1", compile(&[r"fra\d*", r"frankfurt", r"\.fra-"])),
                    ("sin1", compile(&[r"sin\d*", r"singapore", r"\.sin-"])),
                    ("syd1", compile(&[r"syd\d*", r"sydney", r"australia", r"\.syd-"])),
                    ("us-east-va-1", compile(&[r"us-east-va", r"vin\d*", r"virginia", r"ashburn"])),
                ]),
                ("cloudflare", vec![
                    ("ams", compile(&[r"ams\d*", r"amsterdam"])),
                    ("atl", compile(&[r"atl\d*", r"atlanta"])),
                    ("bom", compile(&[r"bom\d*", r"mumbai"])),
                    ("cdg", compile(&[r"cdg\d*", r"paris"])),
                    ("dfw", compile(&[r"dfw\d*", r"dallas"])),
                    ("fra", compile(&[r"fra\d*", r"frankfurt"])),
                    ("iad", compile(&[r"iad\d*", r"washington", r"ashburn"])),
                    ("lax", compile(&[r"lax\d*", r"los.angeles"])),
                    ("lhr", compile(&[r"lhr\d*", r"london"])),
                    ("nrt", compile(&[r"nrt\d*", r"tokyo"])),
                    ("ord", compile(&[r"ord\d*", r"chicago"])),
                    ("sea", compile(&[r"sea\d*", r"seattle"])),
                    ("sin", compile(&[r"sin\d*", r"singapore"])),
                    ("syd", compile(&[r"syd\d*", r"sydney"])),
                ]),
                ("akamai", vec![
                    ("ams", compile(&[r"ams\d*", r"amsterdam"])),
                    ("atl", compile(&[r"atl\d*", r"atlanta"])),
                    ("bos", compile(&[r"bos\d*", r"boston"])),
                    ("cdg", compile(&[r"cdg\d*", r"paris"])),
                    ("dfw", compile(&[r"dfw\d*", r"dallas"])),
                    ("fra", compile(&[r"fra\d*", r"frankfurt"])),
                    ("lax", compile(&[r"lax\d*", r"los.angeles"])),
                    ("lhr", compile(&[r"lhr\d*", r"london"])),
                    ("mia", compile(&[r"mia\d*", r"miami"])),
                    ("nrt", compile(&[r"nrt\d*", r"tokyo"])),
                    ("ord", compile(&[r"ord\d*", r"chicago"])),
                    ("sea", compile(&[r"sea\d*", r"seattle"])),
                    ("sin", compile(&[r"sin\d*", r"singapore"])),
                    ("syd", compile(&[r"syd\d*", r"sydney"])),
                ]),
                ("hetzner", vec![
                    ("fsn1", compile(&[r"fsn\d*", r"falkenstein"])),
                    ("nbg1", compile(&[r"nbg\d*", r"nuremberg"])),
                    ("hel1", compile(&[r"hel\d*", r"helsinki"])),
                    ("ash", compile(&[r"ash\d*", r"ashburn"])),
                    ("hil", compile(&[r"hil\d*", r"hillsboro"])),
                ]),
                ("digitalocean", vec![
                    ("nyc1", compile(&[r"nyc\d*", r"new-york"])),
                    ("sfo3", compile(&[r"sfo\d*", r"san-francisco"])),
                    ("ams3", compile(&[r"ams\d*", r"amsterdam"])),
                    ("sgp1", compile(&[r"sgp\d*", r"singapore"])),
                    ("lon1", compile(&[r"lon\d*", r"london"])),
                    ("fra1", compile(&[r"fra\d*", r"frankfurt"])),
                    ("tor1", compile(&[r"tor\d*", r"toronto"])),
                    ("blr1", compile(&[r"blr\d*", r"bangalore"])),
                ]),
                ("github", vec![
                    ("fra", compile(&[r"fra", r"frankfurt", r"de-cix\.fra", r"\.fra\.github", r"-fra\.github"])),
                    ("sea", compile(&[r"sea", r"seattle"])),
                    ("iad", compile(&[r"iad", r"ashburn", r"washington"])),
                    ("sjc", compile(&[r"sjc", r"san-jose"])),
                    ("lhr", compile(&[r"lhr", r"london"])),
                    ("sin", compile(&[r"sin", r"singapore"])),
                ]),
            ],
            country_to_region: vec![
                ("aws", vec![
                    ("US", "us-east-1"),
                    ("IE", "eu-west-1"),
                    ("GB", "eu-west-2"),
                    ("FR", "eu-west-3"),
                    ("DE", "eu-central-1"),
                    ("SG", "ap-southeast-1"),
                    ("JP", "ap-northeast-1"),
                    ("CA", "ca-central-1"),
                    ("AU", "ap-southeast-2"),
                    ("BR", "sa-east-1"),
                    ("KR", "ap-northeast-2"),
                    ("IN", "ap-south-1"),
                ]),
                ("gcp", vec![
                    ("US", "us-central1"),
                    ("BE", "europe-west1"),
                    ("GB", "europe-west2"),
                    ("DE", "europe-west3"),
                    ("NL", "europe-west4"),
                    ("FR", "europe-west9"),
                    ("SG", "asia-southeast1"),
                    ("JP", "asia-northeast1"),
                    ("KR", "asia-northeast3"),
                    ("IN", "asia-south1"),
                    ("CA", "northamerica-northeast1"),
                    ("AU", "australia-southeast1"),
                    ("BR", "southamerica-east1"),
                ]),
                ("azure", vec![
                    ("US", "eastus"),
                    ("IE", "northeurope"),
                    ("NL", "westeurope"),
                    ("FR", "francecentral"),
                    ("DE", "germanywestcentral"),
                    ("HK", "eastasia"),
                    ("SG", "southeastasia"),
                    ("GB", "uksouth"),
                    ("CA", "canadacentral"),
                    ("AU", "australiaeast"),
                    ("BR", "brazilsouth"),
                    ("KR", "koreacentral"),
                    ("IN", "centralindia"),
                    ("JP", "japaneast"),
                ]),
                ("ovh", vec![
                    ("FR", "gra7"),
                    ("DE", "fra1"),
                    ("GB", "lon1"),
                    ("CA", "bhs5"),
                    ("PL", "waw1"),
                    ("SG", "sin1"),
                    ("AU", "syd1"),
                    ("US", "us-east-va-1"),
                ]),
                ("digitalocean", vec![
                    ("US", "nyc1"),
                    ("NL", "ams3"),
                    ("GB", "lon1"),
                    ("DE", "fra1"),
                    ("SG", "sgp1"),
                    ("CA", "tor1"),
                    ("IN", "blr1"),
                ]),
                ("hetzner", vec![
                    ("DE", "fsn1"),
                    ("FI", "hel1"),
                    ("US", "ash"),
                ]),
                ("cloudflare", vec![
                    ("US", "iad"),
                    ("GB", "lhr"),
                    ("DE", "fra"),
                    ("SG", "sin"),
                    ("FR", "cdg"),
                    ("NL", "ams"),
                    ("JP", "nrt"),
                ]),
            ],
            location_to_region: vec![
                ("aws", vec![
                    ("virginia", "us-east-1"),
                    ("ohio", "us-east-2"),
                    ("california", "us-west-1"),
                    ("oregon", "us-west-2"),
                    ("ireland", "eu-west-1"),
                    ("london", "eu-west-2"),
                    ("paris", "eu-west-3"),
                    ("frankfurt", "eu-central-1"),
                    ("singapore", "ap-southeast-1"),
                    ("tokyo", "ap-northeast-1"),
                    ("sydney", "ap-southeast-2"),
                    ("seoul", "ap-northeast-2"),
                    ("mumbai", "ap-south-1"),
                    ("toronto", "ca-central-1"),
                    ("canada", "ca-central-1"),
                    ("sao paulo", "sa-east-1"),
                ]),
                ("gcp", vec![
                    ("iowa", "us-central1"),
                    ("south carolina", "us-east1"),
                    ("oregon", "us-west1"),
                    ("los angeles", "us-west2"),
                    ("salt lake", "us-west3"),
                    ("las vegas", "us-west4"),
                    ("belgium", "europe-west1"),
                    ("london", "europe-west2"),
                    ("frankfurt", "europe-west3"),
                    ("eemshaven", "europe-west4"),
                    ("netherlands", "europe-west4"),
                    ("paris", "europe-west9"),
                    ("singapore", "asia-southeast1"),
                    ("tokyo", "asia-northeast1"),
                    ("seoul", "asia-northeast3"),
                    ("mumbai", "asia-south1"),
                    ("sydney", "australia-southeast1"),
                    ("montreal", "northamerica-northeast1"),
                    ("sao paulo", "southamerica-east1"),
                ]),
                ("azure", vec![
                    ("virginia", "eastus"),
                    ("washington", "westus2"),
                    ("california", "westus"),
                    ("ireland", "northeurope"),
                    ("netherlands", "westeurope"),
                    ("london", "uksouth"),
                    ("paris", "francecentral"),
                    ("frankfurt", "germanywestcentral"),
                    ("hong kong", "eastasia"),
                    ("singapore", "southeastasia"),
                    ("tokyo", "japaneast"),
                    ("seoul", "koreacentral"),
                    ("mumbai", "centralindia"),
                    ("toronto", "canadacentral"),
                    ("sydney", "australiaeast"),
                    ("sao paulo", "brazilsouth"),
                ]),
                ("ovh", vec![
                    ("gravelines", "gra7"),
                    ("roubaix", "rbx8"),
                    ("strasbourg", "sbg5"),
                    ("beauharnois", "bhs5"),
                    ("montreal", "bhs5"),
                    ("warsaw", "waw1"),
                    ("london", "lon1"),
                    ("frankfurt", "fra1"),
                    ("singapore", "sin1"),
                    ("sydney", "syd1"),
                    ("virginia", "us-east-va-1"),
                    ("ashburn", "us-east-va-1"),
                ]),
                ("digitalocean", vec![
                    ("new york", "nyc1"),
                    ("san francisco", "sfo3"),
                    ("amsterdam", "ams3"),
                    ("singapore", "sgp1"),
                    ("london", "lon1"),
                    ("frankfurt", "fra1"),
                    ("toronto", "tor1"),
                    ("bangalore", "blr1"),
                ]),
                ("hetzner", vec![
                    ("falkenstein", "fsn1"),
                    ("nuremberg", "nbg1"),
                    ("helsinki", "hel1"),
                    ("ashburn", "ash"),
                    ("hillsboro", "hil"),
                ]),
                ("cloudflare", vec![
                    ("amsterdam", "ams"),
                    ("atlanta", "atl"),
                    ("mumbai", "bom"),
                    ("paris", "cdg"),
                    ("dallas", "dfw"),
                    ("frankfurt", "fra"),
                    ("washington", "iad"),
                    ("ashburn", "iad"),
                    ("los angeles", "lax"),
                    ("london", "lhr"),
                    ("tokyo", "nrt"),
                    ("chicago", "ord"),
                    ("seattle", "sea"),
                    ("singapore", "sin"),
                    ("sydney", "syd"),
                ]),
            ],
            cdn_org_tokens: vec![
                "cloudflare", "akamai", "fastly", "cdn", "amazon", "aws", "microsoft",
                "azure", "google", "gcp", "limelight", "edgecast", "stackpath", "keycdn",
                "cloudfront",
            ],
            cdn_asns: vec![
                "13335", // Cloudflare
                "16625", // Akamai
                "20940", // Akamai International
                "54113", // Fastly
                "16509", // AWS
                "8075",  // Microsoft
                "15169", // Google
                "15133", // Edgecast
            ],
            akamai_iata: vec![
                "ams", "atl", "bos", "cdg", "dfw", "fra", "lax", "lhr", "mia", "nrt",
                "ord", "sea", "sin", "syd",
            ],
            org_country_tokens: vec![
                ("US", vec!["united states", "usa", ", us"]),
                ("GB", vec!["united kingdom", ", gb"]),
                ("DE", vec!["germany", "deutschland", ", de"]),
                ("FR", vec!["france", ", fr"]),
                ("NL", vec!["netherlands", "holland", ", nl"]),
                ("CA", vec!["canada", ", ca"]),
                ("AU", vec!["australia", ", au"]),
                ("JP", vec!["japan", ", jp"]),
                ("CN", vec!["china", ", cn"]),
                ("IN", vec!["india", ", in"]),
                ("BR", vec!["brazil", ", br"]),
                ("RU", vec!["russia", ", ru"]),
                ("KR", vec!["korea", ", kr"]),
                ("SG", vec!["singapore", ", sg"]),
                ("IT", vec!["italy", ", it"]),
                ("ES", vec!["spain", ", es"]),
                ("CH", vec!["switzerland", ", ch"]),
                ("SE", vec!["sweden", ", se"]),
                ("NO", vec!["norway", ", no"]),
                ("DK", vec!["denmark", ", dk"]),
                ("FI", vec!["finland", ", fi"]),
                ("IE", vec!["ireland", ", ie"]),
                ("AT", vec!["austria", ", at"]),
                ("BE", vec!["belgium", ", be"]),
                ("PT", vec!["portugal", ", pt"]),
                ("GR", vec!["greece", ", gr"]),
                ("CZ", vec!["czech", ", cz"]),
                ("PL", vec!["poland", ", pl"]),
                ("HU", vec!["hungary", ", hu"]),
                ("RO", vec!["romania", ", ro"]),
                ("BG", vec!["bulgaria", ", bg"]),
                ("HR", vec!["croatia", ", hr"]),
                ("SI", vec!["slovenia", ", si"]),
                ("SK", vec!["slovakia", ", sk"]),
                ("LT", vec!["lithuania", ", lt"]),
                ("LV", vec!["latvia", ", lv"]),
                ("EE", vec!["estonia", ", ee"]),
            ],
        }
    }
}

/// Deduce a country from an ASN organisation string ("OVH SAS, FR" => FR).
pub fn country_from_org(org: &str) -> Option<String> {
    let org = org.to_lowercase();
    for (country, tokens) in &PATTERNS.org_country_tokens {
        if tokens.iter().any(|token| org.contains(token)) {
            return Some((*country).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_region_ids_unique_per_provider() {
        for provider in PATTERNS.providers_with_regions() {
            let ids = PATTERNS.region_ids(provider);
            let unique: HashSet<_> = ids.iter().collect();
            assert_eq!(ids.len(), unique.len(), "duplicate region for {provider}");
        }
    }

    #[test]
    fn test_country_regions_exist_in_pattern_table() {
        for (provider, table) in &PATTERNS.country_to_region {
            let ids = PATTERNS.region_ids(provider);
            for (country, region) in table {
                assert!(
                    ids.contains(region),
                    "{provider}/{country} maps to unknown region {region}"
                );
            }
        }
    }

    #[test]
    fn test_location_regions_exist_in_pattern_table() {
        for (provider, table) in &PATTERNS.location_to_region {
            let ids = PATTERNS.region_ids(provider);
            for (token, region) in table {
                assert!(
                    ids.contains(region),
                    "{provider}/{token} maps to unknown region {region}"
                );
            }
        }
    }

    #[test]
    fn test_identify_provider_from_hostname() {
        assert_eq!(PATTERNS.identify_provider("ec2-52-1-1-1.compute-1.amazonaws.com"), Some("aws"));
        assert_eq!(PATTERNS.identify_provider("ae-66-ae3.edge7.fra.github.com"), Some("github"));
        assert_eq!(
            PATTERNS.identify_provider("a104-16-1-1.deploy.static.akamaitechnologies.com"),
            Some("akamai")
        );
        assert_eq!(PATTERNS.identify_provider("core1.example.net"), None);
    }

    #[test]
    fn test_identify_provider_from_org() {
        assert_eq!(PATTERNS.identify_provider("OVH SAS"), Some("ovh"));
        assert_eq!(PATTERNS.identify_provider("CLOUDFLARENET - Cloudflare, Inc."), Some("cloudflare"));
        assert_eq!(PATTERNS.identify_provider("Hetzner Online GmbH"), Some("hetzner"));
    }

    #[test]
    fn test_provider_for_asn() {
        assert_eq!(PATTERNS.provider_for_asn("16276"), Some("ovh"));
        assert_eq!(PATTERNS.provider_for_asn("36459"), Some("github"));
        assert_eq!(PATTERNS.provider_for_asn("64512"), None);
    }

    #[test]
    fn test_identify_region_first_match_wins() {
        // gra9 is declared before the catch-all gra pattern
        assert_eq!(PATTERNS.identify_region("ovh", "host.gra9.ovh.net"), Some("gra9"));
        assert_eq!(PATTERNS.identify_region("ovh", "host.gra7.ovh.net"), Some("gra7"));
        assert_eq!(PATTERNS.identify_region("ovh", "be102.rbx-g1-nc5.fr.eu"), Some("rbx8"));
        assert_eq!(
            PATTERNS.identify_region("github", "ae-66-ae3.edge7.fra.github.com"),
            Some("fra")
        );
        assert_eq!(PATTERNS.identify_region("aws", "server.eu-west-3.amazonaws.com"), Some("eu-west-3"));
        assert_eq!(PATTERNS.identify_region("ovh", "nothing-here.example"), None);
    }

    #[test]
    fn test_region_for_country() {
        assert_eq!(PATTERNS.region_for_country("ovh", "FR"), Some("gra7"));
        assert_eq!(PATTERNS.region_for_country("ovh", "fr"), Some("gra7"));
        assert_eq!(PATTERNS.region_for_country("aws", "DE"), Some("eu-central-1"));
        assert_eq!(PATTERNS.region_for_country("cloudflare", "JP"), Some("nrt"));
        assert_eq!(PATTERNS.region_for_country("github", "US"), None);
    }

    #[test]
    fn test_region_for_location() {
        assert_eq!(PATTERNS.region_for_location("gcp", "Ile-de-France Paris"), Some("europe-west9"));
        assert_eq!(PATTERNS.region_for_location("hetzner", "Saxony Falkenstein"), Some("fsn1"));
        assert_eq!(PATTERNS.region_for_location("aws", "Nowhere"), None);
    }

    #[test]
    fn test_cdn_hints() {
        assert!(PATTERNS.is_cdn_asn("13335"));
        assert!(PATTERNS.is_cdn_asn("15133"));
        assert!(!PATTERNS.is_cdn_asn("64512"));
        assert!(PATTERNS.has_cdn_org_token("Edgecast Inc."));
        assert!(PATTERNS.has_cdn_org_token("Fastly, Inc."));
        assert!(!PATTERNS.has_cdn_org_token("Some Regular Hosting"));
    }

    #[test]
    fn test_country_from_org() {
        assert_eq!(country_from_org("OVH SAS, FR"), Some("FR".to_string()));
        assert_eq!(country_from_org("Hetzner Online GmbH, Germany"), Some("DE".to_string()));
        assert_eq!(country_from_org("Opaque Networks"), None);
    }
}
