//! Network probes: every external lookup the pipeline performs.
//!
//! Each probe exposes a small trait so the pipeline can be exercised with
//! canned answers; the live implementations are constructed once in the
//! composition root and shared behind `Arc`.

pub mod dns;
pub mod https;
pub mod traceroute;
pub mod whois_domain;
pub mod whois_ip;

pub use dns::{DnsProbe, DnsResolve, build_resolver};
pub use https::{HttpsCheck, HttpsProbe};
pub use traceroute::{HopSource, TracerouteDriver};
pub use whois_domain::{DomainWhois, DomainWhoisProbe};
pub use whois_ip::{IpWhois, IpWhoisInfo, IpWhoisProbe};
