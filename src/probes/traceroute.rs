//! Traceroute driver: shells out to mtr/traceroute/tracert and parses the
//! hop chain.
//!
//! Invocation order is mtr IPv4, mtr IPv6, then the platform traceroute;
//! the first tool producing at least one usable hop wins. Hop entries that
//! remain bare IPs after filtering get a reverse-DNS attempt so downstream
//! pattern matching sees PTR names where possible. Missing tooling is not an
//! error: the driver simply returns an empty hop list.

use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use cidr::Ipv4Cidr;
use hickory_resolver::TokioResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::PRIVATE_IPV4_RANGES;

const MTR_TIMEOUT: Duration = Duration::from_secs(60);
const TRACEROUTE_TIMEOUT: Duration = Duration::from_secs(30);
const RDNS_TIMEOUT: Duration = Duration::from_secs(5);
const MTR_REPORT_CYCLES: &str = "10";

/// Seam between the Region Engine and the subprocess fan-out; absence of all
/// tooling degrades the engine gracefully instead of failing it.
#[async_trait]
pub trait HopSource: Send + Sync {
    /// Ordered, deduplicated hop chain towards `target`.
    async fn hops(&self, target: &str, max_ttl: u32) -> Vec<String>;
}

pub struct TracerouteDriver {
    resolver: Arc<TokioResolver>,
}

impl TracerouteDriver {
    pub fn new(resolver: Arc<TokioResolver>) -> Self {
        Self { resolver }
    }

    async fn run_mtr(&self, target: &str, max_ttl: u32, ipv6: bool) -> Vec<String> {
        let family = if ipv6 { "-6" } else { "-4" };
        let ttl = max_ttl.to_string();
        let args = [
            family,
            "--report",
            "--report-cycles",
            MTR_REPORT_CYCLES,
            "--max-ttl",
            &ttl,
            "-b",
            target,
        ];

        let output = match run_command("mtr", &args, MTR_TIMEOUT).await {
            Ok(output) => output,
            Err(e) => {
                debug!("mtr {} failed for {}: {}", family, target, e);
                return Vec::new();
            }
        };

        if output.status.success() {
            return parse_mtr_output(&String::from_utf8_lossy(&output.stdout));
        }

        // Raw sockets may need elevation depending on the runtime user.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if cfg!(unix) && needs_elevation(&stderr) {
            debug!("Retrying mtr with sudo for {}", target);
            let mut sudo_args = vec!["mtr"];
            sudo_args.extend_from_slice(&args);
            if let Ok(output) = run_command("sudo", &sudo_args, MTR_TIMEOUT).await {
                if output.status.success() {
                    return parse_mtr_output(&String::from_utf8_lossy(&output.stdout));
                }
            }
        }

        debug!("mtr {} exited with {} for {}", family, output.status, target);
        Vec::new()
    }

    async fn run_platform_traceroute(&self, target: &str, max_ttl: u32) -> Vec<String> {
        let ttl = max_ttl.to_string();
        if cfg!(windows) {
            match run_command("tracert", &["-h", &ttl, "-w", "3000", target], TRACEROUTE_TIMEOUT)
                .await
            {
                Ok(output) if output.status.success() => {
                    parse_tracert_output(&String::from_utf8_lossy(&output.stdout))
                }
                Ok(output) => {
                    debug!("tracert exited with {} for {}", output.status, target);
                    Vec::new()
                }
                Err(e) => {
                    debug!("tracert failed for {}: {}", target, e);
                    Vec::new()
                }
            }
        } else {
            match run_command("traceroute", &["-m", &ttl, "-w", "3", target], TRACEROUTE_TIMEOUT)
                .await
            {
                Ok(output) if output.status.success() => {
                    parse_traceroute_output(&String::from_utf8_lossy(&output.stdout))
                }
                Ok(output) => {
                    debug!("traceroute exited with {} for {}", output.status, target);
                    Vec::new()
                }
                Err(e) => {
                    debug!("traceroute failed for {}: {}", target, e);
                    Vec::new()
                }
            }
        }
    }

    /// Reverse-resolve hop entries that are still bare IPs; keep the IP when
    /// no PTR record exists so range analysis can still work on it.
    async fn reverse_resolve(&self, entry: String) -> String {
        let Ok(ip) = entry.parse::<IpAddr>() else {
            return entry;
        };
        match tokio::time::timeout(RDNS_TIMEOUT, self.resolver.reverse_lookup(ip)).await {
            Ok(Ok(lookup)) => match lookup.iter().next() {
                Some(ptr) => {
                    let name = ptr.0.to_string();
                    let name = name.strip_suffix('.').unwrap_or(&name).to_lowercase();
                    if name.contains('.') { name } else { entry }
                }
                None => entry,
            },
            _ => entry,
        }
    }
}

#[async_trait]
impl HopSource for TracerouteDriver {
    async fn hops(&self, target: &str, max_ttl: u32) -> Vec<String> {
        let mut raw = self.run_mtr(target, max_ttl, false).await;
        if raw.is_empty() {
            raw = self.run_mtr(target, max_ttl, true).await;
        }
        if raw.is_empty() {
            raw = self.run_platform_traceroute(target, max_ttl).await;
        }
        if raw.is_empty() {
            warn!("No traceroute tooling produced hops for {}", target);
            return Vec::new();
        }

        let mut hops = Vec::new();
        for entry in raw.into_iter().filter(|e| is_usable_hop(e)) {
            let resolved = self.reverse_resolve(entry).await;
            if !hops.contains(&resolved) {
                hops.push(resolved);
            }
        }
        debug!("Traceroute to {} yielded {} hops", target, hops.len());
        hops
    }
}

/// Spawn with piped output and a hard ceiling. `kill_on_drop` reaps the
/// child on the timeout path; `wait_with_output` drains both pipes on the
/// happy path.
async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<std::process::Output> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(anyhow::anyhow!("{} timed out after {:?}", program, timeout)),
    }
}

fn needs_elevation(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("permission denied")
        || stderr.contains("operation not permitted")
        || stderr.contains("raw socket")
}

// ─── Output parsers ────────────────────────────────────────

// Classic report line with both names:  "  2.|-- host.example.com (1.2.3.4)  0.0% ..."
static MTR_PAREN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\.\|--\s+(\S+)\s+\((\S+)\)").unwrap());
// Classic report line:                  "  2.|-- 192.0.2.1  0.0% ..."
static MTR_PLAIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\.\|--\s+(\S+)").unwrap());
// Modern report line:                   "  2. host.example.com  0.0% ..."
static MTR_MODERN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\.\s+(\S+)").unwrap());

/// Parse an mtr report, recognising the three line shapes in the wild.
pub fn parse_mtr_output(output: &str) -> Vec<String> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.contains("HOST:") || line.contains("Start:") {
            continue;
        }
        let entry = if let Some(captures) = MTR_PAREN_RE.captures(line) {
            Some(captures[1].to_string())
        } else if let Some(captures) = MTR_PLAIN_RE.captures(line) {
            Some(captures[1].to_string())
        } else {
            MTR_MODERN_RE.captures(line).map(|c| c[1].to_string())
        };
        if let Some(entry) = entry {
            entries.push(entry.to_lowercase());
        }
    }
    entries
}

// " 3  router.example.com (192.0.2.1)  10.123 ms ..."
static TRACEROUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\s+([A-Za-z0-9.:\-]+)\s+\(([0-9a-fA-F.:]+)\)").unwrap());
// "  3    10 ms     9 ms    10 ms  router.example.com [192.0.2.1]"
static TRACERT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([A-Za-z0-9.\-]+)\s+\[([0-9a-fA-F.:]+)\]").unwrap());

pub fn parse_traceroute_output(output: &str) -> Vec<String> {
    let mut entries = Vec::new();
    for line in output.lines() {
        if let Some(captures) = TRACEROUTE_RE.captures(line) {
            let host = captures[1].to_lowercase();
            if host != "*" && host.contains('.') {
                entries.push(host);
            }
        }
    }
    entries
}

pub fn parse_tracert_output(output: &str) -> Vec<String> {
    let mut entries = Vec::new();
    for line in output.lines() {
        if !line.trim_start().starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if let Some(captures) = TRACERT_RE.captures(line) {
            let host = captures[1].to_lowercase();
            if host != "*" && host.contains('.') {
                entries.push(host);
            }
        }
    }
    entries
}

// ─── Hop filters ───────────────────────────────────────────

static PRIVATE_V4: Lazy<Vec<Ipv4Cidr>> = Lazy::new(|| {
    PRIVATE_IPV4_RANGES
        .iter()
        .map(|range| range.parse().unwrap())
        .collect()
});

/// Drop timeouts, placeholders, private ranges and the local gateway
/// sentinel.
pub fn is_usable_hop(entry: &str) -> bool {
    if entry.is_empty()
        || entry == "???"
        || entry == "*"
        || entry == "0.0.0.0"
        || entry == "waiting"
        || entry.contains("bbox.lan")
    {
        return false;
    }
    if let Ok(ip) = entry.parse::<Ipv4Addr>() {
        return !PRIVATE_V4.iter().any(|cidr| cidr.contains(&ip));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const MTR_REPORT: &str = "\
Start: 2025-11-02T10:00:00+0000
HOST: probe-host                  Loss%   Snt   Last   Avg  Best  Wrst StDev
  1.|-- bbox.lan (192.168.1.254)   0.0%    10    1.0   1.0   1.0   1.0   0.0
  2.|-- 10.124.0.1                 0.0%    10    5.0   5.0   5.0   5.0   0.0
  3.|-- ae-66-ae3.edge7.fra.github.com (140.82.121.1)  0.0%  10  12.1  12.4  11.9  13.0  0.4
  4.|-- ???                       100.0    10    0.0   0.0   0.0   0.0   0.0
  5.|-- 140.82.121.4               0.0%    10   13.0  13.1  12.8  13.6   0.2
";

    #[test]
    fn test_parse_mtr_classic() {
        let entries = parse_mtr_output(MTR_REPORT);
        assert_eq!(
            entries,
            vec![
                "bbox.lan",
                "10.124.0.1",
                "ae-66-ae3.edge7.fra.github.com",
                "???",
                "140.82.121.4",
            ]
        );
    }

    #[test]
    fn test_parse_mtr_modern() {
        let output = "\
  1. router.local          0.0%    10    1.0   1.0   1.0   1.0   0.0
  2. core1.par.example.net 0.0%    10    8.0   8.0   8.0   8.0   0.0
";
        assert_eq!(
            parse_mtr_output(output),
            vec!["router.local", "core1.par.example.net"]
        );
    }

    #[test]
    fn test_parse_traceroute_unix() {
        let output = "\
traceroute to github.com (140.82.121.4), 15 hops max, 60 byte packets
 1  gateway (192.168.1.1)  0.512 ms  0.401 ms  0.388 ms
 2  core1.par.example.net (203.0.113.7)  4.1 ms  4.0 ms  4.2 ms
 3  * * *
";
        // "gateway" carries no dot and is dropped at parse time
        assert_eq!(parse_traceroute_output(output), vec!["core1.par.example.net"]);
    }

    #[test]
    fn test_parse_tracert_windows() {
        let output = "\
Tracing route to github.com [140.82.121.4]

  1     1 ms     1 ms     1 ms  gateway.home [192.168.1.1]
  2    10 ms     9 ms    10 ms  core1.par.example.net [203.0.113.7]
";
        assert_eq!(
            parse_tracert_output(output),
            vec!["gateway.home", "core1.par.example.net"]
        );
    }

    #[test]
    fn test_hop_filters() {
        assert!(!is_usable_hop("???"));
        assert!(!is_usable_hop("*"));
        assert!(!is_usable_hop("0.0.0.0"));
        assert!(!is_usable_hop("waiting"));
        assert!(!is_usable_hop("bbox.lan"));
        assert!(!is_usable_hop("10.0.0.1"));
        assert!(!is_usable_hop("172.16.4.1"));
        assert!(!is_usable_hop("192.168.1.254"));
        assert!(is_usable_hop("172.64.0.1")); // outside 172.16.0.0/12
        assert!(is_usable_hop("140.82.121.4"));
        assert!(is_usable_hop("ae-66-ae3.edge7.fra.github.com"));
    }

    #[test]
    fn test_elevation_detection() {
        assert!(needs_elevation("mtr: unable to get raw sockets.\n"));
        assert!(needs_elevation("Operation not permitted"));
        assert!(!needs_elevation("mtr: unknown host"));
    }
}
