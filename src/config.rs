//! JSON configuration, environment overrides and logging setup.

use std::fs;
use std::path::Path;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Default port for the metrics endpoint.
pub const DEFAULT_EXPORTER_PORT: u16 = 9105;
/// Default seconds between two collection iterations.
pub const DEFAULT_INTERVAL_SECONDS: u64 = 300;
/// Default per-HTTPS-probe timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
/// Minimum accepted collection interval.
pub const MIN_INTERVAL_SECONDS: u64 = 30;

// WHOIS infrastructure
pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";
pub const DEFAULT_WHOIS_PORT: u16 = 43;
pub const WHOIS_TIMEOUT_SECONDS: u64 = 10;

// RDAP / RIPEstat endpoints used by the IP WHOIS probe
pub const RDAP_IP_API_BASE: &str = "https://rdap.org/ip";
pub const RIPE_PREFIX_OVERVIEW_API: &str =
    "https://stat.ripe.net/data/prefix-overview/data.json";
pub const IP_API_BASE: &str = "http://ip-api.com/json";

// Private IP range definitions, dropped from traceroute hop lists
pub const PRIVATE_IPV4_RANGES: &[&str] = &[
    "10.0.0.0/8",     // RFC1918
    "172.16.0.0/12",  // RFC1918
    "192.168.0.0/16", // RFC1918
];

#[derive(Parser)]
#[command(author, version, about = "Douro - hosting infrastructure exporter")]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    pub config: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid environment override {name}: {value:?}")]
    BadEnvOverride { name: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub port: u16,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_EXPORTER_PORT,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub enable_verbose_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            enable_verbose_logging: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DouroConfig {
    #[serde(default)]
    pub exporter: ExporterConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

impl DouroConfig {
    /// Names of all enabled domains, in declaration order.
    pub fn enabled_domains(&self) -> Vec<String> {
        self.domains
            .iter()
            .filter(|d| d.enabled)
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn enabled_domain_count(&self) -> usize {
        self.domains.iter().filter(|d| d.enabled).count()
    }

    /// Port for the health endpoints: `DOURO_HEALTH_PORT` or exporter port + 1.
    pub fn health_port(&self) -> Result<u16, ConfigError> {
        match std::env::var("DOURO_HEALTH_PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::BadEnvOverride {
                name: "DOURO_HEALTH_PORT".to_string(),
                value,
            }),
            Err(_) => self.exporter.port.checked_add(1).ok_or_else(|| {
                ConfigError::Invalid(
                    "exporter.port leaves no room for the default health port".to_string(),
                )
            }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exporter.port == 0 {
            return Err(ConfigError::Invalid(
                "exporter.port must be between 1 and 65535".to_string(),
            ));
        }
        if self.exporter.interval_seconds < MIN_INTERVAL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "exporter.interval_seconds must be at least {MIN_INTERVAL_SECONDS}"
            )));
        }
        if self.exporter.timeout_seconds < 1 {
            return Err(ConfigError::Invalid(
                "exporter.timeout_seconds must be at least 1".to_string(),
            ));
        }
        const VALID_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
        if !VALID_LEVELS.contains(&self.monitoring.log_level.to_uppercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "monitoring.log_level must be one of {VALID_LEVELS:?}"
            )));
        }
        for domain in &self.domains {
            if domain.name.is_empty() {
                return Err(ConfigError::Invalid(
                    "every domain needs a non-empty 'name'".to_string(),
                ));
            }
        }
        if self.domains.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one domain must be configured".to_string(),
            ));
        }
        if self.enabled_domain_count() == 0 {
            return Err(ConfigError::Invalid(
                "at least one domain must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load, override and validate the configuration.
///
/// `DOURO_CONFIG` takes precedence over the CLI path. Any failure here is
/// fatal at startup; runtime never reloads configuration.
pub fn load_config(config_path: &str) -> Result<DouroConfig, ConfigError> {
    let path = std::env::var("DOURO_CONFIG").unwrap_or_else(|_| config_path.to_string());

    if !Path::new(&path).exists() {
        return Err(ConfigError::NotFound(path));
    }
    let raw = fs::read_to_string(&path)
        .map_err(|e| ConfigError::Invalid(format!("cannot read {path}: {e}")))?;

    let mut config: DouroConfig = serde_json::from_str(&raw)?;
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn env_override<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::BadEnvOverride {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
}

fn apply_env_overrides(config: &mut DouroConfig) -> Result<(), ConfigError> {
    if let Some(port) = env_override("DOURO_EXPORTER_PORT")? {
        config.exporter.port = port;
    }
    if let Some(interval) = env_override("DOURO_EXPORTER_INTERVAL")? {
        config.exporter.interval_seconds = interval;
    }
    if let Some(timeout) = env_override("DOURO_EXPORTER_TIMEOUT")? {
        config.exporter.timeout_seconds = timeout;
    }
    if let Ok(level) = std::env::var("DOURO_LOG_LEVEL") {
        config.monitoring.log_level = level;
    }
    if let Some(verbose) = env_flag("DOURO_ENABLE_VERBOSE_LOGGING") {
        config.monitoring.enable_verbose_logging = verbose;
    }
    Ok(())
}

/// Initialise tracing from the monitoring configuration.
///
/// `DOURO_LOG_DIR` mirrors output into `<dir>/douro.log` while keeping the
/// console stream.
pub fn setup_logging(monitoring: &MonitoringConfig) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = match monitoring.log_level.to_uppercase().as_str() {
        "DEBUG" => tracing::Level::DEBUG,
        "WARNING" => tracing::Level::WARN,
        "ERROR" | "CRITICAL" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level);
    let verbose = monitoring.enable_verbose_logging;

    let console = tracing_subscriber::fmt::layer()
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = match std::env::var("DOURO_LOG_DIR") {
        Ok(dir) => {
            fs::create_dir_all(&dir)?;
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(&dir).join("douro.log"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_file(verbose)
                    .with_line_number(verbose)
                    .with_writer(std::sync::Arc::new(file)),
            )
        }
        Err(_) => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
    Ok(())
}

/// Log a one-line-per-item summary of the validated configuration.
pub fn log_config_summary(config: &DouroConfig) {
    info!("Configuration validated:");
    info!("  - port: {}", config.exporter.port);
    info!("  - interval: {}s", config.exporter.interval_seconds);
    info!("  - timeout: {}s", config.exporter.timeout_seconds);
    info!("  - domains configured: {}", config.domain_count());
    info!("  - domains enabled: {}", config.enabled_domain_count());
    info!("  - domains: {}", config.enabled_domains().join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_full_config() {
        let file = write_config(
            r#"{
                "exporter": {"port": 9200, "interval_seconds": 60, "timeout_seconds": 5},
                "monitoring": {"log_level": "DEBUG", "enable_verbose_logging": true},
                "domains": [
                    {"name": "example.com", "description": "primary"},
                    {"name": "example.org", "enabled": false}
                ]
            }"#,
        );
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.exporter.port, 9200);
        assert_eq!(config.exporter.interval_seconds, 60);
        assert_eq!(config.monitoring.log_level, "DEBUG");
        assert_eq!(config.domain_count(), 2);
        assert_eq!(config.enabled_domains(), vec!["example.com".to_string()]);
        assert_eq!(config.health_port().unwrap(), 9201);
    }

    #[test]
    fn test_defaults_applied() {
        let file = write_config(r#"{"domains": [{"name": "example.com"}]}"#);
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.exporter.port, DEFAULT_EXPORTER_PORT);
        assert_eq!(config.exporter.interval_seconds, DEFAULT_INTERVAL_SECONDS);
        assert_eq!(config.exporter.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert!(!config.monitoring.enable_verbose_logging);
        assert!(config.domains[0].enabled);
    }

    #[test]
    fn test_minimum_interval_boundary() {
        let file = write_config(
            r#"{"exporter": {"interval_seconds": 30}, "domains": [{"name": "a.com"}]}"#,
        );
        assert!(load_config(file.path().to_str().unwrap()).is_ok());

        let file = write_config(
            r#"{"exporter": {"interval_seconds": 29}, "domains": [{"name": "a.com"}]}"#,
        );
        let err = load_config(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_no_domains_rejected() {
        let file = write_config(r#"{"domains": []}"#);
        assert!(load_config(file.path().to_str().unwrap()).is_err());

        let file = write_config(r#"{"domains": [{"name": "a.com", "enabled": false}]}"#);
        assert!(load_config(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let file = write_config(
            r#"{"monitoring": {"log_level": "LOUD"}, "domains": [{"name": "a.com"}]}"#,
        );
        assert!(load_config(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_malformed_json_rejected() {
        let file = write_config("{not json");
        let err = load_config(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/nonexistent/douro.json").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    // Uses a test-only variable name: the DOURO_* variables are process-wide
    // and would race with the other config tests.
    #[test]
    fn test_env_override_parsing() {
        unsafe { std::env::set_var("DOURO_TEST_PORT", "9300") };
        assert_eq!(env_override::<u16>("DOURO_TEST_PORT").unwrap(), Some(9300));

        unsafe { std::env::set_var("DOURO_TEST_PORT", "not-a-port") };
        let err = env_override::<u16>("DOURO_TEST_PORT").unwrap_err();
        assert!(matches!(err, ConfigError::BadEnvOverride { .. }));

        unsafe { std::env::remove_var("DOURO_TEST_PORT") };
        assert_eq!(env_override::<u16>("DOURO_TEST_PORT").unwrap(), None);
    }

    #[test]
    fn test_env_flag_parsing() {
        unsafe { std::env::set_var("DOURO_TEST_FLAG", "yes") };
        assert_eq!(env_flag("DOURO_TEST_FLAG"), Some(true));
        unsafe { std::env::set_var("DOURO_TEST_FLAG", "off") };
        assert_eq!(env_flag("DOURO_TEST_FLAG"), Some(false));
        unsafe { std::env::remove_var("DOURO_TEST_FLAG") };
        assert_eq!(env_flag("DOURO_TEST_FLAG"), None);
    }
}
