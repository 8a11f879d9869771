//! Configuration management for trustwall.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::TrustwallError;
use crate::validation::{validate_domain, validate_https_url, validate_interface, validate_port};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/trustwall/config.json";

/// Upper bound on download attempts per bulk list
pub const MAX_FETCH_RETRIES: u32 = 5;

/// Upper bound on any single network timeout
pub const MAX_TIMEOUT_SECS: u64 = 300;

const DEFAULT_IPV4_URL: &str = "https://www.cloudflare.com/ips-v4";
const DEFAULT_IPV6_URL: &str = "https://www.cloudflare.com/ips-v6";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Published IPv4 range list (one network per line)
    #[serde(alias = "cloudflare_ipv4_url")]
    pub bulk_ipv4_url: String,

    /// Published IPv6 range list (one network per line)
    #[serde(alias = "cloudflare_ipv6_url")]
    pub bulk_ipv6_url: String,

    /// Hostnames whose current addresses are allowed on the HTTPS port
    pub custom_domains: Vec<String>,

    /// SSH port left open to every source
    pub allow_ssh_port: u16,

    /// Port the trusted sources are admitted on
    pub https_port: u16,

    /// Log file (appended to, in addition to stdout)
    pub log_file: PathBuf,

    /// Last successfully applied trusted-source set
    pub cache_file: PathBuf,

    /// Live policy file, loaded by nftables.service at boot
    pub policy_file: PathBuf,

    /// Staging file for freshly compiled policies.
    /// Must live on the same filesystem as `policy_file` for the final rename.
    pub staging_file: PathBuf,

    /// Advisory lock serializing update runs
    pub lock_file: PathBuf,

    /// Overlay/VPN interface allowed unconditionally
    pub tunnel_interface: String,

    /// Container bridge interfaces (nftables wildcard patterns allowed)
    pub bridge_interfaces: Vec<String>,

    /// Services restarted after a ruleset change, if running
    pub dependent_services: Vec<String>,

    /// Per-request timeout for bulk list downloads
    pub fetch_timeout_secs: u64,

    /// Attempts per bulk list download
    pub fetch_retries: u32,

    /// Per-domain resolution timeout
    pub resolve_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bulk_ipv4_url: DEFAULT_IPV4_URL.to_string(),
            bulk_ipv6_url: DEFAULT_IPV6_URL.to_string(),
            custom_domains: Vec::new(),
            allow_ssh_port: 12222,
            https_port: 443,
            log_file: PathBuf::from("/var/log/trustwall.log"),
            cache_file: PathBuf::from("/etc/trustwall/ip_cache.json"),
            policy_file: PathBuf::from("/etc/nftables.conf"),
            staging_file: PathBuf::from("/etc/nftables.conf.staging"),
            lock_file: PathBuf::from("/run/trustwall.lock"),
            tunnel_interface: "tailscale0".to_string(),
            bridge_interfaces: default_bridge_interfaces(),
            dependent_services: vec!["docker".to_string()],
            fetch_timeout_secs: 10,
            fetch_retries: 2,
            resolve_timeout_secs: 5,
        }
    }
}

/// How the configuration in effect was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Read from the file
    File,
    /// The file did not exist; defaults were written to it
    CreatedDefault,
    /// The file did not exist and could not be created
    DefaultsUnwritable(String),
    /// The file could not be parsed; defaults are in effect
    DefaultsAfterParseError(String),
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults (and an attempt to write them out);
    /// a malformed file yields the defaults with the parse error reported in
    /// the returned origin. Values that fail validation are a hard error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigOrigin)> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Config::default();
            let origin = match config.save(path) {
                Ok(()) => ConfigOrigin::CreatedDefault,
                Err(e) => ConfigOrigin::DefaultsUnwritable(format!("{:#}", e)),
            };
            return Ok((config, origin));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let (config, origin) = match serde_json::from_str::<Config>(&content) {
            Ok(config) => (config, ConfigOrigin::File),
            Err(e) => (
                Config::default(),
                ConfigOrigin::DefaultsAfterParseError(e.to_string()),
            ),
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        Ok((config, origin))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), TrustwallError> {
        let invalid = |e: anyhow::Error| TrustwallError::Config(e.to_string());

        validate_https_url(&self.bulk_ipv4_url).map_err(invalid)?;
        validate_https_url(&self.bulk_ipv6_url).map_err(invalid)?;

        for domain in &self.custom_domains {
            validate_domain(domain).map_err(invalid)?;
        }

        validate_port(self.allow_ssh_port, "SSH").map_err(invalid)?;
        validate_port(self.https_port, "HTTPS").map_err(invalid)?;

        validate_interface(&self.tunnel_interface).map_err(invalid)?;
        for iface in &self.bridge_interfaces {
            validate_interface(iface).map_err(invalid)?;
        }

        for service in &self.dependent_services {
            if service.is_empty()
                || !service
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
            {
                return Err(TrustwallError::Config(format!(
                    "Invalid service name '{}'",
                    service.escape_debug()
                )));
            }
        }

        if self.staging_file == self.policy_file {
            return Err(TrustwallError::Config(format!(
                "staging_file must differ from policy_file ({:?})",
                self.policy_file
            )));
        }

        for timeout in [self.fetch_timeout_secs, self.resolve_timeout_secs] {
            if !(1..=MAX_TIMEOUT_SECS).contains(&timeout) {
                return Err(TrustwallError::Config(format!(
                    "Timeouts must be between 1 and {} seconds",
                    MAX_TIMEOUT_SECS
                )));
            }
        }

        if !(1..=MAX_FETCH_RETRIES).contains(&self.fetch_retries) {
            return Err(TrustwallError::Config(format!(
                "fetch_retries must be between 1 and {}",
                MAX_FETCH_RETRIES
            )));
        }

        Ok(())
    }

    /// Save configuration to a JSON file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = path.parent().unwrap_or(Path::new("/etc/trustwall"));
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", parent_dir))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.write_all(b"\n")?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }
}

fn default_bridge_interfaces() -> Vec<String> {
    vec![
        "docker0".to_string(),
        "br-+".to_string(), // user-defined docker networks
        "veth+".to_string(), // container ends of veth pairs
    ]
}
