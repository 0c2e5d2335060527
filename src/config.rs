//! Configuration management for blockade.

use anyhow::{Context, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fetcher::MAX_RETRIES;
use crate::policy::RateLimitPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/blockade/config.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Blacklist feed source
    pub feed: FeedConfig,

    /// Rate-limiting policy applied after the blacklist
    pub policy: RateLimitPolicy,

    /// Packet filter commands
    pub filter: FilterConfig,

    /// Audit log of blocked addresses
    pub block_log: BlockLogConfig,

    /// Protections configured after the firewall rules
    pub auxiliary: AuxiliaryConfig,

    /// Advisory lock held for the duration of `apply`
    pub lock_file: PathBuf,

    /// Summary of the last run (JSON)
    pub state_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            policy: RateLimitPolicy::default(),
            filter: FilterConfig::default(),
            block_log: BlockLogConfig::default(),
            auxiliary: AuxiliaryConfig::default(),
            lock_file: PathBuf::from("/run/blockade.lock"),
            state_file: PathBuf::from("/var/lib/blockade/last_run.json"),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            info!(
                "No config at {:?}, using built-in defaults",
                path.as_ref()
            );
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.feed.url.starts_with("https://") {
            anyhow::bail!("Feed URL must use HTTPS: {}", self.feed.url);
        }
        if self.feed.timeout_secs == 0 {
            anyhow::bail!("feed.timeout_secs must be greater than zero");
        }
        if self.feed.retries > MAX_RETRIES {
            anyhow::bail!(
                "feed.retries must be at most {} (got {})",
                MAX_RETRIES,
                self.feed.retries
            );
        }
        if self.feed.max_size == 0 {
            anyhow::bail!("feed.max_size must be greater than zero");
        }
        if let Some(entry) = &self.feed.archive_entry {
            if entry.is_empty() || entry.contains("..") {
                anyhow::bail!("Invalid feed.archive_entry '{}'", entry);
            }
        }

        self.policy.validate().context("Invalid policy")?;

        if !is_valid_chain_name(&self.filter.chain) {
            anyhow::bail!(
                "Invalid filter.chain '{}'. Use letters, digits, '-' or '_' (max 28)",
                self.filter.chain
            );
        }

        require_absolute("block_log.path", &self.block_log.path)?;
        require_absolute("lock_file", &self.lock_file)?;
        require_absolute("state_file", &self.state_file)?;

        let http_dos = &self.auxiliary.http_dos;
        if http_dos.enabled {
            require_absolute("auxiliary.http_dos.config_path", &http_dos.config_path)?;
            if !is_valid_service_name(&http_dos.service) {
                anyhow::bail!("Invalid service name '{}'", http_dos.service);
            }
            if http_dos.module_path.is_empty()
                || http_dos.module_path.contains(char::is_whitespace)
            {
                anyhow::bail!(
                    "Invalid auxiliary.http_dos.module_path '{}'",
                    http_dos.module_path
                );
            }
        }

        let sg = &self.auxiliary.security_group;
        if sg.enabled {
            if !is_valid_group_id(&sg.group_id) {
                anyhow::bail!(
                    "Invalid security group id '{}'. Expected 'sg-' followed by hex digits",
                    sg.group_id
                );
            }
            if sg.ports.is_empty() {
                anyhow::bail!("auxiliary.security_group.ports cannot be empty");
            }
            let mut ports = sg.ports.clone();
            ports.sort_unstable();
            ports.dedup();
            if ports.len() != sg.ports.len() || ports.contains(&0) {
                anyhow::bail!("auxiliary.security_group.ports must be unique and non-zero");
            }
        }

        Ok(())
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename so a crash never leaves a truncated config.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        crate::utils::write_atomic(path.as_ref(), content.as_bytes())
            .with_context(|| format!("Failed to persist config file: {:?}", path.as_ref()))
    }

    /// Default config with comments, written by `blockade init`
    pub fn generate_default_yaml() -> String {
        include_str!("../templates/config.yaml").to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    /// Name used in logs
    pub name: String,
    /// Location of the zip archive
    pub url: String,
    /// Text file to read inside the archive; the only entry is used when unset
    pub archive_entry: Option<String>,
    pub timeout_secs: u64,
    /// Maximum size in bytes, for both the archive and the extracted text
    pub max_size: u64,
    /// Download attempts before giving up
    pub retries: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            name: "myip.ms".to_string(),
            url: "https://myip.ms/files/blacklist/general/full_blacklist_database.zip"
                .to_string(),
            archive_entry: Some("full_blacklist_database.txt".to_string()),
            timeout_secs: 60,
            max_size: 50 * 1024 * 1024,
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    pub iptables: String,
    pub ip6tables: String,
    /// Chain that is flushed and rebuilt on every run
    pub chain: String,
    /// Also manage ip6tables (needed to drop IPv6 blacklist entries).
    /// The ip6tables binary must exist when set, or the flush fails the run.
    pub ipv6: bool,
    /// Pass `-w` so iptables waits for the xtables lock
    pub wait: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            iptables: "iptables".to_string(),
            ip6tables: "ip6tables".to_string(),
            chain: "INPUT".to_string(),
            ipv6: true,
            wait: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BlockLogConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for BlockLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("/var/log/blockade/blocked.log"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AuxiliaryConfig {
    pub http_dos: HttpDosConfig,
    pub security_group: SecurityGroupConfig,
}

/// mod_evasive settings for Apache httpd
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpDosConfig {
    pub enabled: bool,
    pub config_path: PathBuf,
    /// Module object loaded by the written file, relative to the httpd ServerRoot
    pub module_path: String,
    /// systemd unit restarted after the config is written
    pub service: String,
    pub hash_table_size: u32,
    pub page_count: u32,
    pub page_interval: u32,
    pub site_count: u32,
    pub site_interval: u32,
    pub blocking_period: u32,
}

impl Default for HttpDosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            config_path: PathBuf::from("/etc/httpd/conf.d/mod_evasive.conf"),
            module_path: "modules/mod_evasive24.so".to_string(),
            service: "httpd".to_string(),
            hash_table_size: 3097,
            page_count: 2,
            page_interval: 1,
            site_count: 50,
            site_interval: 1,
            blocking_period: 10,
        }
    }
}

/// Inbound rules authorized on an AWS security group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityGroupConfig {
    pub enabled: bool,
    pub group_id: String,
    pub region: Option<String>,
    pub cidr: IpNet,
    pub ports: Vec<u16>,
    /// Path to the aws CLI
    pub aws_cli: String,
}

impl Default for SecurityGroupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            group_id: String::new(),
            region: None,
            cidr: IpNet::V4(ipnet::Ipv4Net::default()),
            ports: vec![80, 443, 22],
            aws_cli: "aws".to_string(),
        }
    }
}

fn require_absolute(field: &str, path: &Path) -> Result<()> {
    if !path.is_absolute() {
        anyhow::bail!("{} must be an absolute path: {:?}", field, path);
    }
    Ok(())
}

/// iptables limits chain names to 28 characters
fn is_valid_chain_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 28
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.@".contains(c))
}

fn is_valid_group_id(id: &str) -> bool {
    match id.strip_prefix("sg-") {
        Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
