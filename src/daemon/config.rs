use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use svcdns::{
    constants::{
        DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_RECORD_TTL_SECS,
        DEFAULT_RESYNC_INTERVAL, DEFAULT_WORKER_COUNT,
    },
    controller::scheduler::{SchedulerConfig, queue::Backoff},
    machinery::store::StoreConfig,
    resolver::config::DnsServerConfig,
};
use tokio::fs::read_to_string;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing, skip_deserializing)]
    pub config_path: Option<PathBuf>,

    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    #[serde(rename = "store")]
    pub store_config: StoreConfig,

    #[serde(rename = "controller")]
    pub controller_config: ControllerConfig,

    #[serde(rename = "dns")]
    pub dns_config: DnsServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    #[serde(rename = "workers")]
    pub workers: usize,
    #[serde(rename = "resync-interval", with = "svcdns::utils::time")]
    pub resync_interval: Duration,
    /// Expiry of published records, in seconds
    #[serde(rename = "record-ttl")]
    pub record_ttl: u32,
    #[serde(rename = "backoff-base", with = "svcdns::utils::time")]
    pub backoff_base: Duration,
    #[serde(rename = "backoff-max", with = "svcdns::utils::time")]
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            record_ttl: DEFAULT_RECORD_TTL_SECS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl ControllerConfig {
    /// Settings that would load but leave the reconciler broken are startup errors.
    pub fn validate(&self) -> Result<()> {
        if self.resync_interval.is_zero() {
            bail!("controller resync-interval must be greater than zero");
        }
        if self.record_ttl < 1 {
            bail!("controller record-ttl must be at least 1 second");
        }
        if self.backoff_base.is_zero() {
            bail!("controller backoff-base must be greater than zero");
        }
        if self.backoff_max < self.backoff_base {
            bail!("controller backoff-max must not be below backoff-base");
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            worker_count: self.workers,
            resync_interval: self.resync_interval,
            backoff: Backoff {
                base: self.backoff_base,
                max: self.backoff_max,
            },
        }
    }
}

async fn resolve_config_path(
    path_override: Option<PathBuf>,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Option<PathBuf>> {
    let config_path = path_override.or_else(|| env("SVCDNS_CONFIG").map(PathBuf::from));

    if let Some(path) = config_path {
        if !path.exists() {
            bail!("Config file {} does not exist", path.display());
        }
        return Ok(Some(path));
    }

    warn!("No config path override found, looking for config in default locations");

    let cwd = std::env::current_dir()?;
    let path = cwd.join("svcdns.toml");
    if path.exists() {
        return Ok(Some(path));
    }
    debug!("No config found in current directory ({})", path.display());

    if let Some(project_dirs) = directories::ProjectDirs::from("io", "svcdns", "svcdns") {
        let path = project_dirs.config_dir().join("config.toml");
        if path.exists() {
            return Ok(Some(path));
        }
        debug!("No config found in home config dir ({})", path.display());
    }

    let path = PathBuf::from("/etc/svcdns/config.toml");
    if path.exists() {
        return Ok(Some(path));
    }
    debug!("No config found in global config dir ({})", path.display());

    Ok(None)
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("Invalid value for {}: {}", name, other),
    }
}

impl Config {
    /// Loads the config file, if any, and applies the process environment on top.
    pub async fn load(path_override: Option<PathBuf>) -> Result<Self> {
        Self::load_with_env(path_override, |key| std::env::var(key).ok()).await
    }

    pub async fn load_with_env(
        path_override: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = match resolve_config_path(path_override, &env).await? {
            Some(config_path) => {
                let config_str = read_to_string(&config_path)
                    .await
                    .with_context(|| format!("Failed to read {}", config_path.display()))?;
                let mut config = Self::from_toml(&config_str)
                    .with_context(|| format!("Failed to parse {}", config_path.display()))?;
                config.config_path = Some(config_path);
                config
            }
            None => {
                warn!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.controller_config.validate()?;
        if self.store_config.timeout.is_zero() {
            bail!("store timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        Ok(toml::from_str(config_str)?)
    }

    /// `REDIS_ADDR`, `REDIS_PASSWORD` and `REDIS_TLS` override the `[store]` table.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(address) = env("REDIS_ADDR") {
            self.store_config.address = Some(address);
        }
        if let Some(password) = env("REDIS_PASSWORD") {
            self.store_config.password = Some(password);
        }
        if let Some(tls) = env("REDIS_TLS") {
            self.store_config.tls = parse_flag("REDIS_TLS", &tls)?;
        }
        Ok(())
    }
}
