use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;
use serenity::all::{GuildId, UserId};
use tracing_subscriber::filter::LevelFilter;

pub const CONFIG_PATH_ENV: &str = "STARBOARD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Deserialize, Clone, Debug)]
pub struct BotConfig {
    pub discord_token: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    pub cluster_name: String,
    #[serde(default)]
    pub shard_start: u32,
    #[serde(default = "default_shard_end")]
    pub shard_end: u32,
    #[serde(default = "default_total_shards")]
    pub total_shards: u32,
    #[serde(default)]
    pub owner_ids: Vec<u64>,
    pub support_server_id: u64,
    #[serde(default = "default_stats_database")]
    pub stats_database: String,
    #[serde(default = "default_publish_interval_secs")]
    pub publish_interval_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
}

fn default_prefix() -> String {
    "sb!".to_string()
}

fn default_shard_end() -> u32 {
    1
}

fn default_total_shards() -> u32 {
    1
}

fn default_stats_database() -> String {
    "stats.db".to_string()
}

fn default_publish_interval_secs() -> u64 {
    30
}

fn default_stale_after_secs() -> u64 {
    120
}

fn default_refresh_timeout_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs/".to_string()
}

impl BotConfig {
    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config: BotConfig = serde_yaml::from_str(contents).context("Error parsing config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.discord_token.trim().is_empty() {
            bail!("discord_token must not be empty");
        }
        if self.cluster_name.trim().is_empty() {
            bail!("cluster_name must not be empty");
        }
        if self.shard_start >= self.shard_end || self.shard_end > self.total_shards {
            bail!("invalid shard range {}..{} for {} total shards", self.shard_start, self.shard_end, self.total_shards);
        }
        if self.stale_after_secs <= self.publish_interval_secs {
            bail!("stale_after_secs ({}) must be greater than publish_interval_secs ({})", self.stale_after_secs, self.publish_interval_secs);
        }
        Ok(())
    }

    pub fn access(&self) -> AccessConfig {
        AccessConfig {
            owner_ids: self.owner_ids.iter().map(|id| UserId::new(*id)).collect(),
            support_server_id: GuildId::new(self.support_server_id),
        }
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Unknown level names fall back to info.
    pub fn log_level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(self.log_level.trim()).unwrap_or(LevelFilter::INFO)
    }

    /// Rolling log file name, one per cluster so processes sharing a directory don't interleave.
    pub fn log_file_prefix(&self) -> String {
        format!("{}.log", self.cluster_name)
    }
}

/// Operator identities and the home guild, read by the command checks.
#[derive(Clone, Debug)]
pub struct AccessConfig {
    pub owner_ids: HashSet<UserId>,
    pub support_server_id: GuildId,
}

pub fn read_config(path: &str) -> anyhow::Result<BotConfig> {
    let mut file = File::open(path).with_context(|| format!("Unable to open config file {}", path))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).context("Unable to read the config file")?;
    BotConfig::from_yaml(&contents)
}
