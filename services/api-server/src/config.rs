use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::scheduler::{PlacementPolicy, PodScheduler};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub cluster: ClusterConfig,
}

/// Timing and placement settings for the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Interval nodes are told to heartbeat at.
    pub heartbeat_interval: Duration,
    /// A node is dead after `heartbeat_interval * multiplier` of silence.
    pub heartbeat_timeout_multiplier: u32,
    /// Health scan period.
    pub monitor_interval: Duration,
    pub placement_policy: PlacementPolicy,
    pub max_placement_retries: u32,
}

impl ClusterConfig {
    /// Longest accepted interval or heartbeat timeout.
    pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

    /// Silence after which a node is declared dead.
    ///
    /// Saturates instead of overflowing; `Config::from_lookup` rejects
    /// settings whose timeout would exceed [`ClusterConfig::MAX_PERIOD`].
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.heartbeat_timeout_multiplier)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout_multiplier: 3,
            monitor_interval: Duration::from_secs(5),
            placement_policy: PlacementPolicy::default(),
            max_placement_retries: PodScheduler::DEFAULT_MAX_RETRIES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("PACKD_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:5001".to_string())
            .parse()
            .context("PACKD_LISTEN_ADDR must be a socket address")?;

        let log_level = lookup("PACKD_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let defaults = ClusterConfig::default();

        let heartbeat_interval =
            match parse_var::<u64, _>(&lookup, "PACKD_HEARTBEAT_INTERVAL_SECS")? {
                Some(secs) => period("PACKD_HEARTBEAT_INTERVAL_SECS", secs)?,
                None => defaults.heartbeat_interval,
            };

        let heartbeat_timeout_multiplier =
            match parse_var::<u32, _>(&lookup, "PACKD_HEARTBEAT_TIMEOUT_MULTIPLIER")? {
                Some(n) => at_least_one("PACKD_HEARTBEAT_TIMEOUT_MULTIPLIER", n)?,
                None => defaults.heartbeat_timeout_multiplier,
            };

        let heartbeat_timeout = heartbeat_interval
            .checked_mul(heartbeat_timeout_multiplier)
            .filter(|timeout| *timeout <= ClusterConfig::MAX_PERIOD);
        if heartbeat_timeout.is_none() {
            bail!(
                "heartbeat timeout ({}s x {}) exceeds {}s",
                heartbeat_interval.as_secs(),
                heartbeat_timeout_multiplier,
                ClusterConfig::MAX_PERIOD.as_secs()
            );
        }

        let monitor_interval = match parse_var::<u64, _>(&lookup, "PACKD_MONITOR_INTERVAL_SECS")? {
            Some(secs) => period("PACKD_MONITOR_INTERVAL_SECS", secs)?,
            None => defaults.monitor_interval,
        };

        let placement_policy = parse_var::<PlacementPolicy, _>(&lookup, "PACKD_PLACEMENT_POLICY")?
            .unwrap_or(defaults.placement_policy);

        let max_placement_retries = parse_var::<u32, _>(&lookup, "PACKD_PLACEMENT_MAX_RETRIES")?
            .unwrap_or(defaults.max_placement_retries);

        Ok(Self {
            listen_addr,
            log_level,
            cluster: ClusterConfig {
                heartbeat_interval,
                heartbeat_timeout_multiplier,
                monitor_interval,
                placement_policy,
                max_placement_retries,
            },
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value '{raw}' for {key}"))
        })
        .transpose()
}

/// A whole number of seconds between 1 and [`ClusterConfig::MAX_PERIOD`].
fn period(key: &str, secs: u64) -> Result<Duration> {
    let secs = at_least_one(key, secs)?;
    if secs > ClusterConfig::MAX_PERIOD.as_secs() {
        bail!(
            "{key} must be at most {}, got {secs}",
            ClusterConfig::MAX_PERIOD.as_secs()
        );
    }
    Ok(Duration::from_secs(secs))
}

fn at_least_one<T>(key: &str, value: T) -> Result<T>
where
    T: PartialOrd + From<u8> + std::fmt::Display,
{
    if value < T::from(1) {
        bail!("{key} must be at least 1, got {value}");
    }
    Ok(value)
}
