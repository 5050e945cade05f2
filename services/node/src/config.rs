//! Configuration for the node agent.

use anyhow::{bail, Context, Result};

/// Node agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server URL.
    pub api_url: String,

    /// CPU cores this node offers.
    pub cpu_cores: i64,

    /// Heartbeat interval in seconds, used until the server advertises one.
    pub heartbeat_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("PACKD_API_URL")
            .unwrap_or_else(|| "http://127.0.0.1:5001".to_string())
            .trim_end_matches('/')
            .to_string();

        let raw_cores = lookup("PACKD_CPU_CORES").context("PACKD_CPU_CORES is required")?;
        let cpu_cores: i64 = raw_cores
            .trim()
            .parse()
            .with_context(|| format!("invalid value '{raw_cores}' for PACKD_CPU_CORES"))?;
        if cpu_cores <= 0 {
            bail!("PACKD_CPU_CORES must be positive, got {cpu_cores}");
        }

        let heartbeat_interval_secs = match lookup("PACKD_HEARTBEAT_INTERVAL_SECS") {
            Some(raw) => raw.trim().parse::<u64>().with_context(|| {
                format!("invalid value '{raw}' for PACKD_HEARTBEAT_INTERVAL_SECS")
            })?,
            None => 5,
        };
        if heartbeat_interval_secs == 0 {
            bail!("PACKD_HEARTBEAT_INTERVAL_SECS must be at least 1");
        }

        let log_level = lookup("PACKD_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            api_url,
            cpu_cores,
            heartbeat_interval_secs,
            log_level,
        })
    }
}
