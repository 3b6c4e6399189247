//! Indexer configuration
//!
//! Read from the process environment (after `dotenvy` has loaded `.env`).
//! The indexer is optional: without `FACTORY_ADDRESS` it stays disabled.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::error::ConfigError;

/// Environment variable names
pub const ENV_RPC_URL: &str = "RPC_URL";
pub const ENV_BSC_RPC_URL: &str = "BSC_RPC_URL";
pub const ENV_FACTORY_ADDRESS: &str = "FACTORY_ADDRESS";
pub const ENV_START_BLOCK: &str = "START_BLOCK";
pub const ENV_REFRESH_INTERVAL: &str = "REFRESH_INTERVAL_SECS";
pub const ENV_REFRESH_MIN_BACKOFF: &str = "REFRESH_MIN_BACKOFF_MS";
pub const ENV_REFRESH_CONCURRENCY: &str = "REFRESH_CONCURRENCY";
pub const ENV_RPC_TIMEOUT: &str = "RPC_TIMEOUT_SECS";
pub const ENV_MAX_BLOCK_RANGE: &str = "MAX_BLOCK_RANGE";
pub const ENV_LIVE_POLL_INTERVAL: &str = "LIVE_POLL_INTERVAL_MS";
pub const ENV_SHUTDOWN_GRACE: &str = "SHUTDOWN_GRACE_SECS";

pub const DEFAULT_RPC_URL: &str = "https://bsc-dataseed.binance.org/";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REFRESH_MIN_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 8;
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 5000;
pub const DEFAULT_LIVE_POLL_INTERVAL_MS: u64 = 3000;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Connection settings for the chain reader.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub rpc_url: String,
    pub call_timeout: Duration,
    pub live_poll_interval: Duration,
    pub max_block_range: u64,
}

/// Settings for the indexer pipeline itself.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub factory_address: Address,
    pub start_block: u64,
    pub max_block_range: u64,
    pub refresh_interval: Duration,
    pub refresh_min_backoff: Duration,
    pub refresh_concurrency: usize,
    pub shutdown_grace: Duration,
}

impl IndexerSettings {
    pub fn new(factory_address: Address) -> Self {
        Self {
            factory_address,
            start_block: 0,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            refresh_min_backoff: Duration::from_millis(DEFAULT_REFRESH_MIN_BACKOFF_MS),
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub rpc: RpcSettings,
    pub indexer: IndexerSettings,
}

impl IndexerConfig {
    /// Load from the process environment. `Ok(None)` means the indexer is
    /// not configured and should stay off.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let factory = match lookup(ENV_FACTORY_ADDRESS).filter(|v| !v.trim().is_empty()) {
            Some(raw) => Address::from_str(raw.trim()).map_err(|e| ConfigError::Invalid {
                var: ENV_FACTORY_ADDRESS,
                message: e.to_string(),
            })?,
            None => return Ok(None),
        };

        let rpc_url = lookup(ENV_RPC_URL)
            .or_else(|| lookup(ENV_BSC_RPC_URL))
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

        let max_block_range: u64 = parse_or(&lookup, ENV_MAX_BLOCK_RANGE, DEFAULT_MAX_BLOCK_RANGE)?;
        if max_block_range == 0 {
            return Err(ConfigError::Invalid {
                var: ENV_MAX_BLOCK_RANGE,
                message: "must be at least 1".to_string(),
            });
        }

        let refresh_concurrency: usize =
            parse_or(&lookup, ENV_REFRESH_CONCURRENCY, DEFAULT_REFRESH_CONCURRENCY)?;
        if refresh_concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: ENV_REFRESH_CONCURRENCY,
                message: "must be at least 1".to_string(),
            });
        }

        let rpc = RpcSettings {
            rpc_url,
            call_timeout: Duration::from_secs(parse_or(&lookup, ENV_RPC_TIMEOUT, DEFAULT_RPC_TIMEOUT_SECS)?),
            live_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                ENV_LIVE_POLL_INTERVAL,
                DEFAULT_LIVE_POLL_INTERVAL_MS,
            )?),
            max_block_range,
        };

        let indexer = IndexerSettings {
            factory_address: factory,
            start_block: parse_or(&lookup, ENV_START_BLOCK, 0)?,
            max_block_range,
            refresh_interval: Duration::from_secs(parse_or(
                &lookup,
                ENV_REFRESH_INTERVAL,
                DEFAULT_REFRESH_INTERVAL_SECS,
            )?),
            refresh_min_backoff: Duration::from_millis(parse_or(
                &lookup,
                ENV_REFRESH_MIN_BACKOFF,
                DEFAULT_REFRESH_MIN_BACKOFF_MS,
            )?),
            refresh_concurrency,
            shutdown_grace: Duration::from_secs(parse_or(
                &lookup,
                ENV_SHUTDOWN_GRACE,
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?),
        };

        Ok(Some(Self { rpc, indexer }))
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: e.to_string(),
        }),
        _ => Ok(default),
    }
}
