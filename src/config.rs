use std::env;
use std::time::Duration;

use ethers_core::types::Address;

use crate::eth::FetchSettings;
use crate::price::DEFAULT_PRICE_URLS;

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x82A9c823332518c32a0c0eDC050Ef00934Cf04D4";

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_urls: Vec<String>,
    pub contract_address: Address,
    pub price_urls: Vec<String>,
    pub fiat_currency: String,
    pub http_bind_addr: String,
    pub rpc_timeout: Duration,
    pub lookback_days: u64,
    pub block_time_secs: u64,
    pub max_block_range: u64,
    pub conversation_timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing RPC_URLS (or RPC_URL) env var")]
    MissingRpcUrls,
    #[error("invalid CONTRACT_ADDRESS: {0}")]
    InvalidContractAddress(String),
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_rpc_override(&[])
    }

    /// Like `from_env`, but a non-empty `rpc_urls` replaces `RPC_URLS`/`RPC_URL`.
    pub fn from_env_with_rpc_override(rpc_urls: &[String]) -> Result<Self, ConfigError> {
        Self::from_lookup(with_rpc_override(|key| env::var(key).ok(), rpc_urls))
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_urls = lookup("RPC_URLS")
            .or_else(|| lookup("RPC_URL"))
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();

        let contract_raw =
            lookup("CONTRACT_ADDRESS").unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS.to_string());
        let contract_address = contract_raw
            .trim()
            .parse::<Address>()
            .map_err(|_| ConfigError::InvalidContractAddress(contract_raw.clone()))?;

        let price_urls = lookup("PRICE_URLS")
            .map(|raw| parse_list(&raw))
            .filter(|urls| !urls.is_empty())
            .unwrap_or_else(|| DEFAULT_PRICE_URLS.iter().map(|s| s.to_string()).collect());
        let fiat_currency = lookup("FIAT_CURRENCY").unwrap_or_else(|| "usd".to_string());
        let http_bind_addr = lookup("HTTP_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string());

        let rpc_timeout = Duration::from_secs(parse_positive(&lookup, "RPC_TIMEOUT_SECS", 15)?);
        let lookback_days = parse_positive(&lookup, "LOOKBACK_DAYS", 7)?;
        let block_time_secs = parse_positive(&lookup, "BLOCK_TIME_SECS", 2)?;
        let max_block_range = parse_positive(&lookup, "MAX_BLOCK_RANGE", 500)?;
        let conversation_timeout =
            Duration::from_secs(parse_positive(&lookup, "CONVERSATION_TIMEOUT_SECS", 300)?);

        Ok(Self {
            rpc_urls,
            contract_address,
            price_urls,
            fiat_currency,
            http_bind_addr,
            rpc_timeout,
            lookback_days,
            block_time_secs,
            max_block_range,
            conversation_timeout,
        })
    }

    /// Endpoints for commands that talk to the chain; empty is an error there.
    pub fn require_rpc_urls(&self) -> Result<&[String], ConfigError> {
        if self.rpc_urls.is_empty() {
            return Err(ConfigError::MissingRpcUrls);
        }
        Ok(&self.rpc_urls)
    }

    /// Number of blocks in the lookback window at the average block time.
    pub fn lookback_blocks(&self) -> u64 {
        self.lookback_days.saturating_mul(SECONDS_PER_DAY) / self.block_time_secs.max(1)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            lookback_blocks: self.lookback_blocks(),
            max_block_range: self.max_block_range,
            block_time_secs: self.block_time_secs,
            endpoint_timeout: self.rpc_timeout,
        }
    }
}

/// Wraps `lookup` so that `RPC_URLS` answers with `overrides` when any are given.
pub fn with_rpc_override<F>(lookup: F, overrides: &[String]) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let joined = (!overrides.is_empty()).then(|| overrides.join(","));
    move |key: &str| match (&joined, key) {
        (Some(urls), "RPC_URLS") => Some(urls.clone()),
        _ => lookup(key),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_positive<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidNumber { var, value }),
        },
    }
}
