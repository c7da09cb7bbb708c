use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::domain::Address;

#[derive(Debug, Serialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub ledger_url: String,
    pub account_address: Option<Address>,
    pub role_overrides_path: PathBuf,
    pub ledger_timeout_secs: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_secs: u64,
    pub gas_buffer_percent: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ledger_url = lookup("LEDGER_URL").context("LEDGER_URL must be set")?;
        let parsed = Url::parse(&ledger_url)
            .with_context(|| format!("LEDGER_URL is not a valid URL: {}", ledger_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("LEDGER_URL must use http or https, got '{}'", parsed.scheme());
        }

        let account_address = lookup("ACCOUNT_ADDRESS")
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| Address::parse(&raw))
            .transpose()
            .map_err(|e| anyhow::anyhow!("ACCOUNT_ADDRESS {}", e))?;

        Ok(Config {
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            ledger_url: ledger_url.trim_end_matches('/').to_string(),
            account_address,
            role_overrides_path: lookup("ROLE_OVERRIDES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("role_overrides.json")),
            ledger_timeout_secs: parse_or(&lookup, "LEDGER_TIMEOUT_SECS", 30)?,
            circuit_breaker_threshold: parse_or(&lookup, "CIRCUIT_BREAKER_THRESHOLD", 3)?,
            circuit_breaker_reset_secs: parse_or(&lookup, "CIRCUIT_BREAKER_RESET_SECS", 60)?,
            gas_buffer_percent: parse_or(&lookup, "GAS_BUFFER_PERCENT", 20)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
