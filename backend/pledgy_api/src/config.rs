//! Application configuration loaded from environment variables.

use std::str::FromStr;

use pledgy_ledger::{LedgerConfig, ParticipantId};

use crate::errors::{ApiError, Result};

/// One week.
pub const DEFAULT_ATTESTATION_TIMEOUT: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Hex-encoded Ed25519 public key of the permit issuer
    pub permit_issuer_key: String,
    /// Participant allowed to attest goal outcomes
    pub oracle_id: ParticipantId,
    /// Seconds after a deadline during which resolution waits for the oracle
    pub attestation_timeout: u64,
    /// Value-transfer service receiving settlement requests; unset means record only
    pub settlement_url: Option<String>,
    /// Limits handed to the ledger
    pub ledger: LedgerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_var = |key: &str| {
            lookup(key).ok_or_else(|| ApiError::Config(format!("Missing env var: {key}")))
        };
        let defaults = LedgerConfig::default();

        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./pledgy.db".to_string()),
            api_port: parse_or(&lookup, "API_PORT", 3001)?,
            permit_issuer_key: env_var("PERMIT_ISSUER_KEY").map_err(|_| {
                ApiError::Config("PERMIT_ISSUER_KEY environment variable is required".to_string())
            })?,
            oracle_id: env_var("ORACLE_ID")
                .map(ParticipantId::new)
                .map_err(|_| {
                    ApiError::Config("ORACLE_ID environment variable is required".to_string())
                })?,
            attestation_timeout: parse_or(
                &lookup,
                "ATTESTATION_TIMEOUT_SECS",
                DEFAULT_ATTESTATION_TIMEOUT,
            )?,
            settlement_url: env_var("SETTLEMENT_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            ledger: LedgerConfig {
                min_stake: parse_or(&lookup, "MIN_STAKE", defaults.min_stake)?,
                pool_cap: lookup("POOL_CAP")
                    .map(|raw| parse(&raw, "POOL_CAP"))
                    .transpose()?,
                claim_grace_period: parse_or(
                    &lookup,
                    "CLAIM_GRACE_SECS",
                    defaults.claim_grace_period,
                )?,
                max_goal_duration: parse_or(
                    &lookup,
                    "MAX_GOAL_DURATION_SECS",
                    defaults.max_goal_duration,
                )?,
                ..defaults
            },
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => parse(&raw, key),
        None => Ok(default),
    }
}

fn parse<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Config(format!("Invalid {key}")))
}
