//! Configuration management module
//!
//! Loads the relay configuration from a TOML file with environment overrides
//! and converts the policy section into the parsed, read-only parameters
//! used by the transaction validator.

use anyhow::{Context, Result};
use chain_clients_svm::Commitment;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::validator::PolicyParams;

/// Default config file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/sponsor-relay.toml";

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "SPONSOR_RELAY_CONFIG_PATH";

/// Prefix for environment overrides (e.g. `SPONSOR_RELAY__RELAY__ENDPOINT`)
pub const ENV_PREFIX: &str = "SPONSOR_RELAY";

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
pub const DEFAULT_FEE_RECIPIENT: &str = "va1TBuMdfdgHUb3fYA79CfFQPFf3KQ3k86n5dp4hHRr";

/// 10 SOL
pub const DEFAULT_MAX_FEE_LAMPORTS: u64 = 10_000_000_000;
pub const DEFAULT_MAX_CLOSE_ACCOUNTS: usize = 20;
pub const DEFAULT_MAX_BURN_ACCOUNTS: usize = 10;

// ============================================================================
// CONFIG STRUCTURES
// ============================================================================

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub relay: RelayConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub fees: FeeConfig,
}

/// HTTP API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Signer relay (fee payer) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// JSON-RPC endpoint of the signer relay
    pub endpoint: String,
    /// Public key of the relay's fee payer (base58), served by `GET /sponsor`
    pub fee_payer: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Ledger RPC settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Commitment for balance checks; must be `confirmed` or stronger
    #[serde(default = "default_commitment")]
    pub commitment: Commitment,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Transaction policy constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_token_program_ids")]
    pub token_program_ids: Vec<String>,
    #[serde(default = "default_system_program_id")]
    pub system_program_id: String,
    #[serde(default = "default_compute_budget_program_id")]
    pub compute_budget_program_id: String,
    #[serde(default = "default_fee_recipient")]
    pub fee_recipient: String,
    #[serde(default = "default_max_fee_lamports")]
    pub max_fee_lamports: u64,
    #[serde(default = "default_max_close_accounts")]
    pub max_close_accounts: usize,
    #[serde(default = "default_max_burn_accounts")]
    pub max_burn_accounts: usize,
}

/// Redundant block-builder submission and confirmation polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Ordered `sendBundle` endpoints; empty means sign-and-send through the relay
    #[serde(default)]
    pub block_builder_urls: Vec<String>,
    #[serde(default = "default_confirmation_attempts")]
    pub confirmation_attempts: u32,
    #[serde(default = "default_confirmation_interval_ms")]
    pub confirmation_interval_ms: u64,
}

/// Service fee settings used when building transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Percentage of reclaimed rent charged as service fee
    #[serde(default = "default_fee_percent")]
    pub fee_percent: f64,
    /// Flat network fee added in burn mode (one signature)
    #[serde(default = "default_network_fee_lamports")]
    pub network_fee_lamports: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_commitment() -> Commitment {
    Commitment::Confirmed
}

fn default_token_program_ids() -> Vec<String> {
    vec![TOKEN_PROGRAM_ID.to_string(), TOKEN_2022_PROGRAM_ID.to_string()]
}

fn default_system_program_id() -> String {
    solana_sdk_ids::system_program::ID.to_string()
}

fn default_compute_budget_program_id() -> String {
    solana_sdk_ids::compute_budget::ID.to_string()
}

fn default_fee_recipient() -> String {
    DEFAULT_FEE_RECIPIENT.to_string()
}

fn default_max_fee_lamports() -> u64 {
    DEFAULT_MAX_FEE_LAMPORTS
}

fn default_max_close_accounts() -> usize {
    DEFAULT_MAX_CLOSE_ACCOUNTS
}

fn default_max_burn_accounts() -> usize {
    DEFAULT_MAX_BURN_ACCOUNTS
}

fn default_confirmation_attempts() -> u32 {
    30
}

fn default_confirmation_interval_ms() -> u64 {
    1_000
}

fn default_fee_percent() -> f64 {
    1.0
}

fn default_network_fee_lamports() -> u64 {
    5_000
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            token_program_ids: default_token_program_ids(),
            system_program_id: default_system_program_id(),
            compute_budget_program_id: default_compute_budget_program_id(),
            fee_recipient: default_fee_recipient(),
            max_fee_lamports: DEFAULT_MAX_FEE_LAMPORTS,
            max_close_accounts: DEFAULT_MAX_CLOSE_ACCOUNTS,
            max_burn_accounts: DEFAULT_MAX_BURN_ACCOUNTS,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            block_builder_urls: Vec::new(),
            confirmation_attempts: default_confirmation_attempts(),
            confirmation_interval_ms: default_confirmation_interval_ms(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_percent: default_fee_percent(),
            network_fee_lamports: default_network_fee_lamports(),
        }
    }
}

// ============================================================================
// LOADING AND VALIDATION
// ============================================================================

impl Config {
    /// Loads configuration from `SPONSOR_RELAY_CONFIG_PATH` or the default path
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(Some(&path))
    }

    /// Loads configuration from an explicit path (falls back to the default path)
    ///
    /// Values from the file can be overridden by environment variables with the
    /// `SPONSOR_RELAY__` prefix, e.g. `SPONSOR_RELAY__RELAY__ENDPOINT`.
    pub fn load_from_path(path: Option<&str>) -> Result<Self> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

        if !Path::new(path).exists() {
            anyhow::bail!("Config file not found: {}", path);
        }

        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config file {}", path))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config file {}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.relay.endpoint)
            .with_context(|| format!("Invalid relay endpoint URL: {}", self.relay.endpoint))?;
        url::Url::parse(&self.ledger.rpc_url)
            .with_context(|| format!("Invalid ledger RPC URL: {}", self.ledger.rpc_url))?;
        for builder in &self.broadcast.block_builder_urls {
            url::Url::parse(builder)
                .with_context(|| format!("Invalid block builder URL: {}", builder))?;
        }

        parse_pubkey("relay.fee_payer", &self.relay.fee_payer)?;

        if !self.ledger.commitment.at_least(Commitment::Confirmed) {
            anyhow::bail!(
                "ledger.commitment must be 'confirmed' or 'finalized', got '{}'",
                self.ledger.commitment.as_str()
            );
        }

        if self.broadcast.confirmation_interval_ms == 0 {
            anyhow::bail!("broadcast.confirmation_interval_ms must be positive");
        }

        if !(0.0..=100.0).contains(&self.fees.fee_percent) {
            anyhow::bail!(
                "fees.fee_percent must be between 0 and 100, got {}",
                self.fees.fee_percent
            );
        }

        self.policy_params().map(|_| ())
    }

    /// Validator parameters for the configured policy and relay fee payer
    pub fn policy_params(&self) -> Result<PolicyParams> {
        let fee_payer = parse_pubkey("relay.fee_payer", &self.relay.fee_payer)?;
        self.policy.to_params(fee_payer)
    }

    pub fn confirmation_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast.confirmation_interval_ms)
    }
}

impl PolicyConfig {
    /// Parses the policy section into validator parameters
    ///
    /// # Returns
    ///
    /// * `Ok(PolicyParams)` - All program ids and the fee recipient parsed
    /// * `Err(anyhow::Error)` - Invalid public key or ceiling
    pub fn to_params(&self, fee_payer: Pubkey) -> Result<PolicyParams> {
        if self.token_program_ids.len() != 2 {
            anyhow::bail!(
                "policy.token_program_ids must list exactly 2 programs (token and token-2022), got {}",
                self.token_program_ids.len()
            );
        }
        let token_program_ids = [
            parse_pubkey("policy.token_program_ids[0]", &self.token_program_ids[0])?,
            parse_pubkey("policy.token_program_ids[1]", &self.token_program_ids[1])?,
        ];

        if self.max_close_accounts == 0 || self.max_burn_accounts == 0 {
            anyhow::bail!("policy.max_close_accounts and policy.max_burn_accounts must be positive");
        }

        Ok(PolicyParams {
            token_program_ids,
            system_program_id: parse_pubkey("policy.system_program_id", &self.system_program_id)?,
            compute_budget_program_id: parse_pubkey(
                "policy.compute_budget_program_id",
                &self.compute_budget_program_id,
            )?,
            fee_recipient: parse_pubkey("policy.fee_recipient", &self.fee_recipient)?,
            fee_payer,
            max_fee_lamports: self.max_fee_lamports,
            max_close_accounts: self.max_close_accounts,
            max_burn_accounts: self.max_burn_accounts,
        })
    }
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("Invalid public key for {}: {}", field, value))
}
