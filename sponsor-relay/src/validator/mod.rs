//! Transaction validation module
//!
//! Decides whether an inbound transaction is safe for the relay to pay for:
//! decode, classify every instruction, enforce the policy limits, then
//! confirm that every account being closed is empty.

pub mod balance;
pub mod classifier;
pub mod policy;

pub use balance::{verify_zero_balances, BalanceLookup, BalanceSource, LedgerBalanceSource};
pub use classifier::{classify, ClassifiedOperation};
pub use policy::{check_instructions, PendingClose, PolicyOutcome, ValidationAccumulator};

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::config::{DEFAULT_MAX_BURN_ACCOUNTS, DEFAULT_MAX_CLOSE_ACCOUNTS, DEFAULT_MAX_FEE_LAMPORTS};
use crate::error::Rejection;
use crate::transaction::{self, DecodedTransaction};

/// SPL Token program
pub const TOKEN_PROGRAM: Pubkey = solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
/// SPL Token-2022 program
pub const TOKEN_2022_PROGRAM: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

// ============================================================================
// PARAMETERS AND RESULTS
// ============================================================================

/// Read-only validation parameters, parsed once from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyParams {
    /// Token program and Token-2022 program
    pub token_program_ids: [Pubkey; 2],
    pub system_program_id: Pubkey,
    pub compute_budget_program_id: Pubkey,
    /// Only allowed destination of the fee transfer
    pub fee_recipient: Pubkey,
    /// Relay key co-signing every transaction; never a token authority or transfer source
    pub fee_payer: Pubkey,
    pub max_fee_lamports: u64,
    pub max_close_accounts: usize,
    pub max_burn_accounts: usize,
}

impl PolicyParams {
    /// Mainnet program ids and default limits for the given fee recipient and fee payer
    pub fn mainnet(fee_recipient: Pubkey, fee_payer: Pubkey) -> Self {
        Self {
            token_program_ids: [TOKEN_PROGRAM, TOKEN_2022_PROGRAM],
            system_program_id: solana_sdk_ids::system_program::ID,
            compute_budget_program_id: solana_sdk_ids::compute_budget::ID,
            fee_recipient,
            fee_payer,
            max_fee_lamports: DEFAULT_MAX_FEE_LAMPORTS,
            max_close_accounts: DEFAULT_MAX_CLOSE_ACCOUNTS,
            max_burn_accounts: DEFAULT_MAX_BURN_ACCOUNTS,
        }
    }

    pub fn is_token_program(&self, program_id: &Pubkey) -> bool {
        self.token_program_ids.contains(program_id)
    }
}

/// Validation result
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// Whether the transaction may be forwarded to the relay
    pub valid: bool,
    /// Human-readable outcome
    pub message: String,
    /// Typed reason when `valid` is false
    #[serde(skip)]
    pub rejection: Option<Rejection>,
    /// Unix timestamp of the validation
    pub timestamp: u64,
}

impl ValidationResult {
    fn accepted(outcome: &PolicyOutcome) -> Self {
        Self {
            valid: true,
            message: format!(
                "Transaction accepted: {} close(s), {} burn(s), fee {} lamports",
                outcome.close_count, outcome.burn_count, outcome.fee_lamports
            ),
            rejection: None,
            timestamp: now(),
        }
    }

    fn rejected(rejection: Rejection) -> Self {
        Self {
            valid: false,
            message: rejection.to_string(),
            rejection: Some(rejection),
            timestamp: now(),
        }
    }

    /// Converts into a `Result`, yielding the rejection when invalid
    pub fn into_result(self) -> Result<(), Rejection> {
        match self.rejection {
            Some(rejection) => Err(rejection),
            None => Ok(()),
        }
    }
}

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Validates inbound transactions against policy and ledger balances
pub struct TransactionValidator<B> {
    params: PolicyParams,
    balances: B,
}

impl<B: BalanceSource> TransactionValidator<B> {
    pub fn new(params: PolicyParams, balances: B) -> Self {
        Self { params, balances }
    }

    pub fn params(&self) -> &PolicyParams {
        &self.params
    }

    /// Decodes and runs the policy scan, without touching the ledger
    pub fn check_policy(
        &self,
        encoded: &str,
    ) -> Result<(DecodedTransaction, PolicyOutcome), Rejection> {
        let decoded = transaction::decode_base64(encoded)?;
        let outcome = check_instructions(&decoded.instructions, &self.params)?;
        Ok((decoded, outcome))
    }

    /// Full validation: decode, policy scan, then balance verification
    ///
    /// # Arguments
    ///
    /// * `encoded` - Base64 wire transaction as submitted by the client
    ///
    /// # Returns
    ///
    /// A `ValidationResult`; `valid` is true only if every stage passed.
    pub async fn validate(&self, encoded: &str) -> ValidationResult {
        let outcome = match self.check_policy(encoded) {
            Ok((_, outcome)) => outcome,
            Err(rejection) => {
                warn!("Transaction rejected by policy: {}", rejection);
                return ValidationResult::rejected(rejection);
            }
        };

        if let Err(rejection) =
            verify_zero_balances(&self.balances, &outcome.pending_verification).await
        {
            warn!("Transaction rejected by balance check: {}", rejection);
            return ValidationResult::rejected(rejection);
        }

        let result = ValidationResult::accepted(&outcome);
        info!("{}", result.message);
        result
    }
}
