//! Error types for the sponsor relay

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::transaction::DecodeError;

/// Which stage of validation produced a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The transaction bytes could not be decoded
    Decode,
    /// An instruction or the instruction mix violates policy
    Policy,
    /// A balance check failed or could not be completed
    Oracle,
}

/// Reason a transaction was refused before anything was signed
///
/// Every variant carries enough context for its message to name the
/// offending program, account or count.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("Failed to parse transaction: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unauthorized program: {program_id}")]
    UnauthorizedProgram { program_id: Pubkey },

    #[error("Unauthorized token instruction: discriminator {discriminator} on program {program_id} (only Burn and CloseAccount are allowed)")]
    UnauthorizedTokenInstruction { program_id: Pubkey, discriminator: u8 },

    #[error("Unauthorized system instruction: type {instruction_type} (only Transfer is allowed)")]
    UnauthorizedSystemInstruction { instruction_type: u32 },

    #[error("Unauthorized {instruction} instruction: data too short ({len} byte(s), expected at least {expected})")]
    MalformedInstruction {
        instruction: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("Unauthorized {instruction} instruction: missing accounts (expected at least {expected}, found {found})")]
    MissingAccounts {
        instruction: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Unauthorized {instruction} instruction: authority {fee_payer} is the relay fee payer")]
    FeePayerAuthority {
        instruction: &'static str,
        fee_payer: Pubkey,
    },

    #[error("Unauthorized transfer: source {account} is the relay fee payer")]
    FeePayerTransfer { account: Pubkey },

    #[error("Transfer destination {destination} does not match FEE_RECIPIENT {expected}")]
    DestinationMismatch { destination: Pubkey, expected: Pubkey },

    #[error("Fee amount {lamports} lamports exceeds maximum allowed {max} lamports")]
    FeeTooHigh { lamports: u64, max: u64 },

    #[error("Too many close instructions: {count} (maximum {max})")]
    TooManyCloses { count: usize, max: usize },

    #[error("Too many burn instructions: {count} (maximum {max})")]
    TooManyBurns { count: usize, max: usize },

    #[error("Transaction must contain at least one close or burn instruction")]
    NothingToSponsor,

    #[error("Invalid fee transfer count: expected exactly 1 fee transfer, found {found}")]
    TransferCount { found: usize },

    #[error("Token account {account} has non-zero balance ({amount}). Only empty accounts can be closed.")]
    NonZeroBalance { account: Pubkey, amount: u64 },

    #[error("Failed to verify account {account}: {detail}")]
    VerificationFailed { account: Pubkey, detail: String },
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::Decode(_) => RejectionKind::Decode,
            Rejection::NonZeroBalance { .. } | Rejection::VerificationFailed { .. } => {
                RejectionKind::Oracle
            }
            _ => RejectionKind::Policy,
        }
    }
}

/// Errors surfaced by a sponsor request
#[derive(Debug, Error)]
pub enum SponsorError {
    /// Validation refused the transaction; nothing was signed
    #[error("{0}")]
    Rejected(Rejection),

    /// The signer relay answered with an HTTP error or a JSON-RPC error
    #[error("Relay error ({status}): {message}")]
    Relay { status: u16, message: String },

    /// Every block-builder endpoint refused the bundle
    #[error("Failed to broadcast transaction: {0}")]
    Broadcast(String),

    /// The ledger reports the transaction executed with an error
    #[error("Transaction {signature} failed on-chain: {error}")]
    FailedOnChain { signature: String, error: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SponsorError {
    /// HTTP status the API answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            SponsorError::Rejected(_) => 400,
            SponsorError::Relay { status, .. } => *status,
            SponsorError::Broadcast(_) | SponsorError::FailedOnChain { .. } => 502,
            SponsorError::Internal(_) => 500,
        }
    }
}

impl From<Rejection> for SponsorError {
    fn from(rejection: Rejection) -> Self {
        SponsorError::Rejected(rejection)
    }
}
