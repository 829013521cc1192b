//! Token account discovery and eligibility
//!
//! Finds an owner's token accounts under both token programs, parses the raw
//! account layout and decides which accounts can be closed or burned.

pub mod extensions;

pub use extensions::{parse_extensions, ExtensionError, ExtensionKind};

use anyhow::{Context, Result};
use chain_clients_svm::{Commitment, KeyedAccount, SvmClient};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::validator::PolicyParams;

/// Size of the base SPL token account layout
pub const TOKEN_ACCOUNT_LEN: usize = 165;

const STATE_OFFSET: usize = 108;
const CLOSE_AUTHORITY_OFFSET: usize = 129;

// ============================================================================
// ACCOUNT LAYOUT
// ============================================================================

/// Token account state byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    Initialized,
    Frozen,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("account data is {0} bytes, expected at least 165")]
    TooShort(usize),
    #[error("account is not initialized")]
    Uninitialized,
    #[error("invalid account state {0}")]
    InvalidState(u8),
    #[error("invalid option tag {tag} at offset {offset}")]
    InvalidOptionTag { tag: u32, offset: usize },
}

/// Parsed SPL token account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountState {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub delegate: Option<Pubkey>,
    pub state: AccountState,
    pub is_native: Option<u64>,
    pub delegated_amount: u64,
    pub close_authority: Option<Pubkey>,
    /// Token-2022 extensions; `Err` when the extension area could not be parsed
    pub extensions: Result<Vec<ExtensionKind>, ExtensionError>,
}

impl TokenAccountState {
    /// Parses raw account data
    ///
    /// Extensions are only read for Token-2022 accounts; trailing bytes of
    /// classic token accounts are ignored.
    pub fn parse(data: &[u8], token_2022: bool) -> Result<Self, LayoutError> {
        if data.len() < TOKEN_ACCOUNT_LEN {
            return Err(LayoutError::TooShort(data.len()));
        }

        let state = match data[STATE_OFFSET] {
            0 => return Err(LayoutError::Uninitialized),
            1 => AccountState::Initialized,
            2 => AccountState::Frozen,
            other => return Err(LayoutError::InvalidState(other)),
        };

        let extensions = if token_2022 {
            parse_extensions(&data[TOKEN_ACCOUNT_LEN..])
        } else {
            Ok(Vec::new())
        };

        Ok(Self {
            mint: read_pubkey(data, 0),
            owner: read_pubkey(data, 32),
            amount: read_u64(data, 64),
            delegate: read_option(data, 72, |offset| read_pubkey(data, offset))?,
            state,
            is_native: read_option(data, 109, |offset| read_u64(data, offset))?,
            delegated_amount: read_u64(data, 121),
            close_authority: read_option(data, CLOSE_AUTHORITY_OFFSET, |offset| {
                read_pubkey(data, offset)
            })?,
            extensions,
        })
    }
}

fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(bytes)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Reads a `COption<T>`: u32 tag followed by the value
fn read_option<T>(
    data: &[u8],
    offset: usize,
    read: impl Fn(usize) -> T,
) -> Result<Option<T>, LayoutError> {
    let tag = u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]);
    match tag {
        0 => Ok(None),
        1 => Ok(Some(read(offset + 4))),
        tag => Err(LayoutError::InvalidOptionTag { tag, offset }),
    }
}

// ============================================================================
// ELIGIBILITY
// ============================================================================

/// Why an account cannot be closed or burned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    OwnerMismatch,
    UnparsedExtensions,
    ConfidentialTransfer,
    Frozen,
    PermanentDelegate,
    CloseAuthority,
    NonTransferable,
    TransferHook,
    WithheldFees,
    HasBalance,
    NoBalance,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            BlockReason::OwnerMismatch => "Owner mismatch",
            BlockReason::UnparsedExtensions => "Has extensions (unparsed)",
            BlockReason::ConfidentialTransfer => "Has confidential transfer",
            BlockReason::Frozen => "Account is frozen",
            BlockReason::PermanentDelegate => "Has permanent delegate",
            BlockReason::CloseAuthority => "Has close authority",
            BlockReason::NonTransferable => "Non-transferable token",
            BlockReason::TransferHook => "Has transfer hook",
            BlockReason::WithheldFees => "Has withheld fees",
            BlockReason::HasBalance => "Account has a token balance",
            BlockReason::NoBalance => "No balance to burn",
        };
        f.write_str(reason)
    }
}

impl Serialize for BlockReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Close and burn eligibility of one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub can_close: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_blocked: Option<BlockReason>,
    pub can_burn: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burn_blocked: Option<BlockReason>,
}

/// Decides whether `account` can be closed or burned by `owner`
///
/// The first matching reason in precedence order is reported.
pub fn assess(account: &TokenAccountState, owner: &Pubkey) -> Eligibility {
    let owner_matches = account.owner == *owner;
    let is_empty = account.amount == 0;
    let frozen = account.state == AccountState::Frozen;
    // A close authority equal to the owner does not restrict the owner
    let foreign_close_authority = account
        .close_authority
        .map(|authority| authority != account.owner)
        .unwrap_or(false);

    let (unparsed, extensions) = match &account.extensions {
        Ok(extensions) => (
            extensions
                .iter()
                .any(|ext| matches!(ext, ExtensionKind::Unrecognized(_))),
            extensions.as_slice(),
        ),
        Err(_) => (true, &[][..]),
    };
    let has = |pred: fn(&ExtensionKind) -> bool| extensions.iter().any(pred);
    let confidential = has(|ext| {
        matches!(
            ext,
            ExtensionKind::ConfidentialTransferAccount | ExtensionKind::ConfidentialTransferFeeAmount
        )
    });
    let permanent_delegate = has(|ext| matches!(ext, ExtensionKind::PermanentDelegate));
    let non_transferable = has(|ext| matches!(ext, ExtensionKind::NonTransferableAccount));
    let transfer_hook = has(|ext| matches!(ext, ExtensionKind::TransferHookAccount));
    let withheld_fees =
        has(|ext| matches!(ext, ExtensionKind::TransferFeeAmount { withheld } if *withheld > 0));

    let close_blocked = if !owner_matches {
        Some(BlockReason::OwnerMismatch)
    } else if unparsed {
        Some(BlockReason::UnparsedExtensions)
    } else if confidential {
        Some(BlockReason::ConfidentialTransfer)
    } else if frozen {
        Some(BlockReason::Frozen)
    } else if permanent_delegate {
        Some(BlockReason::PermanentDelegate)
    } else if foreign_close_authority {
        Some(BlockReason::CloseAuthority)
    } else if non_transferable {
        Some(BlockReason::NonTransferable)
    } else if transfer_hook {
        Some(BlockReason::TransferHook)
    } else if withheld_fees {
        Some(BlockReason::WithheldFees)
    } else if !is_empty {
        Some(BlockReason::HasBalance)
    } else {
        None
    };

    let burn_blocked = if is_empty {
        Some(BlockReason::NoBalance)
    } else if !owner_matches {
        Some(BlockReason::OwnerMismatch)
    } else if frozen {
        Some(BlockReason::Frozen)
    } else if permanent_delegate {
        Some(BlockReason::PermanentDelegate)
    } else if unparsed {
        Some(BlockReason::UnparsedExtensions)
    } else {
        None
    };

    Eligibility {
        can_close: close_blocked.is_none(),
        close_blocked,
        can_burn: burn_blocked.is_none(),
        burn_blocked,
    }
}

// ============================================================================
// DISCOVERY
// ============================================================================

/// Token account with its eligibility, as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessedAccount {
    #[serde(serialize_with = "as_string")]
    pub address: Pubkey,
    #[serde(serialize_with = "as_string")]
    pub program_id: Pubkey,
    #[serde(serialize_with = "as_string")]
    pub mint: Pubkey,
    #[serde(serialize_with = "as_string")]
    pub owner: Pubkey,
    /// Token amount in base units (string keeps the full u64 range in JSON)
    #[serde(serialize_with = "as_string")]
    pub amount: u64,
    /// Lamports reclaimed by closing the account
    pub rent_lamports: u64,
    #[serde(flatten)]
    pub eligibility: Eligibility,
}

fn as_string<T: fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Assesses one keyed account returned by the ledger
///
/// Returns `None` for accounts whose data cannot be parsed.
pub fn assess_keyed(
    keyed: &KeyedAccount,
    program_id: &Pubkey,
    token_2022: bool,
    owner: &Pubkey,
) -> Option<AssessedAccount> {
    let address = match Pubkey::from_str(&keyed.pubkey) {
        Ok(address) => address,
        Err(e) => {
            warn!("Skipping account with invalid address {}: {}", keyed.pubkey, e);
            return None;
        }
    };
    let state = match TokenAccountState::parse(&keyed.account.data, token_2022) {
        Ok(state) => state,
        Err(e) => {
            debug!("Skipping unparseable token account {}: {}", address, e);
            return None;
        }
    };

    Some(AssessedAccount {
        address,
        program_id: *program_id,
        mint: state.mint,
        owner: state.owner,
        amount: state.amount,
        rent_lamports: keyed.account.lamports,
        eligibility: assess(&state, owner),
    })
}

/// Lists and assesses every token account of `owner` under both token programs
///
/// # Arguments
///
/// * `client` - Ledger RPC client
/// * `params` - Provides the two token program ids
/// * `owner` - Wallet whose accounts are scanned
/// * `commitment` - Commitment level of the reads
pub async fn scan_token_accounts(
    client: &SvmClient,
    params: &PolicyParams,
    owner: &Pubkey,
    commitment: Commitment,
) -> Result<Vec<AssessedAccount>> {
    let owner_str = owner.to_string();
    let [token_program, token_2022_program] = params.token_program_ids;
    let token_program_str = token_program.to_string();
    let token_2022_str = token_2022_program.to_string();

    let (classic, extended) = futures::future::try_join(
        client.get_token_accounts_by_owner(&owner_str, &token_program_str, commitment),
        client.get_token_accounts_by_owner(&owner_str, &token_2022_str, commitment),
    )
    .await
    .with_context(|| format!("Failed to list token accounts of {}", owner))?;

    let mut accounts: Vec<AssessedAccount> = classic
        .iter()
        .filter_map(|keyed| assess_keyed(keyed, &token_program, false, owner))
        .collect();
    accounts.extend(
        extended
            .iter()
            .filter_map(|keyed| assess_keyed(keyed, &token_2022_program, true, owner)),
    );

    debug!("Found {} token account(s) for {}", accounts.len(), owner);
    Ok(accounts)
}
