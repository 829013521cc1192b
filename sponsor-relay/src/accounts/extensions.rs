//! Token-2022 account extensions
//!
//! Extensions follow the 165-byte base account as an account-type byte and
//! a sequence of type-length-value entries (u16 type, u16 length, value).

use thiserror::Error;

/// Account-type byte marking a token account (as opposed to a mint)
pub const ACCOUNT_TYPE_ACCOUNT: u8 = 2;

const TRANSFER_FEE_AMOUNT: u16 = 2;
const CONFIDENTIAL_TRANSFER_ACCOUNT: u16 = 5;
const IMMUTABLE_OWNER: u16 = 7;
const MEMO_TRANSFER: u16 = 8;
const CPI_GUARD: u16 = 11;
const PERMANENT_DELEGATE: u16 = 12;
const NON_TRANSFERABLE_ACCOUNT: u16 = 13;
const TRANSFER_HOOK_ACCOUNT: u16 = 15;
const CONFIDENTIAL_TRANSFER_FEE_AMOUNT: u16 = 17;

/// Extension found on a token account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    /// Transfer fees withheld in the account
    TransferFeeAmount { withheld: u64 },
    ConfidentialTransferAccount,
    ConfidentialTransferFeeAmount,
    NonTransferableAccount,
    TransferHookAccount,
    ImmutableOwner,
    MemoTransfer,
    CpiGuard,
    PermanentDelegate,
    /// Any extension type this relay does not know how to assess
    Unrecognized(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("unexpected account type {0}")]
    AccountType(u8),
    #[error("extension entry at offset {0} overruns account data")]
    Overrun(usize),
    #[error("transfer fee extension has {0} byte(s), expected 8")]
    TransferFeeLength(usize),
}

/// Parses the extension area that follows the base account layout
///
/// `data` starts at the account-type byte. An empty slice means no
/// extensions. A zero type ends the list (the rest is padding). Trailing
/// bytes too short for an entry header are an overrun.
pub fn parse_extensions(data: &[u8]) -> Result<Vec<ExtensionKind>, ExtensionError> {
    let Some((&account_type, mut rest)) = data.split_first() else {
        return Ok(Vec::new());
    };
    if account_type != ACCOUNT_TYPE_ACCOUNT {
        return Err(ExtensionError::AccountType(account_type));
    }

    let mut extensions = Vec::new();
    let mut offset = 1;

    while rest.len() >= 4 {
        let extension_type = u16::from_le_bytes([rest[0], rest[1]]);
        let length = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        if extension_type == 0 {
            break;
        }

        let value = rest
            .get(4..4 + length)
            .ok_or(ExtensionError::Overrun(offset))?;

        extensions.push(match extension_type {
            TRANSFER_FEE_AMOUNT => {
                let bytes: [u8; 8] = value
                    .try_into()
                    .map_err(|_| ExtensionError::TransferFeeLength(value.len()))?;
                ExtensionKind::TransferFeeAmount {
                    withheld: u64::from_le_bytes(bytes),
                }
            }
            CONFIDENTIAL_TRANSFER_ACCOUNT => ExtensionKind::ConfidentialTransferAccount,
            CONFIDENTIAL_TRANSFER_FEE_AMOUNT => ExtensionKind::ConfidentialTransferFeeAmount,
            NON_TRANSFERABLE_ACCOUNT => ExtensionKind::NonTransferableAccount,
            TRANSFER_HOOK_ACCOUNT => ExtensionKind::TransferHookAccount,
            IMMUTABLE_OWNER => ExtensionKind::ImmutableOwner,
            MEMO_TRANSFER => ExtensionKind::MemoTransfer,
            CPI_GUARD => ExtensionKind::CpiGuard,
            PERMANENT_DELEGATE => ExtensionKind::PermanentDelegate,
            other => ExtensionKind::Unrecognized(other),
        });

        rest = &rest[4 + length..];
        offset += 4 + length;
    }

    if (1..4).contains(&rest.len()) {
        return Err(ExtensionError::Overrun(offset));
    }

    Ok(extensions)
}
