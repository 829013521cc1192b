//! Instruction classification
//!
//! Maps each decoded instruction to the single operation the relay is
//! willing to pay for, or to an unauthorized outcome naming why.

use solana_sdk::pubkey::Pubkey;

use super::PolicyParams;
use crate::error::Rejection;
use crate::transaction::Instruction;

/// Token program instruction tag for `Burn`
pub const TOKEN_BURN: u8 = 8;
/// Token program instruction tag for `CloseAccount`
pub const TOKEN_CLOSE_ACCOUNT: u8 = 9;
/// System program instruction type for `Transfer`
pub const SYSTEM_TRANSFER: u32 = 2;

/// Operation an instruction performs, as far as policy is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedOperation {
    /// Token burn on `token_account`
    Burn { token_account: Pubkey },
    /// Token account close; `program_id` is the token program that owns it
    Close {
        token_account: Pubkey,
        program_id: Pubkey,
    },
    /// Lamport transfer to `destination`
    Transfer { destination: Pubkey, lamports: u64 },
    /// Compute budget instruction, ignored by policy
    ComputeBudgetNoop,
    /// Anything else
    Unauthorized(Rejection),
}

/// Classifies one instruction against the program whitelist
///
/// Pure function of the instruction and the policy parameters.
pub fn classify(instruction: &Instruction, params: &PolicyParams) -> ClassifiedOperation {
    let program_id = instruction.program_id;

    if params.is_token_program(&program_id) {
        classify_token(instruction, params)
    } else if program_id == params.system_program_id {
        classify_system(instruction, params)
    } else if program_id == params.compute_budget_program_id {
        ClassifiedOperation::ComputeBudgetNoop
    } else {
        ClassifiedOperation::Unauthorized(Rejection::UnauthorizedProgram { program_id })
    }
}

fn classify_token(instruction: &Instruction, params: &PolicyParams) -> ClassifiedOperation {
    let Some(&discriminator) = instruction.data.first() else {
        return ClassifiedOperation::Unauthorized(Rejection::MalformedInstruction {
            instruction: "token",
            len: 0,
            expected: 1,
        });
    };

    if discriminator != TOKEN_BURN && discriminator != TOKEN_CLOSE_ACCOUNT {
        return ClassifiedOperation::Unauthorized(Rejection::UnauthorizedTokenInstruction {
            program_id: instruction.program_id,
            discriminator,
        });
    }
    let name = if discriminator == TOKEN_BURN { "burn" } else { "close" };

    // Burn: [account, mint, authority, ..signers]; CloseAccount: [account, destination, authority, ..signers]
    if instruction.accounts.len() < 3 {
        return ClassifiedOperation::Unauthorized(Rejection::MissingAccounts {
            instruction: name,
            expected: 3,
            found: instruction.accounts.len(),
        });
    }
    if instruction.accounts[2..]
        .iter()
        .any(|account| account.pubkey == params.fee_payer)
    {
        return ClassifiedOperation::Unauthorized(Rejection::FeePayerAuthority {
            instruction: name,
            fee_payer: params.fee_payer,
        });
    }
    let token_account = instruction.accounts[0].pubkey;

    if discriminator == TOKEN_BURN {
        ClassifiedOperation::Burn { token_account }
    } else {
        ClassifiedOperation::Close {
            token_account,
            program_id: instruction.program_id,
        }
    }
}

fn classify_system(instruction: &Instruction, params: &PolicyParams) -> ClassifiedOperation {
    let data = &instruction.data;
    if data.len() < 4 {
        return ClassifiedOperation::Unauthorized(Rejection::MalformedInstruction {
            instruction: "system",
            len: data.len(),
            expected: 4,
        });
    }

    let instruction_type = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if instruction_type != SYSTEM_TRANSFER {
        return ClassifiedOperation::Unauthorized(Rejection::UnauthorizedSystemInstruction {
            instruction_type,
        });
    }

    if instruction.accounts.len() < 2 {
        return ClassifiedOperation::Unauthorized(Rejection::MissingAccounts {
            instruction: "transfer",
            expected: 2,
            found: instruction.accounts.len(),
        });
    }

    let source = instruction.accounts[0].pubkey;
    if source == params.fee_payer {
        return ClassifiedOperation::Unauthorized(Rejection::FeePayerTransfer { account: source });
    }

    let Some(lamport_bytes) = data.get(4..12) else {
        return ClassifiedOperation::Unauthorized(Rejection::MalformedInstruction {
            instruction: "transfer",
            len: data.len(),
            expected: 12,
        });
    };
    let mut amount = [0u8; 8];
    amount.copy_from_slice(lamport_bytes);

    ClassifiedOperation::Transfer {
        destination: instruction.accounts[1].pubkey,
        lamports: u64::from_le_bytes(amount),
    }
}
