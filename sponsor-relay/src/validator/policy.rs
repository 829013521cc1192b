//! Policy state machine over the classified instruction stream
//!
//! Instructions are applied in transaction order. The first violation stops
//! the scan; count limits are only checked once every instruction passed.

use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use tracing::debug;

use super::classifier::{classify, ClassifiedOperation};
use super::PolicyParams;
use crate::error::Rejection;
use crate::transaction::Instruction;

/// Close that still needs its token balance confirmed as zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingClose {
    pub account: Pubkey,
    pub program_id: Pubkey,
}

/// Running state of one policy scan
#[derive(Debug, Default)]
pub struct ValidationAccumulator {
    pub close_count: usize,
    pub burn_count: usize,
    pub transfer_count: usize,
    /// Accounts burned earlier in the transaction
    pub burned: HashSet<Pubkey>,
    /// Closes of accounts not burned earlier, in first-seen order
    pub pending_verification: Vec<PendingClose>,
}

/// Successful outcome of the policy scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub close_count: usize,
    pub burn_count: usize,
    /// Lamports of the single fee transfer
    pub fee_lamports: u64,
    /// Closes whose balances the oracle must confirm as zero
    pub pending_verification: Vec<PendingClose>,
}

impl ValidationAccumulator {
    /// Applies one classified operation, rejecting on the first violation
    pub fn apply(
        &mut self,
        operation: ClassifiedOperation,
        params: &PolicyParams,
    ) -> Result<(), Rejection> {
        match operation {
            ClassifiedOperation::Burn { token_account } => {
                self.burn_count += 1;
                // A burn after a close of the same account does not waive the check
                if !self.is_pending(&token_account) {
                    self.burned.insert(token_account);
                }
            }
            ClassifiedOperation::Close {
                token_account,
                program_id,
            } => {
                self.close_count += 1;
                if !self.burned.contains(&token_account) && !self.is_pending(&token_account) {
                    self.pending_verification.push(PendingClose {
                        account: token_account,
                        program_id,
                    });
                }
            }
            ClassifiedOperation::Transfer {
                destination,
                lamports,
            } => {
                if destination != params.fee_recipient {
                    return Err(Rejection::DestinationMismatch {
                        destination,
                        expected: params.fee_recipient,
                    });
                }
                if lamports > params.max_fee_lamports {
                    return Err(Rejection::FeeTooHigh {
                        lamports,
                        max: params.max_fee_lamports,
                    });
                }
                self.transfer_count += 1;
            }
            ClassifiedOperation::ComputeBudgetNoop => {}
            ClassifiedOperation::Unauthorized(rejection) => return Err(rejection),
        }
        Ok(())
    }

    /// Checks the instruction-mix limits once every instruction passed
    pub fn finish(self, params: &PolicyParams, fee_lamports: u64) -> Result<PolicyOutcome, Rejection> {
        if self.close_count > params.max_close_accounts {
            return Err(Rejection::TooManyCloses {
                count: self.close_count,
                max: params.max_close_accounts,
            });
        }
        if self.burn_count > params.max_burn_accounts {
            return Err(Rejection::TooManyBurns {
                count: self.burn_count,
                max: params.max_burn_accounts,
            });
        }
        if self.close_count == 0 && self.burn_count == 0 {
            return Err(Rejection::NothingToSponsor);
        }
        if self.transfer_count != 1 {
            return Err(Rejection::TransferCount {
                found: self.transfer_count,
            });
        }

        Ok(PolicyOutcome {
            close_count: self.close_count,
            burn_count: self.burn_count,
            fee_lamports,
            pending_verification: self.pending_verification,
        })
    }

    fn is_pending(&self, account: &Pubkey) -> bool {
        self.pending_verification
            .iter()
            .any(|pending| pending.account == *account)
    }
}

/// Runs the policy scan over a decoded instruction list
///
/// # Arguments
///
/// * `instructions` - Instructions in transaction order
/// * `params` - Whitelist, fee recipient and limits
///
/// # Returns
///
/// * `Ok(PolicyOutcome)` - Every instruction allowed and limits respected
/// * `Err(Rejection)` - First violation encountered
pub fn check_instructions(
    instructions: &[Instruction],
    params: &PolicyParams,
) -> Result<PolicyOutcome, Rejection> {
    let mut accumulator = ValidationAccumulator::default();
    let mut fee_lamports = 0u64;

    for (position, instruction) in instructions.iter().enumerate() {
        let operation = classify(instruction, params);
        debug!(position, program_id = %instruction.program_id, ?operation, "Classified instruction");
        if let ClassifiedOperation::Transfer { lamports, .. } = operation {
            fee_lamports = fee_lamports.saturating_add(lamports);
        }
        accumulator.apply(operation, params)?;
    }

    accumulator.finish(params, fee_lamports)
}
