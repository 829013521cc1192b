//! Close and burn transaction building
//!
//! Builds the unsigned transactions a wallet signs before submitting them
//! for sponsorship, together with the rent and fee breakdown shown to the
//! user. The output is shaped to pass the relay's own validator.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use thiserror::Error;
use tracing::debug;

use crate::accounts::AssessedAccount;
use crate::config::FeeConfig;
use crate::validator::classifier::{SYSTEM_TRANSFER, TOKEN_BURN, TOKEN_CLOSE_ACCOUNT};
use crate::validator::PolicyParams;

/// Which cleanup a built transaction performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Close empty accounts
    Close,
    /// Burn the remaining balance, then close
    Burn,
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Close => write!(f, "closable"),
            BuildMode::Burn => write!(f, "burnable"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No {mode} token accounts for {owner}")]
    NoEligibleAccounts { owner: Pubkey, mode: BuildMode },

    #[error("Failed to serialize transaction: {0}")]
    Serialize(#[from] bincode::Error),
}

/// Rent reclaimed and fee charged by one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeAccounting {
    pub total_rent_lamports: u64,
    pub fee_lamports: u64,
    /// Rent returned to the owner after the fee
    pub net_lamports: u64,
}

impl FeeAccounting {
    /// Close mode: percentage of reclaimed rent
    pub fn close(total_rent_lamports: u64, fees: &FeeConfig) -> Self {
        Self::with_fee(total_rent_lamports, service_fee(total_rent_lamports, fees))
    }

    /// Burn mode: percentage of reclaimed rent plus the network fee
    pub fn burn(total_rent_lamports: u64, fees: &FeeConfig) -> Self {
        Self::with_fee(
            total_rent_lamports,
            service_fee(total_rent_lamports, fees).saturating_add(fees.network_fee_lamports),
        )
    }

    fn with_fee(total_rent_lamports: u64, fee_lamports: u64) -> Self {
        Self {
            total_rent_lamports,
            fee_lamports,
            net_lamports: total_rent_lamports.saturating_sub(fee_lamports),
        }
    }
}

fn service_fee(total_rent_lamports: u64, fees: &FeeConfig) -> u64 {
    (total_rent_lamports as f64 * fees.fee_percent / 100.0).round() as u64
}

/// Unsigned transaction ready for the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltTransaction {
    /// Base64 wire transaction with empty signature slots
    pub transaction: String,
    /// Token accounts included, in instruction order
    #[serde(serialize_with = "pubkeys_as_strings")]
    pub accounts: Vec<Pubkey>,
    pub accounting: FeeAccounting,
}

fn pubkeys_as_strings<S: serde::Serializer>(
    pubkeys: &[Pubkey],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(pubkeys.iter().map(|pubkey| pubkey.to_string()))
}

/// Builds close and burn transactions paid for by the relay's fee payer
pub struct TransactionBuilder {
    params: PolicyParams,
    fees: FeeConfig,
}

impl TransactionBuilder {
    pub fn new(params: PolicyParams, fees: FeeConfig) -> Self {
        Self { params, fees }
    }

    /// Dispatches to the close or burn builder
    pub fn build(
        &self,
        mode: BuildMode,
        accounts: &[AssessedAccount],
        owner: &Pubkey,
        recent_blockhash: Hash,
    ) -> Result<BuiltTransaction, BuildError> {
        match mode {
            BuildMode::Close => self.build_close_transaction(accounts, owner, recent_blockhash),
            BuildMode::Burn => self.build_burn_transaction(accounts, owner, recent_blockhash),
        }
    }

    /// Closes every closable account of `owner`, rent going back to `owner`
    ///
    /// # Arguments
    ///
    /// * `accounts` - Assessed accounts; non-closable ones are skipped
    /// * `owner` - Wallet that owns the accounts and signs the transaction
    /// * `recent_blockhash` - Blockhash the transaction is built against
    ///
    /// # Returns
    ///
    /// * `Ok(BuiltTransaction)` - At most `max_close_accounts` closes plus the fee transfer
    /// * `Err(BuildError)` - No closable account
    pub fn build_close_transaction(
        &self,
        accounts: &[AssessedAccount],
        owner: &Pubkey,
        recent_blockhash: Hash,
    ) -> Result<BuiltTransaction, BuildError> {
        let selected: Vec<&AssessedAccount> = accounts
            .iter()
            .filter(|account| account.eligibility.can_close && account.owner == *owner)
            .take(self.params.max_close_accounts)
            .collect();

        if selected.is_empty() {
            return Err(BuildError::NoEligibleAccounts {
                owner: *owner,
                mode: BuildMode::Close,
            });
        }

        let mut instructions: Vec<Instruction> = selected
            .iter()
            .map(|account| close_instruction(account, owner))
            .collect();

        let total_rent = selected.iter().map(|account| account.rent_lamports).sum();
        let accounting = FeeAccounting::close(total_rent, &self.fees);
        self.push_fee_transfer(&mut instructions, owner, accounting.fee_lamports);

        self.finish(instructions, selected, accounting, recent_blockhash)
    }

    /// Burns the full balance of every burnable account, then closes it
    ///
    /// At most `max_burn_accounts` accounts are included; the fee covers the
    /// network fee on top of the service fee.
    pub fn build_burn_transaction(
        &self,
        accounts: &[AssessedAccount],
        owner: &Pubkey,
        recent_blockhash: Hash,
    ) -> Result<BuiltTransaction, BuildError> {
        let selected: Vec<&AssessedAccount> = accounts
            .iter()
            .filter(|account| account.eligibility.can_burn && account.owner == *owner)
            .take(self.params.max_burn_accounts.min(self.params.max_close_accounts))
            .collect();

        if selected.is_empty() {
            return Err(BuildError::NoEligibleAccounts {
                owner: *owner,
                mode: BuildMode::Burn,
            });
        }

        let mut instructions = Vec::with_capacity(selected.len() * 2 + 1);
        for account in &selected {
            instructions.push(burn_instruction(account, owner));
            instructions.push(close_instruction(account, owner));
        }

        let total_rent = selected.iter().map(|account| account.rent_lamports).sum();
        let accounting = FeeAccounting::burn(total_rent, &self.fees);
        self.push_fee_transfer(&mut instructions, owner, accounting.fee_lamports);

        self.finish(instructions, selected, accounting, recent_blockhash)
    }

    /// Appends the fee transfer; emitted even at zero lamports since the
    /// validator requires exactly one transfer
    fn push_fee_transfer(&self, instructions: &mut Vec<Instruction>, owner: &Pubkey, lamports: u64) {
        let mut data = SYSTEM_TRANSFER.to_le_bytes().to_vec();
        data.extend_from_slice(&lamports.to_le_bytes());
        instructions.push(Instruction::new_with_bytes(
            self.params.system_program_id,
            &data,
            vec![
                AccountMeta::new(*owner, true),
                AccountMeta::new(self.params.fee_recipient, false),
            ],
        ));
    }

    fn finish(
        &self,
        instructions: Vec<Instruction>,
        selected: Vec<&AssessedAccount>,
        accounting: FeeAccounting,
        recent_blockhash: Hash,
    ) -> Result<BuiltTransaction, BuildError> {
        let message =
            Message::new_with_blockhash(&instructions, Some(&self.params.fee_payer), &recent_blockhash);
        let transaction = Transaction::new_unsigned(message);
        let bytes = bincode::serialize(&transaction)?;

        debug!(
            "Built transaction with {} instruction(s), {} bytes, fee {} lamports",
            instructions.len(),
            bytes.len(),
            accounting.fee_lamports
        );

        Ok(BuiltTransaction {
            transaction: general_purpose::STANDARD.encode(bytes),
            accounts: selected.iter().map(|account| account.address).collect(),
            accounting,
        })
    }
}

fn close_instruction(account: &AssessedAccount, owner: &Pubkey) -> Instruction {
    Instruction::new_with_bytes(
        account.program_id,
        &[TOKEN_CLOSE_ACCOUNT],
        vec![
            AccountMeta::new(account.address, false),
            AccountMeta::new(*owner, false),
            AccountMeta::new_readonly(*owner, true),
        ],
    )
}

fn burn_instruction(account: &AssessedAccount, owner: &Pubkey) -> Instruction {
    let mut data = vec![TOKEN_BURN];
    data.extend_from_slice(&account.amount.to_le_bytes());
    Instruction::new_with_bytes(
        account.program_id,
        &data,
        vec![
            AccountMeta::new(account.address, false),
            AccountMeta::new(account.mint, false),
            AccountMeta::new_readonly(*owner, true),
        ],
    )
}
