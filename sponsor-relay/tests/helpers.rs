//! Shared test helpers for sponsor-relay tests
//!
//! Fixture transactions are encoded with solana-sdk and bincode so the
//! decoder under test never decodes its own output.

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use chain_clients_svm::Commitment;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::{v0, Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use sponsor_relay::config::{
    ApiConfig, BroadcastConfig, Config, FeeConfig, LedgerConfig, PolicyConfig, RelayConfig,
};
use sponsor_relay::validator::{
    BalanceLookup, BalanceSource, PolicyParams, TOKEN_2022_PROGRAM, TOKEN_PROGRAM,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DUMMY_FEE_PAYER: &str = "va1TBuMdfdgHUb3fYA79CfFQPFf3KQ3k86n5dp4hHRr";

// ============================================================================
// KEYS AND PARAMETERS
// ============================================================================

/// Deterministic public key distinct per seed byte
pub fn key(seed: u8) -> Pubkey {
    Pubkey::new_from_array([seed; 32])
}

pub fn fee_recipient() -> Pubkey {
    key(200)
}

pub fn fee_payer() -> Pubkey {
    key(201)
}

pub fn owner() -> Pubkey {
    key(202)
}

pub fn test_params() -> PolicyParams {
    PolicyParams::mainnet(fee_recipient(), fee_payer())
}

// ============================================================================
// INSTRUCTIONS
// ============================================================================

pub fn close_ix(program_id: Pubkey, account: Pubkey) -> Instruction {
    Instruction::new_with_bytes(
        program_id,
        &[9],
        vec![
            AccountMeta::new(account, false),
            AccountMeta::new(owner(), false),
            AccountMeta::new_readonly(owner(), true),
        ],
    )
}

pub fn burn_ix(program_id: Pubkey, account: Pubkey, amount: u64) -> Instruction {
    let mut data = vec![8];
    data.extend_from_slice(&amount.to_le_bytes());
    Instruction::new_with_bytes(
        program_id,
        &data,
        vec![
            AccountMeta::new(account, false),
            AccountMeta::new(key(99), false),
            AccountMeta::new_readonly(owner(), true),
        ],
    )
}

pub fn transfer_ix(destination: Pubkey, lamports: u64) -> Instruction {
    let mut data = vec![2, 0, 0, 0];
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction::new_with_bytes(
        solana_sdk_ids::system_program::ID,
        &data,
        vec![
            AccountMeta::new(owner(), true),
            AccountMeta::new(destination, false),
        ],
    )
}

pub fn fee_ix(lamports: u64) -> Instruction {
    transfer_ix(fee_recipient(), lamports)
}

/// ComputeBudget SetComputeUnitLimit(200_000)
pub fn compute_budget_ix() -> Instruction {
    let mut data = vec![2];
    data.extend_from_slice(&200_000u32.to_le_bytes());
    Instruction::new_with_bytes(solana_sdk_ids::compute_budget::ID, &data, vec![])
}

pub fn token_close(account: Pubkey) -> Instruction {
    close_ix(TOKEN_PROGRAM, account)
}

pub fn token_burn(account: Pubkey, amount: u64) -> Instruction {
    burn_ix(TOKEN_PROGRAM, account, amount)
}

pub fn token_2022_close(account: Pubkey) -> Instruction {
    close_ix(TOKEN_2022_PROGRAM, account)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Legacy transaction paid by the relay fee payer, unsigned
pub fn legacy_tx(instructions: &[Instruction]) -> Transaction {
    let blockhash = Hash::new_from_array([3; 32]);
    let message = Message::new_with_blockhash(instructions, Some(&fee_payer()), &blockhash);
    Transaction::new_unsigned(message)
}

pub fn tx_bytes(instructions: &[Instruction]) -> Vec<u8> {
    bincode::serialize(&legacy_tx(instructions)).unwrap()
}

/// Base64 wire encoding of a legacy transaction
pub fn encode_tx(instructions: &[Instruction]) -> String {
    general_purpose::STANDARD.encode(tx_bytes(instructions))
}

/// Version 0 transaction without address lookup tables
pub fn v0_tx_bytes(instructions: &[Instruction]) -> Vec<u8> {
    let message =
        v0::Message::try_compile(&fee_payer(), instructions, &[], Hash::new_from_array([3; 32]))
            .unwrap();
    let signature_count = message.header.num_required_signatures as usize;
    let transaction = VersionedTransaction {
        signatures: vec![Signature::default(); signature_count],
        message: VersionedMessage::V0(message),
    };
    bincode::serialize(&transaction).unwrap()
}

/// Signed transaction bytes whose first signature is `[fill; 64]`
pub fn signed_tx_bytes(instructions: &[Instruction], fill: u8) -> Vec<u8> {
    let mut transaction = legacy_tx(instructions);
    for signature in transaction.signatures.iter_mut() {
        *signature = Signature::from([fill; 64]);
    }
    bincode::serialize(&transaction).unwrap()
}

pub fn signature_of(fill: u8) -> String {
    bs58::encode([fill; 64]).into_string()
}

/// A transaction the policy accepts: burn+close A, close B, fee transfer
pub fn valid_instructions() -> Vec<Instruction> {
    vec![
        compute_budget_ix(),
        token_burn(key(1), 1_000),
        token_close(key(1)),
        token_close(key(2)),
        fee_ix(25_000),
    ]
}

// ============================================================================
// BALANCES
// ============================================================================

/// In-memory balance source recording every lookup
#[derive(Default)]
pub struct MockBalances {
    balances: HashMap<Pubkey, Result<BalanceLookup, String>>,
    lookups: Arc<Mutex<Vec<Pubkey>>>,
}

impl MockBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, account: Pubkey, amount: u64) -> Self {
        self.balances.insert(account, Ok(BalanceLookup::Balance(amount)));
        self
    }

    pub fn with_missing(mut self, account: Pubkey) -> Self {
        self.balances.insert(account, Ok(BalanceLookup::NotFound));
        self
    }

    pub fn with_error(mut self, account: Pubkey, message: &str) -> Self {
        self.balances.insert(account, Err(message.to_string()));
        self
    }

    pub fn looked_up(&self) -> Vec<Pubkey> {
        self.lookups.lock().unwrap().clone()
    }

    /// Handle on the lookup log that outlives moving the source into a validator
    pub fn lookup_log(&self) -> Arc<Mutex<Vec<Pubkey>>> {
        self.lookups.clone()
    }
}

impl BalanceSource for MockBalances {
    async fn token_balance(
        &self,
        account: &Pubkey,
        _program_id: &Pubkey,
    ) -> anyhow::Result<BalanceLookup> {
        self.lookups.lock().unwrap().push(*account);
        match self.balances.get(account) {
            Some(Ok(lookup)) => Ok(*lookup),
            Some(Err(message)) => Err(anyhow::anyhow!("{}", message)),
            None => Err(anyhow::anyhow!("no balance configured for {}", account)),
        }
    }
}

// ============================================================================
// TOKEN ACCOUNT DATA
// ============================================================================

/// Raw 165-byte SPL token account
pub fn token_account_data(
    mint: Pubkey,
    owner: Pubkey,
    amount: u64,
    frozen: bool,
    close_authority: Option<Pubkey>,
) -> Vec<u8> {
    let mut data = vec![0u8; 165];
    data[0..32].copy_from_slice(mint.as_ref());
    data[32..64].copy_from_slice(owner.as_ref());
    data[64..72].copy_from_slice(&amount.to_le_bytes());
    data[108] = if frozen { 2 } else { 1 };
    if let Some(authority) = close_authority {
        data[129..133].copy_from_slice(&1u32.to_le_bytes());
        data[133..165].copy_from_slice(authority.as_ref());
    }
    data
}

/// Appends a Token-2022 extension area with the given (type, value) entries
pub fn with_extensions(mut data: Vec<u8>, entries: &[(u16, Vec<u8>)]) -> Vec<u8> {
    data.push(2);
    for (extension_type, value) in entries {
        data.extend_from_slice(&extension_type.to_le_bytes());
        data.extend_from_slice(&(value.len() as u16).to_le_bytes());
        data.extend_from_slice(value);
    }
    data
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Config pointing at mock servers; no block builders (sign-and-send mode)
pub fn build_test_config(relay_url: &str, ledger_url: &str) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 3333,
        },
        relay: RelayConfig {
            endpoint: relay_url.to_string(),
            fee_payer: DUMMY_FEE_PAYER.to_string(),
            timeout_ms: 5_000,
        },
        ledger: LedgerConfig {
            rpc_url: ledger_url.to_string(),
            commitment: Commitment::Confirmed,
            timeout_ms: 5_000,
        },
        policy: PolicyConfig {
            fee_recipient: fee_recipient().to_string(),
            ..PolicyConfig::default()
        },
        broadcast: BroadcastConfig {
            block_builder_urls: Vec::new(),
            confirmation_attempts: 3,
            confirmation_interval_ms: 10,
        },
        fees: FeeConfig::default(),
    }
}
