//! Unit tests for the policy scan and full validation
//!
//! Balances come from an in-memory source so every test is deterministic.

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    burn_ix, compute_budget_ix, encode_tx, fee_ix, fee_payer, fee_recipient, key, test_params,
    token_2022_close, token_burn, token_close, transfer_ix, valid_instructions, MockBalances,
};

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use sponsor_relay::error::RejectionKind;
use sponsor_relay::validator::{
    check_instructions, verify_zero_balances, PendingClose, PolicyOutcome, TransactionValidator,
    TOKEN_2022_PROGRAM, TOKEN_PROGRAM,
};
use sponsor_relay::{transaction, Rejection};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Runs only the policy scan over a legacy transaction
fn scan(instructions: &[Instruction]) -> Result<PolicyOutcome, Rejection> {
    let bytes = test_helpers::tx_bytes(instructions);
    let decoded = transaction::decode(&bytes).unwrap();
    check_instructions(&decoded.instructions, &test_params())
}

fn closes(count: u8) -> Vec<Instruction> {
    (1..=count).map(|seed| token_close(key(seed))).collect()
}

fn burns(count: u8) -> Vec<Instruction> {
    (1..=count).map(|seed| token_burn(key(seed), 1)).collect()
}

/// Token instruction with an explicit authority followed by any multisig signers
fn token_ix_with_authority(data: &[u8], account: Pubkey, second: Pubkey, authority: &[Pubkey]) -> Instruction {
    let mut metas = vec![AccountMeta::new(account, false), AccountMeta::new(second, false)];
    metas.extend(authority.iter().map(|signer| AccountMeta::new_readonly(*signer, true)));
    Instruction::new_with_bytes(TOKEN_PROGRAM, data, metas)
}

fn burn_by(account: Pubkey, amount: u64, authority: &[Pubkey]) -> Instruction {
    let mut data = vec![8];
    data.extend_from_slice(&amount.to_le_bytes());
    token_ix_with_authority(&data, account, key(99), authority)
}

fn close_by(account: Pubkey, destination: Pubkey, authority: &[Pubkey]) -> Instruction {
    token_ix_with_authority(&[9], account, destination, authority)
}

// ============================================================================
// ACCEPTANCE TESTS
// ============================================================================

/// What is tested: burn-then-close skips the balance check for the burned account only
/// Why: A burned account is empty by construction; the unburned close must still be verified
#[tokio::test]
async fn test_valid_transaction_verifies_only_unburned_closes() {
    let balances = MockBalances::new().with_balance(key(2), 0);
    let log = balances.lookup_log();
    let validator = TransactionValidator::new(test_params(), balances);

    let result = validator.validate(&encode_tx(&valid_instructions())).await;

    assert!(result.valid, "unexpected rejection: {}", result.message);
    assert!(result.rejection.is_none());
    assert!(result.message.contains("2 close(s), 1 burn(s)"));
    assert_eq!(*log.lock().unwrap(), vec![key(2)]);
}

/// What is tested: the policy outcome lists pending closes with their token program
/// Why: The oracle checks account ownership against the program named by the close
#[test]
fn test_pending_closes_carry_program() {
    let outcome = scan(&[
        token_close(key(1)),
        token_2022_close(key(2)),
        fee_ix(5_000),
    ])
    .unwrap();

    assert_eq!(
        outcome.pending_verification,
        vec![
            PendingClose {
                account: key(1),
                program_id: TOKEN_PROGRAM
            },
            PendingClose {
                account: key(2),
                program_id: TOKEN_2022_PROGRAM
            },
        ]
    );
    assert_eq!(outcome.fee_lamports, 5_000);
}

/// What is tested: closing the same account twice queues one balance check
/// Why: Duplicate lookups waste ledger round-trips; the count limit still sees both
#[test]
fn test_duplicate_close_is_verified_once() {
    let outcome = scan(&[token_close(key(1)), token_close(key(1)), fee_ix(5_000)]).unwrap();
    assert_eq!(outcome.close_count, 2);
    assert_eq!(outcome.pending_verification.len(), 1);
}

/// What is tested: a burn placed after the close of the same account keeps the close pending
/// Why: The burn executes after the close, so it does not prove the account was empty
#[test]
fn test_close_then_burn_still_verified() {
    let outcome = scan(&[token_close(key(1)), token_burn(key(1), 5), fee_ix(5_000)]).unwrap();
    assert_eq!(outcome.pending_verification.len(), 1);
    assert_eq!(outcome.pending_verification[0].account, key(1));
}

/// What is tested: burns alone (no closes) plus the fee are sponsorable
/// Why: Burning dust is a valid request even when the accounts stay open
#[test]
fn test_burn_only_transaction_is_accepted() {
    let outcome = scan(&[token_burn(key(1), 5), fee_ix(5_000)]).unwrap();
    assert_eq!(outcome.burn_count, 1);
    assert_eq!(outcome.close_count, 0);
    assert!(outcome.pending_verification.is_empty());
}

/// What is tested: a fee equal to the ceiling is accepted, one lamport more is rejected
/// Why: The ceiling is inclusive
#[test]
fn test_fee_ceiling_is_inclusive() {
    let max = test_params().max_fee_lamports;
    assert!(scan(&[token_close(key(1)), fee_ix(max)]).is_ok());
    assert_eq!(
        scan(&[token_close(key(1)), fee_ix(max + 1)]),
        Err(Rejection::FeeTooHigh {
            lamports: max + 1,
            max
        })
    );
    assert_eq!(
        Rejection::FeeTooHigh { lamports: max + 1, max }.to_string(),
        format!("Fee amount {} lamports exceeds maximum allowed {} lamports", max + 1, max)
    );
}

/// What is tested: exactly the maximum number of closes and burns is accepted
/// Why: Limits are inclusive; only exceeding them is a violation
#[test]
fn test_limits_are_inclusive() {
    let mut instructions = closes(20);
    instructions.push(fee_ix(5_000));
    assert_eq!(scan(&instructions).unwrap().close_count, 20);

    let mut instructions = burns(10);
    instructions.push(fee_ix(5_000));
    assert_eq!(scan(&instructions).unwrap().burn_count, 10);
}

// ============================================================================
// REJECTION TESTS
// ============================================================================

/// What is tested: a non-zero balance on an unburned close rejects with the exact message
/// Why: Closing a funded account would destroy the user's tokens
#[tokio::test]
async fn test_non_zero_balance_rejected() {
    let balances = MockBalances::new().with_balance(key(2), 42);
    let validator = TransactionValidator::new(test_params(), balances);

    let result = validator.validate(&encode_tx(&valid_instructions())).await;

    assert!(!result.valid);
    assert_eq!(
        result.message,
        format!(
            "Token account {} has non-zero balance (42). Only empty accounts can be closed.",
            key(2)
        )
    );
    let rejection = result.into_result().unwrap_err();
    assert_eq!(rejection.kind(), RejectionKind::Oracle);
}

/// What is tested: a fee sent anywhere but the fee recipient is rejected before any lookup
/// Why: Policy violations short-circuit ahead of the ledger round-trips
#[tokio::test]
async fn test_destination_mismatch_rejected_without_lookups() {
    let balances = MockBalances::new().with_balance(key(1), 0);
    let log = balances.lookup_log();
    let validator = TransactionValidator::new(test_params(), balances);

    let encoded = encode_tx(&[token_close(key(1)), transfer_ix(key(77), 5_000)]);
    let result = validator.validate(&encoded).await;

    assert!(!result.valid);
    assert_eq!(
        result.rejection,
        Some(Rejection::DestinationMismatch {
            destination: key(77),
            expected: fee_recipient()
        })
    );
    assert_eq!(
        result.message,
        format!(
            "Transfer destination {} does not match FEE_RECIPIENT {}",
            key(77),
            fee_recipient()
        )
    );
    assert!(log.lock().unwrap().is_empty());
}

/// What is tested: zero or two fee transfers are rejected
/// Why: Exactly one fee payment is expected per sponsored transaction
#[test]
fn test_transfer_count_must_be_one() {
    assert_eq!(
        scan(&[token_close(key(1))]),
        Err(Rejection::TransferCount { found: 0 })
    );
    assert_eq!(
        scan(&[token_close(key(1)), fee_ix(1_000), fee_ix(1_000)]),
        Err(Rejection::TransferCount { found: 2 })
    );
    assert!(Rejection::TransferCount { found: 2 }
        .to_string()
        .ends_with("expected exactly 1 fee transfer, found 2"));
}

/// What is tested: more closes or burns than allowed are rejected
/// Why: Caps bound the compute and rent the relay fronts per transaction
#[test]
fn test_too_many_closes_and_burns() {
    let mut instructions = closes(21);
    instructions.push(fee_ix(5_000));
    assert_eq!(
        scan(&instructions),
        Err(Rejection::TooManyCloses { count: 21, max: 20 })
    );

    let mut instructions = burns(11);
    instructions.push(fee_ix(5_000));
    assert_eq!(
        scan(&instructions),
        Err(Rejection::TooManyBurns { count: 11, max: 10 })
    );
}

/// What is tested: a fee transfer without any close or burn is rejected
/// Why: The relay only pays for account cleanup
#[test]
fn test_nothing_to_sponsor() {
    assert_eq!(
        scan(&[compute_budget_ix(), fee_ix(5_000)]),
        Err(Rejection::NothingToSponsor)
    );
}

/// What is tested: limit checks run in order (closes, burns, empty, transfer count)
/// Why: Clients see a stable reason when several limits are violated at once
#[test]
fn test_limit_check_order() {
    // Too many closes and too many burns, no fee: closes reported first
    let mut instructions = closes(21);
    instructions.extend(burns(11));
    assert!(matches!(
        scan(&instructions),
        Err(Rejection::TooManyCloses { .. })
    ));

    // Too many burns and no fee: burns reported before transfer count
    assert!(matches!(scan(&burns(11)), Err(Rejection::TooManyBurns { .. })));

    // Nothing to sponsor and no fee: empty reported before transfer count
    assert_eq!(scan(&[compute_budget_ix()]), Err(Rejection::NothingToSponsor));
}

/// What is tested: the first violating instruction decides the rejection
/// Why: Scanning stops at the first violation
#[test]
fn test_first_violation_wins() {
    let unknown = Instruction::new_with_bytes(key(42), &[0], vec![]);
    let result = scan(&[transfer_ix(key(77), 1), unknown.clone(), fee_ix(5_000)]);
    assert!(matches!(result, Err(Rejection::DestinationMismatch { .. })));

    let result = scan(&[unknown, transfer_ix(key(77), 1)]);
    assert!(matches!(result, Err(Rejection::UnauthorizedProgram { .. })));
}

/// What is tested: an undecodable transaction is a decode rejection
/// Why: Garbage input must map to a client error, not an internal one
#[tokio::test]
async fn test_undecodable_transaction_rejected() {
    let validator = TransactionValidator::new(test_params(), MockBalances::new());
    let result = validator.validate("AAAA").await;

    assert!(!result.valid);
    let rejection = result.rejection.unwrap();
    assert_eq!(rejection.kind(), RejectionKind::Decode);
    assert!(rejection.to_string().starts_with("Failed to parse transaction: "));
}

/// What is tested: a failed balance lookup rejects the transaction
/// Why: An unverifiable close must never be sponsored
#[tokio::test]
async fn test_lookup_error_rejects() {
    let balances = MockBalances::new().with_error(key(2), "rpc down");
    let validator = TransactionValidator::new(test_params(), balances);

    let result = validator.validate(&encode_tx(&valid_instructions())).await;

    assert_eq!(
        result.rejection,
        Some(Rejection::VerificationFailed {
            account: key(2),
            detail: "rpc down".to_string()
        })
    );
}

// ============================================================================
// BALANCE VERIFICATION TESTS
// ============================================================================

/// What is tested: a missing account passes verification
/// Why: Closing a nonexistent account fails on-chain without moving funds
#[tokio::test]
async fn test_missing_account_passes() {
    let balances = MockBalances::new().with_missing(key(1));
    let pending = [PendingClose {
        account: key(1),
        program_id: TOKEN_PROGRAM,
    }];
    tokio_test::assert_ok!(verify_zero_balances(&balances, &pending).await);
    assert_eq!(balances.looked_up(), vec![key(1)]);
}

/// What is tested: the first failing account in pending order is reported
/// Why: Lookups run concurrently but the reported reason must be deterministic
#[tokio::test]
async fn test_first_failure_in_order_is_reported() {
    let balances = MockBalances::new()
        .with_balance(key(1), 0)
        .with_balance(key(2), 7)
        .with_balance(key(3), 9);
    let pending: Vec<_> = (1..=3)
        .map(|seed| PendingClose {
            account: key(seed),
            program_id: TOKEN_PROGRAM,
        })
        .collect();

    for _ in 0..5 {
        assert_eq!(
            verify_zero_balances(&balances, &pending).await,
            Err(Rejection::NonZeroBalance {
                account: key(2),
                amount: 7
            })
        );
    }
}

/// What is tested: no pending closes means no lookups
/// Why: Burn-only transactions must not touch the ledger
#[tokio::test]
async fn test_no_pending_closes_skips_lookups() {
    let balances = MockBalances::new();
    tokio_test::assert_ok!(verify_zero_balances(&balances, &[]).await);
    assert!(balances.looked_up().is_empty());
}

/// What is tested: Token-2022 burns are counted like Token burns
/// Why: Both token programs share the burn limit
#[test]
fn test_token_2022_burn_counts() {
    let outcome = scan(&[
        burn_ix(TOKEN_2022_PROGRAM, key(1), 3),
        token_2022_close(key(1)),
        fee_ix(5_000),
    ])
    .unwrap();
    assert_eq!(outcome.burn_count, 1);
    assert!(outcome.pending_verification.is_empty());
}

/// What is tested: a zero-lamport transfer to another destination is still rejected
/// Why: Any transfer not paying the fee recipient could be used to drain the fee payer
#[test]
fn test_zero_lamport_foreign_transfer_rejected() {
    assert_eq!(
        scan(&[token_close(key(1)), transfer_ix(key(77), 0)]),
        Err(Rejection::DestinationMismatch {
            destination: key(77),
            expected: fee_recipient()
        })
    );
}

// ============================================================================
// FEE PAYER PROTECTION TESTS
// ============================================================================

/// What is tested: burning and closing an account whose authority is the relay fee payer is rejected
/// Why: The relay co-signs the transaction, so its own token accounts would be burned and their rent sent anywhere
#[tokio::test]
async fn test_fee_payer_as_token_authority_rejected() {
    let balances = MockBalances::new();
    let log = balances.lookup_log();
    let validator = TransactionValidator::new(test_params(), balances);

    let encoded = encode_tx(&[
        burn_by(key(50), 1_000, &[fee_payer()]),
        close_by(key(50), key(77), &[fee_payer()]),
        fee_ix(0),
    ]);
    let result = validator.validate(&encoded).await;

    assert!(!result.valid);
    assert_eq!(
        result.rejection,
        Some(Rejection::FeePayerAuthority {
            instruction: "burn",
            fee_payer: fee_payer()
        })
    );
    assert!(result.message.contains("relay fee payer"));
    assert!(log.lock().unwrap().is_empty());
}

/// What is tested: a close authorized by the fee payer alone is rejected even when the account is empty
/// Why: The rent of the relay's empty accounts must not be redirected
#[test]
fn test_fee_payer_close_rejected() {
    assert_eq!(
        scan(&[close_by(key(51), key(77), &[fee_payer()]), fee_ix(5_000)]),
        Err(Rejection::FeePayerAuthority {
            instruction: "close",
            fee_payer: fee_payer()
        })
    );
}

/// What is tested: the fee payer among multisig signers is rejected
/// Why: A multisig the relay belongs to is as exposed as the relay's own accounts
#[test]
fn test_fee_payer_as_multisig_signer_rejected() {
    let instructions = [close_by(key(52), key(52), &[key(60), key(61), fee_payer()]), fee_ix(5_000)];
    assert!(matches!(
        scan(&instructions),
        Err(Rejection::FeePayerAuthority { instruction: "close", .. })
    ));
}

/// What is tested: a fee transfer funded by the fee payer is rejected
/// Why: The fee must come from the caller, not from the relay's own lamports
#[test]
fn test_transfer_from_fee_payer_rejected() {
    let mut data = vec![2, 0, 0, 0];
    data.extend_from_slice(&5_000u64.to_le_bytes());
    let transfer = Instruction::new_with_bytes(
        solana_sdk_ids::system_program::ID,
        &data,
        vec![
            AccountMeta::new(fee_payer(), true),
            AccountMeta::new(fee_recipient(), false),
        ],
    );

    let result = scan(&[token_close(key(1)), transfer]);
    assert_eq!(result, Err(Rejection::FeePayerTransfer { account: fee_payer() }));
    assert_eq!(
        result.unwrap_err().to_string(),
        format!("Unauthorized transfer: source {} is the relay fee payer", fee_payer())
    );
}
