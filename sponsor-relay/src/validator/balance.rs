//! Balance verification oracle
//!
//! Confirms that every token account queued for closing holds a zero token
//! balance before the relay commits to paying for the transaction.

use anyhow::Result;
use chain_clients_svm::{is_account_not_found, Commitment, SvmClient};
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::future::Future;
use tracing::{debug, warn};

use super::policy::PendingClose;
use crate::error::Rejection;

/// Outcome of a balance lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceLookup {
    /// Token balance in base units
    Balance(u64),
    /// The account does not exist at the queried commitment
    NotFound,
}

/// Source of token balances for pending closes
pub trait BalanceSource: Send + Sync {
    /// Looks up the token balance of `account`, which must be owned by `program_id`
    fn token_balance(
        &self,
        account: &Pubkey,
        program_id: &Pubkey,
    ) -> impl Future<Output = Result<BalanceLookup>> + Send;
}

/// Balance source backed by a ledger RPC node
#[derive(Clone)]
pub struct LedgerBalanceSource {
    client: SvmClient,
    commitment: Commitment,
}

impl LedgerBalanceSource {
    pub fn new(client: SvmClient, commitment: Commitment) -> Self {
        Self { client, commitment }
    }
}

impl BalanceSource for LedgerBalanceSource {
    async fn token_balance(&self, account: &Pubkey, program_id: &Pubkey) -> Result<BalanceLookup> {
        let address = account.to_string();

        let Some(info) = self
            .client
            .get_account_info(&address, self.commitment)
            .await?
        else {
            return Ok(BalanceLookup::NotFound);
        };

        // The close instruction names the program; the account must agree
        let expected_owner = program_id.to_string();
        if info.owner != expected_owner {
            anyhow::bail!(
                "account is owned by {}, not by token program {}",
                info.owner,
                expected_owner
            );
        }

        match self
            .client
            .get_token_account_balance(&address, self.commitment)
            .await
        {
            Ok(balance) => Ok(BalanceLookup::Balance(balance.amount)),
            // Closed between the two reads
            Err(e) if is_account_not_found(&e) => Ok(BalanceLookup::NotFound),
            Err(e) => Err(e),
        }
    }
}

/// Verifies that all pending closes target empty (or nonexistent) accounts
///
/// Lookups run concurrently; the first failure in pending order is reported.
///
/// # Returns
///
/// * `Ok(())` - Every account is empty or absent
/// * `Err(Rejection)` - Non-zero balance, or a lookup could not be completed
pub async fn verify_zero_balances<B: BalanceSource>(
    source: &B,
    pending: &[PendingClose],
) -> Result<(), Rejection> {
    if pending.is_empty() {
        return Ok(());
    }

    debug!("Verifying balances of {} token account(s)", pending.len());

    let lookups = join_all(
        pending
            .iter()
            .map(|close| source.token_balance(&close.account, &close.program_id)),
    )
    .await;

    for (close, lookup) in pending.iter().zip(lookups) {
        match lookup {
            Ok(BalanceLookup::Balance(0)) => {}
            Ok(BalanceLookup::NotFound) => {
                // Closing a missing account fails on-chain without moving funds
                debug!("Token account {} not found, treating as empty", close.account);
            }
            Ok(BalanceLookup::Balance(amount)) => {
                return Err(Rejection::NonZeroBalance {
                    account: close.account,
                    amount,
                });
            }
            Err(e) => {
                warn!("Balance lookup for {} failed: {:#}", close.account, e);
                return Err(Rejection::VerificationFailed {
                    account: close.account,
                    detail: format!("{:#}", e),
                });
            }
        }
    }

    Ok(())
}
