//! Relay submission pipeline
//!
//! Runs only for accepted transactions. Without block builders the signer
//! relay co-signs and broadcasts in one call. With block builders the relay
//! only co-signs; the signed transaction is submitted as a bundle to the
//! first builder that accepts it and the ledger is polled for confirmation.

pub mod bundle;
pub mod signer;

pub use bundle::BlockBuilderClient;
pub use signer::{parse_sign_result, SignedTransaction, SignerRelayClient};

use chain_clients_common::{poll_until, try_each, PollStatus, RetryPolicy};
use chain_clients_svm::{Commitment, SvmClient};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SponsorError;
use crate::transaction::encode_base58;

/// Successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorOutcome {
    pub signature: String,
    /// Receipt id from the block builder that accepted the bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    /// Set when confirmation polling ran out before the transaction landed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Block-builder endpoints and confirmation budget
#[derive(Debug, Clone)]
pub struct BroadcastPolicy {
    /// Tried in order; empty selects sign-and-send through the relay
    pub endpoints: Vec<String>,
    pub confirmation: RetryPolicy,
}

/// Forwards accepted transactions to the signer relay and block builders
pub struct SubmissionPipeline {
    signer: SignerRelayClient,
    builders: BlockBuilderClient,
    ledger: SvmClient,
    broadcast: BroadcastPolicy,
}

impl SubmissionPipeline {
    pub fn new(
        signer: SignerRelayClient,
        builders: BlockBuilderClient,
        ledger: SvmClient,
        broadcast: BroadcastPolicy,
    ) -> Self {
        Self {
            signer,
            builders,
            ledger,
            broadcast,
        }
    }

    /// Submits an accepted transaction
    ///
    /// # Arguments
    ///
    /// * `transaction` - Base64 transaction exactly as received from the client
    ///
    /// # Returns
    ///
    /// * `Ok(SponsorOutcome)` - Signature, plus bundle id and warning in bundle mode
    /// * `Err(SponsorError)` - Relay, broadcast or on-chain failure
    pub async fn submit(&self, transaction: &str) -> Result<SponsorOutcome, SponsorError> {
        if self.broadcast.endpoints.is_empty() {
            let sent = self.signer.sign_and_send_transaction(transaction).await?;
            info!("Relay signed and sent transaction {}", sent.signature);
            return Ok(SponsorOutcome {
                signature: sent.signature,
                bundle_id: None,
                warning: None,
            });
        }

        let signed = self.signer.sign_transaction(transaction).await?;
        let encoded = encode_base58(&signed.bytes()?);

        let (bundle_id, endpoint) = try_each(&self.broadcast.endpoints, |endpoint| {
            self.builders.send_bundle(endpoint, &encoded)
        })
        .await
        .map_err(|e| SponsorError::Broadcast(e.to_string()))?;

        info!(
            "Bundle {} for transaction {} accepted by {}",
            bundle_id, signed.signature, endpoint
        );

        let warning = self.await_confirmation(&signed.signature).await?;

        Ok(SponsorOutcome {
            signature: signed.signature,
            bundle_id: Some(bundle_id),
            warning,
        })
    }

    /// Polls the ledger until the transaction is confirmed, failed, or the budget runs out
    ///
    /// Returns a warning when the budget ran out; the transaction may still land.
    async fn await_confirmation(&self, signature: &str) -> Result<Option<String>, SponsorError> {
        let ledger = &self.ledger;

        let outcome = poll_until(&self.broadcast.confirmation, |attempt| async move {
            match ledger.get_signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        PollStatus::Ready(Err(SponsorError::FailedOnChain {
                            signature: signature.to_string(),
                            error: err.to_string(),
                        }))
                    } else if status.reached(Commitment::Confirmed) {
                        PollStatus::Ready(Ok(()))
                    } else {
                        PollStatus::Pending
                    }
                }
                Ok(None) => PollStatus::Pending,
                Err(e) => {
                    warn!("Status check {} for {} failed: {:#}", attempt, signature, e);
                    PollStatus::Pending
                }
            }
        })
        .await;

        match outcome {
            Some(Ok(())) => {
                info!("Transaction {} confirmed", signature);
                Ok(None)
            }
            Some(Err(e)) => Err(e),
            None => {
                let warning = format!(
                    "Transaction submitted but not confirmed after {} status checks; it may still land. Verify signature {} on-chain.",
                    self.broadcast.confirmation.max_attempts, signature
                );
                warn!("{}", warning);
                Ok(Some(warning))
            }
        }
    }
}
