//! Sponsor service
//!
//! Wires the validator, the balance oracle and the submission pipeline
//! together from configuration. One instance is shared by all API requests.

use anyhow::{Context, Result};
use chain_clients_common::RetryPolicy;
use chain_clients_svm::{Commitment, SvmClient};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::accounts::{scan_token_accounts, AssessedAccount};
use crate::builder::{BuildMode, BuiltTransaction, TransactionBuilder};
use crate::config::Config;
use crate::error::SponsorError;
use crate::relay::{
    BlockBuilderClient, BroadcastPolicy, SignerRelayClient, SponsorOutcome, SubmissionPipeline,
};
use crate::validator::{LedgerBalanceSource, PolicyParams, TransactionValidator};

/// Validates and relays sponsored transactions
pub struct SponsorService {
    validator: TransactionValidator<LedgerBalanceSource>,
    pipeline: SubmissionPipeline,
    builder: TransactionBuilder,
    ledger: SvmClient,
    commitment: Commitment,
    fee_payer: String,
}

impl SponsorService {
    /// Builds the service and its clients from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(SponsorService)` - All clients created and policy parsed
    /// * `Err(anyhow::Error)` - Invalid policy or HTTP client setup failure
    pub fn new(config: &Config) -> Result<Self> {
        let params = config.policy_params()?;
        let ledger = SvmClient::with_timeout(
            &config.ledger.rpc_url,
            Duration::from_millis(config.ledger.timeout_ms),
        )
        .context("Failed to create ledger client")?;
        let relay_timeout = Duration::from_millis(config.relay.timeout_ms);

        let pipeline = SubmissionPipeline::new(
            SignerRelayClient::new(&config.relay.endpoint, relay_timeout)?,
            BlockBuilderClient::new(relay_timeout)?,
            ledger.clone(),
            BroadcastPolicy {
                endpoints: config.broadcast.block_builder_urls.clone(),
                confirmation: RetryPolicy::new(
                    config.broadcast.confirmation_attempts,
                    config.confirmation_interval(),
                ),
            },
        );

        info!(
            "Sponsor service ready: relay {}, {} block builder(s), fee recipient {}",
            config.relay.endpoint,
            config.broadcast.block_builder_urls.len(),
            params.fee_recipient
        );

        Ok(Self {
            builder: TransactionBuilder::new(params.clone(), config.fees.clone()),
            validator: TransactionValidator::new(
                params,
                LedgerBalanceSource::new(ledger.clone(), config.ledger.commitment),
            ),
            pipeline,
            ledger,
            commitment: config.ledger.commitment,
            fee_payer: config.relay.fee_payer.clone(),
        })
    }

    /// Fee payer public key served to clients building transactions
    pub fn fee_payer(&self) -> &str {
        &self.fee_payer
    }

    pub fn params(&self) -> &PolicyParams {
        self.validator.params()
    }

    /// Validates a base64 transaction and, if accepted, relays it
    pub async fn sponsor(&self, transaction: &str) -> Result<SponsorOutcome, SponsorError> {
        let span = info_span!("sponsor", request_id = %Uuid::new_v4());
        async {
            self.validator.validate(transaction).await.into_result()?;
            let outcome = self.pipeline.submit(transaction).await?;
            info!("Sponsored transaction {}", outcome.signature);
            Ok::<_, SponsorError>(outcome)
        }
        .instrument(span)
        .await
    }

    /// Lists the token accounts of `owner` with their close and burn eligibility
    pub async fn scan_accounts(&self, owner: &Pubkey) -> Result<Vec<AssessedAccount>> {
        scan_token_accounts(&self.ledger, self.params(), owner, self.commitment).await
    }

    /// Builds an unsigned close or burn transaction over the eligible accounts of `owner`
    ///
    /// # Returns
    ///
    /// * `Ok(BuiltTransaction)` - Transaction against the latest blockhash, with fee accounting
    /// * `Err(anyhow::Error)` - Ledger failure, or a [`crate::builder::BuildError`]
    pub async fn build_transaction(
        &self,
        owner: &Pubkey,
        mode: BuildMode,
    ) -> Result<BuiltTransaction> {
        let (accounts, latest) = tokio::try_join!(
            self.scan_accounts(owner),
            self.ledger.get_latest_blockhash(self.commitment),
        )?;
        let blockhash = Hash::from_str(&latest.blockhash)
            .with_context(|| format!("Invalid blockhash from ledger: {}", latest.blockhash))?;

        let built = self.builder.build(mode, &accounts, owner, blockhash)?;
        info!(
            "Built {:?} transaction for {} over {} account(s)",
            mode,
            owner,
            built.accounts.len()
        );
        Ok(built)
    }
}
