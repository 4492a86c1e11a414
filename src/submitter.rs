// Leg signing, dry-run, relay submission and confirmation polling

use solana_sdk::{
    signature::{Keypair, Signature},
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{ArbError, ArbResult};
use crate::jito_relay::Relay;
use crate::rpc_client::{ChainClient, SignatureState, SimulationResult};
use crate::tx_builder::PendingTransaction;

/// Delay between signature status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Signed leg plus the height after which its blockhash is dead
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub transaction: VersionedTransaction,
    pub last_valid_block_height: u64,
}

impl SignedTransaction {
    pub fn signature(&self) -> Signature {
        self.transaction.signatures.first().copied().unwrap_or_default()
    }
}

/// Poll until the signature lands, fails, expires or the timeout elapses.
///
/// Status read errors are logged and polling continues; they never count
/// as success.
pub async fn wait_for_confirmation(
    chain: &dyn ChainClient,
    signature: &Signature,
    last_valid_block_height: u64,
    timeout: Duration,
    poll_interval: Duration,
) -> ArbResult<()> {
    let started = Instant::now();

    loop {
        match chain.signature_state(signature).await {
            Ok(SignatureState::Confirmed) => {
                info!("✅ Confirmed {} in {}ms", signature, started.elapsed().as_millis());
                return Ok(());
            }
            Ok(SignatureState::Failed(reason)) => {
                warn!("❌ {} failed on-chain: {}", signature, reason);
                return Err(ArbError::TransactionFailed {
                    signature: signature.to_string(),
                    reason,
                });
            }
            Ok(SignatureState::Pending) => {}
            Err(e) => warn!("⚠️ Status check for {} failed: {}", signature, e),
        }

        match chain.block_height().await {
            Ok(height) if height > last_valid_block_height => {
                warn!(
                    "⌛ Blockhash expired for {} (height {} > {})",
                    signature, height, last_valid_block_height
                );
                return Err(ArbError::BlockhashExpired {
                    signature: signature.to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => debug!("Block height read failed: {}", e),
        }

        if started.elapsed() >= timeout {
            warn!("⏱️ No confirmation for {} within {:?}", signature, timeout);
            return Err(ArbError::ConfirmationTimeout {
                signature: signature.to_string(),
            });
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Signs legs with the wallet and pushes them through the relay
pub struct Submitter {
    chain: Arc<dyn ChainClient>,
    relay: Arc<dyn Relay>,
    keypair: Arc<Keypair>,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl Submitter {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        relay: Arc<dyn Relay>,
        keypair: Arc<Keypair>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            relay,
            keypair,
            confirm_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Attach a fresh blockhash and sign, immediately before use
    pub async fn sign_fresh(&self, pending: &PendingTransaction) -> ArbResult<SignedTransaction> {
        let (blockhash, last_valid_block_height) = self
            .chain
            .latest_blockhash()
            .await
            .map_err(|e| ArbError::submission_failed(format!("no fresh blockhash: {}", e)))?;

        let mut message = pending.message.clone();
        message.set_recent_blockhash(blockhash);

        let transaction = VersionedTransaction::try_new(message, &[self.keypair.as_ref()])
            .map_err(|e| ArbError::build_failed(format!("signing failed: {}", e)))?;

        debug!("✍️ Signed leg with blockhash {} (valid until {})", blockhash, last_valid_block_height);

        Ok(SignedTransaction {
            transaction,
            last_valid_block_height,
        })
    }

    /// Dry-run a leg. Any rejection, or no answer at all, aborts before funds move.
    pub async fn simulate(&self, pending: &PendingTransaction) -> ArbResult<()> {
        let signed = self.sign_fresh(pending).await?;

        match self.chain.simulate(&signed.transaction).await {
            Ok(SimulationResult::Ok) => {
                debug!("🧪 Simulation passed");
                Ok(())
            }
            Ok(SimulationResult::Rejected(reason)) => {
                warn!("🧪 Simulation rejected: {}", reason);
                Err(ArbError::SimulationRejected(reason))
            }
            Err(e) => Err(ArbError::SimulationRejected(format!("simulation unavailable: {}", e))),
        }
    }

    /// Sign, relay and wait for a terminal status. Never retried in place.
    pub async fn submit(&self, pending: &PendingTransaction) -> ArbResult<Signature> {
        let signed = self.sign_fresh(pending).await?;
        let signature = self.relay.send_transaction(&signed.transaction).await?;

        wait_for_confirmation(
            self.chain.as_ref(),
            &signature,
            signed.last_valid_block_height,
            self.confirm_timeout,
            self.poll_interval,
        )
        .await?;

        Ok(signature)
    }
}
