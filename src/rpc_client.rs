// Solana RPC access for transaction building and submission
//
// Provides:
// - Fresh blockhash + last valid block height (with retry)
// - Transaction simulation
// - Signature status polling
// - Address lookup table resolution

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_sdk::{
    address_lookup_table::state::AddressLookupTable,
    address_lookup_table_account::AddressLookupTableAccount, commitment_config::CommitmentConfig,
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};
use solana_transaction_status::TransactionConfirmationStatus;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::{debug, info, warn};

/// What the chain currently says about a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Not seen yet, or seen below confirmed commitment
    Pending,
    /// Landed without error at confirmed commitment or higher
    Confirmed,
    /// Landed with an error
    Failed(String),
}

/// Outcome of a dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationResult {
    Ok,
    Rejected(String),
}

/// Lookup table fetched from chain
#[derive(Debug, Clone)]
pub struct ResolvedLookupTable {
    pub account: AddressLookupTableAccount,
    /// `u64::MAX` while the table is active
    pub deactivation_slot: u64,
}

impl ResolvedLookupTable {
    pub fn is_active(&self) -> bool {
        self.deactivation_slot == u64::MAX
    }
}

/// Chain operations the pipeline needs
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest blockhash and the block height after which it expires
    async fn latest_blockhash(&self) -> Result<(Hash, u64)>;
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationResult>;
    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState>;
    async fn block_height(&self) -> Result<u64>;
    /// One entry per key; `None` when the account is missing or not a lookup table
    async fn lookup_tables(&self, keys: &[Pubkey]) -> Result<Vec<Option<ResolvedLookupTable>>>;
}

/// Wrapper around the nonblocking Solana RPC client
pub struct SolanaRpcClient {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpcClient {
    /// Create new RPC client with endpoint URL
    pub fn new(rpc_url: String) -> Self {
        let commitment = CommitmentConfig::confirmed();
        let client = RpcClient::new_with_timeout_and_commitment(
            rpc_url.clone(),
            Duration::from_secs(8),
            commitment,
        );

        info!("✅ Solana RPC client initialized: {}", rpc_url);

        Self { client, commitment }
    }

    /// Health check - verify RPC connection is working
    pub async fn health_check(&self) -> bool {
        match self.client.get_health().await {
            Ok(_) => {
                debug!("✅ RPC health check passed");
                true
            }
            Err(e) => {
                warn!("❌ RPC health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ChainClient for SolanaRpcClient {
    async fn latest_blockhash(&self) -> Result<(Hash, u64)> {
        // 100ms, 200ms, 400ms
        let strategy = ExponentialBackoff::from_millis(2).factor(50).take(3);

        let (hash, last_valid) = Retry::spawn(strategy, || async {
            self.client
                .get_latest_blockhash_with_commitment(self.commitment)
                .await
                .map_err(|e| {
                    warn!("⚠️ Blockhash fetch failed, retrying: {}", e);
                    e
                })
        })
        .await
        .context("Failed to fetch latest blockhash after retries")?;

        debug!("✅ Got blockhash {} (valid until height {})", hash, last_valid);
        Ok((hash, last_valid))
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationResult> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            commitment: Some(self.commitment),
            ..Default::default()
        };

        let response = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .context("Simulation RPC call failed")?;

        match response.value.err {
            Some(err) => {
                let mut reason = format!("{:?}", err);
                if let Some(logs) = &response.value.logs {
                    for log in logs.iter().filter(|l| {
                        l.contains("Error") || l.contains("failed") || l.contains("insufficient")
                    }) {
                        warn!("   📋 {}", log);
                    }
                    if logs.iter().any(|l| l.contains("slippage")) {
                        reason.push_str(" (slippage exceeded)");
                    }
                }
                Ok(SimulationResult::Rejected(reason))
            }
            None => Ok(SimulationResult::Ok),
        }
    }

    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .context("Error checking transaction status")?;

        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(SignatureState::Pending),
        };

        if let Some(err) = status.err {
            return Ok(SignatureState::Failed(format!("{:?}", err)));
        }

        match status.confirmation_status {
            Some(TransactionConfirmationStatus::Confirmed)
            | Some(TransactionConfirmationStatus::Finalized) => Ok(SignatureState::Confirmed),
            _ => Ok(SignatureState::Pending),
        }
    }

    async fn block_height(&self) -> Result<u64> {
        self.client
            .get_block_height()
            .await
            .context("Failed to get block height")
    }

    async fn lookup_tables(&self, keys: &[Pubkey]) -> Result<Vec<Option<ResolvedLookupTable>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let accounts = self
            .client
            .get_multiple_accounts(keys)
            .await
            .context("Failed to fetch lookup tables")?;

        let tables = keys
            .iter()
            .zip(accounts)
            .map(|(key, account)| {
                let account = account?;
                match AddressLookupTable::deserialize(&account.data) {
                    Ok(table) => Some(ResolvedLookupTable {
                        account: AddressLookupTableAccount {
                            key: *key,
                            addresses: table.addresses.to_vec(),
                        },
                        deactivation_slot: table.meta.deactivation_slot,
                    }),
                    Err(e) => {
                        warn!("⚠️ Account {} is not a lookup table: {:?}", key, e);
                        None
                    }
                }
            })
            .collect();

        Ok(tables)
    }
}
