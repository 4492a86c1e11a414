// Transaction assembly for one trade leg
//
// Turns an aggregator-built swap transaction into a leg we control:
// - resolve the address lookup tables the swap references
// - decompile back to plain instructions
// - append exactly one relay tip transfer
// - recompile (v0) against the still-active tables and enforce the packet limit
//
// Deactivated tables are still read for decompilation but left out of the
// recompiled message, so their addresses are expanded to raw account keys.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use solana_sdk::{
    address_lookup_table_account::AddressLookupTableAccount,
    hash::Hash,
    instruction::{AccountMeta, CompiledInstruction, Instruction},
    message::{v0, MessageHeader, VersionedMessage},
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::Signature,
    system_instruction,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ArbError, ArbResult};
use crate::jito_relay::random_tip_account;
use crate::jito_tip_monitor::TipOracle;
use crate::jupiter::SwapSource;
use crate::rpc_client::ChainClient;
use crate::types::Quote;

/// Single-use leg ready for signing. Never replayed after its blockhash expires.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub instructions: Vec<Instruction>,
    pub payer: Pubkey,
    pub lookup_tables: Vec<AddressLookupTableAccount>,
    pub recent_blockhash: Hash,
    pub message: VersionedMessage,
    pub tip_lamports: u64,
    pub tip_account: Pubkey,
    /// Tables whose addresses were expanded to raw keys
    pub expanded_tables: Vec<Pubkey>,
}

/// Rebuild plain instructions from a compiled message
pub fn decompile_instructions(
    message: &VersionedMessage,
    tables: &[AddressLookupTableAccount],
) -> ArbResult<Vec<Instruction>> {
    match message {
        VersionedMessage::Legacy(legacy) => {
            decompile_parts(&legacy.header, &legacy.account_keys, &legacy.instructions, &[], &[])
        }
        VersionedMessage::V0(v0_message) => {
            let mut writable = Vec::new();
            let mut readonly = Vec::new();

            for lookup in &v0_message.address_table_lookups {
                let table = tables
                    .iter()
                    .find(|t| t.key == lookup.account_key)
                    .ok_or_else(|| {
                        ArbError::build_failed(format!(
                            "lookup table {} unresolved",
                            lookup.account_key
                        ))
                    })?;

                for &index in &lookup.writable_indexes {
                    writable.push(table_address(table, index)?);
                }
                for &index in &lookup.readonly_indexes {
                    readonly.push(table_address(table, index)?);
                }
            }

            decompile_parts(
                &v0_message.header,
                &v0_message.account_keys,
                &v0_message.instructions,
                &writable,
                &readonly,
            )
        }
    }
}

fn table_address(table: &AddressLookupTableAccount, index: u8) -> ArbResult<Pubkey> {
    table.addresses.get(index as usize).copied().ok_or_else(|| {
        ArbError::build_failed(format!(
            "lookup table {} has no index {}",
            table.key, index
        ))
    })
}

fn decompile_parts(
    header: &MessageHeader,
    static_keys: &[Pubkey],
    compiled: &[CompiledInstruction],
    loaded_writable: &[Pubkey],
    loaded_readonly: &[Pubkey],
) -> ArbResult<Vec<Instruction>> {
    let num_signed = header.num_required_signatures as usize;
    let num_readonly_signed = header.num_readonly_signed_accounts as usize;
    let num_readonly_unsigned = header.num_readonly_unsigned_accounts as usize;
    let num_static = static_keys.len();

    let key_meta = |index: usize| -> ArbResult<AccountMeta> {
        if index < num_static {
            let is_signer = index < num_signed;
            let is_writable = if is_signer {
                index < num_signed.saturating_sub(num_readonly_signed)
            } else {
                index < num_static.saturating_sub(num_readonly_unsigned)
            };
            return Ok(AccountMeta {
                pubkey: static_keys[index],
                is_signer,
                is_writable,
            });
        }

        let loaded = index - num_static;
        if let Some(key) = loaded_writable.get(loaded) {
            return Ok(AccountMeta::new(*key, false));
        }
        loaded_readonly
            .get(loaded - loaded_writable.len())
            .map(|key| AccountMeta::new_readonly(*key, false))
            .ok_or_else(|| ArbError::build_failed(format!("account index {} out of range", index)))
    };

    compiled
        .iter()
        .map(|ix| {
            let program_id = key_meta(ix.program_id_index as usize)?.pubkey;
            let accounts = ix
                .accounts
                .iter()
                .map(|&i| key_meta(i as usize))
                .collect::<ArbResult<Vec<_>>>()?;
            Ok(Instruction {
                program_id,
                accounts,
                data: ix.data.clone(),
            })
        })
        .collect()
}

/// Wire size of a fully signed transaction carrying this message
pub fn serialized_size(message: &VersionedMessage) -> ArbResult<usize> {
    let signatures = message.header().num_required_signatures as usize;
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); signatures],
        message: message.clone(),
    };
    bincode::serialized_size(&tx)
        .map(|n| n as usize)
        .map_err(|e| ArbError::build_failed(format!("size check failed: {}", e)))
}

/// Append the tip transfer and compile a v0 message within the packet limit.
///
/// Deterministic for identical inputs.
pub fn compile_with_tip(
    payer: &Pubkey,
    instructions: &[Instruction],
    tip_account: &Pubkey,
    tip_lamports: u64,
    tables: &[AddressLookupTableAccount],
    recent_blockhash: Hash,
) -> ArbResult<VersionedMessage> {
    let mut all = instructions.to_vec();
    all.push(system_instruction::transfer(payer, tip_account, tip_lamports));

    let message = v0::Message::try_compile(payer, &all, tables, recent_blockhash)
        .map_err(|e| ArbError::build_failed(format!("v0 compile failed: {:?}", e)))?;
    let message = VersionedMessage::V0(message);

    let size = serialized_size(&message)?;
    if size > PACKET_DATA_SIZE {
        return Err(ArbError::build_failed(format!(
            "transaction is {} bytes, limit {}",
            size, PACKET_DATA_SIZE
        )));
    }

    debug!("🧱 Compiled leg: {} instructions, {} bytes", all.len(), size);
    Ok(message)
}

/// Builds signed-ready legs from quotes
pub struct TransactionBuilder {
    swaps: Arc<dyn SwapSource>,
    chain: Arc<dyn ChainClient>,
    tips: Arc<dyn TipOracle>,
    payer: Pubkey,
}

impl TransactionBuilder {
    pub fn new(
        swaps: Arc<dyn SwapSource>,
        chain: Arc<dyn ChainClient>,
        tips: Arc<dyn TipOracle>,
        payer: Pubkey,
    ) -> Self {
        Self {
            swaps,
            chain,
            tips,
            payer,
        }
    }

    /// Aggregator swap → tipped, recompiled leg.
    ///
    /// A missing swap transaction, an unresolvable table or an oversized
    /// result is a `BuildFailed`; nothing is ever submitted from here.
    pub async fn build(&self, quote: &Quote) -> ArbResult<PendingTransaction> {
        let encoded = self
            .swaps
            .swap_transaction(quote, &self.payer)
            .await?
            .ok_or_else(|| ArbError::build_failed("aggregator returned no swap transaction"))?;

        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| ArbError::build_failed(format!("swap transaction not base64: {}", e)))?;
        let swap_tx: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| ArbError::build_failed(format!("swap transaction undecodable: {}", e)))?;

        let recent_blockhash = *swap_tx.message.recent_blockhash();

        let table_keys: Vec<Pubkey> = swap_tx
            .message
            .address_table_lookups()
            .map(|lookups| lookups.iter().map(|l| l.account_key).collect())
            .unwrap_or_default();

        let resolved = self
            .chain
            .lookup_tables(&table_keys)
            .await
            .map_err(|e| ArbError::build_failed(format!("lookup table fetch failed: {}", e)))?;

        let mut all_tables = Vec::with_capacity(resolved.len());
        let mut live_tables = Vec::with_capacity(resolved.len());
        let mut expanded_tables = Vec::new();
        for (key, table) in table_keys.iter().zip(resolved) {
            let table = table.ok_or_else(|| {
                ArbError::build_failed(format!("lookup table {} unresolved", key))
            })?;
            if table.is_active() {
                live_tables.push(table.account.clone());
            } else {
                warn!("⚠️ Lookup table {} is deactivated, expanding to raw addresses", key);
                expanded_tables.push(*key);
            }
            all_tables.push(table.account);
        }

        let instructions = decompile_instructions(&swap_tx.message, &all_tables)?;

        let tip_lamports = self.tips.tip_lamports().await;
        let tip_account = random_tip_account().map_err(|e| ArbError::build_failed(e.to_string()))?;

        let message = compile_with_tip(
            &self.payer,
            &instructions,
            &tip_account,
            tip_lamports,
            &live_tables,
            recent_blockhash,
        )?;

        info!(
            "🔨 Built leg {}→{}: {} ixs + tip {} lamports → {}",
            short(&quote.input_mint),
            short(&quote.output_mint),
            instructions.len(),
            tip_lamports,
            tip_account
        );

        Ok(PendingTransaction {
            instructions,
            payer: self.payer,
            lookup_tables: live_tables,
            recent_blockhash,
            message,
            tip_lamports,
            tip_account,
            expanded_tables,
        })
    }
}

fn short(mint: &str) -> &str {
    mint.get(..6).unwrap_or(mint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jito_tip_monitor::FixedTip;
    use crate::rpc_client::{ResolvedLookupTable, SignatureState, SimulationResult};
    use async_trait::async_trait;
    use solana_sdk::system_program;

    fn swap_like_instructions(payer: &Pubkey, accounts: &[Pubkey]) -> Vec<Instruction> {
        let program = Pubkey::new_unique();
        let mut metas = vec![AccountMeta::new(*payer, true)];
        metas.extend(accounts.iter().map(|k| AccountMeta::new_readonly(*k, false)));
        vec![Instruction::new_with_bytes(program, &[1, 2, 3], metas)]
    }

    #[test]
    fn test_decompile_round_trip_through_lookup_table() {
        let payer = Pubkey::new_unique();
        let accounts: Vec<Pubkey> = (0..5).map(|_| Pubkey::new_unique()).collect();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: accounts.clone(),
        };
        let ixs = swap_like_instructions(&payer, &accounts);

        let message = VersionedMessage::V0(
            v0::Message::try_compile(&payer, &ixs, &[table.clone()], Hash::default()).unwrap(),
        );
        assert!(message.address_table_lookups().map(|l| !l.is_empty()).unwrap_or(false));

        let decompiled = decompile_instructions(&message, &[table]).unwrap();
        assert_eq!(decompiled, ixs);
    }

    #[test]
    fn test_decompile_fails_without_table() {
        let payer = Pubkey::new_unique();
        let accounts: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: accounts.clone(),
        };
        let ixs = swap_like_instructions(&payer, &accounts);
        let message = VersionedMessage::V0(
            v0::Message::try_compile(&payer, &ixs, &[table], Hash::default()).unwrap(),
        );

        assert!(matches!(
            decompile_instructions(&message, &[]),
            Err(ArbError::BuildFailed(_))
        ));
    }

    #[test]
    fn test_compile_appends_exactly_one_tip() {
        let payer = Pubkey::new_unique();
        let tip_account = Pubkey::new_unique();
        let ixs = swap_like_instructions(&payer, &[Pubkey::new_unique()]);

        let message =
            compile_with_tip(&payer, &ixs, &tip_account, 250_000, &[], Hash::default()).unwrap();
        let decompiled = decompile_instructions(&message, &[]).unwrap();

        assert_eq!(decompiled.len(), ixs.len() + 1);
        let tip = decompiled.last().unwrap();
        assert_eq!(tip.program_id, system_program::id());
        assert_eq!(*tip, system_instruction::transfer(&payer, &tip_account, 250_000));
        assert_eq!(
            decompiled
                .iter()
                .filter(|ix| ix.program_id == system_program::id())
                .count(),
            1
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let payer = Pubkey::new_unique();
        let tip_account = Pubkey::new_unique();
        let ixs = swap_like_instructions(&payer, &[Pubkey::new_unique(), Pubkey::new_unique()]);
        let a = compile_with_tip(&payer, &ixs, &tip_account, 1_000, &[], Hash::default()).unwrap();
        let b = compile_with_tip(&payer, &ixs, &tip_account, 1_000, &[], Hash::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_expanded_addresses_must_fit_packet() {
        let payer = Pubkey::new_unique();
        let tip_account = Pubkey::new_unique();
        let accounts: Vec<Pubkey> = (0..40).map(|_| Pubkey::new_unique()).collect();
        let ixs = swap_like_instructions(&payer, &accounts);

        // With a table the accounts compress to one byte each
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: accounts.clone(),
        };
        assert!(compile_with_tip(&payer, &ixs, &tip_account, 1_000, &[table], Hash::default()).is_ok());

        // Expanded to raw 32-byte keys the leg no longer fits
        let err = compile_with_tip(&payer, &ixs, &tip_account, 1_000, &[], Hash::default()).unwrap_err();
        assert!(matches!(err, ArbError::BuildFailed(ref m) if m.contains("limit")));
    }

    struct CannedSwap(Option<String>);

    #[async_trait]
    impl SwapSource for CannedSwap {
        async fn swap_transaction(&self, _quote: &Quote, _user: &Pubkey) -> ArbResult<Option<String>> {
            Ok(self.0.clone())
        }
    }

    /// Chain that only answers lookup-table queries
    struct TableChain(Vec<Option<ResolvedLookupTable>>);

    #[async_trait]
    impl ChainClient for TableChain {
        async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)> {
            anyhow::bail!("not used")
        }
        async fn simulate(&self, _tx: &VersionedTransaction) -> anyhow::Result<SimulationResult> {
            anyhow::bail!("not used")
        }
        async fn signature_state(&self, _signature: &Signature) -> anyhow::Result<SignatureState> {
            anyhow::bail!("not used")
        }
        async fn block_height(&self) -> anyhow::Result<u64> {
            anyhow::bail!("not used")
        }
        async fn lookup_tables(
            &self,
            _keys: &[Pubkey],
        ) -> anyhow::Result<Vec<Option<ResolvedLookupTable>>> {
            Ok(self.0.clone())
        }
    }

    struct SwapFixture {
        payer: Pubkey,
        ixs: Vec<Instruction>,
        table: AddressLookupTableAccount,
        encoded: String,
    }

    /// Aggregator-style base64 v0 transaction referencing one lookup table
    fn swap_fixture() -> SwapFixture {
        let payer = Pubkey::new_unique();
        let accounts: Vec<Pubkey> = (0..6).map(|_| Pubkey::new_unique()).collect();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: accounts.clone(),
        };
        let ixs = swap_like_instructions(&payer, &accounts);
        let message = VersionedMessage::V0(
            v0::Message::try_compile(&payer, &ixs, &[table.clone()], Hash::new_unique()).unwrap(),
        );
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message,
        };
        let encoded = BASE64.encode(bincode::serialize(&tx).unwrap());
        SwapFixture {
            payer,
            ixs,
            table,
            encoded,
        }
    }

    fn leg_quote() -> Quote {
        Quote {
            input_mint: "So11111111111111111111111111111111111111112".to_string(),
            output_mint: "TokenMint".to_string(),
            in_amount: 50_000_000,
            out_amount: 1_000,
            price_impact_pct: 0.1,
            route_label: "test".to_string(),
            raw: serde_json::Value::Null,
        }
    }

    fn builder(
        swap: Option<String>,
        tables: Vec<Option<ResolvedLookupTable>>,
        tip: u64,
        payer: Pubkey,
    ) -> TransactionBuilder {
        TransactionBuilder::new(
            Arc::new(CannedSwap(swap)),
            Arc::new(TableChain(tables)),
            Arc::new(FixedTip(tip)),
            payer,
        )
    }

    #[tokio::test]
    async fn test_build_keeps_active_table_and_sizes_tip_from_oracle() {
        let fx = swap_fixture();
        let resolved = ResolvedLookupTable {
            account: fx.table.clone(),
            deactivation_slot: u64::MAX,
        };
        let leg = builder(Some(fx.encoded), vec![Some(resolved)], 123_456, fx.payer)
            .build(&leg_quote())
            .await
            .unwrap();

        assert_eq!(leg.instructions, fx.ixs);
        assert_eq!(leg.tip_lamports, 123_456);
        assert!(leg.expanded_tables.is_empty());
        assert_eq!(leg.lookup_tables, vec![fx.table.clone()]);
        let lookups = leg.message.address_table_lookups().unwrap();
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].account_key, fx.table.key);

        let decompiled = decompile_instructions(&leg.message, &[fx.table]).unwrap();
        assert_eq!(
            decompiled.last().unwrap(),
            &system_instruction::transfer(&fx.payer, &leg.tip_account, 123_456)
        );
        assert_eq!(leg.message.recent_blockhash(), &leg.recent_blockhash);
    }

    #[tokio::test]
    async fn test_build_expands_deactivated_table() {
        let fx = swap_fixture();
        let resolved = ResolvedLookupTable {
            account: fx.table.clone(),
            deactivation_slot: 250_000_000,
        };
        let leg = builder(Some(fx.encoded), vec![Some(resolved)], 10_000, fx.payer)
            .build(&leg_quote())
            .await
            .unwrap();

        assert_eq!(leg.expanded_tables, vec![fx.table.key]);
        assert!(leg.lookup_tables.is_empty());
        assert!(leg
            .message
            .address_table_lookups()
            .map(|l| l.is_empty())
            .unwrap_or(true));
        for key in &fx.table.addresses {
            assert!(leg.message.static_account_keys().contains(key));
        }

        // Decodes without any table now
        let decompiled = decompile_instructions(&leg.message, &[]).unwrap();
        assert_eq!(&decompiled[..fx.ixs.len()], &fx.ixs[..]);
    }

    #[tokio::test]
    async fn test_build_without_swap_transaction_fails() {
        let fx = swap_fixture();
        let err = builder(None, Vec::new(), 10_000, fx.payer)
            .build(&leg_quote())
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::BuildFailed(ref m) if m.contains("no swap transaction")));
    }

    #[tokio::test]
    async fn test_build_with_unresolved_table_fails() {
        let fx = swap_fixture();
        let err = builder(Some(fx.encoded), vec![None], 10_000, fx.payer)
            .build(&leg_quote())
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::BuildFailed(ref m) if m.contains("unresolved")));
    }

    #[tokio::test]
    async fn test_build_rejects_garbage_payload() {
        let fx = swap_fixture();
        let err = builder(Some("%%%".to_string()), Vec::new(), 10_000, fx.payer)
            .build(&leg_quote())
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::BuildFailed(_)));
    }
}
