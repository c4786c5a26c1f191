use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use ethers::types::{H256, U256};

use crate::dump::DumpLayout;
use crate::error::{Result, VerifyError};
use crate::helpers::{hex_bytes, same_json_value};
use crate::rpc::{RpcClient, Transport};
use crate::rules::{ChainProfile, FeeRule};
use crate::schema::{
    BlockRecord, LogKey, LogRecord, RpcBlock, RpcReceipt, RpcTransaction, TxnRecord,
};

/// Counts for one batch, or summed over many.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub blocks: usize,
    pub txns: usize,
    pub logs: usize,
    /// Transaction type code -> number of dumped transactions.
    pub types: BTreeMap<u8, usize>,
}

impl BatchStats {
    pub fn absorb(&mut self, other: &BatchStats) {
        self.blocks += other.blocks;
        self.txns += other.txns;
        self.logs += other.logs;
        for (ty, n) in &other.types {
            *self.types.entry(*ty).or_default() += n;
        }
    }
}

/// Checks one dump against a node, batch by batch.
pub struct Verifier<T> {
    rpc: RpcClient<T>,
    layout: DumpLayout,
    profile: &'static ChainProfile,
}

impl<T: Transport> Verifier<T> {
    pub fn new(rpc: RpcClient<T>, layout: DumpLayout, profile: &'static ChainProfile) -> Self {
        Self {
            rpc,
            layout,
            profile,
        }
    }

    /// Runs all phases for one log file. Any inconsistency is returned as an
    /// error; nothing is retried.
    pub async fn verify_batch(&self, log_number: u64) -> Result<BatchStats> {
        let mut stats = BatchStats::default();

        let mut pending = self.verify_blocks(log_number, &mut stats).await?;
        stats.txns = pending.len();
        info!(
            "ok. Verified {} BLOCK info in {log_number}.log",
            stats.blocks
        );

        let mut dumped_logs = self.layout.load_logs(log_number).await?;
        let txns = self
            .layout
            .load_txns(log_number, self.profile.optional_txn_fields)
            .await?;
        for rec in &txns {
            let fetched = pending
                .remove(&rec.transaction_hash)
                .ok_or(VerifyError::TxnNotFetched(rec.transaction_hash))?;
            check_txn(self.profile, rec, &fetched)?;
            *stats.types.entry(rec.tx_type).or_default() += 1;

            let receipt = self
                .rpc
                .transaction_receipt(rec.transaction_hash)
                .await?
                .ok_or_else(|| VerifyError::MissingResult {
                    method: "eth_getTransactionReceipt",
                    param: format!("{:?}", rec.transaction_hash),
                })?;
            check_receipt(self.profile, rec, &receipt)?;

            for log in &receipt.logs {
                let key = log.key();
                let dumped = dumped_logs
                    .remove(&key)
                    .ok_or(VerifyError::LogNotDumped(key))?;
                check_log(key, &dumped, log)?;
            }
            stats.logs += receipt.logs.len();
        }
        info!(
            "ok. Verified {} TRANSACTION info in {log_number}.log. Txn types cnt: {:?}",
            txns.len(),
            stats.types
        );
        info!("ok. Verified {} LOGS info in {log_number}.log.", stats.logs);

        if !pending.is_empty() {
            let mut leftover: Vec<H256> = pending.into_keys().collect();
            leftover.sort();
            return Err(VerifyError::LeftoverTxns(leftover));
        }
        if !dumped_logs.is_empty() {
            return Err(VerifyError::LeftoverLogs(dumped_logs.into_keys().collect()));
        }
        Ok(stats)
    }

    /// Fetches every block of the batch, compares it with its dump record and
    /// returns the fetched transactions keyed by hash.
    async fn verify_blocks(
        &self,
        log_number: u64,
        stats: &mut BatchStats,
    ) -> Result<HashMap<H256, RpcTransaction>> {
        let dumped = self.layout.load_blocks(log_number).await?;
        let mut pending = HashMap::new();

        for number in self.layout.block_range(log_number) {
            let block = self
                .rpc
                .block_by_number(number)
                .await?
                .ok_or_else(|| VerifyError::MissingResult {
                    method: "eth_getBlockByNumber",
                    param: format!("#{number}"),
                })?;
            stats.blocks += 1;

            match dumped.get(&number) {
                Some(rec) => check_block(self.profile, number, rec, &block)?,
                None => {
                    warn!("block #{number} is missing from the dump");
                    if !block.transactions.is_empty() {
                        return Err(VerifyError::MissingBlock {
                            block: number,
                            txns: block.transactions.len(),
                        });
                    }
                }
            }

            trace!("block #{number}: {} txns", block.transactions.len());
            for txn in block.transactions {
                pending.insert(txn.hash, txn);
            }
        }
        Ok(pending)
    }
}

fn ensure<V: PartialEq + Debug>(
    record: &str,
    field: &'static str,
    dumped: V,
    fetched: V,
) -> Result<()> {
    if dumped == fetched {
        return Ok(());
    }
    Err(VerifyError::Mismatch {
        record: record.to_string(),
        field,
        dumped: format!("{dumped:?}"),
        fetched: format!("{fetched:?}"),
    })
}

fn check_block(
    profile: &ChainProfile,
    number: u64,
    rec: &BlockRecord,
    fetched: &RpcBlock,
) -> Result<()> {
    let record = format!("block #{number}");
    let r = record.as_str();
    ensure(r, "blockHash", rec.block_hash, fetched.hash)?;
    ensure(r, "number", number, fetched.number.as_u64())?;
    ensure(r, "parentHash", rec.parent_hash, fetched.parent_hash)?;
    ensure(r, "miner", rec.miner, fetched.miner)?;
    ensure(r, "difficulty", rec.difficulty, fetched.difficulty)?;
    ensure(r, "gasLimit", U256::from(rec.gas_limit), fetched.gas_limit)?;
    ensure(r, "gasUsed", U256::from(rec.gas_used), fetched.gas_used)?;
    ensure(r, "nonce", rec.nonce, fetched.nonce_u64())?;
    ensure(r, "size", rec.size, fetched.size.as_u64())?;
    ensure(r, "timestamp", rec.timestamp, fetched.timestamp.as_u64())?;
    if profile.block_l1_fields {
        ensure(
            r,
            "l1BlockNumber",
            rec.l1_block_number,
            fetched.l1_block_number.map(|n| n.as_u64()),
        )?;
        ensure(r, "baseFeePerGas", rec.base_fee_per_gas, fetched.base_fee_per_gas)?;
    }
    Ok(())
}

fn check_txn(profile: &ChainProfile, rec: &TxnRecord, fetched: &RpcTransaction) -> Result<()> {
    let hash = rec.transaction_hash;
    let record = format!("txn {hash:?}");
    let r = record.as_str();

    ensure(r, "hash", hash, fetched.hash)?;
    ensure(r, "blockHash", rec.block_hash, fetched.block_hash)?;
    ensure(r, "blockNumber", rec.block_number, fetched.block_number.as_u64())?;
    ensure(
        r,
        "transactionIndex",
        rec.transaction_index,
        fetched.transaction_index.as_u64(),
    )?;
    // a null payload stands for empty input
    ensure(
        r,
        "input",
        hex_bytes(rec.data.as_deref().unwrap_or_default()),
        hex_bytes(fetched.input.as_ref()),
    )?;
    ensure(r, "from", rec.from, fetched.from)?;
    ensure(r, "to", rec.to, fetched.to)?;
    ensure(r, "gas", U256::from(rec.gas), fetched.gas)?;
    ensure(r, "nonce", U256::from(rec.nonce), fetched.nonce)?;
    ensure(r, "type", u64::from(rec.tx_type), fetched.tx_type.as_u64())?;
    ensure(r, "value", rec.value, fetched.value)?;
    ensure(
        r,
        "accessList",
        rec.access_list.clone().unwrap_or_default().0,
        fetched.access_list.clone().unwrap_or_default().0,
    )?;

    let rule = profile
        .fee_rule(rec.tx_type)
        .ok_or(VerifyError::UnknownType {
            hash,
            ty: rec.tx_type,
        })?;
    check_fees(r, rule, rec, fetched)?;
    check_optional_fields(profile, rec, fetched)
}

fn check_fees(r: &str, rule: FeeRule, rec: &TxnRecord, fetched: &RpcTransaction) -> Result<()> {
    match rule {
        FeeRule::Legacy => {
            let dumped = [
                ("gasPrice", rec.gas_price),
                ("gasFeeCap", rec.gas_fee_cap),
                ("gasTipCap", rec.gas_tip_cap),
                ("effectiveGasPrice", rec.effective_gas_price),
            ];
            for (field, value) in dumped {
                ensure(r, field, Some(value), fetched.gas_price)?;
            }
        }
        FeeRule::DynamicFee { check_tip } => {
            ensure(r, "effectiveGasPrice", Some(rec.effective_gas_price), fetched.gas_price)?;
            ensure(r, "gasPrice", Some(rec.gas_price), fetched.max_fee_per_gas)?;
            ensure(r, "gasFeeCap", Some(rec.gas_fee_cap), fetched.max_fee_per_gas)?;
            if check_tip {
                ensure(
                    r,
                    "gasTipCap",
                    Some(rec.gas_tip_cap),
                    fetched.max_priority_fee_per_gas,
                )?;
            }
        }
        FeeRule::Unchecked => {
            warn!("{r}: skipping fee fields of type {}", rec.tx_type);
        }
    }
    Ok(())
}

fn check_optional_fields(
    profile: &ChainProfile,
    rec: &TxnRecord,
    fetched: &RpcTransaction,
) -> Result<()> {
    for &(field, kind) in profile.optional_txn_fields {
        match (rec.extras.get(field), fetched.other.get(field)) {
            (None, None) => {}
            (Some(dumped), Some(value)) => {
                if !same_json_value(kind, dumped, value) {
                    return Err(VerifyError::Mismatch {
                        record: format!("txn {:?}", rec.transaction_hash),
                        field,
                        dumped: dumped.get().to_string(),
                        fetched: value.to_string(),
                    });
                }
            }
            (dumped, value) => {
                return Err(VerifyError::OptionalField {
                    hash: rec.transaction_hash,
                    field,
                    dumped: dumped.is_some(),
                    fetched: value.is_some(),
                })
            }
        }
    }
    Ok(())
}

fn check_receipt(profile: &ChainProfile, rec: &TxnRecord, receipt: &RpcReceipt) -> Result<()> {
    let record = format!("receipt {:?}", rec.transaction_hash);
    let r = record.as_str();
    ensure(r, "transactionHash", rec.transaction_hash, receipt.transaction_hash)?;
    ensure(r, "gasUsed", U256::from(rec.gas_used), receipt.gas_used)?;
    ensure(r, "status", rec.status, receipt.status.map(|s| s.as_u64()))?;
    if profile.receipt_l1_fields {
        ensure(
            r,
            "gasUsedForL1",
            rec.gas_used_for_l1,
            receipt.gas_used_for_l1.map(|g| g.as_u64()),
        )?;
        ensure(
            r,
            "l1BlockNumber",
            rec.l1_block_number,
            receipt.l1_block_number.map(|n| n.as_u64()),
        )?;
        ensure(
            r,
            "effectiveGasPrice",
            Some(rec.effective_gas_price),
            receipt.effective_gas_price,
        )?;
    }
    Ok(())
}

fn check_log(key: LogKey, dumped: &LogRecord, fetched: &LogRecord) -> Result<()> {
    let record = format!("log {key}");
    let r = record.as_str();
    ensure(r, "address", dumped.address, fetched.address)?;
    ensure(r, "topics", &dumped.topics, &fetched.topics)?;
    ensure(
        r,
        "data",
        hex_bytes(dumped.data.as_ref()),
        hex_bytes(fetched.data.as_ref()),
    )?;
    ensure(r, "blockNumber", dumped.block_number, fetched.block_number)?;
    ensure(r, "transactionHash", dumped.transaction_hash, fetched.transaction_hash)?;
    ensure(r, "transactionIndex", dumped.transaction_index, fetched.transaction_index)?;
    ensure(r, "blockHash", dumped.block_hash, fetched.block_hash)?;
    ensure(r, "logIndex", dumped.log_index, fetched.log_index)?;
    ensure(r, "removed", dumped.removed, fetched.removed)
}
