use std::collections::BTreeMap;
use std::fmt;

use ethers::types::transaction::eip2930::AccessList;
use ethers::types::{Bytes, H160, H256, H64, U256, U64};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::helpers;

/// Position of a log inside the chain: `(blockNumber, logIndex)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogKey {
    pub block: u64,
    pub index: u64,
}

impl fmt::Display for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(block #{}, log {})", self.block, self.index)
    }
}

impl fmt::Debug for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One line of `blocks/<dir>/<log>.log`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub block_number: u64,
    pub block_hash: H256,
    pub parent_hash: H256,
    pub miner: H160,
    #[serde(with = "helpers::quantity")]
    pub difficulty: U256,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub nonce: u64,
    pub size: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub l1_block_number: Option<u64>,
    #[serde(default, with = "helpers::quantity::option")]
    pub base_fee_per_gas: Option<U256>,
}

/// One line of `transactions/<dir>/<log>.log`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxnRecord {
    pub transaction_hash: H256,
    pub block_hash: H256,
    pub block_number: u64,
    pub transaction_index: u64,
    pub from: H160,
    pub to: Option<H160>,
    pub gas: u64,
    pub gas_used: u64,
    pub nonce: u64,
    #[serde(rename = "type")]
    pub tx_type: u8,
    #[serde(with = "helpers::quantity")]
    pub value: U256,
    #[serde(default, with = "helpers::base64_bytes::option")]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub access_list: Option<AccessList>,
    #[serde(with = "helpers::quantity")]
    pub gas_price: U256,
    #[serde(with = "helpers::quantity")]
    pub gas_fee_cap: U256,
    #[serde(with = "helpers::quantity")]
    pub gas_tip_cap: U256,
    #[serde(with = "helpers::quantity")]
    pub effective_gas_price: U256,
    #[serde(default)]
    pub status: Option<u64>,
    #[serde(default, rename = "gasUsedForL1")]
    pub gas_used_for_l1: Option<u64>,
    #[serde(default)]
    pub l1_block_number: Option<u64>,
    /// Raw profile-specific optional fields, filled in by the loader.
    #[serde(skip)]
    pub extras: BTreeMap<String, Box<RawValue>>,
}

/// A log in go-ethereum's JSON form. The dumper and the node both write it
/// this way, so one type serves both sides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub address: H160,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: U64,
    pub transaction_hash: H256,
    pub transaction_index: U64,
    pub block_hash: H256,
    pub log_index: U64,
    #[serde(default)]
    pub removed: bool,
}

impl LogRecord {
    pub fn key(&self) -> LogKey {
        LogKey {
            block: self.block_number.as_u64(),
            index: self.log_index.as_u64(),
        }
    }
}

/// `eth_getBlockByNumber` result with full transactions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub hash: H256,
    pub number: U64,
    pub parent_hash: H256,
    pub miner: H160,
    pub difficulty: U256,
    pub gas_limit: U256,
    pub gas_used: U256,
    pub nonce: H64,
    pub size: U64,
    pub timestamp: U64,
    #[serde(default)]
    pub l1_block_number: Option<U64>,
    #[serde(default)]
    pub base_fee_per_gas: Option<U256>,
    pub transactions: Vec<RpcTransaction>,
}

impl RpcBlock {
    /// The 8-byte block nonce read as a big-endian integer; Nitro stores the
    /// delayed message count here.
    pub fn nonce_u64(&self) -> u64 {
        u64::from_be_bytes(self.nonce.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: H256,
    pub block_hash: H256,
    pub block_number: U64,
    pub transaction_index: U64,
    pub from: H160,
    pub to: Option<H160>,
    pub gas: U256,
    pub nonce: U256,
    pub value: U256,
    pub input: Bytes,
    #[serde(rename = "type")]
    pub tx_type: U64,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub access_list: Option<AccessList>,
    /// Everything else the node returned, e.g. retryable-ticket metadata.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// `eth_getTransactionReceipt` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: H256,
    pub gas_used: U256,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
    #[serde(default, rename = "gasUsedForL1")]
    pub gas_used_for_l1: Option<U64>,
    #[serde(default)]
    pub l1_block_number: Option<U64>,
    pub logs: Vec<LogRecord>,
}
