use std::path::PathBuf;

use ethers::types::H256;

use crate::schema::LogKey;

pub type Result<T, E = VerifyError> = std::result::Result<T, E>;

/// Everything that stops a verification run.
#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record at {path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed {method} response: {detail}")]
    Envelope { method: &'static str, detail: String },

    #[error("{method} returned error {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("{method} returned null for {param}")]
    MissingResult { method: &'static str, param: String },

    #[error("{record}: {field} mismatch, dumped {dumped}, fetched {fetched}")]
    Mismatch {
        record: String,
        field: &'static str,
        dumped: String,
        fetched: String,
    },

    #[error("block #{block} is missing from the dump but has {txns} transactions")]
    MissingBlock { block: u64, txns: usize },

    #[error("duplicate block #{0} in dump")]
    DuplicateBlock(u64),

    #[error("block #{block} is dumped in {log}.log, outside that file's range")]
    StrayBlock { block: u64, log: u64 },

    #[error("duplicate log {0} in dump")]
    DuplicateLog(LogKey),

    #[error("txn is not dumped: {0:?} was never fetched from a block")]
    TxnNotFetched(H256),

    #[error("log not found in dump: {0}")]
    LogNotDumped(LogKey),

    #[error("txn {hash:?}: unseen transaction type {ty}")]
    UnknownType { hash: H256, ty: u8 },

    #[error("txn {hash:?}: field {field} dumped={dumped} fetched={fetched}")]
    OptionalField {
        hash: H256,
        field: &'static str,
        dumped: bool,
        fetched: bool,
    },

    #[error("not all dumped txns are valid, unmatched: {}", format_keys(.0))]
    LeftoverTxns(Vec<H256>),

    #[error("not all dumped logs are valid, unmatched: {}", format_keys(.0))]
    LeftoverLogs(Vec<LogKey>),
}

fn format_keys<K: std::fmt::Debug>(keys: &[K]) -> String {
    keys.iter()
        .map(|k| format!("{k:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}
