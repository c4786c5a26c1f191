use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::error::{Result, VerifyError};
use crate::rules::OptionalKind;
use crate::schema::{BlockRecord, LogKey, LogRecord, TxnRecord};

/// The three record streams the dumper writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Blocks,
    Transactions,
    Receipts,
}

impl Category {
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Blocks => "blocks",
            Category::Transactions => "transactions",
            Category::Receipts => "receipts",
        }
    }
}

/// On-disk sharding of the dump: `<root>/<category>/<dir>/<log>.log`, with
/// `per_file` blocks per log file and `per_dir` blocks per directory.
#[derive(Debug, Clone)]
pub struct DumpLayout {
    root: PathBuf,
    per_file: u64,
    per_dir: u64,
}

impl DumpLayout {
    pub fn new(root: impl Into<PathBuf>, per_file: u64, per_dir: u64) -> Result<Self> {
        if per_file == 0 || per_dir == 0 {
            return Err(VerifyError::Config(
                "blocks per file and per dir must be non-zero".to_string(),
            ));
        }
        if per_dir % per_file != 0 {
            return Err(VerifyError::Config(format!(
                "blocks per dir ({per_dir}) is not a multiple of blocks per file ({per_file})"
            )));
        }
        Ok(Self {
            root: root.into(),
            per_file,
            per_dir,
        })
    }

    /// Block numbers covered by one log file.
    pub fn block_range(&self, log_number: u64) -> Range<u64> {
        let start = log_number * self.per_file;
        start..start + self.per_file
    }

    pub fn path(&self, category: Category, log_number: u64) -> PathBuf {
        let files_per_dir = self.per_dir / self.per_file;
        self.root
            .join(category.dir_name())
            .join((log_number / files_per_dir).to_string())
            .join(format!("{log_number}.log"))
    }

    /// Dumped blocks keyed by number. The file must exist and may only hold
    /// blocks of its own range.
    pub async fn load_blocks(&self, log_number: u64) -> Result<HashMap<u64, BlockRecord>> {
        let path = self.path(Category::Blocks, log_number);
        let text = read(&path, false).await?;
        let range = self.block_range(log_number);
        let mut blocks = HashMap::new();
        for (line_no, line) in lines(&text) {
            let rec: BlockRecord = parse(&path, line_no, line)?;
            let number = rec.block_number;
            if !range.contains(&number) {
                return Err(VerifyError::StrayBlock {
                    block: number,
                    log: log_number,
                });
            }
            if blocks.insert(number, rec).is_some() {
                return Err(VerifyError::DuplicateBlock(number));
            }
        }
        debug!("loaded {} blocks from {}", blocks.len(), path.display());
        Ok(blocks)
    }

    /// Dumped logs keyed by `(blockNumber, logIndex)`. A missing file is an
    /// empty batch.
    pub async fn load_logs(&self, log_number: u64) -> Result<BTreeMap<LogKey, LogRecord>> {
        let path = self.path(Category::Receipts, log_number);
        let text = read(&path, true).await?;
        let mut logs = BTreeMap::new();
        for (line_no, line) in lines(&text) {
            let rec: LogRecord = parse(&path, line_no, line)?;
            let key = rec.key();
            if logs.insert(key, rec).is_some() {
                return Err(VerifyError::DuplicateLog(key));
            }
        }
        debug!("loaded {} logs from {}", logs.len(), path.display());
        Ok(logs)
    }

    /// Dumped transactions in file order, with the raw values of
    /// `optional_fields` attached. A missing file is an empty batch.
    pub async fn load_txns(
        &self,
        log_number: u64,
        optional_fields: &[(&str, OptionalKind)],
    ) -> Result<Vec<TxnRecord>> {
        let path = self.path(Category::Transactions, log_number);
        let text = read(&path, true).await?;
        let mut txns = Vec::new();
        for (line_no, line) in lines(&text) {
            let mut rec: TxnRecord = parse(&path, line_no, line)?;
            if !optional_fields.is_empty() {
                let mut raw: BTreeMap<String, Box<RawValue>> = parse(&path, line_no, line)?;
                raw.retain(|k, _| optional_fields.iter().any(|(name, _)| *name == k.as_str()));
                rec.extras = raw;
            }
            txns.push(rec);
        }
        debug!("loaded {} txns from {}", txns.len(), path.display());
        Ok(txns)
    }
}

async fn read(path: &Path, missing_ok: bool) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if missing_ok && e.kind() == ErrorKind::NotFound => {
            debug!("{} does not exist, treating as empty", path.display());
            Ok(String::new())
        }
        Err(source) => Err(VerifyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Non-blank lines with 1-based line numbers.
fn lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(_, l)| !l.trim().is_empty())
}

fn parse<T: DeserializeOwned>(path: &Path, line: usize, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|source| VerifyError::Parse {
        path: path.to_path_buf(),
        line,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ARBITRUM;
    use ethers::types::U256;
    use tempfile::TempDir;

    const BLOCK: &str = r#"{"timestamp":10,"blockNumber":201,"blockHash":"0x1111111111111111111111111111111111111111111111111111111111111111","parentHash":"0x2222222222222222222222222222222222222222222222222222222222222222","gasLimit":30000000,"gasUsed":0,"miner":"0x0000000000000000000000000000000000000000","difficulty":1,"nonce":0,"size":512}"#;

    const LOG: &str = r#"{"address":"0x0000000000000000000000000000000000000064","topics":[],"data":"0x","blockNumber":"0xc9","transactionHash":"0x3333333333333333333333333333333333333333333333333333333333333333","transactionIndex":"0x0","blockHash":"0x1111111111111111111111111111111111111111111111111111111111111111","logIndex":"0x0","removed":false}"#;

    const TXN: &str = r#"{"blockNumber":201,"blockHash":"0x1111111111111111111111111111111111111111111111111111111111111111","transactionIndex":0,"transactionHash":"0x3333333333333333333333333333333333333333333333333333333333333333","from":"0x0000000000000000000000000000000000000001","to":"0x0000000000000000000000000000000000000002","gas":21000,"gasUsed":21000,"gasPrice":1,"data":"","accessList":[],"nonce":0,"gasFeeCap":1,"gasTipCap":1,"effectiveGasPrice":"0x1","type":105,"value":0,"status":1,"ticketId":"0x4444444444444444444444444444444444444444444444444444444444444444","maxRefund":12345678901234567890123,"unrelated":true}"#;

    fn write(dir: &TempDir, layout: &DumpLayout, category: Category, log: u64, body: &str) {
        let path = layout.path(category, log);
        assert!(path.starts_with(dir.path()));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn layout_paths_follow_sharding() {
        let layout = DumpLayout::new("/dump", 100, 10_000).unwrap();
        assert_eq!(
            layout.path(Category::Blocks, 387_723),
            PathBuf::from("/dump/blocks/3877/387723.log")
        );
        assert_eq!(
            layout.path(Category::Receipts, 99),
            PathBuf::from("/dump/receipts/0/99.log")
        );
        assert_eq!(layout.block_range(2), 200..300);
    }

    #[test]
    fn layout_rejects_bad_sharding() {
        assert!(matches!(
            DumpLayout::new("/dump", 0, 100),
            Err(VerifyError::Config(_))
        ));
        assert!(matches!(
            DumpLayout::new("/dump", 30, 100),
            Err(VerifyError::Config(_))
        ));
    }

    #[tokio::test]
    async fn loads_blocks_and_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let layout = DumpLayout::new(dir.path(), 100, 10_000).unwrap();
        write(&dir, &layout, Category::Blocks, 2, &format!("{BLOCK}\n\n"));
        let blocks = layout.load_blocks(2).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[&201].size, 512);

        write(&dir, &layout, Category::Blocks, 2, &format!("{BLOCK}\n{BLOCK}\n"));
        assert!(matches!(
            layout.load_blocks(2).await,
            Err(VerifyError::DuplicateBlock(201))
        ));
    }

    #[tokio::test]
    async fn block_outside_its_file_range_is_rejected() {
        let dir = TempDir::new().unwrap();
        let layout = DumpLayout::new(dir.path(), 100, 10_000).unwrap();
        write(&dir, &layout, Category::Blocks, 3, &format!("{BLOCK}\n"));
        match layout.load_blocks(3).await {
            Err(err @ VerifyError::StrayBlock { block: 201, log: 3 }) => {
                assert!(err.to_string().contains("3.log"), "{err}")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_block_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let layout = DumpLayout::new(dir.path(), 100, 10_000).unwrap();
        assert!(matches!(
            layout.load_blocks(7).await,
            Err(VerifyError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn missing_txn_and_log_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let layout = DumpLayout::new(dir.path(), 100, 10_000).unwrap();
        assert!(layout.load_logs(7).await.unwrap().is_empty());
        assert!(layout.load_txns(7, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_log_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let layout = DumpLayout::new(dir.path(), 100, 10_000).unwrap();
        write(&dir, &layout, Category::Receipts, 2, &format!("{LOG}\n{LOG}\n"));
        match layout.load_logs(2).await {
            Err(VerifyError::DuplicateLog(key)) => {
                assert_eq!(key, LogKey { block: 201, index: 0 })
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_line_reports_position() {
        let dir = TempDir::new().unwrap();
        let layout = DumpLayout::new(dir.path(), 100, 10_000).unwrap();
        write(&dir, &layout, Category::Receipts, 2, &format!("{LOG}\n{{oops\n"));
        match layout.load_logs(2).await {
            Err(VerifyError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn txns_keep_only_profile_extras() {
        let dir = TempDir::new().unwrap();
        let layout = DumpLayout::new(dir.path(), 100, 10_000).unwrap();
        write(&dir, &layout, Category::Transactions, 2, TXN);

        let plain = layout.load_txns(2, &[]).await.unwrap();
        assert!(plain[0].extras.is_empty());
        assert_eq!(plain[0].data, Some(vec![]));

        let txns = layout
            .load_txns(2, ARBITRUM.optional_txn_fields)
            .await
            .unwrap();
        let extras = &txns[0].extras;
        assert_eq!(extras.len(), 2);
        assert_eq!(extras["maxRefund"].get(), "12345678901234567890123");
        assert!(!extras.contains_key("unrelated"));
        assert_eq!(txns[0].value, U256::zero());
    }
}
