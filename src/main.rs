use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

mod dump;
mod error;
mod helpers;
mod rpc;
mod rules;
mod schema;
mod verifier;

use dump::DumpLayout;
use rpc::{HttpTransport, RpcClient};
use rules::Chain;
use verifier::{BatchStats, Verifier};

/// Cross-check a block/transaction/log dump against a JSON-RPC node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// json-rpc endpoint url
    #[arg(short, long, default_value = "http://localhost:8547")]
    rpc: String,

    /// dump root, holding blocks/, transactions/ and receipts/
    #[arg(short, long)]
    dump: PathBuf,

    /// first log number
    #[arg(long)]
    from: u64,

    /// (inclusive) last log number
    #[arg(long)]
    to: u64,

    /// dump schema
    #[arg(long, value_enum, default_value_t = Chain::Arbitrum)]
    chain: Chain,

    /// blocks per log file
    #[arg(long, default_value_t = 100)]
    per_file: u64,

    /// blocks per directory
    #[arg(long, default_value_t = 10_000)]
    per_dir: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init_timed();

    let args = Args::parse();
    let profile = args.chain.profile();

    let layout = DumpLayout::new(&args.dump, args.per_file, args.per_dir)?;
    let client = RpcClient::new(HttpTransport::new(&args.rpc)?);
    let verifier = Verifier::new(client, layout, profile);

    info!(
        "verifying {} logs {}..={} against {}",
        profile.name, args.from, args.to, args.rpc
    );

    let mut total = BatchStats::default();
    for log_number in args.from..=args.to {
        let stats = verifier.verify_batch(log_number).await.map_err(|e| {
            error!("log {log_number}: {e}");
            e
        })?;
        total.absorb(&stats);
    }

    info!(
        "OK! Verified {} blocks, {} txns, and {} logs in total! Txn types cnt: {:?}",
        total.blocks, total.txns, total.logs, total.types
    );
    Ok(())
}
