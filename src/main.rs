//! Coinnet exchange engine CLI
//!
//! Replays a command script against a fresh exchange context and writes the
//! final transaction table to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- script.csv > transactions.csv
//! cargo run -- --strategy sync script.csv > transactions.csv
//! cargo run -- --strategy async --batch-size 500 --max-concurrent 4 script.csv
//! RUST_LOG=info cargo run -- --commission-rate 0.04 --max-active 3 script.csv
//! ```
//!
//! Rejected commands are logged to stderr (level `warn`, filter via
//! `RUST_LOG`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Fatal error (missing arguments, unreadable script, output failure)

use coinnet_engine::cli;
use coinnet_engine::strategy;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    let strategy = {
        let batch = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, args.to_engine_config(), batch)
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
