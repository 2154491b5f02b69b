use crate::config::EngineConfig;
use crate::strategy::BatchConfig;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Replay a cash-for-transfer exchange command script
#[derive(Parser, Debug)]
#[command(name = "coinnet-engine")]
#[command(about = "Replay exchange commands and print the final transaction table", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing the command script
    #[arg(value_name = "INPUT", help = "Path to the command script CSV")]
    pub input_file: PathBuf,

    /// Replay strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Replay strategy: 'sync' for sequential or 'async' for batched concurrent replay"
    )]
    pub strategy: StrategyType,

    /// Number of commands per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Worker threads of the replay runtime (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Worker threads for concurrent replay (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Commission rate charged on the requested amount
    #[arg(
        long = "commission-rate",
        value_name = "RATE",
        help = "Commission rate in (0, 1) (default: 0.05)"
    )]
    pub commission_rate: Option<Decimal>,

    /// Active transactions a user may hold at once
    #[arg(
        long = "max-active",
        value_name = "COUNT",
        help = "Maximum active transactions per user (default: 2)"
    )]
    pub max_active: Option<usize>,
}

/// Available replay strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Build the BatchConfig, falling back to defaults for missing values
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Build the EngineConfig; out-of-range values fall back with a warning
    pub fn to_engine_config(&self) -> EngineConfig {
        if self.commission_rate.is_some() || self.max_active.is_some() {
            let default = EngineConfig::default();
            EngineConfig::new(
                self.commission_rate.unwrap_or(default.commission_rate),
                self.max_active.unwrap_or(default.max_active_transactions),
            )
        } else {
            EngineConfig::default()
        }
    }
}
