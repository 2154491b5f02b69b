//! Processing strategies for script replay
//!
//! A strategy is a complete pipeline: read the command script, replay it
//! against a fresh exchange context, write the final transaction table.
//! The implementation (sequential or batched async) is picked at runtime.

use crate::cli::StrategyType;
use crate::config::EngineConfig;
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Complete replay pipeline
pub trait ProcessingStrategy: Send + Sync {
    /// Replay the script at `input_path` and write the transaction table
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal conditions: the script cannot be opened,
    /// the runtime cannot start, or output cannot be written. Rejected commands
    /// are logged and skipped.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Create a processing strategy
///
/// # Arguments
///
/// * `strategy_type` - Sync or Async
/// * `engine` - Configuration of the exchange context the script runs against
/// * `batch` - Batch configuration, ignored by the sync strategy
pub fn create_strategy(
    strategy_type: StrategyType,
    engine: EngineConfig,
    batch: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(engine)),
        StrategyType::Async => {
            let batch = batch.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(engine, batch))
        }
    }
}
