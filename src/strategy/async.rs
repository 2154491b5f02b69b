//! Asynchronous batch replay strategy
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (owner lanes + barriers)
//!         └── Arc<ReplayEngine>
//!             └── ExchangeService (DashMap-backed state)
//! ```
//!
//! Batches are replayed one after another. Within a batch, commands on
//! transactions of different owners run concurrently on the tokio
//! multi-threaded runtime; directory commands run alone, in script order.

use crate::config::EngineConfig;
use crate::core::{BatchProcessor, ReplayEngine};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_transactions_csv;
use crate::strategy::ProcessingStrategy;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Configuration for batch processing
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of commands per batch
    pub batch_size: usize,
    /// Worker threads of the replay runtime
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig, falling back to defaults for zero values
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                "Invalid batch_size ({}), using default ({})",
                batch_size, default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                "Invalid max_concurrent_batches ({}), using default ({})",
                max_concurrent_batches, default.max_concurrent_batches
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Batched concurrent replay
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    engine: EngineConfig,
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(engine: EngineConfig, config: BatchConfig) -> Self {
        Self { engine, config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let engine = Arc::new(ReplayEngine::new(self.engine.clone()));
            let processor = BatchProcessor::new(Arc::clone(&engine));

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                // The next batch may touch the same transactions; finish this one first
                for outcome in processor.process_batch(batch).await {
                    if let Err(e) = outcome.result {
                        warn!(
                            action = %outcome.command.action,
                            actor = %outcome.command.actor,
                            kind = e.kind().as_str(),
                            "command rejected: {}",
                            e
                        );
                    }
                }
            }

            write_transactions_csv(&engine.rows(), output)?;

            Ok(())
        })
    }
}
