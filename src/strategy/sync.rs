//! Synchronous processing strategy
//!
//! Replays the script one command at a time on the calling thread:
//! - script parsing via `SyncReader` (iterator interface)
//! - command execution via `ReplayEngine`
//! - output via `csv_format::write_transactions_csv`

use crate::config::EngineConfig;
use crate::core::ReplayEngine;
use crate::io::csv_format::write_transactions_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::ProcessingStrategy;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Sequential replay
///
/// ```no_run
/// use coinnet_engine::config::EngineConfig;
/// use coinnet_engine::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
///
/// let strategy = SyncProcessingStrategy::new(EngineConfig::default());
/// strategy
///     .process(Path::new("script.csv"), &mut std::io::stdout())
///     .expect("Replay failed");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyncProcessingStrategy {
    config: EngineConfig,
}

impl SyncProcessingStrategy {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let engine = ReplayEngine::new(self.config.clone());
        let reader = SyncReader::new(input_path)?;

        for result in reader {
            match result {
                Ok(command) => {
                    if let Err(e) = engine.execute(&command) {
                        warn!(
                            action = %command.action,
                            actor = %command.actor,
                            kind = e.kind().as_str(),
                            "command rejected: {}",
                            e
                        );
                    }
                }
                Err(e) => warn!("CSV parsing error: {}", e),
            }
        }

        write_transactions_csv(&engine.rows(), output)?;

        Ok(())
    }
}
