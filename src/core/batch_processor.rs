//! Batch processing with owner-based lanes for the async replay strategy
//!
//! A batch is cut into segments. Commands that act on a labelled transaction
//! are grouped into lanes keyed by the transaction owner's handle; lanes run
//! concurrently on tokio tasks while commands inside one lane keep their
//! script order. Every other command (registrations, provider changes,
//! searches, suspensions) is a barrier: the lanes before it finish, the
//! barrier runs alone, then the next segment starts.
//!
//! Transactions of different owners never share capacity slots, and provider
//! counters only ever accumulate, so running lanes concurrently gives the
//! same final state as running the script in order.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     └── Arc<ReplayEngine>  (shared, DashMap-backed)
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::engine::ReplayEngine;
use crate::types::{Action, Command, ExchangeError};
use tracing::error;

/// Result of executing a single command
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub command: Command,
    pub result: Result<String, ExchangeError>,
}

/// Ordered unit of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Commands of different owners, runnable concurrently
    Lanes(HashMap<String, Vec<Command>>),
    /// A command that must run alone
    Barrier(Command),
}

/// Batch processor with owner-based partitioning
#[derive(Clone)]
pub struct BatchProcessor {
    engine: Arc<ReplayEngine>,
}

impl BatchProcessor {
    pub fn new(engine: Arc<ReplayEngine>) -> Self {
        Self { engine }
    }

    /// Cut a batch into lane segments and barriers, preserving order
    ///
    /// Owners of labels requested earlier in the same batch are resolved from
    /// the batch itself; a command whose label has no known owner becomes a
    /// barrier and fails (or succeeds) exactly as it would in order.
    pub fn segment(&self, batch: Vec<Command>) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut lanes: HashMap<String, Vec<Command>> = HashMap::new();
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut contested: HashSet<String> = HashSet::new();

        for command in batch {
            match self.lane_of(&command, &mut owners, &mut contested) {
                Some(owner) => lanes.entry(owner).or_default().push(command),
                None => {
                    if !lanes.is_empty() {
                        segments.push(Segment::Lanes(std::mem::take(&mut lanes)));
                    }
                    segments.push(Segment::Barrier(command));
                }
            }
        }
        if !lanes.is_empty() {
            segments.push(Segment::Lanes(lanes));
        }

        segments
    }

    /// Lane of `command`, or `None` when it must run alone
    ///
    /// A label requested by two different owners is contested: which request
    /// binds it is only known at execution time, so every later command on it
    /// runs as a barrier.
    fn lane_of(
        &self,
        command: &Command,
        owners: &mut HashMap<String, String>,
        contested: &mut HashSet<String>,
    ) -> Option<String> {
        if !command.action.is_transaction_scoped() {
            return None;
        }
        let label = command.tx.as_deref()?;
        if contested.contains(label) {
            return None;
        }
        let known = owners
            .get(label)
            .cloned()
            .or_else(|| self.engine.label_owner(label));

        if command.action != Action::Request {
            return known;
        }
        match known {
            Some(owner) if owner != command.actor => {
                contested.insert(label.to_string());
                None
            }
            _ => {
                owners.insert(label.to_string(), command.actor.clone());
                Some(command.actor.clone())
            }
        }
    }

    /// Execute one lane's commands in order
    pub async fn process_lane(&self, commands: Vec<Command>) -> Vec<CommandOutcome> {
        let mut results = Vec::with_capacity(commands.len());

        for command in commands {
            let result = self.engine.execute(&command);
            results.push(CommandOutcome { command, result });
        }

        results
    }

    /// Execute a batch: segments in order, lanes within a segment concurrently
    ///
    /// Outcomes of concurrent lanes may be reported in any order.
    pub async fn process_batch(&self, batch: Vec<Command>) -> Vec<CommandOutcome> {
        let mut results = Vec::with_capacity(batch.len());

        for segment in self.segment(batch) {
            match segment {
                Segment::Barrier(command) => {
                    let result = self.engine.execute(&command);
                    results.push(CommandOutcome { command, result });
                }
                Segment::Lanes(lanes) => {
                    let mut tasks = Vec::with_capacity(lanes.len());
                    for (_owner, commands) in lanes {
                        let processor = self.clone();
                        tasks.push(tokio::spawn(async move {
                            processor.process_lane(commands).await
                        }));
                    }

                    for task in tasks {
                        match task.await {
                            Ok(lane_results) => results.extend(lane_results),
                            Err(e) => error!("lane task panicked: {:?}", e),
                        }
                    }
                }
            }
        }

        results
    }
}
