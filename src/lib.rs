//! Coinnet exchange engine
//!
//! # Overview
//!
//! Core of a peer-to-peer cash exchange: a user hands cash to a nearby
//! merchant (the provider) and receives the same value as an instant bank
//! transfer, paying a commission. The library tracks each exchange through a
//! strict lifecycle, enforces who may drive each step, matches users to
//! nearby providers and lets administrators settle disputes.
//!
//! # Architecture
//!
//! - [`types`] - Domain records, identifiers, replay commands and the error enum
//! - [`config`] - Exchange context configuration
//! - [`core`] - Business components:
//!   - [`core::exchange`] - The exchange context and every operation
//!   - [`core::ledger`] - Transaction state machine and capacity admission
//!   - [`core::provider_directory`] - Provider profiles and proximity search
//!   - [`core::authorization`] - Per-action authorization guard
//!   - [`core::dispute_resolver`] - Dispute escalation and resolution
//!   - [`core::engine`] - Command script replay
//! - [`io`] - Script parsing and transaction table output
//! - [`strategy`] - Sync and async replay pipelines
//! - [`cli`] - CLI argument parsing
//!
//! # Transaction Lifecycle
//!
//! ```text
//! requested → accepted → sinpe_sent → proof_uploaded → verified → completed
//!                  └──────────────────────↑
//! any non-terminal status → cancelled | disputed
//! disputed → (administrator resolution) → any status
//! ```
//!
//! A user holds at most `max_active_transactions` transactions in
//! `requested`, `accepted`, `sinpe_sent` or `proof_uploaded` at once.

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use config::EngineConfig;
pub use core::{ExchangeService, ReplayEngine};
pub use io::write_transactions_csv;
pub use types::{
    ErrorKind, ExchangeError, Principal, ProviderId, Transaction, TransactionId,
    TransactionStatus, UserId,
};
