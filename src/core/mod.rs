//! Core business logic module
//!
//! - `commission` - Commission breakdown for a requested amount
//! - `geo` - Great-circle distance
//! - `provider_directory` - Provider profiles and proximity matching
//! - `ledger` - Transaction records, state machine and admission control
//! - `authorization` - Role and relationship checks per action
//! - `dispute_resolver` - Dispute escalation and administrative resolution
//! - `user_directory` - In-memory users and credential authentication
//! - `object_store` - In-memory proof object storage
//! - `traits` - Collaborator abstractions (authentication, object storage)
//! - `exchange` - The exchange context wiring everything together
//! - `engine` - Command replay over an exchange context
//! - `batch_processor` - Concurrent replay with owner-based lanes

pub mod authorization;
pub mod batch_processor;
pub mod commission;
pub mod dispute_resolver;
pub mod engine;
pub mod exchange;
pub mod geo;
pub mod ledger;
pub mod object_store;
pub mod provider_directory;
pub mod traits;
pub mod user_directory;

pub use authorization::AuthorizationGuard;
pub use batch_processor::{BatchProcessor, CommandOutcome};
pub use commission::CommissionCalculator;
pub use dispute_resolver::{DisputeResolver, ResolutionRequest};
pub use engine::{ReplayEngine, ReplayRow};
pub use exchange::{ExchangeService, ProofUpload};
pub use ledger::{NewTransaction, TransactionLedger};
pub use object_store::InMemoryObjectStore;
pub use provider_directory::{NearbyQuery, ProviderDirectory, RankedProvider};
pub use traits::{AuthenticationService, ObjectStore};
pub use user_directory::UserDirectory;
