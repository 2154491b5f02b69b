//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `ids`: Entity identifiers
//! - `user`: Users, roles and authenticated principals
//! - `provider`: Provider profiles and geographic points
//! - `transaction`: Transaction status machine, sub-records and projections
//! - `command`: Replay script commands
//! - `error`: Error types for the exchange engine

pub mod command;
pub mod error;
pub mod ids;
pub mod provider;
pub mod transaction;
pub mod user;

pub use command::{Action, Command};
pub use error::{ErrorKind, ExchangeError};
pub use ids::{ProviderId, TransactionId, UserId};
pub use provider::{
    Availability, GeoPoint, NewProvider, Provider, ProviderUpdate, ProviderView,
    VerificationStatus,
};
pub use transaction::{
    CommissionBreakdown, Dispute, DisputeResolution, ProofReference, SettlementSnapshot,
    TimelineEvent, Transaction, TransactionStatus, TransactionView, Transition, TransitionOutcome,
};
pub use user::{AccountStatus, NewUser, Principal, Role, User};
