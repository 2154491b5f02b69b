//! Error types for the exchange engine
//!
//! Every rejected operation is reported as an [`ExchangeError`]. Variants carry
//! enough context for a human-readable message while [`ExchangeError::kind`]
//! gives callers a machine-distinguishable category.
//!
//! # Error Categories
//!
//! - **Validation**: malformed ids, amounts outside provider bounds, bad input
//! - **NotFound**: an id that does not resolve
//! - **Authorization**: unknown credential, suspended account, role or ownership mismatch
//! - **StateConflict**: transition not allowed from the current persisted status
//! - **ExternalService**: object store or identity backend failure
//! - **Capacity**: active-transaction limit reached
//!
//! No rejected operation leaves partial state behind.

use super::ids::UserId;
use super::transaction::TransactionStatus;
use thiserror::Error;

/// Machine-distinguishable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authorization,
    StateConflict,
    ExternalService,
    Capacity,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Authorization => "authorization",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Capacity => "capacity",
        }
    }
}

/// Main error type for the exchange engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    /// Input failed validation before anything was touched
    #[error("Validation failed: {message}")]
    Validation {
        /// Description of the rejected input
        message: String,
    },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind ("Transaction", "Provider", ...)
        entity: &'static str,
        /// The id or handle that failed to resolve
        id: String,
    },

    /// Credential did not resolve to a principal
    #[error("Authentication failed: {message}")]
    Unauthenticated {
        /// Description of the authentication failure
        message: String,
    },

    /// Principal lacks the role or ownership the action requires
    #[error("Not allowed to {action}: {reason}")]
    Forbidden {
        /// Attempted action
        action: String,
        /// Which rule rejected it
        reason: String,
    },

    /// Transition not valid for the current persisted status
    ///
    /// Also reported to the loser of a race between two transitions.
    #[error("Cannot {operation}: transaction is {current}")]
    StateConflict {
        /// Attempted operation
        operation: String,
        /// Status observed when the operation was rejected
        current: TransactionStatus,
    },

    /// Collaborating service failed
    #[error("{service} failure: {message}")]
    ExternalService {
        /// Failing collaborator
        service: &'static str,
        /// Description of the failure
        message: String,
    },

    /// User already holds the maximum number of active transactions
    #[error("User {user} already has {active} active transactions (limit {limit})")]
    Capacity {
        /// Requesting user
        user: UserId,
        /// Active transactions at admission time
        active: usize,
        /// Configured limit
        limit: usize,
    },
}

impl ExchangeError {
    /// Category of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::Validation { .. } => ErrorKind::Validation,
            ExchangeError::NotFound { .. } => ErrorKind::NotFound,
            ExchangeError::Unauthenticated { .. } | ExchangeError::Forbidden { .. } => {
                ErrorKind::Authorization
            }
            ExchangeError::StateConflict { .. } => ErrorKind::StateConflict,
            ExchangeError::ExternalService { .. } => ErrorKind::ExternalService,
            ExchangeError::Capacity { .. } => ErrorKind::Capacity,
        }
    }
}

// Helper functions for creating common errors

impl ExchangeError {
    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ExchangeError::Validation {
            message: message.into(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ExchangeError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an Unauthenticated error
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ExchangeError::Unauthenticated {
            message: message.into(),
        }
    }

    /// Create a Forbidden error
    pub fn forbidden(action: &str, reason: impl Into<String>) -> Self {
        ExchangeError::Forbidden {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a StateConflict error
    pub fn state_conflict(operation: &str, current: TransactionStatus) -> Self {
        ExchangeError::StateConflict {
            operation: operation.to_string(),
            current,
        }
    }

    /// Create an ExternalService error
    pub fn external(service: &'static str, message: impl Into<String>) -> Self {
        ExchangeError::ExternalService {
            service,
            message: message.into(),
        }
    }

    /// Create a Capacity error
    pub fn capacity(user: UserId, active: usize, limit: usize) -> Self {
        ExchangeError::Capacity {
            user,
            active,
            limit,
        }
    }
}
