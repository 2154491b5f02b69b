//! Entity identifiers
//!
//! Users, providers and transactions are identified by UUID newtypes so that a
//! provider id can never be passed where a transaction id is expected. Parsing
//! an identifier from text is the only fallible step and reports a validation
//! error naming the entity.

use super::error::ExchangeError;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ExchangeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ExchangeError::validation(format!("Invalid {} id '{}'", $entity, s)))
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered user
    UserId,
    "user"
);

entity_id!(
    /// Identifier of a provider profile
    ProviderId,
    "provider"
);

entity_id!(
    /// Identifier of an exchange transaction
    TransactionId,
    "transaction"
);
