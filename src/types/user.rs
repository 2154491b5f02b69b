//! User-related types for the exchange engine
//!
//! This module defines registered users, their roles and account status, and
//! the authenticated principal handed to every exchange operation.

use super::error::ExchangeError;
use super::ids::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Requests cash from providers
    Regular,
    /// Owns (at most) one provider profile
    ProviderBusiness,
    /// Platform administrator
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::ProviderBusiness => "provider_business",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "regular" | "user" => Ok(Role::Regular),
            "provider_business" | "provider" => Ok(Role::ProviderBusiness),
            "superadmin" | "admin" => Ok(Role::Superadmin),
            _ => Err(ExchangeError::validation(format!("Unknown role '{}'", s))),
        }
    }
}

/// Account status, changed only by administrative suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    Active,
    Suspended,
}

/// Registered user
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    /// Stored lowercased; unique
    pub email: String,
    pub full_name: String,
    /// Unique when present
    pub phone: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub reputation_score: Decimal,
    /// Completed exchanges as the requesting user
    pub total_transactions: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            role: self.role,
            status: self.status,
        }
    }
}

/// Registration input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

/// Authenticated identity, trusted unmodified by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
    pub status: AccountStatus,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Superadmin
    }

    pub fn is_suspended(&self) -> bool {
        self.status == AccountStatus::Suspended
    }
}
