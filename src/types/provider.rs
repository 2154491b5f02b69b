//! Provider-related types for the exchange engine
//!
//! A provider is a physical business that hands out cash against instant
//! transfers. This module defines the provider profile, its verification
//! status, the geographic point it is indexed by, and the inputs and
//! projections used by the provider operations.

use super::error::ExchangeError;
use super::ids::{ProviderId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting out-of-range or non-finite coordinates
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ExchangeError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ExchangeError::validation(format!(
                "Latitude {} is outside [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ExchangeError::validation(format!(
                "Longitude {} is outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }
}

/// Provider verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    /// Registered, not yet reviewed; still matchable
    PendingReview,
    /// Reviewed by an administrator
    Active,
    /// Removed from matching by an administrator
    Suspended,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::PendingReview => "pending_review",
            VerificationStatus::Active => "active",
            VerificationStatus::Suspended => "suspended",
        }
    }

    /// Whether providers in this status may be matched to new requests
    pub fn is_matchable(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Active | VerificationStatus::PendingReview
        )
    }

    /// Primary ranking key: verified providers first
    pub fn rank(&self) -> u8 {
        match self {
            VerificationStatus::Active => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending_review" => Ok(VerificationStatus::PendingReview),
            "active" => Ok(VerificationStatus::Active),
            "suspended" => Ok(VerificationStatus::Suspended),
            _ => Err(ExchangeError::validation(format!(
                "Unknown verification status '{}'",
                s
            ))),
        }
    }
}

/// Provider profile
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub id: ProviderId,
    /// Owning user; one profile per user
    pub user_id: UserId,
    pub business_name: String,
    /// Settlement-account identifier; globally unique and immutable
    pub settlement_account: String,
    pub settlement_holder_name: String,
    pub bank_email: String,
    pub address: Option<String>,
    pub location: GeoPoint,
    pub description: Option<String>,
    pub verification_status: VerificationStatus,
    pub is_available: bool,
    pub declared_liquidity: Option<Decimal>,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub reputation_score: Decimal,
    pub total_transactions: u64,
    pub total_volume: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    /// Whether `amount` falls inside the accepted range (inclusive)
    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        self.min_amount <= amount && amount <= self.max_amount
    }

    /// Available and in a matchable verification status
    pub fn is_matchable(&self) -> bool {
        self.is_available && self.verification_status.is_matchable()
    }
}

/// Provider registration input
#[derive(Debug, Clone, PartialEq)]
pub struct NewProvider {
    pub business_name: String,
    pub settlement_account: String,
    pub settlement_holder_name: String,
    pub bank_email: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub description: Option<String>,
    /// Defaults to 1000 when absent
    pub min_amount: Option<Decimal>,
    /// Defaults to 100000 when absent
    pub max_amount: Option<Decimal>,
}

/// Partial profile update; `None` leaves a field untouched
///
/// Latitude and longitude are applied only when both are present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderUpdate {
    pub business_name: Option<String>,
    pub settlement_holder_name: Option<String>,
    pub bank_email: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: Option<String>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub declared_liquidity: Option<Decimal>,
}

/// Availability toggle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Availability {
    pub is_available: bool,
    pub declared_liquidity: Option<Decimal>,
}

/// Public projection of a provider
///
/// Omits the bank email. `distance_km` is set only by proximity searches.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderView {
    pub id: ProviderId,
    pub user_id: UserId,
    pub business_name: String,
    pub settlement_account: String,
    pub settlement_holder_name: String,
    pub address: Option<String>,
    pub location: GeoPoint,
    pub description: Option<String>,
    pub verification_status: VerificationStatus,
    pub is_available: bool,
    pub declared_liquidity: Option<Decimal>,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub reputation_score: Decimal,
    pub total_transactions: u64,
    pub distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ProviderView {
    pub fn project(provider: &Provider, distance_km: Option<f64>) -> Self {
        Self {
            id: provider.id,
            user_id: provider.user_id,
            business_name: provider.business_name.clone(),
            settlement_account: provider.settlement_account.clone(),
            settlement_holder_name: provider.settlement_holder_name.clone(),
            address: provider.address.clone(),
            location: provider.location,
            description: provider.description.clone(),
            verification_status: provider.verification_status,
            is_available: provider.is_available,
            declared_liquidity: provider.declared_liquidity,
            min_amount: provider.min_amount,
            max_amount: provider.max_amount,
            reputation_score: provider.reputation_score,
            total_transactions: provider.total_transactions,
            distance_km,
            created_at: provider.created_at,
        }
    }
}
