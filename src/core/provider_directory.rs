//! Provider directory and proximity matching
//!
//! The directory owns provider profiles and the two uniqueness constraints on
//! them (one profile per user, one profile per settlement account). It also
//! answers proximity searches: which available, matchable providers lie within
//! a radius of a point, optionally filtered by the amount they accept.
//!
//! # Ranking
//!
//! A search keeps the `result_limit` nearest eligible providers and orders
//! them verified-first: `active` providers precede `pending_review` ones, and
//! each group runs in ascending distance. Providers without a computable
//! distance sort last.
//!
//! # Thread Safety
//!
//! Profiles live in a `DashMap`. Searches read without locking the directory
//! as a whole, so a search may observe a profile change made concurrently;
//! transaction creation re-checks availability and bounds on the current
//! profile.

use super::geo::haversine_km;
use crate::types::{
    Availability, ExchangeError, GeoPoint, NewProvider, Provider, ProviderId, ProviderUpdate,
    UserId, VerificationStatus,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use tracing::{debug, info};

const DEFAULT_MIN_AMOUNT: i64 = 1_000;
const DEFAULT_MAX_AMOUNT: i64 = 100_000;

/// Proximity search parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub origin: GeoPoint,
    pub radius_km: f64,
    /// When positive, only providers whose range contains it are eligible
    pub amount: Option<Decimal>,
}

impl NearbyQuery {
    pub fn new(
        origin: GeoPoint,
        radius_km: f64,
        amount: Option<Decimal>,
    ) -> Result<Self, ExchangeError> {
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(ExchangeError::validation(format!(
                "Search radius must be a positive number of km, got {}",
                radius_km
            )));
        }
        Ok(Self {
            origin,
            radius_km,
            amount: amount.filter(|a| *a > Decimal::ZERO),
        })
    }
}

/// Search hit: a provider snapshot and its distance from the origin
#[derive(Debug, Clone, PartialEq)]
pub struct RankedProvider {
    pub provider: Provider,
    pub distance_km: Option<f64>,
}

/// Lazily evaluated search result
///
/// Nothing is read from the directory until the first call to `next`. Each
/// call to [`ProviderDirectory::find_nearby`] runs the search again; no state
/// is shared between result sets.
pub struct NearbyProviders<'a> {
    directory: &'a ProviderDirectory,
    query: NearbyQuery,
    results: Option<std::vec::IntoIter<RankedProvider>>,
}

impl Iterator for NearbyProviders<'_> {
    type Item = RankedProvider;

    fn next(&mut self) -> Option<Self::Item> {
        let directory = self.directory;
        let query = self.query;
        self.results
            .get_or_insert_with(|| directory.search(&query).into_iter())
            .next()
    }
}

/// Thread-safe provider registry with a proximity search
#[derive(Debug)]
pub struct ProviderDirectory {
    providers: DashMap<ProviderId, Provider>,
    by_user: DashMap<UserId, ProviderId>,
    by_settlement: DashMap<String, ProviderId>,
    result_limit: usize,
}

impl ProviderDirectory {
    /// Create an empty directory whose searches return at most `result_limit` hits
    pub fn new(result_limit: usize) -> Self {
        Self {
            providers: DashMap::new(),
            by_user: DashMap::new(),
            by_settlement: DashMap::new(),
            result_limit,
        }
    }

    /// Register a provider profile for `owner`
    ///
    /// New profiles start `pending_review` and unavailable.
    ///
    /// # Errors
    ///
    /// * `ExchangeError::Validation` - malformed input, owner already has a
    ///   profile, or settlement account already registered
    pub fn register(&self, owner: UserId, input: NewProvider) -> Result<Provider, ExchangeError> {
        let business_name = require_text(&input.business_name, "Business name", 2)?;
        let holder_name = require_text(&input.settlement_holder_name, "Holder name", 2)?;
        let settlement_account = validate_settlement_account(&input.settlement_account)?;
        let location = GeoPoint::new(input.latitude, input.longitude)?;
        let min_amount = input.min_amount.unwrap_or(Decimal::from(DEFAULT_MIN_AMOUNT));
        let max_amount = input.max_amount.unwrap_or(Decimal::from(DEFAULT_MAX_AMOUNT));
        validate_bounds(min_amount, max_amount)?;

        let id = ProviderId::new();

        match self.by_user.entry(owner) {
            Entry::Occupied(_) => {
                return Err(ExchangeError::validation("You already have a provider profile"))
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let account_taken = match self.by_settlement.entry(settlement_account.clone()) {
            Entry::Occupied(_) => true,
            Entry::Vacant(slot) => {
                slot.insert(id);
                false
            }
        };
        if account_taken {
            self.by_user.remove(&owner);
            return Err(ExchangeError::validation(format!(
                "Settlement account {} is already registered",
                settlement_account
            )));
        }

        let now = Utc::now();
        let provider = Provider {
            id,
            user_id: owner,
            business_name,
            settlement_account,
            settlement_holder_name: holder_name,
            bank_email: input.bank_email.trim().to_string(),
            address: input.address,
            location,
            description: input.description,
            verification_status: VerificationStatus::PendingReview,
            is_available: false,
            declared_liquidity: None,
            min_amount,
            max_amount,
            reputation_score: Decimal::new(50, 1),
            total_transactions: 0,
            total_volume: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        self.providers.insert(id, provider.clone());

        debug!(provider = %id, owner = %owner, "provider registered");
        Ok(provider)
    }

    /// Look up a provider by id
    pub fn get(&self, id: ProviderId) -> Option<Provider> {
        self.providers.get(&id).map(|entry| entry.value().clone())
    }

    /// Look up the profile owned by `user`
    pub fn find_by_user(&self, user: UserId) -> Option<Provider> {
        let id = self.by_user.get(&user).map(|entry| *entry.value())?;
        self.get(id)
    }

    /// Update a provider with a closure (atomic per provider)
    ///
    /// The closure runs while the provider's entry is locked. If it returns an
    /// error it must not have mutated the provider.
    pub fn update<F, T>(&self, id: ProviderId, f: F) -> Result<T, ExchangeError>
    where
        F: FnOnce(&mut Provider) -> Result<T, ExchangeError>,
    {
        match self.providers.get_mut(&id) {
            Some(mut entry) => f(entry.value_mut()),
            None => Err(ExchangeError::not_found("Provider", id)),
        }
    }

    /// Apply a partial profile update
    ///
    /// The update is validated against the resulting profile and applied in
    /// full or not at all.
    pub fn apply_update(
        &self,
        id: ProviderId,
        changes: ProviderUpdate,
    ) -> Result<Provider, ExchangeError> {
        self.update(id, |provider| {
            let mut updated = provider.clone();

            if let Some(name) = &changes.business_name {
                updated.business_name = require_text(name, "Business name", 2)?;
            }
            if let Some(holder) = &changes.settlement_holder_name {
                updated.settlement_holder_name = require_text(holder, "Holder name", 2)?;
            }
            if let Some(email) = &changes.bank_email {
                updated.bank_email = email.trim().to_string();
            }
            if let Some(address) = &changes.address {
                updated.address = Some(address.clone());
            }
            if let Some(description) = &changes.description {
                updated.description = Some(description.clone());
            }
            if let (Some(lat), Some(lng)) = (changes.latitude, changes.longitude) {
                updated.location = GeoPoint::new(lat, lng)?;
            }
            if let Some(min) = changes.min_amount {
                updated.min_amount = min;
            }
            if let Some(max) = changes.max_amount {
                updated.max_amount = max;
            }
            validate_bounds(updated.min_amount, updated.max_amount)?;
            if let Some(liquidity) = changes.declared_liquidity {
                updated.declared_liquidity = Some(validate_liquidity(liquidity)?);
            }

            updated.updated_at = Utc::now();
            *provider = updated.clone();
            Ok(updated)
        })
    }

    /// Toggle availability and declared liquidity
    pub fn set_availability(
        &self,
        id: ProviderId,
        availability: Availability,
    ) -> Result<Provider, ExchangeError> {
        let liquidity = availability
            .declared_liquidity
            .map(validate_liquidity)
            .transpose()?;

        self.update(id, |provider| {
            provider.is_available = availability.is_available;
            provider.declared_liquidity = liquidity;
            provider.updated_at = Utc::now();
            Ok(provider.clone())
        })
    }

    /// Change verification status
    ///
    /// Suspension also takes the provider offline.
    pub fn set_verification(
        &self,
        id: ProviderId,
        status: VerificationStatus,
    ) -> Result<Provider, ExchangeError> {
        let provider = self.update(id, |provider| {
            provider.verification_status = status;
            if status == VerificationStatus::Suspended {
                provider.is_available = false;
            }
            provider.updated_at = Utc::now();
            Ok(provider.clone())
        })?;
        info!(provider = %id, status = %status, "provider verification changed");
        Ok(provider)
    }

    /// Proximity search
    ///
    /// See the module documentation for eligibility and ranking. The result is
    /// evaluated on first use.
    pub fn find_nearby(&self, query: NearbyQuery) -> NearbyProviders<'_> {
        NearbyProviders {
            directory: self,
            query,
            results: None,
        }
    }

    fn search(&self, query: &NearbyQuery) -> Vec<RankedProvider> {
        let mut hits: Vec<RankedProvider> = self
            .providers
            .iter()
            .filter(|entry| is_eligible(entry.value(), query.amount))
            .filter_map(|entry| {
                let provider = entry.value();
                let distance = haversine_km(query.origin, provider.location)?;
                (distance <= query.radius_km).then(|| RankedProvider {
                    provider: provider.clone(),
                    distance_km: Some(distance),
                })
            })
            .collect();

        // Nearest first, capped, then re-ranked verified-first
        hits.sort_by(|a, b| compare_distance(a.distance_km, b.distance_km));
        hits.truncate(self.result_limit);
        hits.sort_by(|a, b| {
            a.provider
                .verification_status
                .rank()
                .cmp(&b.provider.verification_status.rank())
                .then_with(|| compare_distance(a.distance_km, b.distance_km))
                .then_with(|| a.provider.id.cmp(&b.provider.id))
        });
        hits
    }
}

fn is_eligible(provider: &Provider, amount: Option<Decimal>) -> bool {
    provider.is_matchable() && amount.map_or(true, |amount| provider.accepts_amount(amount))
}

/// Ascending distance with unknown distances last
fn compare_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn require_text(value: &str, field: &str, min_chars: usize) -> Result<String, ExchangeError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min_chars {
        return Err(ExchangeError::validation(format!(
            "{} must have at least {} characters",
            field, min_chars
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_settlement_account(account: &str) -> Result<String, ExchangeError> {
    let account = account.trim();
    let len = account.chars().count();
    if !(8..=12).contains(&len) {
        return Err(ExchangeError::validation(format!(
            "Settlement account must have 8 to 12 characters, got {}",
            len
        )));
    }
    Ok(account.to_string())
}

fn validate_bounds(min: Decimal, max: Decimal) -> Result<(), ExchangeError> {
    if min <= Decimal::ZERO {
        return Err(ExchangeError::validation("Minimum amount must be positive"));
    }
    if min > max {
        return Err(ExchangeError::validation(format!(
            "Minimum amount {} exceeds maximum amount {}",
            min, max
        )));
    }
    Ok(())
}

fn validate_liquidity(liquidity: Decimal) -> Result<Decimal, ExchangeError> {
    if liquidity < Decimal::ZERO {
        return Err(ExchangeError::validation("Declared liquidity cannot be negative"));
    }
    Ok(liquidity)
}
