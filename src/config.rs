//! Engine configuration
//!
//! `EngineConfig` is built once at process start and handed to
//! [`crate::core::ExchangeService`]; no component reads configuration from
//! global state.

use rust_decimal::Decimal;
use tracing::warn;

/// Configuration of one exchange context
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Commission charged on the requested amount, in (0, 1)
    pub commission_rate: Decimal,
    /// Transactions a user may hold in an active status at once
    pub max_active_transactions: usize,
    /// Cap on providers returned by one proximity search
    pub nearby_result_limit: usize,
    /// Search radius used when the caller gives none
    pub default_radius_km: f64,
    /// Cap on transactions returned by list queries
    pub listing_limit: usize,
    /// Base URL proof objects are published under
    pub proof_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(5, 2),
            max_active_transactions: 2,
            nearby_result_limit: 20,
            default_radius_km: 5.0,
            listing_limit: 50,
            proof_base_url: "https://proofs.coinnet.local".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig with custom commission and capacity values
    ///
    /// Out-of-range values fall back to the defaults with a warning.
    pub fn new(commission_rate: Decimal, max_active_transactions: usize) -> Self {
        let default = Self::default();

        let commission_rate = if commission_rate <= Decimal::ZERO || commission_rate >= Decimal::ONE {
            warn!(
                requested = %commission_rate,
                fallback = %default.commission_rate,
                "invalid commission rate, using default"
            );
            default.commission_rate
        } else {
            commission_rate
        };

        let max_active_transactions = if max_active_transactions == 0 {
            warn!(
                fallback = default.max_active_transactions,
                "invalid max_active_transactions (0), using default"
            );
            default.max_active_transactions
        } else {
            max_active_transactions
        };

        Self {
            commission_rate,
            max_active_transactions,
            ..default
        }
    }

    /// Override the proximity-search defaults
    pub fn with_search(mut self, nearby_result_limit: usize, default_radius_km: f64) -> Self {
        if nearby_result_limit > 0 {
            self.nearby_result_limit = nearby_result_limit;
        } else {
            warn!("invalid nearby_result_limit (0), keeping {}", self.nearby_result_limit);
        }
        if default_radius_km.is_finite() && default_radius_km > 0.0 {
            self.default_radius_km = default_radius_km;
        } else {
            warn!(
                requested = default_radius_km,
                "invalid default radius, keeping {}", self.default_radius_km
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.commission_rate, dec!(0.05));
        assert_eq!(config.max_active_transactions, 2);
        assert_eq!(config.nearby_result_limit, 20);
        assert_eq!(config.default_radius_km, 5.0);
        assert_eq!(config.listing_limit, 50);
    }

    #[rstest]
    #[case::custom(dec!(0.03), 3, dec!(0.03), 3)]
    #[case::zero_rate(dec!(0), 3, dec!(0.05), 3)]
    #[case::full_rate(dec!(1), 3, dec!(0.05), 3)]
    #[case::negative_rate(dec!(-0.1), 1, dec!(0.05), 1)]
    #[case::zero_capacity(dec!(0.04), 0, dec!(0.04), 2)]
    fn test_new_falls_back_on_invalid_values(
        #[case] rate: Decimal,
        #[case] capacity: usize,
        #[case] expected_rate: Decimal,
        #[case] expected_capacity: usize,
    ) {
        let config = EngineConfig::new(rate, capacity);
        assert_eq!(config.commission_rate, expected_rate);
        assert_eq!(config.max_active_transactions, expected_capacity);
    }

    #[test]
    fn test_with_search_ignores_invalid_values() {
        let config = EngineConfig::default().with_search(0, -1.0);
        assert_eq!(config.nearby_result_limit, 20);
        assert_eq!(config.default_radius_km, 5.0);

        let config = EngineConfig::default().with_search(5, 12.5);
        assert_eq!(config.nearby_result_limit, 5);
        assert_eq!(config.default_radius_km, 12.5);
    }
}
