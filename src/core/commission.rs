//! Commission computation
//!
//! Pure and deterministic. The breakdown returned here is copied into the
//! transaction at creation and never recomputed afterwards, so a later rate
//! change cannot alter existing transactions.

use crate::types::{CommissionBreakdown, ExchangeError};
use rust_decimal::{Decimal, RoundingStrategy};

/// Computes the commission owed on a requested cash amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionCalculator {
    rate: Decimal,
}

impl CommissionCalculator {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }

    /// Rate applied by [`Self::compute`]
    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Compute `{rate, commission, total}` for `amount`
    ///
    /// Both `commission = amount * rate` and `total = amount + commission` are
    /// rounded half-up to two decimal places.
    ///
    /// # Errors
    ///
    /// * `ExchangeError::Validation` - if `amount` is zero or negative, or the
    ///   multiplication overflows
    pub fn compute(&self, amount: Decimal) -> Result<CommissionBreakdown, ExchangeError> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::validation(format!(
                "Amount must be positive, got {}",
                amount
            )));
        }

        let commission = amount
            .checked_mul(self.rate)
            .map(round_half_up)
            .ok_or_else(|| ExchangeError::validation(format!("Amount {} is too large", amount)))?;
        let total = amount
            .checked_add(commission)
            .map(round_half_up)
            .ok_or_else(|| ExchangeError::validation(format!("Amount {} is too large", amount)))?;

        Ok(CommissionBreakdown {
            requested_amount: amount,
            rate: self.rate,
            commission,
            total,
        })
    }
}

fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
