//! Pricing Engine
//!
//! Maps a purchased duration to gross price, discount tier and net amount.
//! Amounts are integer minor units of the base currency.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// Shortest purchasable duration
pub const MIN_MONTHS: u32 = 1;

/// Longest purchasable duration
pub const MAX_MONTHS: u32 = 24;

/// Default monthly price in XAF
pub const DEFAULT_UNIT_PRICE: i64 = 2000;

/// Priced purchase, fixed at intent creation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub months: u32,
    pub gross_amount: i64,
    pub discount_percent: u8,
    pub net_amount: i64,
}

/// Prices the monthly premium product
#[derive(Clone, Copy, Debug)]
pub struct PricingEngine {
    unit_price: i64,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_PRICE)
    }
}

impl PricingEngine {
    pub fn new(unit_price: i64) -> Self {
        Self { unit_price }
    }

    pub fn unit_price(&self) -> i64 {
        self.unit_price
    }

    /// Quote a purchase of `months` months.
    ///
    /// Rejects durations outside `MIN_MONTHS..=MAX_MONTHS` without side effects.
    pub fn quote(&self, months: u32) -> Result<Quote> {
        if !(MIN_MONTHS..=MAX_MONTHS).contains(&months) {
            return Err(BillingError::Validation(format!(
                "months must be between {MIN_MONTHS} and {MAX_MONTHS}, got {months}"
            )));
        }

        let discount_percent = discount_percent(months);
        let gross_amount = i64::from(months) * self.unit_price;
        let net = Decimal::from(gross_amount) * (dec!(100) - Decimal::from(discount_percent)) / dec!(100);

        Ok(Quote {
            months,
            gross_amount,
            discount_percent,
            net_amount: round_to_minor(net)?,
        })
    }
}

/// Discount tier: 15% from a year, 5% from a quarter, otherwise none
pub fn discount_percent(months: u32) -> u8 {
    match months {
        m if m >= 12 => 15,
        m if m >= 3 => 5,
        _ => 0,
    }
}

/// Per-month price printed on receipts.
///
/// Rounded the same way as the net amount, so `unit * months` may differ
/// from `amount` for discounts that do not divide evenly.
pub fn unit_price_for(amount: i64, months: u32) -> Result<i64> {
    if months == 0 {
        return Err(BillingError::Validation("months must be positive".into()));
    }
    round_to_minor(Decimal::from(amount) / Decimal::from(months))
}

fn round_to_minor(value: Decimal) -> Result<i64> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| BillingError::Validation(format!("amount {value} out of range")))
}
