//! Money Module
//!
//! Fixed-point currency handling for balances, fees and accrued profit.
//! All amounts are `rust_decimal::Decimal`; floating point never enters the ledger.
//!
//! ## Ledger precision
//! - Balances and reward counters are kept at [`LEDGER_SCALE`] (4) decimal places
//! - Rounding is half-up (midpoint away from zero), applied at the ledger boundary
//! - Sub-precision remainders of accrual are carried, not dropped (see [`split_carry`])
//!
//! ## Usage
//! ```rust
//! use hashlease::money::{format_ledger, round_ledger};
//! use rust_decimal::Decimal;
//!
//! let tick = Decimal::new(14583, 7); // 0.0014583
//! assert_eq!(round_ledger(tick), Decimal::new(15, 4));
//! assert_eq!(format_ledger(Decimal::new(126, 1)), "12.6000");
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;

/// Decimal places kept on balances and reward counters
pub const LEDGER_SCALE: u32 = 4;

/// Decimal places kept on the accrual carry
pub const CARRY_SCALE: u32 = 12;

/// Money parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Round to ledger precision, half-up
#[inline]
pub fn round_ledger(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(LEDGER_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Render at exactly four decimals (e.g. `"12.6000"`)
pub fn format_ledger(value: Decimal) -> String {
    let mut rounded = round_ledger(value);
    rounded.rescale(LEDGER_SCALE);
    rounded.to_string()
}

/// Split a raw amount into the part the ledger can hold and the remainder.
///
/// `credited + carry == raw` up to [`CARRY_SCALE`], and `|carry| <= 0.00005`.
pub fn split_carry(raw: Decimal) -> (Decimal, Decimal) {
    let credited = round_ledger(raw);
    let carry = (raw - credited).round_dp(CARRY_SCALE);
    (credited, carry)
}

/// Parse a client-supplied positive amount (e.g. `"100"`, `"12.5"`).
///
/// Rejects more than [`LEDGER_SCALE`] decimals rather than truncating.
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }
    if amount_str.starts_with('+') {
        return Err(MoneyError::InvalidFormat("explicit sign not allowed".into()));
    }

    let value = Decimal::from_str(amount_str)
        .map_err(|_| MoneyError::InvalidFormat(format!("not a decimal: {}", amount_str)))?;

    if value <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }

    let provided = value.normalize().scale();
    if provided > LEDGER_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided,
            max: LEDGER_SCALE,
        });
    }

    Ok(value)
}
