//! Profit arithmetic shared by the periodic tick and offline catch-up.
//!
//! All functions are pure; the callers own time and storage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{Contract, Machine, MachineType};
use crate::money::split_carry;

const MICROS_PER_HOUR: i64 = 3_600_000_000;
const SECS_PER_DAY: i64 = 86_400;

/// Accrual basis: buy price for purchased machines, deposit for rented ones
pub fn principal(machine: &Machine, contract: &Contract) -> Decimal {
    match machine.machine_type {
        MachineType::Buy => machine.buy_price,
        MachineType::Rent => contract.amount,
    }
}

/// `principal * dailyRate / 100`
pub fn daily_profit(principal: Decimal, daily_rate: Decimal) -> Decimal {
    principal * daily_rate / Decimal::ONE_HUNDRED
}

/// `dailyProfit / 24`
pub fn hourly_rate(daily: Decimal) -> Decimal {
    daily / Decimal::from(24)
}

/// `hourlyRate * elapsedHours` over `[from, to)`, at microsecond resolution
pub fn accrued_over(daily: Decimal, from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    hourly_rate(daily) * elapsed_hours(from, to)
}

/// `floor((now - start) / 24h)`
pub fn days_active(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_seconds().div_euclid(SECS_PER_DAY)
}

/// Fractional hours between two instants, zero if `to` precedes `from`
pub fn elapsed_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    let micros = (to - from).num_microseconds().unwrap_or(i64::MAX).max(0);
    Decimal::from(micros) / Decimal::from(MICROS_PER_HOUR)
}

/// Latest instant a contract may accrue up to in its current window.
///
/// Time past `end_date` is unpaid until the window is renewed or resumed.
pub fn accrual_horizon(contract: &Contract, now: DateTime<Utc>) -> DateTime<Utc> {
    now.min(contract.end_date)
}

/// Amount owed on one contract for the window `[last_accrued_at, horizon)`
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualQuote {
    pub new_cursor: DateTime<Utc>,
    /// Ledger-precision amount to credit (may be zero for very short windows)
    pub credited: Decimal,
    pub carry: Decimal,
}

/// `None` when there is nothing to claim: zero profit or an empty window
pub fn quote(
    contract: &Contract,
    machine: &Machine,
    now: DateTime<Utc>,
) -> Option<AccrualQuote> {
    let daily = daily_profit(principal(machine, contract), machine.daily_rate);
    if daily <= Decimal::ZERO {
        return None;
    }

    let horizon = accrual_horizon(contract, now);
    if horizon <= contract.last_accrued_at {
        return None;
    }

    let raw = accrued_over(daily, contract.last_accrued_at, horizon) + contract.accrual_carry;
    let (credited, carry) = split_carry(raw);
    Some(AccrualQuote {
        new_cursor: horizon,
        credited,
        carry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContractStatus;
    use chrono::Duration;

    fn ticks_per_day(interval: std::time::Duration) -> Decimal {
        let secs = interval.as_secs().max(1);
        Decimal::from(SECS_PER_DAY) / Decimal::from(secs)
    }

    fn tick_profit(daily: Decimal, interval: std::time::Duration) -> Decimal {
        daily / ticks_per_day(interval)
    }

    fn machine(machine_type: MachineType, rate: Decimal, buy_price: Decimal) -> Machine {
        Machine {
            id: 1,
            name: "S19".into(),
            machine_type,
            daily_rate: rate,
            duration_days: 30,
            monthly_fee: Decimal::from(3),
            min_deposit: Decimal::from(30),
            rental_price: Decimal::ZERO,
            buy_price,
            is_active: true,
        }
    }

    fn contract(amount: Decimal, start: DateTime<Utc>) -> Contract {
        Contract {
            id: 1,
            user_id: 1,
            machine_id: 1,
            amount,
            start_date: start,
            end_date: start + Duration::days(30),
            status: ContractStatus::Active,
            accumulated_rewards: Decimal::ZERO,
            auto_reinvest: false,
            last_accrued_at: start,
            accrual_carry: Decimal::ZERO,
        }
    }

    #[test]
    fn test_principal_basis_by_type() {
        let c = contract(Decimal::from(100), Utc::now());
        let buy = machine(MachineType::Buy, Decimal::new(28, 1), Decimal::from(450));
        let rent = machine(MachineType::Rent, Decimal::new(28, 1), Decimal::from(450));
        assert_eq!(principal(&buy, &c), Decimal::from(450));
        assert_eq!(principal(&rent, &c), Decimal::from(100));
    }

    #[test]
    fn test_tick_profit_for_ten_second_ticks() {
        let daily = daily_profit(Decimal::from(450), Decimal::new(28, 1));
        assert_eq!(daily, Decimal::new(126, 1));
        assert_eq!(ticks_per_day(std::time::Duration::from_secs(10)), Decimal::from(8640));

        let tick = tick_profit(daily, std::time::Duration::from_secs(10));
        assert_eq!(tick.round_dp(7), Decimal::new(14583, 7));
        assert_eq!(hourly_rate(daily), Decimal::new(525, 3));
    }

    #[test]
    fn test_days_active_floors() {
        let start = Utc::now();
        assert_eq!(days_active(start, start + Duration::hours(23)), 0);
        assert_eq!(days_active(start, start + Duration::days(30)), 30);
        assert_eq!(days_active(start, start + Duration::days(30) - Duration::seconds(1)), 29);
        assert_eq!(days_active(start, start - Duration::hours(1)), -1);
    }

    #[test]
    fn test_elapsed_hours() {
        let from = Utc::now();
        assert_eq!(elapsed_hours(from, from + Duration::minutes(90)), Decimal::new(15, 1));
        assert_eq!(elapsed_hours(from, from + Duration::seconds(36)), Decimal::new(1, 2));
        assert_eq!(elapsed_hours(from, from - Duration::hours(1)), Decimal::ZERO);
    }

    #[test]
    fn test_quote_stops_at_end_date() {
        let start = Utc::now();
        let c = contract(Decimal::from(100), start);
        let m = machine(MachineType::Rent, Decimal::from(1), Decimal::ZERO);

        let q = quote(&c, &m, start + Duration::days(45)).unwrap();
        assert_eq!(q.new_cursor, c.end_date);
        assert_eq!(q.credited, Decimal::from(30)); // 1/day for 30 days

        let mut caught_up = c.clone();
        caught_up.last_accrued_at = c.end_date;
        assert!(quote(&caught_up, &m, start + Duration::days(45)).is_none());
    }

    #[test]
    fn test_quote_none_for_zero_profit() {
        let start = Utc::now();
        let m = machine(MachineType::Rent, Decimal::from(2), Decimal::ZERO);
        let c = contract(Decimal::ZERO, start);
        assert!(quote(&c, &m, start + Duration::hours(1)).is_none());

        let m = machine(MachineType::Buy, Decimal::ZERO, Decimal::from(450));
        assert!(quote(&c, &m, start + Duration::hours(1)).is_none());
    }

    #[test]
    fn test_carry_accumulates_to_daily_total() {
        let start = Utc::now();
        let m = machine(MachineType::Buy, Decimal::new(28, 1), Decimal::from(450));
        let mut c = contract(Decimal::from(450), start);

        let mut now = start;
        for _ in 0..8640 {
            now += Duration::seconds(10);
            let q = quote(&c, &m, now).unwrap();
            c.accumulated_rewards += q.credited;
            c.accrual_carry = q.carry;
            c.last_accrued_at = q.new_cursor;
        }
        assert_eq!(c.accumulated_rewards, Decimal::new(126, 1));
    }
}
