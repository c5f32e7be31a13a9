use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// decimal places carried by monetary amounts
pub const MONEY_DP: u32 = 2;

/// decimal places carried by rates
pub const RATE_DP: u32 = 10;

fn round_money(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Money type with two decimal places, rounded half-up on every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    /// one minor unit (a cent / paisa)
    pub const CENT: Money = Money(Decimal::from_parts(1, 0, 0, false, 2));

    /// create from decimal, rounding half-up to the cent
    pub fn from_decimal(d: Decimal) -> Self {
        Money(round_money(d))
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Money(round_money(Decimal::from_str(s)?)))
    }

    /// create from whole currency units
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from minor units (cents)
    pub fn from_minor(amount: i64) -> Self {
        Money(Decimal::new(amount, MONEY_DP))
    }

    /// get underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// check if strictly positive
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// check if strictly negative
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// absolute value
    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// minimum of two values
    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    /// maximum of two values
    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    /// never below zero
    pub fn clamp_non_negative(self) -> Self {
        self.max(Money::ZERO)
    }

    /// share of this amount at a percentage (e.g. 80 for 80%)
    pub fn percentage(&self, percent: Decimal) -> Self {
        Money(round_money(self.0 * percent / Decimal::ONE_HUNDRED))
    }

    /// simple interest over a fraction of a year
    pub fn interest_for(&self, annual_rate: Rate, year_fraction: Decimal) -> Self {
        Money(round_money(self.0 * annual_rate.as_decimal() * year_fraction))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i64> for Money {
    fn from(i: i64) -> Self {
        Money::from_major(i)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money(round_money(self.0 * other))
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money(round_money(self.0 / other))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

/// rate type for interest rates and percentages, ten decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from decimal (e.g. 0.12 for 12%)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d.round_dp(RATE_DP))
    }

    /// create from percentage (e.g. 12 for 12%)
    pub fn from_percentage(p: Decimal) -> Self {
        Rate((p / Decimal::ONE_HUNDRED).round_dp(RATE_DP))
    }

    /// create from basis points (e.g. 1200 for 12%)
    pub fn from_bps(bps: i64) -> Self {
        Rate(Decimal::from(bps) / Decimal::from(10_000))
    }

    /// get as decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// get as percentage
    pub fn as_percentage(&self) -> Decimal {
        self.0 * Decimal::ONE_HUNDRED
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// periodic rate for a payment frequency
    pub fn periodic(&self, periods_per_year: u32) -> Rate {
        Rate((self.0 / Decimal::from(periods_per_year)).round_dp(RATE_DP))
    }

    /// daily rate over a year basis (365, 360 or 366)
    pub fn daily(&self, year_basis: u32) -> Rate {
        Rate((self.0 / Decimal::from(year_basis)).round_dp(RATE_DP))
    }

    pub fn min(self, other: Self) -> Self {
        Rate(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Rate(self.0.max(other.0))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().normalize())
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}

impl Add for Rate {
    type Output = Rate;

    fn add(self, other: Rate) -> Rate {
        Rate(self.0 + other.0)
    }
}

impl Sub for Rate {
    type Output = Rate;

    fn sub(self, other: Rate) -> Rate {
        Rate(self.0 - other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_rounds_half_up() {
        assert_eq!(Money::from_decimal(dec!(1.005)), Money::from_str_exact("1.01").unwrap());
        assert_eq!(Money::from_decimal(dec!(1.004)), Money::from_str_exact("1.00").unwrap());
        assert_eq!(Money::from_decimal(dec!(-1.005)).to_string(), "-1.01");
    }

    #[test]
    fn test_money_minor_units() {
        assert_eq!(Money::from_minor(1), Money::CENT);
        assert_eq!(Money::from_minor(123_45), Money::from_str_exact("123.45").unwrap());
    }

    #[test]
    fn test_percentage_share() {
        let m = Money::from_major(10_000);
        assert_eq!(m.percentage(dec!(80)), Money::from_major(8_000));
        assert_eq!(m.percentage(dec!(0.5)), Money::from_major(50));
    }

    #[test]
    fn test_interest_for_fraction() {
        // 100000 at 12% for one month of a 360-day year
        let m = Money::from_major(100_000);
        let interest = m.interest_for(Rate::from_percentage(dec!(12)), dec!(30) / dec!(360));
        assert_eq!(interest, Money::from_major(1_000));
    }

    #[test]
    fn test_rate_precision() {
        let r = Rate::from_percentage(dec!(12));
        assert_eq!(r.periodic(12).as_decimal(), dec!(0.01));
        // 12% / 365 keeps ten decimal places
        assert_eq!(r.daily(365).as_decimal(), dec!(0.0003287671));
    }

    #[test]
    fn test_money_sum() {
        let total: Money = vec![Money::from_major(1), Money::from_major(2)].into_iter().sum();
        assert_eq!(total, Money::from_major(3));
    }
}
