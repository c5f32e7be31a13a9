use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate, RATE_DP};

/// day count convention for interest calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DayCountConvention {
    /// 30-day months over a 360-day year (US bond basis)
    Thirty360,
    /// actual days / 365
    #[default]
    Act365,
    /// actual days / 360 (money market)
    Act360,
    /// actual days / actual days in year, split at year boundaries (ISDA)
    ActAct,
}

impl DayCountConvention {
    /// days in the year basis for this convention
    pub fn days_in_year(&self, year: i32) -> u32 {
        match self {
            DayCountConvention::Thirty360 | DayCountConvention::Act360 => 360,
            DayCountConvention::Act365 => 365,
            DayCountConvention::ActAct => {
                if is_leap_year(year) {
                    366
                } else {
                    365
                }
            }
        }
    }

    /// year fraction between two dates; zero when start >= end
    pub fn year_fraction(&self, start: NaiveDate, end: NaiveDate) -> Decimal {
        if start >= end {
            return Decimal::ZERO;
        }

        let fraction = match self {
            DayCountConvention::Thirty360 => {
                Decimal::from(days_30_360(start, end)) / Decimal::from(360)
            }
            DayCountConvention::Act360 => {
                Decimal::from(actual_days(start, end)) / Decimal::from(360)
            }
            DayCountConvention::Act365 => {
                Decimal::from(actual_days(start, end)) / Decimal::from(365)
            }
            DayCountConvention::ActAct => {
                if start.year() == end.year() {
                    Decimal::from(actual_days(start, end))
                        / Decimal::from(self.days_in_year(start.year()))
                } else {
                    // prorate each calendar year separately
                    let mut fraction = Decimal::ZERO;
                    for year in start.year()..=end.year() {
                        let year_start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
                        let next_year = NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap();
                        let sub_start = start.max(year_start);
                        let sub_end = end.min(next_year);
                        if sub_start < sub_end {
                            fraction += Decimal::from(actual_days(sub_start, sub_end))
                                / Decimal::from(self.days_in_year(year));
                        }
                    }
                    fraction
                }
            }
        };

        fraction.round_dp(RATE_DP)
    }

    /// interest for a period, rounded half-up to the cent
    pub fn period_interest(
        &self,
        principal: Money,
        annual_rate: Rate,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Money {
        principal.interest_for(annual_rate, self.year_fraction(start, end))
    }
}

/// actual calendar days between two dates
pub fn actual_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// 30/360 day count with the standard end-of-month adjustments:
/// a start day of 31 becomes 30; an end day of 31 becomes 30 when the
/// adjusted start day is 30 or more.
pub fn days_30_360(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut d1 = start.day() as i64;
    let mut d2 = end.day() as i64;

    if d1 == 31 {
        d1 = 30;
    }
    if d2 == 31 && d1 >= 30 {
        d2 = 30;
    }

    360 * (end.year() as i64 - start.year() as i64)
        + 30 * (end.month() as i64 - start.month() as i64)
        + (d2 - d1)
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
