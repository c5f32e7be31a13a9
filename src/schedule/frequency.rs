use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// payment frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Frequency {
    Weekly,
    Biweekly,
    #[default]
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl Frequency {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Frequency::Weekly => 52,
            Frequency::Biweekly => 26,
            Frequency::Monthly => 12,
            Frequency::Quarterly => 4,
            Frequency::SemiAnnual => 2,
            Frequency::Annual => 1,
        }
    }

    /// fixed day span for day-based frequencies, none for month-based
    fn day_span(&self) -> Option<i64> {
        match self {
            Frequency::Weekly => Some(7),
            Frequency::Biweekly => Some(14),
            _ => None,
        }
    }

    fn month_span(&self) -> i32 {
        match self {
            Frequency::Monthly => 1,
            Frequency::Quarterly => 3,
            Frequency::SemiAnnual => 6,
            Frequency::Annual => 12,
            Frequency::Weekly | Frequency::Biweekly => 0,
        }
    }

    /// advance a date by a number of periods (negative moves backwards)
    pub fn add_periods(&self, anchor: NaiveDate, periods: i32) -> NaiveDate {
        match self.day_span() {
            Some(days) => anchor + Duration::days(days * periods as i64),
            None => add_months(anchor, self.month_span() * periods),
        }
    }

    /// raw due-date sequence: one period after the anchor, then onwards
    pub fn due_dates(&self, start: NaiveDate, num_periods: u32) -> Vec<NaiveDate> {
        (1..=num_periods as i32).map(|p| self.add_periods(start, p)).collect()
    }

    /// convert a tenure in months to a number of payment periods
    pub fn tenure_periods(&self, tenure_months: u32) -> u32 {
        let periods = f64::from(tenure_months) / 12.0 * f64::from(self.periods_per_year());
        periods.round() as u32
    }
}

/// add months to a date, clamping to the last day of shorter months
pub fn add_months(anchor: NaiveDate, months: i32) -> NaiveDate {
    let month_index = anchor.month0() as i32 + months;
    let year = anchor.year() + month_index.div_euclid(12);
    let month = month_index.rem_euclid(12) as u32 + 1;
    let day = anchor.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if crate::interest::daycount::is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => unreachable!("month out of range"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_add_months_clamps_month_end() {
        assert_eq!(add_months(date(2025, 1, 31), 1), date(2025, 2, 28));
        assert_eq!(add_months(date(2024, 1, 31), 1), date(2024, 2, 29));
        assert_eq!(add_months(date(2025, 3, 31), 1), date(2025, 4, 30));
        assert_eq!(add_months(date(2025, 1, 15), -1), date(2024, 12, 15));
    }

    #[test]
    fn test_due_dates_monthly() {
        let dates = Frequency::Monthly.due_dates(date(2025, 1, 1), 3);
        assert_eq!(dates, vec![date(2025, 2, 1), date(2025, 3, 1), date(2025, 4, 1)]);
    }

    #[test]
    fn test_due_dates_weekly() {
        let dates = Frequency::Weekly.due_dates(date(2025, 1, 1), 2);
        assert_eq!(dates, vec![date(2025, 1, 8), date(2025, 1, 15)]);
    }

    #[test]
    fn test_tenure_periods() {
        assert_eq!(Frequency::Monthly.tenure_periods(12), 12);
        assert_eq!(Frequency::Quarterly.tenure_periods(12), 4);
        assert_eq!(Frequency::Weekly.tenure_periods(12), 52);
        assert_eq!(Frequency::Annual.tenure_periods(36), 3);
    }

    #[test]
    fn test_add_periods_backwards() {
        assert_eq!(Frequency::Quarterly.add_periods(date(2025, 7, 1), -1), date(2025, 4, 1));
    }
}
