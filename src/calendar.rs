use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::{LoanError, Result};
use crate::types::CalendarId;

/// safety bound when searching for a business day
const MAX_ADJUSTMENT_DAYS: u32 = 30;

/// business day adjustment modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AdjustmentMode {
    /// use the raw date regardless of weekends and holidays
    Unadjusted,
    /// move to the next business day
    Following,
    /// move to the previous business day
    Preceding,
    /// following, unless that crosses into the next month, then preceding
    #[default]
    ModifiedFollowing,
    /// preceding, unless that crosses into the previous month, then following
    ModifiedPreceding,
}

/// a holiday calendar: fixed dates, yearly recurring dates and a weekly-off mask
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessCalendar {
    pub id: CalendarId,
    pub name: String,
    holidays: BTreeSet<NaiveDate>,
    /// (month, day) pairs observed every year
    recurring: BTreeSet<(u32, u32)>,
    weekly_off: Vec<Weekday>,
}

impl BusinessCalendar {
    pub fn new(id: CalendarId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            holidays: BTreeSet::new(),
            recurring: BTreeSet::new(),
            weekly_off: vec![Weekday::Sat, Weekday::Sun],
        }
    }

    /// calendar with no holidays and no weekly offs; every day is a business day
    pub fn seven_day(id: CalendarId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            holidays: BTreeSet::new(),
            recurring: BTreeSet::new(),
            weekly_off: Vec::new(),
        }
    }

    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    /// add a holiday observed on the same month/day every year
    pub fn with_recurring_holiday(mut self, month: u32, day: u32) -> Self {
        self.recurring.insert((month, day));
        self
    }

    pub fn with_weekly_off(mut self, days: Vec<Weekday>) -> Self {
        self.weekly_off = days;
        self
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date) || self.recurring.contains(&(date.month(), date.day()))
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !self.weekly_off.contains(&date.weekday()) && !self.is_holiday(date)
    }

    /// next business day on or after the given date
    pub fn next_business_day(&self, date: NaiveDate) -> Result<NaiveDate> {
        let mut current = date;
        for _ in 0..MAX_ADJUSTMENT_DAYS {
            if self.is_business_day(current) {
                return Ok(current);
            }
            current += Duration::days(1);
        }
        Err(LoanError::invalid_input(format!(
            "no business day within {MAX_ADJUSTMENT_DAYS} days after {date}"
        )))
    }

    /// previous business day on or before the given date
    pub fn previous_business_day(&self, date: NaiveDate) -> Result<NaiveDate> {
        let mut current = date;
        for _ in 0..MAX_ADJUSTMENT_DAYS {
            if self.is_business_day(current) {
                return Ok(current);
            }
            current -= Duration::days(1);
        }
        Err(LoanError::invalid_input(format!(
            "no business day within {MAX_ADJUSTMENT_DAYS} days before {date}"
        )))
    }

    /// shift a date to a business day per the adjustment mode
    pub fn adjust(&self, date: NaiveDate, mode: AdjustmentMode) -> Result<NaiveDate> {
        if mode == AdjustmentMode::Unadjusted || self.is_business_day(date) {
            return Ok(date);
        }

        match mode {
            AdjustmentMode::Unadjusted => Ok(date),
            AdjustmentMode::Following => self.next_business_day(date),
            AdjustmentMode::Preceding => self.previous_business_day(date),
            AdjustmentMode::ModifiedFollowing => {
                let adjusted = self.next_business_day(date)?;
                if adjusted.month() != date.month() {
                    self.previous_business_day(date)
                } else {
                    Ok(adjusted)
                }
            }
            AdjustmentMode::ModifiedPreceding => {
                let adjusted = self.previous_business_day(date)?;
                if adjusted.month() != date.month() {
                    self.next_business_day(date)
                } else {
                    Ok(adjusted)
                }
            }
        }
    }

    /// adjust a raw due-date sequence before it is persisted
    pub fn adjust_all(&self, dates: &[NaiveDate], mode: AdjustmentMode) -> Result<Vec<NaiveDate>> {
        dates.iter().map(|d| self.adjust(*d, mode)).collect()
    }
}
