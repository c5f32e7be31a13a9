use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::interest::daycount::DayCountConvention;
use crate::types::AccountId;

/// lifecycle of an accrual row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccrualStatus {
    /// accrued, not yet collected
    Accrued,
    /// matched against collected interest
    Posted,
    Reversed,
}

/// one day of interest accrual; at most one non-reversed row per (account, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestAccrual {
    pub account_id: AccountId,
    pub accrual_date: NaiveDate,
    pub opening_principal: Money,
    pub rate: Rate,
    /// benchmark component for floating-rate accounts
    pub benchmark_rate: Option<Rate>,
    pub spread: Option<Rate>,
    pub convention: DayCountConvention,
    pub year_basis: u32,
    pub accrued: Money,
    pub cumulative: Money,
    pub status: AccrualStatus,
}

/// engine for daily interest accrual
#[derive(Debug, Clone, Copy)]
pub struct AccrualEngine {
    pub convention: DayCountConvention,
}

impl AccrualEngine {
    pub fn new(convention: DayCountConvention) -> Self {
        Self { convention }
    }

    /// one day of interest: principal x rate x day-fraction(d, d+1)
    pub fn daily_interest(&self, principal: Money, annual_rate: Rate, date: NaiveDate) -> Money {
        let next = date + Duration::days(1);
        self.convention.period_interest(principal, annual_rate, date, next)
    }

    /// build the accrual row for a date, chaining the cumulative total
    pub fn accrue_for_date(
        &self,
        account_id: AccountId,
        date: NaiveDate,
        principal: Money,
        effective_rate: Rate,
        benchmark_rate: Option<Rate>,
        spread: Option<Rate>,
        previous_cumulative: Money,
    ) -> InterestAccrual {
        let accrued = if principal.is_positive() {
            self.daily_interest(principal, effective_rate, date)
        } else {
            Money::ZERO
        };

        InterestAccrual {
            account_id,
            accrual_date: date,
            opening_principal: principal,
            rate: effective_rate,
            benchmark_rate,
            spread,
            convention: self.convention,
            year_basis: self.convention.days_in_year(date.year()),
            accrued,
            cumulative: previous_cumulative + accrued,
            status: AccrualStatus::Accrued,
        }
    }
}
