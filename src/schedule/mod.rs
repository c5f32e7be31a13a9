pub mod advanced;
pub mod frequency;
pub mod generator;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::types::{AccountId, ComponentAmounts, InstallmentStatus};

pub use frequency::Frequency;
pub use generator::{generate_schedule, ScheduleSpec};

/// one repayment schedule row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub number: u32,
    /// due date after business-day adjustment
    pub due_date: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening_balance: Money,
    pub principal_due: Money,
    pub interest_due: Money,
    pub fees_due: Money,
    pub closing_balance: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub fees_paid: Money,
    pub status: InstallmentStatus,
}

impl Installment {
    pub fn total_due(&self) -> Money {
        self.principal_due + self.interest_due + self.fees_due
    }

    pub fn total_paid(&self) -> Money {
        self.principal_paid + self.interest_paid + self.fees_paid
    }

    /// unpaid remainder per component, never negative
    pub fn remaining(&self) -> ComponentAmounts {
        ComponentAmounts {
            principal: (self.principal_due - self.principal_paid).clamp_non_negative(),
            interest: (self.interest_due - self.interest_paid).clamp_non_negative(),
            fees: (self.fees_due - self.fees_paid).clamp_non_negative(),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, InstallmentStatus::Paid | InstallmentStatus::Skipped)
    }

    /// a row is open while anything remains due on it
    pub fn is_open(&self) -> bool {
        !self.is_settled() && self.remaining().total().is_positive()
    }
}

/// the full installment sequence for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RepaymentSchedule {
    pub account_id: AccountId,
    pub installments: Vec<Installment>,
}

impl RepaymentSchedule {
    pub fn new(account_id: AccountId, installments: Vec<Installment>) -> Self {
        Self { account_id, installments }
    }

    pub fn is_empty(&self) -> bool {
        self.installments.is_empty()
    }

    /// rows ordered for the payment waterfall: due date, then installment number
    pub fn ordered_for_allocation(&mut self) -> Vec<&mut Installment> {
        let mut rows: Vec<&mut Installment> = self.installments.iter_mut().collect();
        rows.sort_by_key(|r| (r.due_date, r.number));
        rows
    }

    /// earliest row whose total paid is less than its total due
    pub fn oldest_unpaid(&self) -> Option<&Installment> {
        self.installments
            .iter()
            .filter(|r| r.is_open())
            .min_by_key(|r| (r.due_date, r.number))
    }

    /// open rows due strictly before a date
    pub fn overdue_rows(&self, as_of: NaiveDate) -> Vec<&Installment> {
        let mut rows: Vec<&Installment> = self
            .installments
            .iter()
            .filter(|r| r.is_open() && r.due_date < as_of)
            .collect();
        rows.sort_by_key(|r| (r.due_date, r.number));
        rows
    }

    /// outstanding totals recomputed from the rows
    pub fn outstanding(&self) -> ComponentAmounts {
        self.installments
            .iter()
            .filter(|r| r.status != InstallmentStatus::Skipped)
            .fold(ComponentAmounts::default(), |acc, r| {
                let remaining = r.remaining();
                ComponentAmounts {
                    principal: acc.principal + remaining.principal,
                    interest: acc.interest + remaining.interest,
                    fees: acc.fees + remaining.fees,
                }
            })
    }

    /// next open row by due date
    pub fn next_due(&self) -> Option<&Installment> {
        self.oldest_unpaid()
    }

    /// count of open, not yet settled rows
    pub fn open_count(&self) -> usize {
        self.installments.iter().filter(|r| r.is_open()).count()
    }

    /// reconcile the schedule against the principal it was generated for.
    ///
    /// checks the opening/closing chain, a zero terminal balance and the
    /// sum of principal due against the expected principal. a mismatch is
    /// an invariant violation.
    pub fn validate(&self, expected_principal: Money) -> Result<()> {
        let rows = &self.installments;
        if rows.is_empty() {
            return Err(LoanError::fatal("schedule has no installments"));
        }

        let mut principal_total = Money::ZERO;
        for (i, row) in rows.iter().enumerate() {
            if let Some(next) = rows.get(i + 1) {
                if row.closing_balance != next.opening_balance {
                    return Err(LoanError::fatal(format!(
                        "closing balance of installment {} does not chain to {}",
                        row.number, next.number
                    )));
                }
            }
            principal_total += row.principal_due;
        }

        let last = rows.last().expect("non-empty");
        if !last.closing_balance.is_zero() {
            return Err(LoanError::fatal(format!(
                "terminal closing balance is {} not zero",
                last.closing_balance
            )));
        }
        if principal_total != expected_principal {
            return Err(LoanError::fatal(format!(
                "principal due {} does not reconcile to {}",
                principal_total, expected_principal
            )));
        }
        Ok(())
    }
}
