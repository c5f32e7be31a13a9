use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::AdjustmentMode;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::interest::{DayCountConvention, RateSpec};
use crate::schedule::Frequency;
use crate::types::{
    AccountId, AccountStatus, CalendarId, ClosureKind, DelinquencyBucket, EclStage, NpaCategory,
    ScheduleKind,
};

/// the loan account aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanAccount {
    // identification
    pub id: AccountId,
    pub account_number: String,
    pub product_code: String,
    pub borrower_id: String,

    // principal and balances
    pub principal_disbursed: Money,
    pub principal_outstanding: Money,
    pub interest_outstanding: Money,
    pub fees_outstanding: Money,

    // rate
    pub rate_spec: RateSpec,
    /// effective annual rate as of the last resolution
    pub current_rate: Rate,
    pub next_rate_reset: Option<NaiveDate>,

    // terms
    pub tenure_periods: u32,
    pub frequency: Frequency,
    pub schedule_kind: ScheduleKind,
    pub day_count: DayCountConvention,
    pub calendar_id: CalendarId,
    pub adjustment: AdjustmentMode,

    // dates
    pub disbursement_date: NaiveDate,
    pub first_due_date: NaiveDate,
    pub closure_date: Option<NaiveDate>,
    pub closure_kind: Option<ClosureKind>,

    // status and delinquency
    pub status: AccountStatus,
    pub dpd: u32,
    pub bucket: DelinquencyBucket,
    pub is_npa: bool,
    pub npa_date: Option<NaiveDate>,
    pub npa_category: Option<NpaCategory>,

    // lifecycle flags
    pub is_restructured: bool,
    pub restructure_count: u32,
    pub is_written_off: bool,
    pub sicr_flag: bool,
    pub is_secured: bool,

    // ECL
    pub ecl_stage: EclStage,
    pub ecl_provision: Money,
    pub ecl_provision_date: Option<NaiveDate>,

    // accrual tracking
    pub cumulative_accrued: Money,
    pub last_accrual_date: Option<NaiveDate>,

    // payment tracking
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Option<Money>,
    pub total_payments_received: Money,

    // prepayment terms
    pub prepayment_penalty_rate: Rate,
}

/// terms needed to open an account
#[derive(Debug, Clone)]
pub struct LoanTerms {
    pub account_number: String,
    pub product_code: String,
    pub borrower_id: String,
    pub principal: Money,
    pub rate_spec: RateSpec,
    pub current_rate: Rate,
    pub tenure_periods: u32,
    pub frequency: Frequency,
    pub schedule_kind: ScheduleKind,
    pub day_count: DayCountConvention,
    pub calendar_id: CalendarId,
    pub adjustment: AdjustmentMode,
    pub disbursement_date: NaiveDate,
    pub first_due_date: NaiveDate,
    pub is_secured: bool,
    pub prepayment_penalty_rate: Rate,
}

impl LoanAccount {
    /// open a new active account from its terms
    pub fn open(id: AccountId, terms: LoanTerms) -> Result<Self> {
        if !terms.principal.is_positive() {
            return Err(LoanError::invalid_input("principal must be positive"));
        }
        if terms.tenure_periods == 0 {
            return Err(LoanError::invalid_input("tenure must be at least one period"));
        }

        Ok(Self {
            id,
            account_number: terms.account_number,
            product_code: terms.product_code,
            borrower_id: terms.borrower_id,
            principal_disbursed: terms.principal,
            principal_outstanding: terms.principal,
            interest_outstanding: Money::ZERO,
            fees_outstanding: Money::ZERO,
            rate_spec: terms.rate_spec,
            current_rate: terms.current_rate,
            next_rate_reset: None,
            tenure_periods: terms.tenure_periods,
            frequency: terms.frequency,
            schedule_kind: terms.schedule_kind,
            day_count: terms.day_count,
            calendar_id: terms.calendar_id,
            adjustment: terms.adjustment,
            disbursement_date: terms.disbursement_date,
            first_due_date: terms.first_due_date,
            closure_date: None,
            closure_kind: None,
            status: AccountStatus::Active,
            dpd: 0,
            bucket: DelinquencyBucket::Current,
            is_npa: false,
            npa_date: None,
            npa_category: None,
            is_restructured: false,
            restructure_count: 0,
            is_written_off: false,
            sicr_flag: false,
            is_secured: terms.is_secured,
            ecl_stage: EclStage::Stage1,
            ecl_provision: Money::ZERO,
            ecl_provision_date: None,
            cumulative_accrued: Money::ZERO,
            last_accrual_date: None,
            next_due_date: None,
            next_due_amount: None,
            total_payments_received: Money::ZERO,
            prepayment_penalty_rate: terms.prepayment_penalty_rate,
        })
    }

    pub fn total_outstanding(&self) -> Money {
        self.principal_outstanding + self.interest_outstanding + self.fees_outstanding
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// guard for state-changing operations
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LoanError::AccountNotOpen { status: self.status })
        }
    }

    /// mark the account closed
    pub fn close(&mut self, kind: ClosureKind, on: NaiveDate) {
        self.status = if kind == ClosureKind::WriteOff {
            AccountStatus::WrittenOff
        } else {
            AccountStatus::Closed
        };
        self.closure_kind = Some(kind);
        self.closure_date = Some(on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn test_terms() -> LoanTerms {
        LoanTerms {
            account_number: "LN-0001".into(),
            product_code: "PL-STD".into(),
            borrower_id: "B-42".into(),
            principal: Money::from_major(100_000),
            rate_spec: RateSpec::Fixed { rate: Rate::from_percentage(dec!(12)) },
            current_rate: Rate::from_percentage(dec!(12)),
            tenure_periods: 12,
            frequency: Frequency::Monthly,
            schedule_kind: ScheduleKind::Emi,
            day_count: DayCountConvention::Act365,
            calendar_id: Uuid::new_v4(),
            adjustment: AdjustmentMode::Unadjusted,
            disbursement_date: date(2025, 1, 1),
            first_due_date: date(2025, 2, 1),
            is_secured: false,
            prepayment_penalty_rate: Rate::from_percentage(dec!(2)),
        }
    }

    #[test]
    fn test_open_active_account() {
        let account = LoanAccount::open(Uuid::new_v4(), test_terms()).unwrap();
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.principal_outstanding, Money::from_major(100_000));
        assert_eq!(account.ecl_stage, EclStage::Stage1);
        assert!(account.ensure_open().is_ok());
    }

    #[test]
    fn test_open_rejects_zero_principal() {
        let mut terms = test_terms();
        terms.principal = Money::ZERO;
        assert!(LoanAccount::open(Uuid::new_v4(), terms).is_err());
    }

    #[test]
    fn test_closed_account_is_not_open() {
        let mut account = LoanAccount::open(Uuid::new_v4(), test_terms()).unwrap();
        account.close(ClosureKind::Normal, date(2025, 6, 1));
        assert_eq!(account.status, AccountStatus::Closed);
        assert!(matches!(account.ensure_open(), Err(LoanError::AccountNotOpen { .. })));
    }

    #[test]
    fn test_write_off_closure_sets_written_off_status() {
        let mut account = LoanAccount::open(Uuid::new_v4(), test_terms()).unwrap();
        account.close(ClosureKind::WriteOff, date(2025, 6, 1));
        assert_eq!(account.status, AccountStatus::WrittenOff);
    }
}
