use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::LoanAccount;
use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::schedule::RepaymentSchedule;
use crate::types::{
    AccountId, ClosureKind, ComponentAmounts, InstallmentStatus, NpaCategory, WriteOffId,
};

/// how far recovery on a write-off has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStatus {
    Pending,
    Partial,
    Complete,
}

/// immutable write-off record with running recovery totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOff {
    pub id: WriteOffId,
    pub account_id: AccountId,
    pub write_off_date: NaiveDate,
    pub written_off: ComponentAmounts,
    pub dpd_at_write_off: u32,
    pub npa_category_at_write_off: Option<NpaCategory>,
    /// full or partial
    pub is_partial: bool,
    pub reason: String,
    pub approved_by: String,
    pub recovered: ComponentAmounts,
    pub recovery_status: RecoveryStatus,
    pub last_recovery_date: Option<NaiveDate>,
}

impl WriteOff {
    pub fn total_written_off(&self) -> Money {
        self.written_off.total()
    }

    pub fn total_recovered(&self) -> Money {
        self.recovered.total()
    }
}

/// recovery event against a write-off; allocation runs fees, interest,
/// then principal against the written-off components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOffRecovery {
    pub id: Uuid,
    pub write_off_id: WriteOffId,
    pub recovery_date: NaiveDate,
    pub amount: Money,
    pub allocated: ComponentAmounts,
    pub source: String,
}

/// close a fully repaid loan
pub fn close_normal(
    account: &mut LoanAccount,
    schedule: &RepaymentSchedule,
    closure_date: NaiveDate,
) -> Result<()> {
    account.ensure_open()?;

    if account.total_outstanding().is_positive() {
        return Err(LoanError::conflicting_state(format!(
            "outstanding balance {} prevents normal closure",
            account.total_outstanding()
        )));
    }
    if schedule.open_count() > 0 {
        return Err(LoanError::conflicting_state("schedule still has open installments"));
    }

    account.close(ClosureKind::Normal, closure_date);
    Ok(())
}

/// one-time settlement: a negotiated amount below the outstanding is
/// accepted as full discharge and the residual is waived
pub fn close_settlement(
    account: &mut LoanAccount,
    schedule: &mut RepaymentSchedule,
    settlement_amount: Money,
    settlement_date: NaiveDate,
) -> Result<Money> {
    account.ensure_open()?;

    let outstanding = account.total_outstanding();
    if !settlement_amount.is_positive() {
        return Err(LoanError::InvalidPaymentAmount { amount: settlement_amount });
    }
    if settlement_amount >= outstanding {
        return Err(LoanError::conflicting_state(
            "settlement amount covers the outstanding; use normal closure",
        ));
    }

    for row in schedule.installments.iter_mut().filter(|r| !r.is_settled()) {
        row.status = InstallmentStatus::Skipped;
    }

    let waived = outstanding - settlement_amount;
    account.principal_outstanding = Money::ZERO;
    account.interest_outstanding = Money::ZERO;
    account.fees_outstanding = Money::ZERO;
    account.total_payments_received += settlement_amount;
    account.close(ClosureKind::Settlement, settlement_date);
    Ok(waived)
}

/// write off the outstanding components; a partial write-off names the
/// components explicitly, a full one takes everything outstanding
pub fn write_off(
    account: &mut LoanAccount,
    schedule: &mut RepaymentSchedule,
    components: Option<ComponentAmounts>,
    write_off_date: NaiveDate,
    reason: impl Into<String>,
    approved_by: impl Into<String>,
) -> Result<WriteOff> {
    account.ensure_open()?;
    if account.is_written_off {
        return Err(LoanError::conflicting_state("account is already written off"));
    }

    let outstanding = ComponentAmounts {
        principal: account.principal_outstanding,
        interest: account.interest_outstanding,
        fees: account.fees_outstanding,
    };
    let written_off = match components {
        Some(c) => {
            if c.principal > outstanding.principal
                || c.interest > outstanding.interest
                || c.fees > outstanding.fees
            {
                return Err(LoanError::invalid_input(
                    "write-off components exceed the outstanding",
                ));
            }
            c
        }
        None => outstanding,
    };
    if !written_off.total().is_positive() {
        return Err(LoanError::invalid_input("nothing to write off"));
    }
    let is_partial = written_off != outstanding;

    for row in schedule.installments.iter_mut().filter(|r| !r.is_settled()) {
        row.status = InstallmentStatus::Skipped;
    }

    account.principal_outstanding -= written_off.principal;
    account.interest_outstanding -= written_off.interest;
    account.fees_outstanding -= written_off.fees;
    account.is_written_off = true;
    account.ecl_stage = crate::types::EclStage::Stage3;
    account.close(ClosureKind::WriteOff, write_off_date);

    Ok(WriteOff {
        id: Uuid::new_v4(),
        account_id: account.id,
        write_off_date,
        written_off,
        dpd_at_write_off: account.dpd,
        npa_category_at_write_off: account.npa_category,
        is_partial,
        reason: reason.into(),
        approved_by: approved_by.into(),
        recovered: ComponentAmounts::default(),
        recovery_status: RecoveryStatus::Pending,
        last_recovery_date: None,
    })
}

/// record a recovery against a write-off; fees first, then interest,
/// then principal, each capped at what remains unrecovered
pub fn record_recovery(
    write_off: &mut WriteOff,
    amount: Money,
    recovery_date: NaiveDate,
    source: impl Into<String>,
) -> Result<WriteOffRecovery> {
    if !amount.is_positive() {
        return Err(LoanError::InvalidPaymentAmount { amount });
    }

    let mut remaining = amount;

    let fees_gap = write_off.written_off.fees - write_off.recovered.fees;
    let fees = remaining.min(fees_gap.clamp_non_negative());
    remaining -= fees;

    let interest_gap = write_off.written_off.interest - write_off.recovered.interest;
    let interest = remaining.min(interest_gap.clamp_non_negative());
    remaining -= interest;

    let principal_gap = write_off.written_off.principal - write_off.recovered.principal;
    let principal = remaining.min(principal_gap.clamp_non_negative());

    let allocated = ComponentAmounts { principal, interest, fees };
    write_off.recovered.principal += principal;
    write_off.recovered.interest += interest;
    write_off.recovered.fees += fees;
    write_off.last_recovery_date = Some(recovery_date);
    write_off.recovery_status = if write_off.total_recovered() >= write_off.total_written_off() {
        RecoveryStatus::Complete
    } else {
        RecoveryStatus::Partial
    };

    Ok(WriteOffRecovery {
        id: Uuid::new_v4(),
        write_off_id: write_off.id,
        recovery_date,
        amount,
        allocated,
        source: source.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::LoanTerms;
    use crate::calendar::AdjustmentMode;
    use crate::decimal::Rate;
    use crate::interest::{DayCountConvention, RateSpec};
    use crate::schedule::generator::{generate_schedule, ScheduleSpec};
    use crate::schedule::Frequency;
    use crate::types::{AccountStatus, EclStage, ScheduleKind};
    use crate::calendar::BusinessCalendar;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn open_account() -> (LoanAccount, RepaymentSchedule) {
        let terms = LoanTerms {
            account_number: "LN-11".into(),
            product_code: "PL".into(),
            borrower_id: "B".into(),
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
            prepayment_penalty_rate: Rate::ZERO,
        };
        let mut account = LoanAccount::open(Uuid::new_v4(), terms).unwrap();
        let spec = ScheduleSpec {
            account_id: account.id,
            principal: account.principal_disbursed,
            annual_rate: account.current_rate,
            tenure_periods: 12,
            frequency: Frequency::Monthly,
            kind: ScheduleKind::Emi,
            disbursement_date: account.disbursement_date,
            first_due: account.first_due_date,
            adjustment: AdjustmentMode::Unadjusted,
            first_installment_number: 1,
        };
        let schedule =
            generate_schedule(&spec, &BusinessCalendar::seven_day(Uuid::new_v4(), "7d")).unwrap();
        let outstanding = schedule.outstanding();
        account.interest_outstanding = outstanding.interest;
        (account, schedule)
    }

    #[test]
    fn test_normal_closure_requires_zero_outstanding() {
        let (mut account, schedule) = open_account();
        let err = close_normal(&mut account, &schedule, date(2025, 6, 1));
        assert!(matches!(err, Err(LoanError::ConflictingState { .. })));
    }

    #[test]
    fn test_settlement_waives_residual() {
        let (mut account, mut schedule) = open_account();
        let outstanding = account.total_outstanding();

        let waived =
            close_settlement(&mut account, &mut schedule, Money::from_major(60_000), date(2025, 9, 1))
                .unwrap();
        assert_eq!(waived, outstanding - Money::from_major(60_000));
        assert_eq!(account.status, AccountStatus::Closed);
        assert_eq!(account.closure_kind, Some(ClosureKind::Settlement));
        assert_eq!(account.total_outstanding(), Money::ZERO);
        assert!(schedule.installments.iter().all(|r| r.is_settled()));
    }

    #[test]
    fn test_settlement_rejects_full_amount() {
        let (mut account, mut schedule) = open_account();
        let outstanding = account.total_outstanding();
        let err = close_settlement(&mut account, &mut schedule, outstanding, date(2025, 9, 1));
        assert!(err.is_err());
    }

    #[test]
    fn test_full_write_off_forces_stage3() {
        let (mut account, mut schedule) = open_account();
        account.dpd = 200;
        account.npa_category = Some(NpaCategory::Substandard);

        let record =
            write_off(&mut account, &mut schedule, None, date(2025, 10, 1), "uncollectable", "cro")
                .unwrap();

        assert_eq!(record.written_off.principal, Money::from_major(100_000));
        assert_eq!(record.dpd_at_write_off, 200);
        assert_eq!(record.npa_category_at_write_off, Some(NpaCategory::Substandard));
        assert!(!record.is_partial);
        assert!(account.is_written_off);
        assert_eq!(account.ecl_stage, EclStage::Stage3);
        assert_eq!(account.status, AccountStatus::WrittenOff);
    }

    #[test]
    fn test_write_off_twice_rejected() {
        let (mut account, mut schedule) = open_account();
        write_off(&mut account, &mut schedule, None, date(2025, 10, 1), "r", "a").unwrap();
        let err = write_off(&mut account, &mut schedule, None, date(2025, 11, 1), "r", "a");
        assert!(matches!(err, Err(LoanError::AccountNotOpen { .. })));
    }

    #[test]
    fn test_recovery_allocates_fees_interest_principal() {
        let (mut account, mut schedule) = open_account();
        account.fees_outstanding = Money::from_major(200);
        let mut record =
            write_off(&mut account, &mut schedule, None, date(2025, 10, 1), "r", "a").unwrap();

        let recovery =
            record_recovery(&mut record, Money::from_major(1_000), date(2026, 1, 5), "agency")
                .unwrap();
        assert_eq!(recovery.allocated.fees, Money::from_major(200));
        assert_eq!(recovery.allocated.interest + recovery.allocated.principal, Money::from_major(800));
        assert_eq!(record.recovery_status, RecoveryStatus::Partial);
    }

    #[test]
    fn test_recovery_never_exceeds_written_off() {
        let (mut account, mut schedule) = open_account();
        let mut record = write_off(
            &mut account,
            &mut schedule,
            Some(ComponentAmounts {
                principal: Money::from_major(1_000),
                interest: Money::ZERO,
                fees: Money::ZERO,
            }),
            date(2025, 10, 1),
            "partial",
            "a",
        )
        .unwrap();
        assert!(record.is_partial);

        let recovery =
            record_recovery(&mut record, Money::from_major(5_000), date(2026, 1, 5), "borrower")
                .unwrap();
        // only the written-off principal is recoverable
        assert_eq!(recovery.allocated.total(), Money::from_major(1_000));
        assert_eq!(record.recovery_status, RecoveryStatus::Complete);
    }
}
