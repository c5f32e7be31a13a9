use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::LoanAccount;
use crate::calendar::BusinessCalendar;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::schedule::generator::{emi_amount, generate_schedule, ScheduleSpec};
use crate::schedule::RepaymentSchedule;
use crate::types::{AccountId, EclStage, InstallmentStatus, RestructureKind, ScheduleKind};

/// a restructure to apply to the forward portion of the schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestructureRequest {
    pub kind: RestructureKind,
    pub effective_date: NaiveDate,
    /// replacement annual rate, when the kind changes it
    pub new_rate: Option<Rate>,
    /// replacement total tenure in periods, when the kind changes it
    pub new_tenure_periods: Option<u32>,
    pub principal_waiver: Money,
    pub interest_waiver: Money,
    pub fees_waiver: Money,
    pub reason: String,
    pub requested_by: String,
    pub approved_by: String,
}

/// immutable record of an applied restructure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestructureEvent {
    pub id: Uuid,
    pub account_id: AccountId,
    pub kind: RestructureKind,
    pub effective_date: NaiveDate,
    pub old_rate: Rate,
    pub new_rate: Rate,
    pub old_tenure_periods: u32,
    pub new_tenure_periods: u32,
    pub old_outstanding: Money,
    pub new_outstanding: Money,
    pub old_emi: Option<Money>,
    pub new_emi: Option<Money>,
    pub principal_waived: Money,
    pub interest_waived: Money,
    pub fees_waived: Money,
    pub reason: String,
    pub requested_by: String,
    pub approved_by: String,
}

impl RestructureRequest {
    fn check(&self, account: &LoanAccount) -> Result<()> {
        if account.is_written_off {
            return Err(LoanError::conflicting_state("cannot restructure a written-off account"));
        }
        account.ensure_open()?;
        if self.principal_waiver.is_negative()
            || self.interest_waiver.is_negative()
            || self.fees_waiver.is_negative()
        {
            return Err(LoanError::invalid_input("waivers must not be negative"));
        }
        match self.kind {
            RestructureKind::RateReduction if self.new_rate.is_none() => {
                Err(LoanError::invalid_input("rate reduction requires a new rate"))
            }
            RestructureKind::TenureExtension if self.new_tenure_periods.is_none() => {
                Err(LoanError::invalid_input("tenure extension requires a new tenure"))
            }
            RestructureKind::PrincipalHaircut if !self.principal_waiver.is_positive() => {
                Err(LoanError::invalid_input("principal haircut requires a waiver"))
            }
            _ => Ok(()),
        }
    }
}

/// the schedule kind used for a regenerated tail; stepped, balloon and
/// moratorium structures rework into plain amortization going forward
fn forward_kind(kind: &ScheduleKind) -> ScheduleKind {
    match kind {
        ScheduleKind::InterestOnly => ScheduleKind::InterestOnly,
        ScheduleKind::Bullet => ScheduleKind::Bullet,
        _ => ScheduleKind::Emi,
    }
}

/// apply a restructure: paid rows are untouched, partially-paid rows stay as
/// boundary rows, fully pending rows are regenerated under the new terms.
/// unconditionally sets the restructure flag, which forces ECL stage 2 or
/// worse at the next staging run.
pub fn apply_restructure(
    account: &mut LoanAccount,
    schedule: &mut RepaymentSchedule,
    calendar: &BusinessCalendar,
    request: &RestructureRequest,
) -> Result<RestructureEvent> {
    request.check(account)?;

    let old_rate = account.current_rate;
    let old_tenure = account.tenure_periods;
    let old_outstanding = account.principal_outstanding;
    let old_emi = schedule.next_due().map(|r| r.total_due());

    let new_rate = request.new_rate.unwrap_or(old_rate);
    let new_outstanding = old_outstanding - request.principal_waiver;
    if !new_outstanding.is_positive() {
        return Err(LoanError::invalid_input("waiver must leave positive outstanding"));
    }

    // drop the fully pending tail; preserve settled and boundary rows
    let preserved: Vec<_> = schedule
        .installments
        .iter()
        .filter(|r| {
            r.status != InstallmentStatus::Pending || r.total_paid().is_positive()
        })
        .cloned()
        .collect();
    let boundary_number = preserved.iter().map(|r| r.number).max().unwrap_or(0);

    let total_tenure = request.new_tenure_periods.unwrap_or(old_tenure);
    if total_tenure <= boundary_number {
        return Err(LoanError::invalid_input("new tenure ends before the restructure boundary"));
    }
    let remaining_periods = total_tenure - boundary_number;

    // principal owed by the regenerated tail excludes what boundary rows still collect
    let boundary_principal: Money =
        preserved.iter().map(|r| r.remaining().principal).sum();
    let tail_principal = new_outstanding - boundary_principal;
    if !tail_principal.is_positive() {
        return Err(LoanError::invalid_input("no principal left for the regenerated tail"));
    }

    let spec = ScheduleSpec {
        account_id: account.id,
        principal: tail_principal,
        annual_rate: new_rate,
        tenure_periods: remaining_periods,
        frequency: account.frequency,
        kind: forward_kind(&account.schedule_kind),
        disbursement_date: request.effective_date,
        first_due: account.frequency.add_periods(request.effective_date, 1),
        adjustment: account.adjustment,
        first_installment_number: boundary_number + 1,
    };
    let tail = generate_schedule(&spec, calendar)?;

    schedule.installments = preserved;
    schedule.installments.extend(tail.installments);

    // refresh the account from the mutated schedule
    let outstanding = schedule.outstanding();
    account.principal_outstanding = outstanding.principal;
    account.interest_outstanding =
        (outstanding.interest - request.interest_waiver).clamp_non_negative();
    account.fees_outstanding = (outstanding.fees - request.fees_waiver).clamp_non_negative();
    account.current_rate = new_rate;
    account.tenure_periods = total_tenure;
    account.is_restructured = true;
    account.restructure_count += 1;
    account.ecl_stage = account.ecl_stage.max(EclStage::Stage2);
    account.next_due_date = schedule.next_due().map(|r| r.due_date);
    account.next_due_amount = schedule.next_due().map(|r| r.total_due());

    let new_emi = schedule
        .installments
        .iter()
        .find(|r| r.number == boundary_number + 1)
        .map(|r| r.total_due());

    Ok(RestructureEvent {
        id: Uuid::new_v4(),
        account_id: account.id,
        kind: request.kind,
        effective_date: request.effective_date,
        old_rate,
        new_rate,
        old_tenure_periods: old_tenure,
        new_tenure_periods: total_tenure,
        old_outstanding,
        new_outstanding,
        old_emi,
        new_emi,
        principal_waived: request.principal_waiver,
        interest_waived: request.interest_waiver,
        fees_waived: request.fees_waiver,
        reason: request.reason.clone(),
        requested_by: request.requested_by.clone(),
        approved_by: request.approved_by.clone(),
    })
}

/// pure comparison of current terms against a proposed restructure
pub fn restructure_impact(
    account: &LoanAccount,
    request: &RestructureRequest,
) -> RestructureImpact {
    let r = account.current_rate.periodic(account.frequency.periods_per_year());
    let current_emi = emi_amount(account.principal_outstanding, r, account.tenure_periods);

    let new_rate = request.new_rate.unwrap_or(account.current_rate);
    let new_tenure = request.new_tenure_periods.unwrap_or(account.tenure_periods);
    let new_principal = account.principal_outstanding - request.principal_waiver;
    let new_r = new_rate.periodic(account.frequency.periods_per_year());
    let proposed_emi = emi_amount(new_principal.clamp_non_negative(), new_r, new_tenure);

    RestructureImpact {
        current_emi,
        proposed_emi,
        emi_delta: current_emi - proposed_emi,
        current_tenure_periods: account.tenure_periods,
        proposed_tenure_periods: new_tenure,
        principal_waived: request.principal_waiver,
    }
}

/// what a proposed restructure would do to the installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestructureImpact {
    pub current_emi: Money,
    pub proposed_emi: Money,
    pub emi_delta: Money,
    pub current_tenure_periods: u32,
    pub proposed_tenure_periods: u32,
    pub principal_waived: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::LoanTerms;
    use crate::calendar::AdjustmentMode;
    use crate::interest::{DayCountConvention, RateSpec};
    use crate::payments::{Payment, PaymentAllocator};
    use crate::schedule::Frequency;
    use crate::types::PaymentChannel;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cal() -> BusinessCalendar {
        BusinessCalendar::seven_day(Uuid::new_v4(), "unadjusted")
    }

    fn open_account(tenure: u32) -> (LoanAccount, RepaymentSchedule) {
        let terms = LoanTerms {
            account_number: "LN-7".into(),
            product_code: "PL".into(),
            borrower_id: "B".into(),
            principal: Money::from_major(600_000),
            rate_spec: RateSpec::Fixed { rate: Rate::from_percentage(dec!(12)) },
            current_rate: Rate::from_percentage(dec!(12)),
            tenure_periods: tenure,
            frequency: Frequency::Monthly,
            schedule_kind: ScheduleKind::Emi,
            day_count: DayCountConvention::Act365,
            calendar_id: Uuid::new_v4(),
            adjustment: AdjustmentMode::Unadjusted,
            disbursement_date: date(2025, 1, 1),
            first_due_date: date(2025, 2, 1),
            is_secured: false,
            prepayment_penalty_rate: Rate::from_percentage(dec!(2)),
        };
        let account = LoanAccount::open(Uuid::new_v4(), terms).unwrap();
        let spec = ScheduleSpec {
            account_id: account.id,
            principal: account.principal_disbursed,
            annual_rate: account.current_rate,
            tenure_periods: tenure,
            frequency: account.frequency,
            kind: ScheduleKind::Emi,
            disbursement_date: account.disbursement_date,
            first_due: account.first_due_date,
            adjustment: AdjustmentMode::Unadjusted,
            first_installment_number: 1,
        };
        let schedule = generate_schedule(&spec, &cal()).unwrap();
        (account, schedule)
    }

    fn pay_installments(account: &mut LoanAccount, schedule: &mut RepaymentSchedule, count: usize) {
        let allocator = PaymentAllocator::default();
        let total: Money = schedule.installments[..count].iter().map(|r| r.total_due()).sum();
        let payment = Payment::new(
            Uuid::new_v4(),
            account.id,
            total,
            Utc::now(),
            PaymentChannel::BankTransfer,
            "SETUP",
        )
        .unwrap();
        let result = allocator.allocate(schedule, &payment);
        assert_eq!(result.unallocated, Money::ZERO);
        let outstanding = schedule.outstanding();
        account.principal_outstanding = outstanding.principal;
        account.interest_outstanding = outstanding.interest;
        account.fees_outstanding = outstanding.fees;
    }

    fn extension_request(total_tenure: u32) -> RestructureRequest {
        RestructureRequest {
            kind: RestructureKind::TenureExtension,
            effective_date: date(2026, 1, 15),
            new_rate: None,
            new_tenure_periods: Some(total_tenure),
            principal_waiver: Money::ZERO,
            interest_waiver: Money::ZERO,
            fees_waiver: Money::ZERO,
            reason: "hardship".into(),
            requested_by: "ops".into(),
            approved_by: "credit-head".into(),
        }
    }

    #[test]
    fn test_tenure_extension_regenerates_forward_only() {
        let (mut account, mut schedule) = open_account(60);
        pay_installments(&mut account, &mut schedule, 12);
        let paid_rows: Vec<_> = schedule.installments[..12].to_vec();

        let event =
            apply_restructure(&mut account, &mut schedule, &cal(), &extension_request(84)).unwrap();

        // rows 1-12 untouched
        assert_eq!(&schedule.installments[..12], &paid_rows[..]);
        // regenerated tail runs 13..=84
        assert_eq!(schedule.installments[12].number, 13);
        assert_eq!(schedule.installments.last().unwrap().number, 84);
        assert_eq!(schedule.installments.len(), 84);
        assert_eq!(schedule.installments.last().unwrap().closing_balance, Money::ZERO);

        assert!(account.is_restructured);
        assert_eq!(account.ecl_stage, EclStage::Stage2);
        assert_eq!(account.tenure_periods, 84);
        assert_eq!(event.old_tenure_periods, 60);
        assert_eq!(event.new_tenure_periods, 84);
        // longer tenure lowers the installment
        assert!(event.new_emi.unwrap() < event.old_emi.unwrap());
    }

    #[test]
    fn test_principal_haircut_reduces_outstanding() {
        let (mut account, mut schedule) = open_account(60);
        pay_installments(&mut account, &mut schedule, 12);
        let before = account.principal_outstanding;

        let request = RestructureRequest {
            kind: RestructureKind::PrincipalHaircut,
            effective_date: date(2026, 1, 15),
            new_rate: None,
            new_tenure_periods: None,
            principal_waiver: Money::from_major(50_000),
            interest_waiver: Money::ZERO,
            fees_waiver: Money::ZERO,
            reason: "settlement support".into(),
            requested_by: "ops".into(),
            approved_by: "credit-head".into(),
        };
        apply_restructure(&mut account, &mut schedule, &cal(), &request).unwrap();

        assert_eq!(account.principal_outstanding, before - Money::from_major(50_000));
        let principal_from_schedule: Money = schedule
            .installments
            .iter()
            .filter(|r| !r.is_settled())
            .map(|r| r.remaining().principal)
            .sum();
        assert_eq!(principal_from_schedule, account.principal_outstanding);
    }

    #[test]
    fn test_restructure_rejected_after_write_off() {
        let (mut account, mut schedule) = open_account(60);
        account.is_written_off = true;
        let err = apply_restructure(&mut account, &mut schedule, &cal(), &extension_request(84));
        assert!(matches!(err, Err(LoanError::ConflictingState { .. })));
    }

    #[test]
    fn test_restructure_flag_survives_cure() {
        let (mut account, mut schedule) = open_account(60);
        pay_installments(&mut account, &mut schedule, 12);
        apply_restructure(&mut account, &mut schedule, &cal(), &extension_request(84)).unwrap();

        // a later full cure clears NPA but never the restructure flag
        account.is_npa = false;
        account.npa_date = None;
        assert!(account.is_restructured);
    }

    #[test]
    fn test_impact_is_pure() {
        let (account, _schedule) = open_account(60);
        let request = extension_request(84);
        let a = restructure_impact(&account, &request);
        let b = restructure_impact(&account, &request);
        assert_eq!(a, b);
        assert!(a.proposed_emi < a.current_emi);
    }
}
