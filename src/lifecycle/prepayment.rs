use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::LoanAccount;
use crate::calendar::BusinessCalendar;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::schedule::generator::{generate_schedule, ScheduleSpec};
use crate::schedule::RepaymentSchedule;
use crate::types::{AccountId, ClosureKind, InstallmentStatus, PaymentId, PrepaymentAction, ScheduleKind};

/// components of a full payoff as of a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffQuote {
    pub as_of: NaiveDate,
    pub principal_outstanding: Money,
    pub accrued_interest: Money,
    pub fees_outstanding: Money,
    pub overdue_total: Money,
    pub penalty: Money,
    pub total_payoff: Money,
}

/// payoff amount: principal + accrued interest + fees + overdue + penalty.
/// the penalty applies to the prepaid principal unless explicitly waived.
pub fn payoff_quote(
    account: &LoanAccount,
    schedule: &RepaymentSchedule,
    accrued_interest: Money,
    as_of: NaiveDate,
    penalty_waived: bool,
) -> PayoffQuote {
    let overdue_total: Money =
        schedule.overdue_rows(as_of).iter().map(|r| r.remaining().total()).sum();

    let penalty = if penalty_waived {
        Money::ZERO
    } else {
        Money::from_decimal(
            account.principal_outstanding.as_decimal()
                * account.prepayment_penalty_rate.as_decimal(),
        )
    };

    let total_payoff = account.principal_outstanding
        + accrued_interest
        + account.fees_outstanding
        + overdue_total
        + penalty;

    PayoffQuote {
        as_of,
        principal_outstanding: account.principal_outstanding,
        accrued_interest,
        fees_outstanding: account.fees_outstanding,
        overdue_total,
        penalty,
        total_payoff,
    }
}

/// immutable record of a processed prepayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prepayment {
    pub id: Uuid,
    pub account_id: AccountId,
    pub payment_id: Option<PaymentId>,
    pub prepayment_date: NaiveDate,
    pub amount: Money,
    pub penalty: Money,
    pub penalty_waived: bool,
    pub principal_reduced: Money,
    pub action: PrepaymentAction,
    pub old_outstanding: Money,
    pub new_outstanding: Money,
    pub old_emi: Option<Money>,
    pub new_emi: Option<Money>,
    pub old_remaining_periods: u32,
    pub new_remaining_periods: u32,
    pub is_foreclosure: bool,
}

/// what each prepayment option would do; a pure function of current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepaymentImpact {
    pub amount: Money,
    pub penalty: Money,
    pub principal_reduced: Money,
    pub new_outstanding: Money,
    pub old_emi: Money,
    pub new_emi: Money,
    pub old_remaining_periods: u32,
    pub new_remaining_periods: u32,
    pub interest_saved: Money,
    pub payoff: Money,
}

/// split a received amount into penalty and principal reduction so the
/// penalty equals penalty_rate x prepaid principal exactly
fn split_penalty(amount: Money, penalty_rate: Rate, waived: bool) -> (Money, Money) {
    if waived || penalty_rate.is_zero() {
        return (Money::ZERO, amount);
    }
    let principal =
        Money::from_decimal(amount.as_decimal() / (Decimal::ONE + penalty_rate.as_decimal()));
    (amount - principal, principal)
}

/// derive the tenure that keeps the current installment after a principal
/// reduction, walking the amortization forward one period at a time
fn tenure_for_installment(principal: Money, periodic_rate: Rate, installment: Money) -> u32 {
    let r = periodic_rate.as_decimal();
    if r.is_zero() {
        let periods = (principal.as_decimal() / installment.as_decimal()).ceil();
        return periods.to_u32().unwrap_or(1).max(1);
    }

    let mut remaining = principal;
    let mut periods = 0u32;
    while remaining.is_positive() && periods < 1200 {
        let interest = Money::from_decimal(remaining.as_decimal() * r);
        let principal_part = installment - interest;
        if !principal_part.is_positive() {
            break;
        }
        remaining = (remaining - principal_part).clamp_non_negative();
        periods += 1;
    }
    periods.max(1)
}

/// pure impact analysis for a proposed prepayment
pub fn prepayment_impact(
    account: &LoanAccount,
    schedule: &RepaymentSchedule,
    accrued_interest: Money,
    amount: Money,
    action: PrepaymentAction,
    as_of: NaiveDate,
) -> Result<PrepaymentImpact> {
    if !amount.is_positive() {
        return Err(LoanError::InvalidPaymentAmount { amount });
    }

    let quote = payoff_quote(account, schedule, accrued_interest, as_of, false);
    let (penalty, principal_reduced) = match action {
        PrepaymentAction::Foreclosure => (quote.penalty, account.principal_outstanding),
        _ => split_penalty(amount, account.prepayment_penalty_rate, false),
    };

    if action != PrepaymentAction::Foreclosure && principal_reduced >= account.principal_outstanding
    {
        return Err(LoanError::invalid_input(
            "partial prepayment reaches the full outstanding; use foreclosure",
        ));
    }

    let old_remaining = schedule.open_count() as u32;
    let old_emi = schedule.next_due().map(|r| r.total_due()).unwrap_or(Money::ZERO);
    let old_interest: Money = schedule
        .installments
        .iter()
        .filter(|r| !r.is_settled())
        .map(|r| (r.interest_due - r.interest_paid).clamp_non_negative())
        .sum();

    let new_outstanding = (account.principal_outstanding - principal_reduced).clamp_non_negative();
    let r = account.current_rate.periodic(account.frequency.periods_per_year());

    let (new_emi, new_remaining, new_interest) = match action {
        PrepaymentAction::Foreclosure => (Money::ZERO, 0, Money::ZERO),
        PrepaymentAction::ReduceEmi => {
            let emi =
                crate::schedule::generator::emi_amount(new_outstanding, r, old_remaining.max(1));
            let total = emi * Decimal::from(old_remaining);
            (emi, old_remaining, (total - new_outstanding).clamp_non_negative())
        }
        PrepaymentAction::ReduceTenure => {
            let periods = tenure_for_installment(new_outstanding, r, old_emi);
            let total = old_emi * Decimal::from(periods);
            (old_emi, periods, (total - new_outstanding).clamp_non_negative())
        }
    };

    Ok(PrepaymentImpact {
        amount,
        penalty,
        principal_reduced,
        new_outstanding,
        old_emi,
        new_emi,
        old_remaining_periods: old_remaining,
        new_remaining_periods: new_remaining,
        interest_saved: (old_interest - new_interest).clamp_non_negative(),
        payoff: quote.total_payoff,
    })
}

/// apply a prepayment, reshaping the forward schedule per the action.
/// foreclosure settles everything and closes the account.
pub fn apply_prepayment(
    account: &mut LoanAccount,
    schedule: &mut RepaymentSchedule,
    calendar: &BusinessCalendar,
    accrued_interest: Money,
    amount: Money,
    action: PrepaymentAction,
    as_of: NaiveDate,
    payment_id: Option<PaymentId>,
    penalty_waived: bool,
) -> Result<Prepayment> {
    account.ensure_open()?;
    if !amount.is_positive() {
        return Err(LoanError::InvalidPaymentAmount { amount });
    }

    let old_outstanding = account.principal_outstanding;
    let old_remaining = schedule.open_count() as u32;
    let old_emi = schedule.next_due().map(|r| r.total_due());

    if action == PrepaymentAction::Foreclosure {
        let quote = payoff_quote(account, schedule, accrued_interest, as_of, penalty_waived);
        if amount < quote.total_payoff {
            return Err(LoanError::invalid_input(format!(
                "foreclosure amount {} is below the payoff {}",
                amount, quote.total_payoff
            )));
        }

        for row in schedule.installments.iter_mut().filter(|r| !r.is_settled()) {
            row.status = InstallmentStatus::Skipped;
        }
        account.principal_outstanding = Money::ZERO;
        account.interest_outstanding = Money::ZERO;
        account.fees_outstanding = Money::ZERO;
        account.total_payments_received += amount;
        account.close(ClosureKind::Foreclosure, as_of);

        return Ok(Prepayment {
            id: Uuid::new_v4(),
            account_id: account.id,
            payment_id,
            prepayment_date: as_of,
            amount,
            penalty: quote.penalty,
            penalty_waived,
            principal_reduced: old_outstanding,
            action,
            old_outstanding,
            new_outstanding: Money::ZERO,
            old_emi,
            new_emi: None,
            old_remaining_periods: old_remaining,
            new_remaining_periods: 0,
            is_foreclosure: true,
        });
    }

    let (penalty, principal_reduced) =
        split_penalty(amount, account.prepayment_penalty_rate, penalty_waived);
    if principal_reduced >= account.principal_outstanding {
        return Err(LoanError::invalid_input(
            "partial prepayment reaches the full outstanding; use foreclosure",
        ));
    }

    // preserve settled and boundary rows, regenerate the pending tail
    let preserved: Vec<_> = schedule
        .installments
        .iter()
        .filter(|r| r.status != InstallmentStatus::Pending || r.total_paid().is_positive())
        .cloned()
        .collect();
    let boundary_number = preserved.iter().map(|r| r.number).max().unwrap_or(0);
    let boundary_principal: Money = preserved.iter().map(|r| r.remaining().principal).sum();

    let new_outstanding = account.principal_outstanding - principal_reduced;
    let tail_principal = new_outstanding - boundary_principal;
    if !tail_principal.is_positive() {
        return Err(LoanError::invalid_input("no principal left for the regenerated tail"));
    }

    let r = account.current_rate.periodic(account.frequency.periods_per_year());
    let dropped = schedule.installments.len() - preserved.len();
    let tail_periods = match action {
        PrepaymentAction::ReduceEmi => (dropped as u32).max(1),
        PrepaymentAction::ReduceTenure => {
            let emi = old_emi.unwrap_or_else(|| {
                crate::schedule::generator::emi_amount(tail_principal, r, dropped as u32)
            });
            tenure_for_installment(tail_principal, r, emi)
        }
        PrepaymentAction::Foreclosure => unreachable!("handled above"),
    };

    let spec = ScheduleSpec {
        account_id: account.id,
        principal: tail_principal,
        annual_rate: account.current_rate,
        tenure_periods: tail_periods,
        frequency: account.frequency,
        kind: ScheduleKind::Emi,
        disbursement_date: as_of,
        first_due: account.frequency.add_periods(as_of, 1),
        adjustment: account.adjustment,
        first_installment_number: boundary_number + 1,
    };
    let tail = generate_schedule(&spec, calendar)?;

    schedule.installments = preserved;
    schedule.installments.extend(tail.installments);

    let outstanding = schedule.outstanding();
    account.principal_outstanding = outstanding.principal;
    account.interest_outstanding = outstanding.interest;
    account.fees_outstanding = outstanding.fees;
    account.tenure_periods = boundary_number + tail_periods;
    account.total_payments_received += amount;
    account.next_due_date = schedule.next_due().map(|r| r.due_date);
    account.next_due_amount = schedule.next_due().map(|r| r.total_due());

    let new_emi = schedule
        .installments
        .iter()
        .find(|r| r.number == boundary_number + 1)
        .map(|r| r.total_due());

    Ok(Prepayment {
        id: Uuid::new_v4(),
        account_id: account.id,
        payment_id,
        prepayment_date: as_of,
        amount,
        penalty,
        penalty_waived,
        principal_reduced,
        action,
        old_outstanding,
        new_outstanding,
        old_emi,
        new_emi,
        old_remaining_periods: old_remaining,
        new_remaining_periods: tail_periods,
        is_foreclosure: false,
    })
}
