use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::decimal::Money;
use crate::schedule::generator::{emi_amount, new_row, ScheduleSpec};
use crate::schedule::Installment;
use crate::types::MoratoriumTreatment;

/// stepped schedule: the installment is re-derived at every step boundary
/// from the remaining balance and remaining periods, then moved by the step
/// percentage. a negative step percentage steps down.
pub(super) fn build_stepped(
    spec: &ScheduleSpec,
    due_dates: &[NaiveDate],
    step_percent: Decimal,
    step_every_periods: u32,
) -> Vec<Installment> {
    let n = spec.tenure_periods;
    let r = spec.annual_rate.periodic(spec.frequency.periods_per_year());
    let factor = Decimal::ONE + step_percent / Decimal::ONE_HUNDRED;

    let mut rows = Vec::with_capacity(n as usize);
    let mut balance = spec.principal;
    let mut current_emi = emi_amount(spec.principal, r, n);

    for i in 0..n as usize {
        if i > 0 && i as u32 % step_every_periods == 0 {
            let base = emi_amount(balance, r, n - i as u32);
            current_emi = Money::from_decimal(base.as_decimal() * factor);
        }

        let interest = Money::from_decimal(balance.as_decimal() * r.as_decimal());
        let principal = if i as u32 == n - 1 {
            balance
        } else {
            (current_emi - interest).clamp_non_negative().min(balance)
        };
        let closing = balance - principal;
        rows.push(new_row(spec, i, due_dates, balance, principal, interest, closing));
        balance = closing;
    }

    rows
}

/// balloon schedule: the regular installment amortizes only the non-balloon
/// portion; the final installment pays the balloon fraction plus the last
/// period's interest.
pub(super) fn build_balloon(
    spec: &ScheduleSpec,
    due_dates: &[NaiveDate],
    final_fraction: Decimal,
) -> Vec<Installment> {
    let n = spec.tenure_periods;
    let r = spec.annual_rate.periodic(spec.frequency.periods_per_year());

    let balloon = Money::from_decimal(spec.principal.as_decimal() * final_fraction);
    let amortized = spec.principal - balloon;
    let emi = emi_amount(amortized, r, n);

    let mut rows = Vec::with_capacity(n as usize);
    let mut balance = spec.principal;

    for i in 0..n as usize {
        let interest = Money::from_decimal(balance.as_decimal() * r.as_decimal());
        let principal = if i as u32 == n - 1 {
            balance
        } else {
            // regular payments never eat into the balloon portion
            (emi - interest).clamp_non_negative().min((balance - balloon).clamp_non_negative())
        };
        let closing = balance - principal;
        rows.push(new_row(spec, i, due_dates, balance, principal, interest, closing));
        balance = closing;
    }

    rows
}

/// moratorium schedule: leading periods carry no principal; interest during
/// the holiday is capitalized into the balance, deferred into the first
/// regular installment, or waived. returns the rows plus the principal the
/// schedule must reconcile to (grown by capitalization).
pub(super) fn build_moratorium(
    spec: &ScheduleSpec,
    due_dates: &[NaiveDate],
    moratorium_periods: u32,
    treatment: MoratoriumTreatment,
) -> (Vec<Installment>, Money) {
    let n = spec.tenure_periods;
    let r = spec.annual_rate.periodic(spec.frequency.periods_per_year());

    let mut rows = Vec::with_capacity(n as usize);
    let mut balance = spec.principal;
    let mut deferred_interest = Money::ZERO;

    for i in 0..moratorium_periods as usize {
        let accrued = Money::from_decimal(balance.as_decimal() * r.as_decimal());
        let closing = match treatment {
            MoratoriumTreatment::Capitalize => balance + accrued,
            MoratoriumTreatment::Collect => {
                deferred_interest += accrued;
                balance
            }
            MoratoriumTreatment::Waive => balance,
        };
        rows.push(new_row(spec, i, due_dates, balance, Money::ZERO, Money::ZERO, closing));
        balance = closing;
    }

    let repayment_periods = n - moratorium_periods;
    let emi = emi_amount(balance, r, repayment_periods);
    let expected_principal = balance;

    for i in moratorium_periods as usize..n as usize {
        let period_interest = Money::from_decimal(balance.as_decimal() * r.as_decimal());
        // deferred moratorium interest is collected with the first regular installment
        let mut interest = period_interest;
        if i == moratorium_periods as usize {
            interest += deferred_interest;
        }
        let principal = if i as u32 == n - 1 {
            balance
        } else {
            (emi - period_interest).clamp_non_negative().min(balance)
        };
        let closing = balance - principal;
        rows.push(new_row(spec, i, due_dates, balance, principal, interest, closing));
        balance = closing;
    }

    (rows, expected_principal)
}
