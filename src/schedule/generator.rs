use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::calendar::{AdjustmentMode, BusinessCalendar};
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::schedule::frequency::Frequency;
use crate::schedule::{Installment, RepaymentSchedule};
use crate::types::{AccountId, InstallmentStatus, ScheduleKind};

/// inputs for schedule generation
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub account_id: AccountId,
    pub principal: Money,
    /// annual rate, already resolved for floating-rate accounts
    pub annual_rate: Rate,
    pub tenure_periods: u32,
    pub frequency: Frequency,
    pub kind: ScheduleKind,
    pub disbursement_date: NaiveDate,
    pub first_due: NaiveDate,
    pub adjustment: AdjustmentMode,
    /// installment number the sequence starts at (above 1 after restructure)
    pub first_installment_number: u32,
}

impl ScheduleSpec {
    fn check(&self) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(LoanError::invalid_input("principal must be positive"));
        }
        if self.tenure_periods == 0 {
            return Err(LoanError::invalid_input("tenure must be at least one period"));
        }
        if self.annual_rate.is_negative() {
            return Err(LoanError::invalid_input("rate must not be negative"));
        }
        match &self.kind {
            ScheduleKind::Balloon { final_fraction } => {
                if *final_fraction <= Decimal::ZERO || *final_fraction >= Decimal::ONE {
                    return Err(LoanError::invalid_input(
                        "balloon final fraction must lie strictly between 0 and 1",
                    ));
                }
            }
            ScheduleKind::Moratorium { periods, .. } => {
                if *periods >= self.tenure_periods {
                    return Err(LoanError::invalid_input(
                        "moratorium must end before the final installment",
                    ));
                }
            }
            ScheduleKind::StepUp { step_every_periods, .. }
            | ScheduleKind::StepDown { step_every_periods, .. } => {
                if *step_every_periods == 0 {
                    return Err(LoanError::invalid_input("step frequency must be positive"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// equated installment by the closed formula; P/n when the rate is zero
pub fn emi_amount(principal: Money, periodic_rate: Rate, periods: u32) -> Money {
    if periods == 0 {
        return principal;
    }
    let r = periodic_rate.as_decimal();
    if r.is_zero() {
        return principal / Decimal::from(periods);
    }

    // EMI = P * r * (1+r)^n / ((1+r)^n - 1)
    let mut compound = Decimal::ONE;
    let base = Decimal::ONE + r;
    for _ in 0..periods {
        compound *= base;
    }

    Money::from_decimal(principal.as_decimal() * r * compound / (compound - Decimal::ONE))
}

/// generate the installment sequence for a spec. pure over its inputs;
/// referentially transparent given the same calendar.
pub fn generate_schedule(
    spec: &ScheduleSpec,
    calendar: &BusinessCalendar,
) -> Result<RepaymentSchedule> {
    spec.check()?;

    let raw_dates = due_date_sequence(spec);
    let due_dates = calendar.adjust_all(&raw_dates, spec.adjustment)?;

    let (rows, expected_principal) = match &spec.kind {
        ScheduleKind::Emi => (build_emi(spec, &due_dates), spec.principal),
        ScheduleKind::InterestOnly => (build_interest_only(spec, &due_dates), spec.principal),
        ScheduleKind::Bullet => (build_bullet(spec, &due_dates), spec.principal),
        ScheduleKind::StepUp { step_percent, step_every_periods } => (
            super::advanced::build_stepped(spec, &due_dates, *step_percent, *step_every_periods),
            spec.principal,
        ),
        ScheduleKind::StepDown { step_percent, step_every_periods } => (
            super::advanced::build_stepped(spec, &due_dates, -*step_percent, *step_every_periods),
            spec.principal,
        ),
        ScheduleKind::Balloon { final_fraction } => {
            (super::advanced::build_balloon(spec, &due_dates, *final_fraction), spec.principal)
        }
        ScheduleKind::Moratorium { periods, treatment } => {
            super::advanced::build_moratorium(spec, &due_dates, *periods, *treatment)
        }
    };

    let schedule = RepaymentSchedule::new(spec.account_id, rows);
    schedule.validate(expected_principal)?;
    Ok(schedule)
}

/// raw due dates: the first due date, then one frequency step at a time
fn due_date_sequence(spec: &ScheduleSpec) -> Vec<NaiveDate> {
    (0..spec.tenure_periods as i32)
        .map(|i| spec.frequency.add_periods(spec.first_due, i))
        .collect()
}

pub(super) fn new_row(
    spec: &ScheduleSpec,
    index: usize,
    due_dates: &[NaiveDate],
    opening: Money,
    principal_due: Money,
    interest_due: Money,
    closing: Money,
) -> Installment {
    let period_start = if index == 0 { spec.disbursement_date } else { due_dates[index - 1] };
    Installment {
        number: spec.first_installment_number + index as u32,
        due_date: due_dates[index],
        period_start,
        period_end: due_dates[index],
        opening_balance: opening,
        principal_due,
        interest_due,
        fees_due: Money::ZERO,
        closing_balance: closing,
        principal_paid: Money::ZERO,
        interest_paid: Money::ZERO,
        fees_paid: Money::ZERO,
        status: InstallmentStatus::Pending,
    }
}

fn build_emi(spec: &ScheduleSpec, due_dates: &[NaiveDate]) -> Vec<Installment> {
    let n = spec.tenure_periods;
    let r = spec.annual_rate.periodic(spec.frequency.periods_per_year());
    let emi = emi_amount(spec.principal, r, n);

    let mut rows = Vec::with_capacity(n as usize);
    let mut balance = spec.principal;

    for i in 0..n as usize {
        let interest = Money::from_decimal(balance.as_decimal() * r.as_decimal());
        // final installment carries the residual so principal sums exactly
        let principal = if i as u32 == n - 1 {
            balance
        } else {
            (emi - interest).clamp_non_negative().min(balance)
        };
        let closing = balance - principal;
        rows.push(new_row(spec, i, due_dates, balance, principal, interest, closing));
        balance = closing;
    }

    rows
}

fn build_interest_only(spec: &ScheduleSpec, due_dates: &[NaiveDate]) -> Vec<Installment> {
    let n = spec.tenure_periods;
    let r = spec.annual_rate.periodic(spec.frequency.periods_per_year());
    let interest = Money::from_decimal(spec.principal.as_decimal() * r.as_decimal());

    (0..n as usize)
        .map(|i| {
            let is_last = i as u32 == n - 1;
            let principal = if is_last { spec.principal } else { Money::ZERO };
            let closing = if is_last { Money::ZERO } else { spec.principal };
            new_row(spec, i, due_dates, spec.principal, principal, interest, closing)
        })
        .collect()
}

fn build_bullet(spec: &ScheduleSpec, due_dates: &[NaiveDate]) -> Vec<Installment> {
    let n = spec.tenure_periods;
    let r = spec.annual_rate.periodic(spec.frequency.periods_per_year());
    let per_period = Money::from_decimal(spec.principal.as_decimal() * r.as_decimal());

    (0..n as usize)
        .map(|i| {
            let is_last = i as u32 == n - 1;
            let principal = if is_last { spec.principal } else { Money::ZERO };
            // interest carried to the terminal installment, simple and uncompounded
            let interest = if is_last { per_period * Decimal::from(n) } else { Money::ZERO };
            let closing = if is_last { Money::ZERO } else { spec.principal };
            new_row(spec, i, due_dates, spec.principal, principal, interest, closing)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MoratoriumTreatment;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seven_day() -> BusinessCalendar {
        BusinessCalendar::seven_day(Uuid::new_v4(), "unadjusted")
    }

    fn spec(kind: ScheduleKind) -> ScheduleSpec {
        ScheduleSpec {
            account_id: Uuid::new_v4(),
            principal: Money::from_major(100_000),
            annual_rate: Rate::from_percentage(dec!(12)),
            tenure_periods: 12,
            frequency: Frequency::Monthly,
            kind,
            disbursement_date: date(2025, 1, 1),
            first_due: date(2025, 2, 1),
            adjustment: AdjustmentMode::Unadjusted,
            first_installment_number: 1,
        }
    }

    #[test]
    fn test_emi_amount_matches_closed_formula() {
        // 100000 at 12% over 12 months
        let emi = emi_amount(Money::from_major(100_000), Rate::from_decimal(dec!(0.01)), 12);
        assert_eq!(emi, Money::from_str_exact("8884.88").unwrap());
    }

    #[test]
    fn test_emi_schedule_first_and_last_rows() {
        let schedule = generate_schedule(&spec(ScheduleKind::Emi), &seven_day()).unwrap();
        assert_eq!(schedule.installments.len(), 12);

        let first = &schedule.installments[0];
        assert_eq!(first.opening_balance, Money::from_major(100_000));
        assert_eq!(first.interest_due, Money::from_major(1_000));
        assert_eq!(first.principal_due, Money::from_str_exact("7884.88").unwrap());
        assert_eq!(first.closing_balance, Money::from_str_exact("92115.12").unwrap());

        let last = &schedule.installments[11];
        assert_eq!(last.closing_balance, Money::ZERO);

        let principal_total: Money = schedule.installments.iter().map(|r| r.principal_due).sum();
        assert_eq!(principal_total, Money::from_major(100_000));
    }

    #[test]
    fn test_zero_rate_emi_is_principal_over_n() {
        let mut s = spec(ScheduleKind::Emi);
        s.annual_rate = Rate::ZERO;
        let schedule = generate_schedule(&s, &seven_day()).unwrap();
        for row in &schedule.installments[..11] {
            assert_eq!(row.principal_due, Money::from_str_exact("8333.33").unwrap());
            assert_eq!(row.interest_due, Money::ZERO);
        }
        // residual lands on the last installment
        assert_eq!(schedule.installments[11].principal_due, Money::from_str_exact("8333.37").unwrap());
    }

    #[test]
    fn test_single_period_tenure() {
        let mut s = spec(ScheduleKind::Emi);
        s.tenure_periods = 1;
        let schedule = generate_schedule(&s, &seven_day()).unwrap();
        assert_eq!(schedule.installments.len(), 1);
        let row = &schedule.installments[0];
        assert_eq!(row.principal_due, Money::from_major(100_000));
        assert_eq!(row.interest_due, Money::from_major(1_000));
    }

    #[test]
    fn test_interest_only_pays_principal_last() {
        let schedule = generate_schedule(&spec(ScheduleKind::InterestOnly), &seven_day()).unwrap();
        for row in &schedule.installments[..11] {
            assert_eq!(row.principal_due, Money::ZERO);
            assert_eq!(row.interest_due, Money::from_major(1_000));
            assert_eq!(row.closing_balance, Money::from_major(100_000));
        }
        let last = &schedule.installments[11];
        assert_eq!(last.principal_due, Money::from_major(100_000));
        assert_eq!(last.closing_balance, Money::ZERO);
    }

    #[test]
    fn test_bullet_pays_everything_at_maturity() {
        let schedule = generate_schedule(&spec(ScheduleKind::Bullet), &seven_day()).unwrap();
        for row in &schedule.installments[..11] {
            assert_eq!(row.total_due(), Money::ZERO);
        }
        let last = &schedule.installments[11];
        assert_eq!(last.principal_due, Money::from_major(100_000));
        assert_eq!(last.interest_due, Money::from_major(12_000));
    }

    #[test]
    fn test_due_dates_advance_by_frequency() {
        let schedule = generate_schedule(&spec(ScheduleKind::Emi), &seven_day()).unwrap();
        assert_eq!(schedule.installments[0].due_date, date(2025, 2, 1));
        assert_eq!(schedule.installments[1].due_date, date(2025, 3, 1));
        assert_eq!(schedule.installments[11].due_date, date(2026, 1, 1));
    }

    #[test]
    fn test_business_day_adjustment_applied() {
        let mut s = spec(ScheduleKind::Emi);
        s.adjustment = AdjustmentMode::Following;
        s.first_due = date(2025, 2, 1); // saturday
        let cal = BusinessCalendar::new(Uuid::new_v4(), "weekends");
        let schedule = generate_schedule(&s, &cal).unwrap();
        assert_eq!(schedule.installments[0].due_date, date(2025, 2, 3));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut s = spec(ScheduleKind::Emi);
        s.principal = Money::ZERO;
        assert!(matches!(
            generate_schedule(&s, &seven_day()),
            Err(LoanError::InvalidInput { .. })
        ));

        let mut s = spec(ScheduleKind::Emi);
        s.tenure_periods = 0;
        assert!(generate_schedule(&s, &seven_day()).is_err());

        let s = spec(ScheduleKind::Balloon { final_fraction: dec!(1.5) });
        assert!(generate_schedule(&s, &seven_day()).is_err());

        let s = spec(ScheduleKind::Moratorium {
            periods: 12,
            treatment: MoratoriumTreatment::Capitalize,
        });
        assert!(generate_schedule(&s, &seven_day()).is_err());
    }

    #[test]
    fn test_generation_is_referentially_transparent() {
        let s = spec(ScheduleKind::Emi);
        let cal = seven_day();
        let a = generate_schedule(&s, &cal).unwrap();
        let b = generate_schedule(&s, &cal).unwrap();
        assert_eq!(a.installments, b.installments);
    }
}
