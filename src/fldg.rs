use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::types::{
    AccountId, ArrangementId, ComponentAmounts, FldgKind, FldgTrigger, PartnerId, UtilizationId,
};

/// a first-loss default guarantee pool protecting a lender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FldgArrangement {
    pub id: ArrangementId,
    pub code: String,
    pub originator_id: PartnerId,
    pub lender_id: PartnerId,
    pub kind: FldgKind,
    /// min(portfolio x percent, absolute cap), refreshed as the book moves
    pub effective_limit: Money,
    pub current_balance: Money,
    pub total_utilized: Money,
    pub total_recovered: Money,
    pub covers_principal: bool,
    pub covers_interest: bool,
    pub covers_fees: bool,
    /// DPD at which a claim may be raised
    pub trigger_dpd: u32,
    /// for second-loss pools, losses below this stay with the first loss
    pub first_loss_threshold: Money,
}

impl FldgArrangement {
    pub fn new(
        id: ArrangementId,
        code: impl Into<String>,
        originator_id: PartnerId,
        lender_id: PartnerId,
        kind: FldgKind,
        effective_limit: Money,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            originator_id,
            lender_id,
            kind,
            effective_limit,
            current_balance: effective_limit,
            total_utilized: Money::ZERO,
            total_recovered: Money::ZERO,
            covers_principal: true,
            covers_interest: false,
            covers_fees: false,
            trigger_dpd: 90,
            first_loss_threshold: Money::ZERO,
        }
    }

    /// effective limit from portfolio outstanding and the cap
    pub fn limit_for_portfolio(portfolio: Money, percent: Decimal, absolute_cap: Money) -> Money {
        portfolio.percentage(percent).min(absolute_cap)
    }

    /// balance = limit - utilized + recovered, always within [0, limit]
    pub fn check_balance(&self) -> Result<()> {
        let expected = self.effective_limit - self.total_utilized + self.total_recovered;
        if self.current_balance != expected {
            return Err(LoanError::fatal(format!(
                "FLDG balance {} does not reconcile to {}",
                self.current_balance, expected
            )));
        }
        if self.current_balance.is_negative() || self.current_balance > self.effective_limit {
            return Err(LoanError::fatal("FLDG balance outside [0, effective limit]"));
        }
        Ok(())
    }
}

/// utilization lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtilizationStatus {
    Approved,
    /// the approved amount has been fully replenished by recoveries
    Recovered,
}

/// immutable claim record against an arrangement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FldgUtilization {
    pub id: UtilizationId,
    pub arrangement_id: ArrangementId,
    pub account_id: AccountId,
    pub utilization_date: NaiveDate,
    pub trigger: FldgTrigger,
    pub dpd_at_utilization: u32,
    pub claimed: ComponentAmounts,
    pub total_claimed: Money,
    pub total_approved: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    /// lender share applied to the claim, e.g. 80.00
    pub lender_share_percent: Decimal,
    pub returned_to_pool: Money,
    pub status: UtilizationStatus,
}

/// raise and approve a claim: components x lender share, coverage flags
/// applied, capped at the pool balance. a drained pool is an error; a
/// partially covering pool approves what remains.
pub fn claim(
    arrangement: &mut FldgArrangement,
    account_id: AccountId,
    outstanding: ComponentAmounts,
    lender_share_percent: Decimal,
    trigger: FldgTrigger,
    dpd: u32,
    utilization_date: NaiveDate,
) -> Result<FldgUtilization> {
    if trigger == FldgTrigger::DpdThreshold && dpd < arrangement.trigger_dpd {
        return Err(LoanError::conflicting_state(format!(
            "DPD {} below the arrangement trigger {}",
            dpd, arrangement.trigger_dpd
        )));
    }

    let claimed = ComponentAmounts {
        principal: if arrangement.covers_principal {
            outstanding.principal.percentage(lender_share_percent)
        } else {
            Money::ZERO
        },
        interest: if arrangement.covers_interest {
            outstanding.interest.percentage(lender_share_percent)
        } else {
            Money::ZERO
        },
        fees: if arrangement.covers_fees {
            outstanding.fees.percentage(lender_share_percent)
        } else {
            Money::ZERO
        },
    };

    let mut total_claimed = claimed.total();
    if arrangement.kind == FldgKind::SecondLoss {
        if total_claimed <= arrangement.first_loss_threshold {
            return Err(LoanError::conflicting_state(
                "loss below the first-loss threshold; no second-loss utilization",
            ));
        }
        total_claimed -= arrangement.first_loss_threshold;
    }
    if !total_claimed.is_positive() {
        return Err(LoanError::invalid_input("claim amount is zero"));
    }

    if !arrangement.current_balance.is_positive() {
        return Err(LoanError::FldgExhausted { arrangement_id: arrangement.id });
    }

    let balance_before = arrangement.current_balance;
    let total_approved = total_claimed.min(balance_before);
    let balance_after = balance_before - total_approved;

    arrangement.current_balance = balance_after;
    arrangement.total_utilized += total_approved;
    arrangement.check_balance()?;

    Ok(FldgUtilization {
        id: Uuid::new_v4(),
        arrangement_id: arrangement.id,
        account_id,
        utilization_date,
        trigger,
        dpd_at_utilization: dpd,
        claimed,
        total_claimed,
        total_approved,
        balance_before,
        balance_after,
        lender_share_percent,
        returned_to_pool: Money::ZERO,
        status: UtilizationStatus::Approved,
    })
}

/// recovery outcome: what refilled the pool and what flowed to the lender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FldgRecovery {
    pub id: Uuid,
    pub utilization_id: UtilizationId,
    pub recovery_date: NaiveDate,
    pub recovered: ComponentAmounts,
    pub total_recovered: Money,
    pub returned_to_pool: Money,
    pub excess_to_lender: Money,
    pub source: String,
}

/// apply a recovery: the lender's share of the recovery replenishes the
/// pool first, capped at the utilization's approved amount; any excess
/// flows to the lender directly.
pub fn recover(
    arrangement: &mut FldgArrangement,
    utilization: &mut FldgUtilization,
    recovered: ComponentAmounts,
    recovery_date: NaiveDate,
    source: impl Into<String>,
) -> Result<FldgRecovery> {
    if utilization.arrangement_id != arrangement.id {
        return Err(LoanError::conflicting_state("utilization belongs to another arrangement"));
    }
    let total = recovered.total();
    if !total.is_positive() {
        return Err(LoanError::InvalidPaymentAmount { amount: total });
    }

    let lender_portion = total.percentage(utilization.lender_share_percent);
    let replenishable =
        (utilization.total_approved - utilization.returned_to_pool).clamp_non_negative();
    let returned_to_pool = lender_portion.min(replenishable);
    let excess_to_lender = total - returned_to_pool;

    utilization.returned_to_pool += returned_to_pool;
    if utilization.returned_to_pool >= utilization.total_approved {
        utilization.status = UtilizationStatus::Recovered;
    }

    arrangement.current_balance += returned_to_pool;
    arrangement.total_recovered += returned_to_pool;
    arrangement.check_balance()?;

    Ok(FldgRecovery {
        id: Uuid::new_v4(),
        utilization_id: utilization.id,
        recovery_date,
        recovered,
        total_recovered: total,
        returned_to_pool,
        excess_to_lender,
        source: source.into(),
    })
}

/// point-in-time view of an arrangement and its claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FldgSummary {
    pub arrangement_id: ArrangementId,
    pub code: String,
    pub kind: FldgKind,
    pub effective_limit: Money,
    pub current_balance: Money,
    pub total_utilized: Money,
    pub total_recovered: Money,
    pub utilization_count: u32,
    pub total_approved: Money,
}

pub fn summarize(arrangement: &FldgArrangement, utilizations: &[FldgUtilization]) -> FldgSummary {
    FldgSummary {
        arrangement_id: arrangement.id,
        code: arrangement.code.clone(),
        kind: arrangement.kind,
        effective_limit: arrangement.effective_limit,
        current_balance: arrangement.current_balance,
        total_utilized: arrangement.total_utilized,
        total_recovered: arrangement.total_recovered,
        utilization_count: utilizations.len() as u32,
        total_approved: utilizations.iter().map(|u| u.total_approved).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn arrangement() -> FldgArrangement {
        let mut a = FldgArrangement::new(
            Uuid::new_v4(),
            "FLDG-01",
            Uuid::new_v4(),
            Uuid::new_v4(),
            FldgKind::FirstLoss,
            Money::from_major(500_000),
        );
        a.covers_interest = true;
        a
    }

    fn written_off_components() -> ComponentAmounts {
        ComponentAmounts {
            principal: Money::from_major(100_000),
            interest: Money::from_major(5_000),
            fees: Money::from_major(200),
        }
    }

    #[test]
    fn test_claim_applies_coverage_and_share() {
        let mut a = arrangement();
        let utilization = claim(
            &mut a,
            Uuid::new_v4(),
            written_off_components(),
            dec!(80),
            FldgTrigger::WriteOff,
            200,
            date(2025, 10, 1),
        )
        .unwrap();

        // 80% of principal + interest; fees are not covered
        assert_eq!(utilization.total_approved, Money::from_major(84_000));
        assert_eq!(utilization.balance_before, Money::from_major(500_000));
        assert_eq!(utilization.balance_after, Money::from_major(416_000));
        assert_eq!(a.current_balance, Money::from_major(416_000));
        assert_eq!(a.total_utilized, Money::from_major(84_000));
        assert!(a.check_balance().is_ok());
    }

    #[test]
    fn test_claim_capped_at_balance() {
        let mut a = arrangement();
        a.effective_limit = Money::from_major(50_000);
        a.current_balance = Money::from_major(50_000);

        let utilization = claim(
            &mut a,
            Uuid::new_v4(),
            written_off_components(),
            dec!(80),
            FldgTrigger::Npa,
            120,
            date(2025, 10, 1),
        )
        .unwrap();
        assert_eq!(utilization.total_claimed, Money::from_major(84_000));
        assert_eq!(utilization.total_approved, Money::from_major(50_000));
        assert_eq!(a.current_balance, Money::ZERO);
    }

    #[test]
    fn test_exhausted_pool_rejects_claim() {
        let mut a = arrangement();
        a.current_balance = Money::ZERO;
        a.total_utilized = Money::from_major(500_000);

        let err = claim(
            &mut a,
            Uuid::new_v4(),
            written_off_components(),
            dec!(80),
            FldgTrigger::WriteOff,
            200,
            date(2025, 10, 1),
        );
        assert!(matches!(err, Err(LoanError::FldgExhausted { .. })));
    }

    #[test]
    fn test_dpd_trigger_enforced() {
        let mut a = arrangement();
        let err = claim(
            &mut a,
            Uuid::new_v4(),
            written_off_components(),
            dec!(80),
            FldgTrigger::DpdThreshold,
            45,
            date(2025, 10, 1),
        );
        assert!(matches!(err, Err(LoanError::ConflictingState { .. })));
    }

    #[test]
    fn test_second_loss_threshold() {
        let mut a = arrangement();
        a.kind = FldgKind::SecondLoss;
        a.first_loss_threshold = Money::from_major(20_000);

        let utilization = claim(
            &mut a,
            Uuid::new_v4(),
            written_off_components(),
            dec!(80),
            FldgTrigger::WriteOff,
            200,
            date(2025, 10, 1),
        )
        .unwrap();
        assert_eq!(utilization.total_approved, Money::from_major(64_000));

        let mut below = arrangement();
        below.kind = FldgKind::SecondLoss;
        below.first_loss_threshold = Money::from_major(200_000);
        let err = claim(
            &mut below,
            Uuid::new_v4(),
            written_off_components(),
            dec!(80),
            FldgTrigger::WriteOff,
            200,
            date(2025, 10, 1),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_recovery_replenishes_pool_then_lender() {
        let mut a = arrangement();
        let mut utilization = claim(
            &mut a,
            Uuid::new_v4(),
            written_off_components(),
            dec!(80),
            FldgTrigger::WriteOff,
            200,
            date(2025, 10, 1),
        )
        .unwrap();

        let recovery = recover(
            &mut a,
            &mut utilization,
            ComponentAmounts { principal: Money::from_major(50_000), interest: Money::ZERO, fees: Money::ZERO },
            date(2026, 2, 1),
            "agency",
        )
        .unwrap();

        // lender share of the recovery refills the pool; the rest goes out
        assert_eq!(recovery.returned_to_pool, Money::from_major(40_000));
        assert_eq!(recovery.excess_to_lender, Money::from_major(10_000));
        assert_eq!(a.current_balance, Money::from_major(456_000));
        assert_eq!(a.total_recovered, Money::from_major(40_000));
        assert!(a.check_balance().is_ok());
        assert_eq!(utilization.status, UtilizationStatus::Approved);
    }

    #[test]
    fn test_recovery_capped_at_approved() {
        let mut a = arrangement();
        let mut utilization = claim(
            &mut a,
            Uuid::new_v4(),
            written_off_components(),
            dec!(80),
            FldgTrigger::WriteOff,
            200,
            date(2025, 10, 1),
        )
        .unwrap();

        // recover far more than the approved claim
        let recovery = recover(
            &mut a,
            &mut utilization,
            ComponentAmounts { principal: Money::from_major(200_000), interest: Money::ZERO, fees: Money::ZERO },
            date(2026, 2, 1),
            "borrower",
        )
        .unwrap();

        assert_eq!(recovery.returned_to_pool, Money::from_major(84_000));
        assert_eq!(recovery.excess_to_lender, Money::from_major(116_000));
        assert_eq!(utilization.status, UtilizationStatus::Recovered);
        // the pool never refills above its limit
        assert!(a.current_balance <= a.effective_limit);
        assert!(a.check_balance().is_ok());
    }

    #[test]
    fn test_limit_from_portfolio() {
        let limit = FldgArrangement::limit_for_portfolio(
            Money::from_major(10_000_000),
            dec!(5),
            Money::from_major(400_000),
        );
        assert_eq!(limit, Money::from_major(400_000));
    }
}
