use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;

/// unique identifier for a loan account
pub type AccountId = Uuid;

/// unique identifier for a payment
pub type PaymentId = Uuid;

/// unique identifier for a co-lending partner
pub type PartnerId = Uuid;

/// unique identifier for an FLDG arrangement
pub type ArrangementId = Uuid;

/// unique identifier for an FLDG utilization
pub type UtilizationId = Uuid;

/// unique identifier for a write-off
pub type WriteOffId = Uuid;

/// unique identifier for a holiday calendar
pub type CalendarId = Uuid;

/// unique identifier for a benchmark rate series
pub type BenchmarkId = Uuid;

/// loan account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// loan disbursed and performing or delinquent
    Active,
    /// fully discharged (normal, settlement or foreclosure)
    Closed,
    /// written off as loss
    WrittenOff,
}

/// how the loan was discharged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosureKind {
    /// outstanding reached zero naturally
    Normal,
    /// one-time settlement; residual waived
    Settlement,
    /// prepayment of the full remaining balance
    Foreclosure,
    WriteOff,
}

/// schedule variants; the set is closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScheduleKind {
    /// equated installments covering interest and principal
    Emi,
    /// interest each period, principal in the final installment
    InterestOnly,
    /// everything at maturity
    Bullet,
    /// installment stepped up at each boundary
    StepUp { step_percent: Decimal, step_every_periods: u32 },
    /// installment stepped down at each boundary
    StepDown { step_percent: Decimal, step_every_periods: u32 },
    /// regular installments leaving a final fraction of principal
    Balloon { final_fraction: Decimal },
    /// leading periods with no principal due
    Moratorium { periods: u32, treatment: MoratoriumTreatment },
}

/// interest handling during a moratorium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoratoriumTreatment {
    /// fold accrued interest into principal when the moratorium ends
    Capitalize,
    /// accrue and collect with the first post-moratorium installments
    Collect,
    Waive,
}

/// installment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    Pending,
    PartiallyPaid,
    Paid,
    /// closed out by restructure, settlement or write-off
    Skipped,
}

/// delinquency bucket derived from DPD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelinquencyBucket {
    Current,
    Sma0,
    Sma1,
    Sma2,
    NpaSubstandard,
    NpaDoubtful,
    NpaLoss,
}

impl DelinquencyBucket {
    pub fn is_npa(&self) -> bool {
        matches!(
            self,
            DelinquencyBucket::NpaSubstandard
                | DelinquencyBucket::NpaDoubtful
                | DelinquencyBucket::NpaLoss
        )
    }
}

/// NPA ageing category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NpaCategory {
    Substandard,
    Doubtful,
    Loss,
}

/// IFRS-9 ECL stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EclStage {
    Stage1,
    Stage2,
    Stage3,
}

impl EclStage {
    pub fn as_number(&self) -> u8 {
        match self {
            EclStage::Stage1 => 1,
            EclStage::Stage2 => 2,
            EclStage::Stage3 => 3,
        }
    }
}

/// restructure variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestructureKind {
    RateReduction,
    TenureExtension,
    PrincipalHaircut,
    EmiRescheduling,
    Combination,
}

/// what a partial prepayment does to the forward schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepaymentAction {
    /// keep remaining tenure, recompute the installment
    ReduceEmi,
    /// keep the installment, shorten the tenure
    ReduceTenure,
    /// pay off everything and close
    Foreclosure,
}

/// FLDG arrangement flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FldgKind {
    FirstLoss,
    SecondLoss,
}

/// what tripped an FLDG claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FldgTrigger {
    DpdThreshold,
    Npa,
    WriteOff,
}

/// channel a payment arrived through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentChannel {
    BankTransfer,
    Upi,
    Cheque,
    Cash,
    Nach,
    Other(String),
}

/// component amounts split by principal / interest / fees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ComponentAmounts {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
}

impl ComponentAmounts {
    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees
    }

    pub fn is_zero(&self) -> bool {
        self.total().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_npa_flag() {
        assert!(!DelinquencyBucket::Current.is_npa());
        assert!(!DelinquencyBucket::Sma2.is_npa());
        assert!(DelinquencyBucket::NpaSubstandard.is_npa());
        assert!(DelinquencyBucket::NpaLoss.is_npa());
    }

    #[test]
    fn test_stage_ordering() {
        assert!(EclStage::Stage1 < EclStage::Stage2);
        assert!(EclStage::Stage2 < EclStage::Stage3);
        assert_eq!(EclStage::Stage3.as_number(), 3);
    }

    #[test]
    fn test_component_totals() {
        let c = ComponentAmounts {
            principal: Money::from_major(100),
            interest: Money::from_major(10),
            fees: Money::from_major(1),
        };
        assert_eq!(c.total(), Money::from_major(111));
        assert!(!c.is_zero());
        assert!(ComponentAmounts::default().is_zero());
    }
}
