pub mod waterfall;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::types::{AccountId, PaymentChannel, PaymentId};

pub use waterfall::{
    AllocationResult, PaymentAllocator, PaymentComponent, StandardWaterfall, WaterfallPolicy,
};

/// an inbound payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub account_id: AccountId,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    pub value_date: NaiveDate,
    pub channel: PaymentChannel,
    /// unique reference making resubmission idempotent
    pub external_ref: String,
    /// remainder after the waterfall, never negative
    pub unallocated: Money,
}

impl Payment {
    pub fn new(
        id: PaymentId,
        account_id: AccountId,
        amount: Money,
        paid_at: DateTime<Utc>,
        channel: PaymentChannel,
        external_ref: impl Into<String>,
    ) -> Result<Self> {
        if !amount.is_positive() {
            return Err(LoanError::InvalidPaymentAmount { amount });
        }
        let external_ref = external_ref.into();
        if external_ref.is_empty() {
            return Err(LoanError::invalid_input("external reference must not be empty"));
        }
        Ok(Self {
            id,
            account_id,
            amount,
            paid_at,
            value_date: paid_at.date_naive(),
            channel,
            external_ref,
            unallocated: Money::ZERO,
        })
    }
}

/// one payment applied to one installment, split by component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub payment_id: PaymentId,
    pub installment_number: u32,
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
}

impl PaymentAllocation {
    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_payment_rejects_non_positive_amount() {
        let result = Payment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Money::ZERO,
            Utc::now(),
            PaymentChannel::Upi,
            "REF-1",
        );
        assert!(matches!(result, Err(LoanError::InvalidPaymentAmount { .. })));
    }

    #[test]
    fn test_payment_requires_reference() {
        let result = Payment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Money::from_major(100),
            Utc::now(),
            PaymentChannel::Upi,
            "",
        );
        assert!(result.is_err());
    }
}
