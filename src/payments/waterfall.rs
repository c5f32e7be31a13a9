use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::payments::{Payment, PaymentAllocation};
use crate::schedule::{Installment, RepaymentSchedule};
use crate::types::InstallmentStatus;

/// a component an incoming payment can be applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentComponent {
    Fees,
    Interest,
    Principal,
}

/// capability yielding the allocation order for an installment.
///
/// products may carry an alternative order; the engine never hard-codes one.
pub trait WaterfallPolicy {
    fn component_order(&self, installment: &Installment) -> [PaymentComponent; 3];
}

/// the default waterfall: fees, then interest, then principal
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardWaterfall;

impl WaterfallPolicy for StandardWaterfall {
    fn component_order(&self, _installment: &Installment) -> [PaymentComponent; 3] {
        [PaymentComponent::Fees, PaymentComponent::Interest, PaymentComponent::Principal]
    }
}

/// outcome of applying one payment through the waterfall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub allocations: Vec<PaymentAllocation>,
    pub unallocated: Money,
}

impl AllocationResult {
    pub fn total_allocated(&self) -> Money {
        self.allocations.iter().map(|a| a.total()).sum()
    }
}

/// applies payments to a schedule through a waterfall policy
pub struct PaymentAllocator<P: WaterfallPolicy> {
    policy: P,
}

impl Default for PaymentAllocator<StandardWaterfall> {
    fn default() -> Self {
        Self::new(StandardWaterfall)
    }
}

impl<P: WaterfallPolicy> PaymentAllocator<P> {
    pub fn new(policy: P) -> Self {
        Self { policy }
    }

    /// walk installments from the oldest due; within each, allocate in the
    /// policy's component order, capped at each component's remainder.
    /// deterministic over the ordered schedule and the payment amount.
    pub fn allocate(&self, schedule: &mut RepaymentSchedule, payment: &Payment) -> AllocationResult {
        let mut remaining = payment.amount;
        let mut allocations = Vec::new();

        for row in schedule.ordered_for_allocation() {
            if !remaining.is_positive() {
                break;
            }
            if row.is_settled() {
                continue;
            }

            let mut allocation = PaymentAllocation {
                payment_id: payment.id,
                installment_number: row.number,
                principal: Money::ZERO,
                interest: Money::ZERO,
                fees: Money::ZERO,
            };

            for component in self.policy.component_order(row) {
                let due = row.remaining();
                let (due_part, paid_field, alloc_field) = match component {
                    PaymentComponent::Fees => (due.fees, &mut row.fees_paid, &mut allocation.fees),
                    PaymentComponent::Interest => {
                        (due.interest, &mut row.interest_paid, &mut allocation.interest)
                    }
                    PaymentComponent::Principal => {
                        (due.principal, &mut row.principal_paid, &mut allocation.principal)
                    }
                };

                let applied = remaining.min(due_part);
                if applied.is_positive() {
                    *paid_field += applied;
                    *alloc_field += applied;
                    remaining -= applied;
                }
                if !remaining.is_positive() {
                    break;
                }
            }

            if row.remaining().total().is_zero() {
                row.status = InstallmentStatus::Paid;
            } else if row.total_paid().is_positive() {
                row.status = InstallmentStatus::PartiallyPaid;
            }

            if allocation.total().is_positive() {
                allocations.push(allocation);
            }
        }

        AllocationResult { allocations, unallocated: remaining }
    }
}
