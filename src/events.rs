use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{
    AccountId, AccountStatus, ArrangementId, ClosureKind, EclStage, NpaCategory, PaymentId,
    PrepaymentAction, RestructureKind, UtilizationId, WriteOffId,
};

/// all events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // schedule events
    ScheduleGenerated {
        account_id: AccountId,
        installments: u32,
        principal: Money,
    },
    ScheduleRegenerated {
        account_id: AccountId,
        from_installment: u32,
        reason: String,
    },

    // payment events
    PaymentReceived {
        account_id: AccountId,
        payment_id: PaymentId,
        amount: Money,
        applied_to_fees: Money,
        applied_to_interest: Money,
        applied_to_principal: Money,
        unallocated: Money,
        value_date: NaiveDate,
    },
    PaymentReplayed {
        account_id: AccountId,
        payment_id: PaymentId,
        external_ref: String,
    },

    // interest events
    InterestAccrued {
        account_id: AccountId,
        accrual_date: NaiveDate,
        amount: Money,
        cumulative: Money,
    },
    RateReset {
        account_id: AccountId,
        reset_date: NaiveDate,
        old_rate: Rate,
        new_rate: Rate,
    },

    // delinquency events
    NpaEntered {
        account_id: AccountId,
        as_of: NaiveDate,
        dpd: u32,
        category: Option<NpaCategory>,
    },
    NpaExited {
        account_id: AccountId,
        as_of: NaiveDate,
    },

    // lifecycle events
    Restructured {
        account_id: AccountId,
        kind: RestructureKind,
        effective_date: NaiveDate,
    },
    PrepaymentApplied {
        account_id: AccountId,
        action: PrepaymentAction,
        amount: Money,
        principal_reduced: Money,
    },
    AccountClosed {
        account_id: AccountId,
        kind: ClosureKind,
        closure_date: NaiveDate,
    },
    WrittenOff {
        account_id: AccountId,
        write_off_id: WriteOffId,
        total_written_off: Money,
        dpd: u32,
    },
    RecoveryRecorded {
        account_id: AccountId,
        write_off_id: WriteOffId,
        amount: Money,
    },
    StatusChanged {
        account_id: AccountId,
        old_status: AccountStatus,
        new_status: AccountStatus,
    },

    // derived postings
    CollectionSplit {
        account_id: AccountId,
        payment_id: PaymentId,
        partners: u32,
        total: Money,
    },
    FldgClaimed {
        account_id: AccountId,
        arrangement_id: ArrangementId,
        utilization_id: UtilizationId,
        approved: Money,
    },
    FldgRecovered {
        utilization_id: UtilizationId,
        returned_to_pool: Money,
        excess_to_lender: Money,
    },
    EclStaged {
        account_id: AccountId,
        previous_stage: EclStage,
        new_stage: EclStage,
        provision: Money,
    },
}

/// event store collecting events during a unit of work
#[derive(Debug, Default, Clone)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_emit_and_take() {
        let mut store = EventStore::new();
        let id = Uuid::new_v4();
        store.emit(Event::NpaExited { account_id: id, as_of: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap() });
        assert_eq!(store.events().len(), 1);

        let events = store.take_events();
        assert_eq!(events.len(), 1);
        assert!(store.events().is_empty());
    }
}
