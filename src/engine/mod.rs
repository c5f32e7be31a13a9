pub mod batch;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::account::{LoanAccount, LoanTerms};
use crate::colending::{
    split_collection, CollectionContext, Participation, PartnerLedgerEntry, ServicerTerms,
};
use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::delinquency::{self, DelinquencySnapshot};
use crate::ecl::{self, EclProvision};
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventStore};
use crate::fldg::{self, FldgRecovery, FldgUtilization};
use crate::interest::{
    effective_rate, AccrualEngine, AccrualStatus, InterestAccrual, RateReset, RateSpec,
};
use crate::lifecycle::closure;
use crate::lifecycle::prepayment::{self, PayoffQuote, Prepayment, PrepaymentImpact};
use crate::lifecycle::restructure::{apply_restructure, RestructureEvent, RestructureRequest};
use crate::lifecycle::{WriteOff, WriteOffRecovery};
use crate::payments::{AllocationResult, Payment, PaymentAllocator};
use crate::schedule::{generate_schedule, RepaymentSchedule, ScheduleSpec};
use crate::store::{AccountState, LoanStore};
use crate::types::{
    AccountId, AccountStatus, ArrangementId, ClosureKind, ComponentAmounts, DelinquencyBucket,
    FldgTrigger, PaymentChannel, PaymentId, PrepaymentAction, UtilizationId, WriteOffId,
};

pub use batch::{BatchResult, CancelToken, EodResult};

/// result of applying a payment, replayed or fresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub payment_id: PaymentId,
    pub allocations: Vec<crate::payments::PaymentAllocation>,
    pub unallocated: Money,
    pub new_dpd: u32,
    /// true when an external reference was resubmitted and the prior
    /// result is returned unchanged
    pub replayed: bool,
}

/// the loan lifecycle engine: every public operation is one unit of work
/// under the account's logical lock, committed atomically or not at all
pub struct LoanEngine {
    store: Arc<LoanStore>,
    config: EngineConfig,
}

impl LoanEngine {
    pub fn new(store: Arc<LoanStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &Arc<LoanStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// run one unit of work: lock, clone, mutate, commit on success
    fn unit_of_work<R>(
        &self,
        account_id: AccountId,
        f: impl FnOnce(&mut AccountState, &mut EventStore) -> Result<R>,
    ) -> Result<R> {
        let lock = self.store.account_lock(account_id);
        let _guard = lock.lock();

        let mut working = self.store.load(account_id)?;
        let mut events = EventStore::new();
        match f(&mut working, &mut events) {
            Ok(result) => {
                self.store.commit(account_id, working);
                for event in events.take_events() {
                    debug!(?event, "event");
                }
                Ok(result)
            }
            Err(err) => Err(err),
        }
    }

    // -- origination ---------------------------------------------------

    /// open an account; the schedule is persisted separately
    pub fn open_account(&self, terms: LoanTerms) -> Result<AccountId> {
        let id = Uuid::new_v4();
        let account = LoanAccount::open(id, terms)?;
        self.store.calendar(account.calendar_id)?;
        info!(account = %account.account_number, "account opened");
        self.store.insert_account(account)?;
        Ok(id)
    }

    fn schedule_spec(&self, account: &LoanAccount) -> ScheduleSpec {
        ScheduleSpec {
            account_id: account.id,
            principal: account.principal_outstanding,
            annual_rate: account.current_rate,
            tenure_periods: account.tenure_periods,
            frequency: account.frequency,
            kind: account.schedule_kind.clone(),
            disbursement_date: account.disbursement_date,
            first_due: account.first_due_date,
            adjustment: account.adjustment,
            first_installment_number: 1,
        }
    }

    /// generate the schedule for an account without persisting it
    pub fn generate_schedule(&self, account_id: AccountId) -> Result<RepaymentSchedule> {
        let state = self.store.load(account_id)?;
        let account = state.account()?;
        let calendar = self.store.calendar(account.calendar_id)?;
        generate_schedule(&self.schedule_spec(account), &calendar)
    }

    /// generate and persist; an existing schedule is an error
    pub fn persist_schedule(&self, account_id: AccountId) -> Result<RepaymentSchedule> {
        let calendar_store = Arc::clone(&self.store);
        self.unit_of_work(account_id, |state, events| {
            if !state.schedule.is_empty() {
                return Err(LoanError::ScheduleExists { account_id });
            }
            let account = state.account()?;
            let calendar = calendar_store.calendar(account.calendar_id)?;
            let schedule = generate_schedule(&self.schedule_spec(account), &calendar)?;

            events.emit(Event::ScheduleGenerated {
                account_id,
                installments: schedule.installments.len() as u32,
                principal: account.principal_outstanding,
            });

            let outstanding = schedule.outstanding();
            let account = state.account_mut()?;
            account.interest_outstanding = outstanding.interest;
            account.fees_outstanding = outstanding.fees;
            account.next_due_date = schedule.next_due().map(|r| r.due_date);
            account.next_due_amount = schedule.next_due().map(|r| r.total_due());

            state.schedule = schedule.clone();
            Ok(schedule)
        })
    }

    // -- payments ------------------------------------------------------

    /// apply a payment through the waterfall. idempotent by external_ref:
    /// a resubmission returns the prior outcome without re-allocating.
    pub fn apply_payment(
        &self,
        account_id: AccountId,
        amount: Money,
        paid_at: DateTime<Utc>,
        channel: PaymentChannel,
        external_ref: &str,
    ) -> Result<PaymentOutcome> {
        let config = self.config.delinquency;
        self.unit_of_work(account_id, |state, events| {
            if let Some(prior) = state.payment_by_ref(external_ref) {
                let payment_id = prior.id;
                let unallocated = prior.unallocated;
                events.emit(Event::PaymentReplayed {
                    account_id,
                    payment_id,
                    external_ref: external_ref.to_string(),
                });
                return Ok(PaymentOutcome {
                    payment_id,
                    allocations: state
                        .allocations
                        .iter()
                        .filter(|a| a.payment_id == payment_id)
                        .cloned()
                        .collect(),
                    unallocated,
                    new_dpd: state.account()?.dpd,
                    replayed: true,
                });
            }

            state.account()?.ensure_open()?;
            if state.schedule.is_empty() {
                return Err(LoanError::conflicting_state("no schedule to allocate against"));
            }

            let mut payment =
                Payment::new(Uuid::new_v4(), account_id, amount, paid_at, channel, external_ref)?;

            let allocator = PaymentAllocator::default();
            let AllocationResult { allocations, unallocated } =
                allocator.allocate(&mut state.schedule, &payment);
            payment.unallocated = unallocated;

            let interest_collected: Money = allocations.iter().map(|a| a.interest).sum();
            if interest_collected.is_positive() {
                let value_date = payment.value_date;
                for accrual in state
                    .accruals
                    .iter_mut()
                    .filter(|a| a.status == AccrualStatus::Accrued && a.accrual_date <= value_date)
                {
                    accrual.status = AccrualStatus::Posted;
                }
            }

            // recompute account totals from the schedule, then DPD
            let outstanding = state.schedule.outstanding();
            let next_due_date = state.schedule.next_due().map(|r| r.due_date);
            let next_due_amount = state.schedule.next_due().map(|r| r.total_due());
            let value_date = payment.value_date;
            {
                let account = state.account_mut()?;
                account.principal_outstanding = outstanding.principal;
                account.interest_outstanding = outstanding.interest;
                account.fees_outstanding = outstanding.fees;
                account.total_payments_received += amount;
                account.next_due_date = next_due_date;
                account.next_due_amount = next_due_amount;
            }
            let schedule = state.schedule.clone();
            let snapshot = {
                let account = state.account_mut()?;
                delinquency::refresh_delinquency(account, &schedule, value_date, &config)
            };

            // a naturally cleared book closes the account
            if outstanding.is_zero() {
                let account = state.account_mut()?;
                if account.is_active() {
                    account.close(ClosureKind::Normal, value_date);
                    events.emit(Event::AccountClosed {
                        account_id,
                        kind: ClosureKind::Normal,
                        closure_date: value_date,
                    });
                }
            }

            events.emit(Event::PaymentReceived {
                account_id,
                payment_id: payment.id,
                amount,
                applied_to_fees: allocations.iter().map(|a| a.fees).sum(),
                applied_to_interest: interest_collected,
                applied_to_principal: allocations.iter().map(|a| a.principal).sum(),
                unallocated,
                value_date,
            });

            let outcome = PaymentOutcome {
                payment_id: payment.id,
                allocations: allocations.clone(),
                unallocated,
                new_dpd: snapshot.dpd,
                replayed: false,
            };
            state.payments.push(payment);
            state.allocations.extend(allocations);
            Ok(outcome)
        })
    }

    // -- accrual -------------------------------------------------------

    /// accrue one day of interest; re-running a date returns the existing row
    pub fn accrue(&self, account_id: AccountId, as_of: NaiveDate) -> Result<InterestAccrual> {
        let benchmarks = self.store.benchmarks();
        self.unit_of_work(account_id, |state, events| {
            let account = state.account()?;
            account.ensure_open()?;
            if as_of < account.disbursement_date {
                return Err(LoanError::invalid_input("accrual before disbursement"));
            }
            if let Some(existing) = state.accrual_for(as_of) {
                return Ok(existing.clone());
            }

            let rate = effective_rate(&account.rate_spec, &benchmarks, as_of)?;
            let (benchmark_rate, spread) = match &account.rate_spec {
                RateSpec::Floating { spread, .. } => (Some(rate - *spread), Some(*spread)),
                RateSpec::Fixed { .. } => (None, None),
            };

            let engine = AccrualEngine::new(account.day_count);
            let previous = state.latest_accrual().map(|a| a.cumulative).unwrap_or(Money::ZERO);
            let row = engine.accrue_for_date(
                account_id,
                as_of,
                account.principal_outstanding,
                rate,
                benchmark_rate,
                spread,
                previous,
            );

            events.emit(Event::InterestAccrued {
                account_id,
                accrual_date: as_of,
                amount: row.accrued,
                cumulative: row.cumulative,
            });

            let account = state.account_mut()?;
            account.current_rate = rate;
            account.cumulative_accrued = row.cumulative;
            account.last_accrual_date = Some(as_of);

            state.accruals.push(row.clone());
            Ok(row)
        })
    }

    /// catch-up accrual over an inclusive date range
    pub fn accrue_range(
        &self,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InterestAccrual>> {
        if from > to {
            return Err(LoanError::invalid_input("accrual range is inverted"));
        }
        let mut rows = Vec::new();
        let mut current = from;
        while current <= to {
            rows.push(self.accrue(account_id, current)?);
            current = current.succ_opt().ok_or_else(|| {
                LoanError::invalid_input("accrual date range exceeds the representable calendar")
            })?;
        }
        Ok(rows)
    }

    /// apply a floating-rate reset as of a date
    pub fn apply_rate_reset(&self, account_id: AccountId, reset_date: NaiveDate) -> Result<RateReset> {
        let benchmarks = self.store.benchmarks();
        self.unit_of_work(account_id, |state, events| {
            let account = state.account()?;
            account.ensure_open()?;
            let reset =
                crate::interest::floating::resolve_reset(&account.rate_spec, account.current_rate, &benchmarks, reset_date)?;

            events.emit(Event::RateReset {
                account_id,
                reset_date,
                old_rate: reset.old_rate,
                new_rate: reset.new_rate,
            });

            let account = state.account_mut()?;
            account.current_rate = reset.new_rate;
            account.next_rate_reset = Some(reset.next_reset_date);
            Ok(reset)
        })
    }

    // -- delinquency ---------------------------------------------------

    /// recompute DPD, bucket and sticky NPA; write the day's snapshot
    pub fn refresh_delinquency(
        &self,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<DelinquencySnapshot> {
        let config = self.config.delinquency;
        self.unit_of_work(account_id, |state, events| {
            let was_npa = state.account()?.is_npa;
            let schedule = state.schedule.clone();
            let account = state.account_mut()?;
            let snapshot = delinquency::refresh_delinquency(account, &schedule, as_of, &config);

            if !was_npa && snapshot.is_npa {
                events.emit(Event::NpaEntered {
                    account_id,
                    as_of,
                    dpd: snapshot.dpd,
                    category: snapshot.npa_category,
                });
            } else if was_npa && !snapshot.is_npa {
                events.emit(Event::NpaExited { account_id, as_of });
            }

            state.snapshots.retain(|s| s.snapshot_date != as_of);
            state.snapshots.push(snapshot.clone());
            Ok(snapshot)
        })
    }

    // -- lifecycle -----------------------------------------------------

    /// apply a restructure; the schedule is mutated forward-only
    pub fn restructure(
        &self,
        account_id: AccountId,
        request: RestructureRequest,
    ) -> Result<RestructureEvent> {
        let store = Arc::clone(&self.store);
        self.unit_of_work(account_id, |state, events| {
            let calendar = store.calendar(state.account()?.calendar_id)?;
            let mut schedule = std::mem::take(&mut state.schedule);
            let account = state.account_mut()?;
            let result = apply_restructure(account, &mut schedule, &calendar, &request);
            state.schedule = schedule;
            let event = result?;

            events.emit(Event::Restructured {
                account_id,
                kind: event.kind,
                effective_date: event.effective_date,
            });
            state.restructures.push(event.clone());
            Ok(event)
        })
    }

    /// interest accrued but not yet collected
    fn uncollected_interest(state: &AccountState) -> Money {
        state
            .accruals
            .iter()
            .filter(|a| a.status == AccrualStatus::Accrued)
            .map(|a| a.accrued)
            .sum()
    }

    /// payoff components as of a date; a pure read
    pub fn payoff_quote(&self, account_id: AccountId, as_of: NaiveDate) -> Result<PayoffQuote> {
        let state = self.store.load(account_id)?;
        let accrued = Self::uncollected_interest(&state);
        Ok(prepayment::payoff_quote(state.account()?, &state.schedule, accrued, as_of, false))
    }

    /// impact of a proposed prepayment; pure, repeatable, no state change
    pub fn prepayment_impact(
        &self,
        account_id: AccountId,
        amount: Money,
        action: PrepaymentAction,
        as_of: NaiveDate,
    ) -> Result<PrepaymentImpact> {
        let state = self.store.load(account_id)?;
        let accrued = Self::uncollected_interest(&state);
        prepayment::prepayment_impact(state.account()?, &state.schedule, accrued, amount, action, as_of)
    }

    /// apply a prepayment; foreclosure closes the account
    pub fn apply_prepayment(
        &self,
        account_id: AccountId,
        amount: Money,
        action: PrepaymentAction,
        as_of: NaiveDate,
        penalty_waived: bool,
    ) -> Result<Prepayment> {
        let store = Arc::clone(&self.store);
        self.unit_of_work(account_id, |state, events| {
            let calendar = store.calendar(state.account()?.calendar_id)?;
            let accrued = Self::uncollected_interest(state);
            let mut schedule = std::mem::take(&mut state.schedule);
            let account = state.account_mut()?;
            let result = prepayment::apply_prepayment(
                account, &mut schedule, &calendar, accrued, amount, action, as_of, None,
                penalty_waived,
            );
            state.schedule = schedule;
            let record = result?;

            events.emit(Event::PrepaymentApplied {
                account_id,
                action,
                amount,
                principal_reduced: record.principal_reduced,
            });
            if record.is_foreclosure {
                events.emit(Event::AccountClosed {
                    account_id,
                    kind: ClosureKind::Foreclosure,
                    closure_date: as_of,
                });
            }
            state.prepayments.push(record.clone());
            Ok(record)
        })
    }

    /// close an account normally or by one-time settlement
    pub fn close_account(
        &self,
        account_id: AccountId,
        closure: ClosureKind,
        amount: Option<Money>,
        closure_date: NaiveDate,
    ) -> Result<AccountStatus> {
        self.unit_of_work(account_id, |state, events| {
            let mut schedule = std::mem::take(&mut state.schedule);
            let account = state.account_mut()?;
            let result = match closure {
                ClosureKind::Normal => closure::close_normal(account, &schedule, closure_date),
                ClosureKind::Settlement => {
                    let amount = amount.ok_or_else(|| {
                        LoanError::invalid_input("settlement requires an amount")
                    })?;
                    closure::close_settlement(account, &mut schedule, amount, closure_date)
                        .map(|_| ())
                }
                ClosureKind::Foreclosure | ClosureKind::WriteOff => {
                    Err(LoanError::invalid_input(
                        "use apply_prepayment or write_off for this closure",
                    ))
                }
            };
            state.schedule = schedule;
            result?;

            let status = state.account()?.status;
            events.emit(Event::AccountClosed { account_id, kind: closure, closure_date });
            Ok(status)
        })
    }

    /// write off outstanding components; forces ECL stage 3
    pub fn write_off(
        &self,
        account_id: AccountId,
        components: Option<ComponentAmounts>,
        reason: &str,
        approved_by: &str,
        write_off_date: NaiveDate,
    ) -> Result<WriteOff> {
        self.unit_of_work(account_id, |state, events| {
            let mut schedule = std::mem::take(&mut state.schedule);
            let account = state.account_mut()?;
            let result = closure::write_off(
                account, &mut schedule, components, write_off_date, reason, approved_by,
            );
            state.schedule = schedule;
            let record = result?;

            events.emit(Event::WrittenOff {
                account_id,
                write_off_id: record.id,
                total_written_off: record.total_written_off(),
                dpd: record.dpd_at_write_off,
            });
            state.write_offs.push(record.clone());
            Ok(record)
        })
    }

    /// record a recovery on a written-off loan. in co-lending the lender
    /// share is routed to FLDG replenishment before anything reaches the
    /// lender directly.
    pub fn record_write_off_recovery(
        &self,
        write_off_id: WriteOffId,
        amount: Money,
        source: &str,
        recovery_date: NaiveDate,
    ) -> Result<WriteOffRecovery> {
        let (account_id, _) = self.store.write_off(write_off_id)?;
        let store = Arc::clone(&self.store);

        self.unit_of_work(account_id, |state, events| {
            let write_off = state
                .write_offs
                .iter_mut()
                .find(|w| w.id == write_off_id)
                .ok_or(LoanError::NotFound { entity: "write-off", id: write_off_id })?;

            let recovery = closure::record_recovery(write_off, amount, recovery_date, source)?;

            events.emit(Event::RecoveryRecorded {
                account_id,
                write_off_id,
                amount,
            });

            // route through FLDG when a covering utilization exists
            let covered = state
                .participations
                .iter()
                .filter_map(|p| p.fldg_arrangement_id)
                .find_map(|arrangement_id| {
                    store.utilization_for_account(arrangement_id, account_id)
                });
            if let Some(mut utilization) = covered {
                let mut arrangement = store.arrangement(utilization.arrangement_id)?;
                let fldg_recovery = fldg::recover(
                    &mut arrangement,
                    &mut utilization,
                    recovery.allocated,
                    recovery_date,
                    source,
                )?;
                events.emit(Event::FldgRecovered {
                    utilization_id: utilization.id,
                    returned_to_pool: fldg_recovery.returned_to_pool,
                    excess_to_lender: fldg_recovery.excess_to_lender,
                });
                store.commit_arrangement(arrangement);
                store.commit_utilization(utilization);
                store.record_fldg_recovery(fldg_recovery);
            }

            state.write_off_recoveries.push(recovery.clone());
            Ok(recovery)
        })
    }

    // -- co-lending ----------------------------------------------------

    /// register participations for an account; shares must sum to 100 and
    /// any servicer must itself hold a participation
    pub fn register_participations(
        &self,
        account_id: AccountId,
        participations: Vec<Participation>,
        servicer_terms: Option<ServicerTerms>,
    ) -> Result<()> {
        crate::colending::validate_shares(&participations)?;
        if let Some(terms) = &servicer_terms {
            if !participations.iter().any(|p| p.partner_id == terms.servicer_partner_id) {
                return Err(LoanError::invalid_input(
                    "servicer partner has no participation on the account",
                ));
            }
        }
        self.unit_of_work(account_id, |state, _events| {
            if participations.iter().any(|p| p.account_id != account_id) {
                return Err(LoanError::invalid_input("participation bound to another account"));
            }
            state.participations = participations.clone();
            state.servicer_terms = servicer_terms.clone();
            Ok(())
        })
    }

    /// split a payment's collected components across partners
    pub fn split_collection(
        &self,
        account_id: AccountId,
        payment_id: PaymentId,
    ) -> Result<Vec<PartnerLedgerEntry>> {
        let store = Arc::clone(&self.store);
        self.unit_of_work(account_id, |state, events| {
            let payment = state
                .payments
                .iter()
                .find(|p| p.id == payment_id)
                .ok_or(LoanError::NotFound { entity: "payment", id: payment_id })?
                .clone();

            let components = state
                .allocations
                .iter()
                .filter(|a| a.payment_id == payment_id)
                .fold(ComponentAmounts::default(), |acc, a| ComponentAmounts {
                    principal: acc.principal + a.principal,
                    interest: acc.interest + a.interest,
                    fees: acc.fees + a.fees,
                });
            if components.is_zero() {
                return Err(LoanError::conflicting_state("payment has no allocations to split"));
            }

            // the servicing period runs from the previous collection
            let previous = state
                .payments
                .iter()
                .filter(|p| p.id != payment_id && p.value_date <= payment.value_date)
                .map(|p| p.value_date)
                .max()
                .unwrap_or(state.account()?.disbursement_date);
            let period_days = (payment.value_date - previous).num_days().max(0) as u32;

            let account = state.account()?;
            let ctx = CollectionContext {
                payment_id,
                value_date: payment.value_date,
                borrower_rate: account.current_rate,
                // the fee base is the principal carried over the period,
                // before this collection reduced it
                principal_outstanding: account.principal_outstanding + components.principal,
                period_days,
            };
            let servicer = state.servicer_terms.clone();

            let entries = store.with_ledger(|ledger| {
                split_collection(
                    &mut state.participations,
                    components,
                    servicer.as_ref(),
                    ctx,
                    ledger,
                )
            })?;

            events.emit(Event::CollectionSplit {
                account_id,
                payment_id,
                partners: state.participations.len() as u32,
                total: components.total(),
            });
            Ok(entries)
        })
    }

    // -- FLDG ----------------------------------------------------------

    /// raise a claim against an arrangement covering this account
    pub fn fldg_claim(
        &self,
        account_id: AccountId,
        arrangement_id: ArrangementId,
        as_of: NaiveDate,
    ) -> Result<FldgUtilization> {
        let store = Arc::clone(&self.store);
        self.unit_of_work(account_id, |state, events| {
            if store.utilization_for_account(arrangement_id, account_id).is_some() {
                return Err(LoanError::conflicting_state(
                    "FLDG already utilized for this account",
                ));
            }

            let participation = state
                .participations
                .iter()
                .find(|p| p.fldg_arrangement_id == Some(arrangement_id))
                .ok_or_else(|| {
                    LoanError::conflicting_state("account is not covered by this arrangement")
                })?;
            let lender_share = participation.share_percent;

            let account = state.account()?;
            let (components, trigger) = match state.live_write_off() {
                Some(w) => {
                    let unrecovered = ComponentAmounts {
                        principal: w.written_off.principal - w.recovered.principal,
                        interest: w.written_off.interest - w.recovered.interest,
                        fees: w.written_off.fees - w.recovered.fees,
                    };
                    (unrecovered, FldgTrigger::WriteOff)
                }
                None => {
                    let components = ComponentAmounts {
                        principal: account.principal_outstanding,
                        interest: account.interest_outstanding,
                        fees: account.fees_outstanding,
                    };
                    let trigger =
                        if account.is_npa { FldgTrigger::Npa } else { FldgTrigger::DpdThreshold };
                    (components, trigger)
                }
            };

            let mut arrangement = store.arrangement(arrangement_id)?;
            let utilization = fldg::claim(
                &mut arrangement,
                account_id,
                components,
                lender_share,
                trigger,
                account.dpd,
                as_of,
            )?;

            events.emit(Event::FldgClaimed {
                account_id,
                arrangement_id,
                utilization_id: utilization.id,
                approved: utilization.total_approved,
            });
            store.commit_arrangement(arrangement);
            store.commit_utilization(utilization.clone());
            Ok(utilization)
        })
    }

    /// record a recovery directly against a utilization
    pub fn fldg_recovery(
        &self,
        utilization_id: UtilizationId,
        components: ComponentAmounts,
        source: &str,
        recovery_date: NaiveDate,
    ) -> Result<FldgRecovery> {
        let mut utilization = self.store.utilization(utilization_id)?;
        let mut arrangement = self.store.arrangement(utilization.arrangement_id)?;

        let recovery =
            fldg::recover(&mut arrangement, &mut utilization, components, recovery_date, source)?;

        self.store.commit_arrangement(arrangement);
        self.store.commit_utilization(utilization);
        self.store.record_fldg_recovery(recovery.clone());
        Ok(recovery)
    }

    // -- ECL -----------------------------------------------------------

    /// stage and provision one account as of a date
    pub fn provision_account(&self, account_id: AccountId, as_of: NaiveDate) -> Result<EclProvision> {
        let config = self.config.ecl.clone();
        self.unit_of_work(account_id, |state, events| {
            let account = state.account()?;
            let (provision, movement) = ecl::compute_provision(account, &config, as_of);

            if let Some(movement) = movement {
                events.emit(Event::EclStaged {
                    account_id,
                    previous_stage: movement.previous_stage,
                    new_stage: movement.stage,
                    provision: provision.closing_provision,
                });
                state.stagings.push(movement);
            }

            ecl::apply_provision(state.account_mut()?, &provision);
            state.provisions.push(provision.clone());
            Ok(provision)
        })
    }

    // -- read-only projections -----------------------------------------

    /// per-bucket counts and exposure from the snapshots of a date
    pub fn bucket_distribution(&self, as_of: NaiveDate) -> Vec<(DelinquencyBucket, BucketSlice)> {
        let mut slices: Vec<(DelinquencyBucket, BucketSlice)> = Vec::new();
        for id in self.store.account_ids() {
            let Ok(state) = self.store.load(id) else { continue };
            let Some(snapshot) = state.snapshots.iter().find(|s| s.snapshot_date == as_of) else {
                continue;
            };
            let idx = match slices.iter().position(|(b, _)| *b == snapshot.bucket) {
                Some(idx) => idx,
                None => {
                    slices.push((snapshot.bucket, BucketSlice::default()));
                    slices.len() - 1
                }
            };
            let slice = &mut slices[idx].1;
            slice.accounts += 1;
            slice.principal_outstanding += snapshot.principal_outstanding;
            slice.total_overdue += snapshot.total_overdue;
        }
        slices
    }

    /// an account's snapshots over a date range, oldest first
    pub fn delinquency_trend(
        &self,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DelinquencySnapshot>> {
        let state = self.store.load(account_id)?;
        let mut snapshots: Vec<_> = state
            .snapshots
            .into_iter()
            .filter(|s| s.snapshot_date >= from && s.snapshot_date <= to)
            .collect();
        snapshots.sort_by_key(|s| s.snapshot_date);
        Ok(snapshots)
    }

    /// net balance owed to a partner across all of its participations
    pub fn partner_balance(&self, partner_id: crate::types::PartnerId) -> Money {
        let ledger = self.store.ledger_snapshot();
        let participation_ids: std::collections::HashSet<_> = ledger
            .entries
            .iter()
            .filter(|e| e.partner_id == partner_id)
            .map(|e| e.participation_id)
            .collect();
        participation_ids.into_iter().map(|id| ledger.balance(id)).sum()
    }

    /// arrangement status with its claims
    pub fn fldg_summary(&self, arrangement_id: ArrangementId) -> Result<crate::fldg::FldgSummary> {
        let arrangement = self.store.arrangement(arrangement_id)?;
        let utilizations = self.store.utilizations_for_arrangement(arrangement_id);
        Ok(fldg::summarize(&arrangement, &utilizations))
    }
}

/// one bucket's share of the book in a distribution view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BucketSlice {
    pub accounts: u32,
    pub principal_outstanding: Money,
    pub total_overdue: Money,
}
