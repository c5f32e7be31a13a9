use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::account::LoanAccount;
use crate::calendar::BusinessCalendar;
use crate::colending::{Participation, PartnerLedger, ServicerTerms};
use crate::delinquency::DelinquencySnapshot;
use crate::ecl::{EclPortfolioSummary, EclProvision, EclStaging};
use crate::errors::{LoanError, Result};
use crate::fldg::{FldgArrangement, FldgRecovery, FldgUtilization};
use crate::interest::{BenchmarkCurve, InterestAccrual};
use crate::lifecycle::{Prepayment, RestructureEvent, WriteOff, WriteOffRecovery};
use crate::payments::{Payment, PaymentAllocation};
use crate::schedule::RepaymentSchedule;
use crate::types::{AccountId, ArrangementId, BenchmarkId, CalendarId, UtilizationId, WriteOffId};

/// everything owned by one account; cloned at the start of a unit of work
/// and written back only on commit
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    pub account: Option<LoanAccount>,
    pub schedule: RepaymentSchedule,
    pub payments: Vec<Payment>,
    pub allocations: Vec<PaymentAllocation>,
    pub accruals: Vec<InterestAccrual>,
    pub snapshots: Vec<DelinquencySnapshot>,
    pub participations: Vec<Participation>,
    pub servicer_terms: Option<ServicerTerms>,
    pub prepayments: Vec<Prepayment>,
    pub restructures: Vec<RestructureEvent>,
    pub write_offs: Vec<WriteOff>,
    pub write_off_recoveries: Vec<WriteOffRecovery>,
    pub provisions: Vec<EclProvision>,
    pub stagings: Vec<EclStaging>,
}

impl AccountState {
    pub fn account(&self) -> Result<&LoanAccount> {
        self.account.as_ref().ok_or(LoanError::Transient {
            message: "account state loaded without an account row".into(),
        })
    }

    pub fn account_mut(&mut self) -> Result<&mut LoanAccount> {
        self.account.as_mut().ok_or(LoanError::Transient {
            message: "account state loaded without an account row".into(),
        })
    }

    /// payment previously recorded under an external reference
    pub fn payment_by_ref(&self, external_ref: &str) -> Option<&Payment> {
        self.payments.iter().find(|p| p.external_ref == external_ref)
    }

    /// non-reversed accrual for a date, if any
    pub fn accrual_for(&self, date: chrono::NaiveDate) -> Option<&InterestAccrual> {
        self.accruals.iter().find(|a| {
            a.accrual_date == date && a.status != crate::interest::AccrualStatus::Reversed
        })
    }

    pub fn latest_accrual(&self) -> Option<&InterestAccrual> {
        self.accruals
            .iter()
            .filter(|a| a.status != crate::interest::AccrualStatus::Reversed)
            .max_by_key(|a| a.accrual_date)
    }

    pub fn live_write_off(&self) -> Option<&WriteOff> {
        self.write_offs.last()
    }
}

/// in-memory repository honouring the transactional contract: one unit of
/// work per account under an exclusive logical lock, commit-or-discard.
/// a relational store can be slotted behind the same surface.
#[derive(Default)]
pub struct LoanStore {
    states: RwLock<HashMap<AccountId, AccountState>>,
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,

    // shared derived state
    arrangements: Mutex<HashMap<ArrangementId, FldgArrangement>>,
    utilizations: Mutex<HashMap<UtilizationId, FldgUtilization>>,
    fldg_recoveries: Mutex<Vec<FldgRecovery>>,
    ledger: Mutex<PartnerLedger>,
    summaries: Mutex<Vec<EclPortfolioSummary>>,

    // read-mostly resources, replaced wholesale on reload
    calendars: RwLock<HashMap<CalendarId, BusinessCalendar>>,
    benchmarks: RwLock<BTreeMap<BenchmarkId, BenchmarkCurve>>,
}

impl LoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// the logical lock serializing operations on one account
    pub fn account_lock(&self, id: AccountId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub fn insert_account(&self, account: LoanAccount) -> Result<()> {
        let mut states = self.states.write();
        if states.contains_key(&account.id) {
            return Err(LoanError::conflicting_state("account already exists"));
        }
        let id = account.id;
        let mut state = AccountState::default();
        state.schedule.account_id = id;
        state.account = Some(account);
        states.insert(id, state);
        Ok(())
    }

    /// working copy for a unit of work
    pub fn load(&self, id: AccountId) -> Result<AccountState> {
        self.states
            .read()
            .get(&id)
            .cloned()
            .ok_or(LoanError::AccountNotFound { id })
    }

    /// write back a completed unit of work
    pub fn commit(&self, id: AccountId, state: AccountState) {
        self.states.write().insert(id, state);
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        self.states.read().keys().copied().collect()
    }

    /// ids of accounts still on the active book
    pub fn active_account_ids(&self) -> Vec<AccountId> {
        self.states
            .read()
            .iter()
            .filter(|(_, s)| s.account.as_ref().is_some_and(|a| a.is_active()))
            .map(|(id, _)| *id)
            .collect()
    }

    // -- FLDG ----------------------------------------------------------

    pub fn insert_arrangement(&self, arrangement: FldgArrangement) {
        self.arrangements.lock().insert(arrangement.id, arrangement);
    }

    pub fn arrangement(&self, id: ArrangementId) -> Result<FldgArrangement> {
        self.arrangements
            .lock()
            .get(&id)
            .cloned()
            .ok_or(LoanError::NotFound { entity: "fldg arrangement", id })
    }

    pub fn commit_arrangement(&self, arrangement: FldgArrangement) {
        self.arrangements.lock().insert(arrangement.id, arrangement);
    }

    pub fn utilization(&self, id: UtilizationId) -> Result<FldgUtilization> {
        self.utilizations
            .lock()
            .get(&id)
            .cloned()
            .ok_or(LoanError::NotFound { entity: "fldg utilization", id })
    }

    pub fn commit_utilization(&self, utilization: FldgUtilization) {
        self.utilizations.lock().insert(utilization.id, utilization);
    }

    pub fn utilization_for_account(
        &self,
        arrangement_id: ArrangementId,
        account_id: AccountId,
    ) -> Option<FldgUtilization> {
        self.utilizations
            .lock()
            .values()
            .find(|u| u.arrangement_id == arrangement_id && u.account_id == account_id)
            .cloned()
    }

    pub fn record_fldg_recovery(&self, recovery: FldgRecovery) {
        self.fldg_recoveries.lock().push(recovery);
    }

    pub fn fldg_recoveries_for(&self, utilization_id: UtilizationId) -> Vec<FldgRecovery> {
        self.fldg_recoveries
            .lock()
            .iter()
            .filter(|r| r.utilization_id == utilization_id)
            .cloned()
            .collect()
    }

    // -- partner ledger ------------------------------------------------

    pub fn with_ledger<R>(&self, f: impl FnOnce(&mut PartnerLedger) -> R) -> R {
        f(&mut self.ledger.lock())
    }

    pub fn ledger_snapshot(&self) -> PartnerLedger {
        self.ledger.lock().clone()
    }

    // -- ECL summaries -------------------------------------------------

    pub fn record_summary(&self, summary: EclPortfolioSummary) {
        self.summaries.lock().push(summary);
    }

    pub fn latest_summary(&self) -> Option<EclPortfolioSummary> {
        self.summaries.lock().last().cloned()
    }

    // -- read-mostly resources -----------------------------------------

    pub fn load_calendar(&self, calendar: BusinessCalendar) {
        self.calendars.write().insert(calendar.id, calendar);
    }

    pub fn calendar(&self, id: CalendarId) -> Result<BusinessCalendar> {
        self.calendars
            .read()
            .get(&id)
            .cloned()
            .ok_or(LoanError::NotFound { entity: "calendar", id })
    }

    /// replace all calendars; the explicit refresh hook for the cache
    pub fn reload_calendars(&self, calendars: impl IntoIterator<Item = BusinessCalendar>) {
        let mut map = self.calendars.write();
        map.clear();
        map.extend(calendars.into_iter().map(|c| (c.id, c)));
    }

    pub fn load_benchmark(&self, curve: BenchmarkCurve) {
        self.benchmarks.write().insert(curve.id, curve);
    }

    pub fn publish_benchmark_rate(
        &self,
        id: BenchmarkId,
        effective_date: chrono::NaiveDate,
        rate: crate::decimal::Rate,
    ) -> Result<()> {
        let mut curves = self.benchmarks.write();
        let curve = curves.get_mut(&id).ok_or(LoanError::NotFound { entity: "benchmark", id })?;
        curve.publish(effective_date, rate);
        Ok(())
    }

    pub fn benchmarks(&self) -> BTreeMap<BenchmarkId, BenchmarkCurve> {
        self.benchmarks.read().clone()
    }

    /// replace all benchmark curves; the explicit refresh hook for the cache
    pub fn reload_benchmarks(&self, curves: impl IntoIterator<Item = BenchmarkCurve>) {
        let mut map = self.benchmarks.write();
        map.clear();
        map.extend(curves.into_iter().map(|c| (c.id, c)));
    }

    // -- lookups across accounts ---------------------------------------

    pub fn utilizations_for_arrangement(&self, arrangement_id: ArrangementId) -> Vec<FldgUtilization> {
        self.utilizations
            .lock()
            .values()
            .filter(|u| u.arrangement_id == arrangement_id)
            .cloned()
            .collect()
    }

    pub fn write_off(&self, id: WriteOffId) -> Result<(AccountId, WriteOff)> {
        let states = self.states.read();
        for (account_id, state) in states.iter() {
            if let Some(w) = state.write_offs.iter().find(|w| w.id == id) {
                return Ok((*account_id, w.clone()));
            }
        }
        Err(LoanError::NotFound { entity: "write-off", id })
    }
}
