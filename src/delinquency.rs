use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::account::LoanAccount;
use crate::decimal::Money;
use crate::schedule::RepaymentSchedule;
use crate::types::{AccountId, DelinquencyBucket, NpaCategory};

/// boundaries driving bucket classification and NPA ageing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelinquencyConfig {
    /// upper bounds of SMA-0 / SMA-1 / SMA-2
    pub sma_boundaries: (u32, u32, u32),
    /// DPD at which an account turns NPA
    pub npa_trigger_dpd: u32,
    /// DPD at which a substandard NPA becomes doubtful
    pub doubtful_from_dpd: u32,
    /// DPD at which a doubtful NPA becomes a loss asset
    pub loss_from_dpd: u32,
}

impl Default for DelinquencyConfig {
    fn default() -> Self {
        Self {
            sma_boundaries: (30, 60, 90),
            npa_trigger_dpd: 90,
            doubtful_from_dpd: 366,
            loss_from_dpd: 1096,
        }
    }
}

impl DelinquencyConfig {
    /// bucket for a DPD value
    pub fn bucket(&self, dpd: u32) -> DelinquencyBucket {
        let (sma0, sma1, sma2) = self.sma_boundaries;
        if dpd == 0 {
            DelinquencyBucket::Current
        } else if dpd <= sma0 {
            DelinquencyBucket::Sma0
        } else if dpd <= sma1 {
            DelinquencyBucket::Sma1
        } else if dpd <= sma2 {
            DelinquencyBucket::Sma2
        } else if dpd < self.doubtful_from_dpd {
            DelinquencyBucket::NpaSubstandard
        } else if dpd < self.loss_from_dpd {
            DelinquencyBucket::NpaDoubtful
        } else {
            DelinquencyBucket::NpaLoss
        }
    }

    fn category_for_dpd(&self, dpd: u32) -> NpaCategory {
        if dpd >= self.loss_from_dpd {
            NpaCategory::Loss
        } else if dpd >= self.doubtful_from_dpd {
            NpaCategory::Doubtful
        } else {
            NpaCategory::Substandard
        }
    }
}

/// whole-day count from the oldest unpaid due date; zero when nothing is unpaid
pub fn compute_dpd(schedule: &RepaymentSchedule, as_of: NaiveDate) -> u32 {
    match schedule.oldest_unpaid() {
        Some(row) if row.due_date < as_of => (as_of - row.due_date).num_days() as u32,
        _ => 0,
    }
}

/// sticky NPA evaluation result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpaState {
    pub is_npa: bool,
    pub npa_date: Option<NaiveDate>,
    pub npa_category: Option<NpaCategory>,
    pub entered_npa: bool,
    pub exited_npa: bool,
}

/// evaluate the sticky NPA state machine.
///
/// an account enters NPA when DPD reaches the trigger and stays NPA until
/// DPD cures fully back to zero. partial payments never reset the flag.
pub fn evaluate_npa(
    dpd: u32,
    as_of: NaiveDate,
    was_npa: bool,
    existing_npa_date: Option<NaiveDate>,
    existing_category: Option<NpaCategory>,
    config: &DelinquencyConfig,
) -> NpaState {
    if dpd >= config.npa_trigger_dpd {
        NpaState {
            is_npa: true,
            npa_date: existing_npa_date.or(Some(as_of)),
            npa_category: Some(config.category_for_dpd(dpd)),
            entered_npa: !was_npa,
            exited_npa: false,
        }
    } else if was_npa && dpd > 0 {
        // sticky: below the trigger but not cured
        NpaState {
            is_npa: true,
            npa_date: existing_npa_date.or(Some(as_of)),
            npa_category: existing_category.or(Some(NpaCategory::Substandard)),
            entered_npa: false,
            exited_npa: false,
        }
    } else {
        NpaState {
            is_npa: false,
            npa_date: None,
            npa_category: None,
            entered_npa: false,
            exited_npa: was_npa,
        }
    }
}

/// daily delinquency snapshot for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelinquencySnapshot {
    pub account_id: AccountId,
    pub snapshot_date: NaiveDate,
    pub dpd: u32,
    pub bucket: DelinquencyBucket,
    pub is_npa: bool,
    pub npa_category: Option<NpaCategory>,
    pub overdue_principal: Money,
    pub overdue_interest: Money,
    pub overdue_fees: Money,
    pub total_overdue: Money,
    pub principal_outstanding: Money,
    pub missed_installments: u32,
    pub oldest_due_date: Option<NaiveDate>,
}

/// recompute DPD, bucket and sticky NPA state onto the account and
/// produce the day's snapshot
pub fn refresh_delinquency(
    account: &mut LoanAccount,
    schedule: &RepaymentSchedule,
    as_of: NaiveDate,
    config: &DelinquencyConfig,
) -> DelinquencySnapshot {
    let dpd = compute_dpd(schedule, as_of);
    let npa = evaluate_npa(dpd, as_of, account.is_npa, account.npa_date, account.npa_category, config);

    account.dpd = dpd;
    account.bucket = config.bucket(dpd);
    account.is_npa = npa.is_npa;
    account.npa_date = npa.npa_date;
    account.npa_category = npa.npa_category;

    let overdue = schedule.overdue_rows(as_of);
    let mut overdue_principal = Money::ZERO;
    let mut overdue_interest = Money::ZERO;
    let mut overdue_fees = Money::ZERO;
    for row in &overdue {
        let remaining = row.remaining();
        overdue_principal += remaining.principal;
        overdue_interest += remaining.interest;
        overdue_fees += remaining.fees;
    }

    DelinquencySnapshot {
        account_id: account.id,
        snapshot_date: as_of,
        dpd,
        bucket: account.bucket,
        is_npa: account.is_npa,
        npa_category: account.npa_category,
        overdue_principal,
        overdue_interest,
        overdue_fees,
        total_overdue: overdue_principal + overdue_interest + overdue_fees,
        principal_outstanding: account.principal_outstanding,
        missed_installments: overdue.len() as u32,
        oldest_due_date: overdue.first().map(|r| r.due_date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> DelinquencyConfig {
        DelinquencyConfig::default()
    }

    #[test]
    fn test_bucket_boundaries() {
        let c = config();
        assert_eq!(c.bucket(0), DelinquencyBucket::Current);
        assert_eq!(c.bucket(1), DelinquencyBucket::Sma0);
        assert_eq!(c.bucket(30), DelinquencyBucket::Sma0);
        assert_eq!(c.bucket(31), DelinquencyBucket::Sma1);
        assert_eq!(c.bucket(60), DelinquencyBucket::Sma1);
        assert_eq!(c.bucket(61), DelinquencyBucket::Sma2);
        assert_eq!(c.bucket(90), DelinquencyBucket::Sma2);
        assert_eq!(c.bucket(91), DelinquencyBucket::NpaSubstandard);
        assert_eq!(c.bucket(365), DelinquencyBucket::NpaSubstandard);
        assert_eq!(c.bucket(366), DelinquencyBucket::NpaDoubtful);
        assert_eq!(c.bucket(1095), DelinquencyBucket::NpaDoubtful);
        assert_eq!(c.bucket(1096), DelinquencyBucket::NpaLoss);
    }

    #[test]
    fn test_enter_npa_at_trigger() {
        let state = evaluate_npa(95, date(2025, 5, 1), false, None, None, &config());
        assert!(state.is_npa);
        assert!(state.entered_npa);
        assert_eq!(state.npa_date, Some(date(2025, 5, 1)));
        assert_eq!(state.npa_category, Some(NpaCategory::Substandard));
    }

    #[test]
    fn test_npa_sticks_through_partial_cure() {
        let entered = date(2025, 5, 1);
        let state = evaluate_npa(
            45,
            date(2025, 5, 20),
            true,
            Some(entered),
            Some(NpaCategory::Substandard),
            &config(),
        );
        assert!(state.is_npa);
        assert!(!state.entered_npa);
        assert!(!state.exited_npa);
        assert_eq!(state.npa_date, Some(entered));
    }

    #[test]
    fn test_full_cure_exits_npa() {
        let state = evaluate_npa(
            0,
            date(2025, 6, 1),
            true,
            Some(date(2025, 5, 1)),
            Some(NpaCategory::Substandard),
            &config(),
        );
        assert!(!state.is_npa);
        assert!(state.exited_npa);
        assert_eq!(state.npa_date, None);
        assert_eq!(state.npa_category, None);
    }

    #[test]
    fn test_ageing_into_doubtful_and_loss() {
        let c = config();
        let state = evaluate_npa(400, date(2026, 7, 1), true, Some(date(2025, 5, 1)), None, &c);
        assert_eq!(state.npa_category, Some(NpaCategory::Doubtful));
        let state = evaluate_npa(1200, date(2028, 9, 1), true, Some(date(2025, 5, 1)), None, &c);
        assert_eq!(state.npa_category, Some(NpaCategory::Loss));
    }

    #[test]
    fn test_dpd_zero_when_nothing_unpaid() {
        let schedule = RepaymentSchedule::default();
        assert_eq!(compute_dpd(&schedule, date(2025, 5, 1)), 0);
    }
}
