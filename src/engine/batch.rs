use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::ecl::EclPortfolioSummary;
use crate::engine::LoanEngine;
use crate::errors::{LoanError, Result};
use crate::types::AccountId;

/// cancellation signal with an optional deadline; batches check it
/// between accounts and return the partial result
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), deadline: None }
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), deadline: Some(Instant::now() + timeout) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// a single account's failure inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub account_id: AccountId,
    pub error: String,
}

/// aggregate outcome of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub as_of: NaiveDate,
    pub processed: u32,
    pub succeeded: u32,
    pub failed: Vec<BatchFailure>,
    /// accounts skipped because the run was cancelled
    pub skipped: u32,
}

impl BatchResult {
    pub fn failed_count(&self) -> u32 {
        self.failed.len() as u32
    }
}

enum TaskOutcome {
    Succeeded,
    Failed(BatchFailure),
    Fatal(LoanError),
    Skipped,
}

/// end-of-day orchestration outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EodResult {
    pub as_of: NaiveDate,
    pub accrual: BatchResult,
    pub delinquency: BatchResult,
    /// present only on month-end runs
    pub ecl: Option<BatchResult>,
}

fn is_month_end(date: NaiveDate) -> bool {
    date.succ_opt().map(|next| next.month() != date.month()).unwrap_or(true)
}

impl LoanEngine {
    /// fan a per-account operation across the worker pool. each account
    /// runs in its own transaction; one failure never poisons the rest.
    /// fatal errors indicate corruption and abort the batch.
    fn run_batch(
        &self,
        label: &str,
        as_of: NaiveDate,
        cancel: &CancelToken,
        op: impl Fn(AccountId) -> Result<()> + Sync,
    ) -> Result<BatchResult> {
        let ids = self.store().active_account_ids();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config().worker_pool_size)
            .build()
            .map_err(|e| LoanError::Transient { message: e.to_string() })?;

        let outcomes: Vec<TaskOutcome> = pool.install(|| {
            ids.par_iter()
                .map(|&id| {
                    if cancel.is_cancelled() {
                        return TaskOutcome::Skipped;
                    }
                    match op(id) {
                        Ok(()) => TaskOutcome::Succeeded,
                        Err(err) if err.is_fatal() => TaskOutcome::Fatal(err),
                        Err(err) => {
                            warn!(account_id = %id, error = %err, "batch item failed");
                            TaskOutcome::Failed(BatchFailure {
                                account_id: id,
                                error: err.to_string(),
                            })
                        }
                    }
                })
                .collect()
        });

        let mut result =
            BatchResult { as_of, processed: 0, succeeded: 0, failed: Vec::new(), skipped: 0 };
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Succeeded => {
                    result.processed += 1;
                    result.succeeded += 1;
                }
                TaskOutcome::Failed(failure) => {
                    result.processed += 1;
                    result.failed.push(failure);
                }
                TaskOutcome::Fatal(err) => return Err(err),
                TaskOutcome::Skipped => result.skipped += 1,
            }
        }

        info!(
            batch = label,
            %as_of,
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed.len(),
            skipped = result.skipped,
            "batch complete"
        );
        Ok(result)
    }

    /// daily interest accrual over the active book, catching up every
    /// date since each account's last accrual
    pub fn run_accrual_batch(&self, as_of: NaiveDate, cancel: &CancelToken) -> Result<BatchResult> {
        self.run_batch("accrual", as_of, cancel, |id| {
            let state = self.store().load(id)?;
            let account = state.account()?;
            // not yet disbursed as of this date
            if account.disbursement_date > as_of {
                return Ok(());
            }
            let from = account
                .last_accrual_date
                .and_then(|d| d.succ_opt())
                .unwrap_or(account.disbursement_date)
                .max(account.disbursement_date);
            if from > as_of {
                return Ok(());
            }
            self.accrue_range(id, from, as_of).map(|_| ())
        })
    }

    /// daily DPD / bucket / NPA refresh over the active book
    pub fn run_delinquency_batch(
        &self,
        as_of: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<BatchResult> {
        self.run_batch("delinquency", as_of, cancel, |id| {
            self.refresh_delinquency(id, as_of).map(|_| ())
        })
    }

    /// month-end ECL staging and provisioning, with a portfolio summary
    pub fn run_monthly_ecl(
        &self,
        as_of: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<(BatchResult, EclPortfolioSummary)> {
        let result = self.run_batch("ecl", as_of, cancel, |id| {
            self.provision_account(id, as_of).map(|_| ())
        })?;

        // aggregate the provisions written on this date
        let provisions: Vec<_> = self
            .store()
            .account_ids()
            .into_iter()
            .filter_map(|id| self.store().load(id).ok())
            .flat_map(|state| {
                state
                    .provisions
                    .iter()
                    .filter(|p| p.provision_date == as_of)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        let summary = EclPortfolioSummary::from_provisions(as_of, &provisions);
        self.store().record_summary(summary.clone());
        Ok((result, summary))
    }

    /// end-of-day orchestration: accrual, then delinquency, then ECL on
    /// month-end dates
    pub fn run_eod(&self, as_of: NaiveDate, cancel: &CancelToken) -> Result<EodResult> {
        info!(%as_of, "end-of-day run started");
        let accrual = self.run_accrual_batch(as_of, cancel)?;
        let delinquency = self.run_delinquency_batch(as_of, cancel)?;
        let ecl = if is_month_end(as_of) && !cancel.is_cancelled() {
            Some(self.run_monthly_ecl(as_of, cancel)?.0)
        } else {
            None
        };

        Ok(EodResult { as_of, accrual, delinquency, ecl })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_end_detection() {
        assert!(is_month_end(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()));
        assert!(is_month_end(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert!(is_month_end(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()));
        assert!(!is_month_end(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap()));
        assert!(!is_month_end(NaiveDate::from_ymd_opt(2025, 1, 30).unwrap()));
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());

        let expired = CancelToken::with_deadline(Duration::ZERO);
        assert!(expired.is_cancelled());
    }
}
