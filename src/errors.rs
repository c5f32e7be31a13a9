use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::AccountStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoanError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount { amount: Money },

    #[error("account not found: {id}")]
    AccountNotFound { id: Uuid },

    #[error("entity not found: {entity} {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("account not open: current status is {status:?}")]
    AccountNotOpen { status: AccountStatus },

    #[error("conflicting state: {message}")]
    ConflictingState { message: String },

    #[error("schedule already exists for account {account_id}")]
    ScheduleExists { account_id: Uuid },

    #[error("no benchmark publication on or before {as_of} for series {benchmark_id}")]
    BenchmarkUnavailable { benchmark_id: Uuid, as_of: NaiveDate },

    #[error("FLDG balance exhausted on arrangement {arrangement_id}")]
    FldgExhausted { arrangement_id: Uuid },

    #[error("operation cancelled")]
    Cancelled,

    #[error("transient storage failure: {message}")]
    Transient { message: String },

    #[error("invariant violation: {message}")]
    Fatal { message: String },
}

impl LoanError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        LoanError::InvalidInput { message: message.into() }
    }

    pub fn conflicting_state(message: impl Into<String>) -> Self {
        LoanError::ConflictingState { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        LoanError::Fatal { message: message.into() }
    }

    /// fatal errors abort batch orchestration; everything else is recorded per account
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoanError::Fatal { .. })
    }

    /// the caller may retry transient failures
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoanError::Transient { .. })
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;
