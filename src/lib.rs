pub mod account;
pub mod calendar;
pub mod colending;
pub mod config;
pub mod decimal;
pub mod delinquency;
pub mod ecl;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fldg;
pub mod interest;
pub mod lifecycle;
pub mod payments;
pub mod schedule;
pub mod store;
pub mod types;

// re-export key types
pub use account::{LoanAccount, LoanTerms};
pub use calendar::{AdjustmentMode, BusinessCalendar};
pub use config::EngineConfig;
pub use decimal::{Money, Rate};
pub use engine::{BatchResult, CancelToken, EodResult, LoanEngine, PaymentOutcome};
pub use errors::{LoanError, Result};
pub use events::{Event, EventStore};
pub use interest::{
    AccrualEngine, BenchmarkCurve, DayCountConvention, InterestAccrual, RateSpec,
};
pub use schedule::{Frequency, Installment, RepaymentSchedule, ScheduleSpec};
pub use store::LoanStore;
pub use types::{
    AccountId, AccountStatus, ClosureKind, ComponentAmounts, DelinquencyBucket, EclStage,
    MoratoriumTreatment, NpaCategory, PaymentChannel, PrepaymentAction, RestructureKind,
    ScheduleKind,
};

// re-export external dependencies that users will need
pub use chrono;
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
