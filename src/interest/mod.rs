pub mod accrual;
pub mod daycount;
pub mod floating;

pub use accrual::{AccrualEngine, AccrualStatus, InterestAccrual};
pub use daycount::DayCountConvention;
pub use floating::{effective_rate, BenchmarkCurve, BenchmarkSource, RateReset, RateSpec};
