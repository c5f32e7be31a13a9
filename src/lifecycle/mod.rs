pub mod closure;
pub mod prepayment;
pub mod restructure;

pub use closure::{WriteOff, WriteOffRecovery};
pub use prepayment::{PayoffQuote, Prepayment, PrepaymentImpact};
pub use restructure::{RestructureEvent, RestructureRequest};
