//! Outlets: the bounded set of concurrent brewing slots.
//!
//! Outlet count limits how many beverages brew at once. It never decides
//! whether a beverage is accepted; stock does that.

mod pool;
mod task;

pub use pool::{OutletPool, OutletStats, ShutdownOutcome, SubmitError};
pub use task::{BrewOutcome, BrewTask, OutletId};
