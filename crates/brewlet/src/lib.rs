//! brewlet: concurrent multi-outlet beverage dispenser.
//!
//! Callers on any thread submit ordered batches of beverage names. Each
//! beverage's ingredients are reserved atomically from shared stock, then the
//! brew is queued onto a fixed number of outlets.

mod config;
mod dispenser;
mod inventory;
mod recipe;
mod report;
mod status;

pub mod outlet;

pub use config::{ConfigError, DispenserConfig, Machine, MachineConfig, Outlets};
pub use dispenser::{BatchReport, BeverageOutcome, Dispenser};
pub use inventory::{Insufficient, Inventory, RefillError, Shortfall};
pub use outlet::{OutletPool, OutletStats, ShutdownOutcome, SubmitError};
pub use recipe::{Recipe, RecipeBook};
pub use report::{InventoryReport, StockLevel};
pub use status::{DispenserStatus, Power};

/// brewlet version from Cargo.toml
pub const BREWLET_VERSION: &str = env!("CARGO_PKG_VERSION");
