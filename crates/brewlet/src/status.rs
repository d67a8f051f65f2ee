//! Power state and status snapshots.

use serde::{Deserialize, Serialize};

use crate::outlet::OutletStats;

/// Whether the dispenser accepts beverage requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    #[default]
    Off,
    On,
    /// `stop` is draining the outlets. Requests are refused as if off.
    Stopping,
}

impl Power {
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

/// Snapshot of the dispenser for operators and health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispenserStatus {
    pub power: Power,
    pub outlets: OutletStats,
}

impl DispenserStatus {
    /// On, but every outlet is brewing.
    pub fn is_busy(&self) -> bool {
        self.power.is_on() && self.outlets.brewing >= self.outlets.capacity
    }
}
