//! Machine configuration.
//!
//! The document shape is the dispenser's JSON input:
//!
//! ```json
//! {
//!   "machine": {
//!     "outlets": { "count_n": 3 },
//!     "total_items_quantity": { "hot_water": 500 },
//!     "beverages": { "hot_tea": { "hot_water": 200 } }
//!   }
//! }
//! ```
//!
//! Loading is plain dependency injection: callers read a [`MachineConfig`],
//! derive the parts they need and hand them to [`crate::Dispenser::new`].

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::inventory::Inventory;
use crate::recipe::RecipeBook;

/// Configuration errors. All of them are fatal at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed machine config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("number of outlets should be > 0, got {0}")]
    InvalidOutlets(i64),

    #[error("{what} name must not be empty")]
    EmptyName { what: &'static str },

    #[error("beverage {beverage} has no ingredients")]
    EmptyRecipe { beverage: String },

    #[error("beverage {beverage} requires zero {ingredient}; quantities must be > 0")]
    ZeroQuantity { beverage: String, ingredient: String },

    #[error("outlet pool must be created inside a tokio runtime")]
    NoRuntime,
}

/// Top-level machine document.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    pub machine: Machine,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Machine {
    pub outlets: Outlets,

    #[serde(rename = "total_items_quantity", default)]
    pub ingredients: IndexMap<String, u32>,

    #[serde(rename = "beverages", default)]
    pub beverages: IndexMap<String, IndexMap<String, u32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Outlets {
    /// Signed so that a non-positive count surfaces as [`ConfigError::InvalidOutlets`]
    /// instead of a generic parse failure.
    #[serde(rename = "count_n")]
    pub count: i64,
}

impl MachineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!(
            path = %path.display(),
            outlets = config.machine.outlets.count,
            ingredients = config.machine.ingredients.len(),
            beverages = config.machine.beverages.len(),
            "Loaded machine config"
        );
        Ok(config)
    }

    /// Outlet count and default brew timing. Fails on a non-positive count.
    pub fn dispenser_config(&self) -> Result<DispenserConfig, ConfigError> {
        let count = self.machine.outlets.count;
        let outlets = usize::try_from(count)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::InvalidOutlets(count))?;
        Ok(DispenserConfig::new(outlets))
    }

    pub fn recipe_book(&self) -> Result<RecipeBook, ConfigError> {
        RecipeBook::from_compositions(self.machine.beverages.clone())
    }

    pub fn inventory(&self) -> Result<Inventory, ConfigError> {
        Inventory::new(self.machine.ingredients.clone())
    }
}

/// Runtime settings for a [`crate::Dispenser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispenserConfig {
    pub outlets: usize,
    pub brew_duration: Duration,
}

impl DispenserConfig {
    pub const DEFAULT_BREW_DURATION: Duration = Duration::from_secs(5);

    pub fn new(outlets: usize) -> Self {
        Self {
            outlets,
            brew_duration: Self::DEFAULT_BREW_DURATION,
        }
    }

    pub fn with_brew_duration(mut self, brew_duration: Duration) -> Self {
        self.brew_duration = brew_duration;
        self
    }

    /// How long `stop` waits for queued and in-flight brews.
    pub fn grace_period(&self) -> Duration {
        self.brew_duration.saturating_mul(2)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.outlets == 0 {
            return Err(ConfigError::InvalidOutlets(0));
        }
        Ok(())
    }
}
