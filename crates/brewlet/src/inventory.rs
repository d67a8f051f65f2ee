//! Shared ingredient stock.
//!
//! Levels are only reachable through compound operations that run under one
//! lock: [`Inventory::reserve_if_available`] checks and deducts every
//! ingredient of a recipe as a single step, and [`Inventory::refill`] applies
//! every delta as a single step. No caller can compose a read with a later
//! write, so levels never go negative and no update is lost.

use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;

use crate::config::ConfigError;
use crate::recipe::Recipe;

/// One ingredient a recipe could not get enough of.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Shortfall {
    pub ingredient: String,
    pub required: u32,
    pub available: u32,
}

/// A rejected reservation. Lists every unsatisfied ingredient, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} is not sufficient/available", self.names().join(", "))]
pub struct Insufficient {
    shortfalls: Vec<Shortfall>,
}

impl Insufficient {
    pub fn shortfalls(&self) -> &[Shortfall] {
        &self.shortfalls
    }

    pub fn names(&self) -> Vec<&str> {
        self.shortfalls
            .iter()
            .map(|s| s.ingredient.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefillError {
    #[error("refilling {ingredient} by {delta} would overflow its level of {current}")]
    Overflow {
        ingredient: String,
        current: u32,
        /// Sum of every delta given for `ingredient` in the refill.
        delta: u64,
    },
}

#[derive(Debug, Default)]
pub struct Inventory {
    levels: Mutex<IndexMap<String, u32>>,
}

impl Inventory {
    pub fn new(levels: IndexMap<String, u32>) -> Result<Self, ConfigError> {
        if levels.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::EmptyName { what: "ingredient" });
        }
        Ok(Self {
            levels: Mutex::new(levels),
        })
    }

    /// Lock the levels, recovering from poison.
    ///
    /// Every mutation is computed before anything is written, so a panic while
    /// the lock is held cannot leave a half-applied reservation behind.
    fn levels(&self) -> MutexGuard<'_, IndexMap<String, u32>> {
        self.levels.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Inventory mutex poisoned - recovering stock levels");
            poisoned.into_inner()
        })
    }

    /// Deduct all of `recipe`'s ingredients, or none of them.
    pub fn reserve_if_available(&self, recipe: &Recipe) -> Result<(), Insufficient> {
        let mut levels = self.levels();

        let shortfalls: Vec<Shortfall> = recipe
            .ingredients()
            .filter_map(|(ingredient, required)| {
                let available = levels.get(ingredient).copied().unwrap_or(0);
                (available < required).then(|| Shortfall {
                    ingredient: ingredient.to_string(),
                    required,
                    available,
                })
            })
            .collect();

        if !shortfalls.is_empty() {
            return Err(Insufficient { shortfalls });
        }

        for (ingredient, required) in recipe.ingredients() {
            if let Some(level) = levels.get_mut(ingredient) {
                *level -= required;
            }
        }
        Ok(())
    }

    /// Add each delta to its level, creating unknown ingredients at zero.
    ///
    /// All-or-nothing: if any level would overflow nothing is changed.
    pub fn refill<I, S>(&self, delta: I) -> Result<(), RefillError>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        // Widened so repeated keys can be summed before the level is consulted.
        let mut merged: IndexMap<String, u64> = IndexMap::new();
        for (ingredient, amount) in delta {
            let pending = merged.entry(ingredient.into()).or_insert(0);
            *pending = pending.saturating_add(u64::from(amount));
        }

        let mut levels = self.levels();

        let mut updated = Vec::with_capacity(merged.len());
        for (ingredient, amount) in merged {
            let current = levels.get(&ingredient).copied().unwrap_or(0);
            let next = u32::try_from(u64::from(current).saturating_add(amount)).map_err(|_| {
                RefillError::Overflow {
                    ingredient: ingredient.clone(),
                    current,
                    delta: amount,
                }
            })?;
            updated.push((ingredient, current, next));
        }

        for (ingredient, last, current) in updated {
            tracing::info!(%ingredient, last, current, "Refilled ingredient");
            levels.insert(ingredient, current);
        }
        Ok(())
    }

    /// Point-in-time copy of every level, in insertion order.
    pub fn snapshot(&self) -> IndexMap<String, u32> {
        self.levels().clone()
    }
}
