//! Structured stock reports.
//!
//! The core hands out data; rendering is left to whoever consumes it. The
//! [`std::fmt::Display`] impl is the numbered table operators are used to.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub ingredient: String,
    pub quantity: u32,
}

/// Snapshot of every ingredient level, in inventory order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct InventoryReport {
    levels: Vec<StockLevel>,
}

impl InventoryReport {
    pub fn levels(&self) -> &[StockLevel] {
        &self.levels
    }

    pub fn get(&self, ingredient: &str) -> Option<u32> {
        self.levels
            .iter()
            .find(|l| l.ingredient == ingredient)
            .map(|l| l.quantity)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl From<IndexMap<String, u32>> for InventoryReport {
    fn from(levels: IndexMap<String, u32>) -> Self {
        Self {
            levels: levels
                .into_iter()
                .map(|(ingredient, quantity)| StockLevel {
                    ingredient,
                    quantity,
                })
                .collect(),
        }
    }
}

impl fmt::Display for InventoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-----CURRENT INGREDIENT STOCK-----")?;
        for (i, level) in self.levels.iter().enumerate() {
            writeln!(f, "{}. {} : {}", i + 1, level.ingredient, level.quantity)?;
        }
        Ok(())
    }
}
