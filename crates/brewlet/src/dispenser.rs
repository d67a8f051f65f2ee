//! Dispenser: the beverage-request API.
//!
//! The dispenser owns:
//! - The recipe book (read-only after construction)
//! - Ingredient stock (atomic reserve/refill)
//! - The outlet pool (bounded concurrent brewing)
//! - The on/off switch
//!
//! A request walks each beverage through recipe lookup, reservation and
//! outlet hand-off. Stock is deducted at reservation, so later requests see
//! what is really left while earlier brews are still running. Concurrent
//! batches are not serialized against each other; the inventory's atomic
//! reservation is what keeps them from double-spending.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::{ConfigError, DispenserConfig, MachineConfig};
use crate::inventory::{Insufficient, Inventory, RefillError};
use crate::outlet::{BrewTask, OutletPool, ShutdownOutcome, SubmitError};
use crate::recipe::RecipeBook;
use crate::report::InventoryReport;
use crate::status::{DispenserStatus, Power};

/// What happened to one beverage in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeverageOutcome {
    /// Ingredients reserved and the brew queued on an outlet.
    Dispatched { beverage: String },
    /// No composition data for this name. Stock untouched.
    UnknownBeverage { beverage: String },
    /// Not enough stock. Nothing was deducted.
    Insufficient {
        beverage: String,
        shortfall: Insufficient,
    },
    /// Ingredients were deducted but the outlets had shut down.
    /// The deducted ingredients are not refunded.
    DispatchFailed {
        beverage: String,
        error: SubmitError,
    },
}

impl BeverageOutcome {
    pub fn beverage(&self) -> &str {
        match self {
            Self::Dispatched { beverage }
            | Self::UnknownBeverage { beverage }
            | Self::Insufficient { beverage, .. }
            | Self::DispatchFailed { beverage, .. } => beverage,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Result of one `request_batch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReport {
    /// The dispenser was off; nothing was looked at.
    MachineOff,
    /// One outcome per requested name, in request order.
    Processed(Vec<BeverageOutcome>),
}

impl BatchReport {
    pub fn is_machine_off(&self) -> bool {
        matches!(self, Self::MachineOff)
    }

    pub fn outcomes(&self) -> &[BeverageOutcome] {
        match self {
            Self::MachineOff => &[],
            Self::Processed(outcomes) => outcomes,
        }
    }

    pub fn dispatched(&self) -> impl Iterator<Item = &str> {
        self.outcomes()
            .iter()
            .filter(|o| o.is_dispatched())
            .map(BeverageOutcome::beverage)
    }
}

pub struct Dispenser {
    recipes: RecipeBook,
    inventory: Inventory,
    outlets: OutletPool,
    power: RwLock<Power>,
    config: DispenserConfig,
}

impl Dispenser {
    /// Build a dispenser and spawn its outlets. Must run inside a tokio runtime.
    ///
    /// Starts switched off.
    pub fn new(
        config: DispenserConfig,
        recipes: RecipeBook,
        inventory: Inventory,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let outlets = OutletPool::new(config.outlets, config.brew_duration)?;

        tracing::info!(
            outlets = config.outlets,
            beverages = recipes.len(),
            brew_duration = ?config.brew_duration,
            "Dispenser ready"
        );

        Ok(Self {
            recipes,
            inventory,
            outlets,
            power: RwLock::new(Power::Off),
            config,
        })
    }

    /// Build from a machine document with the default brew duration.
    pub fn from_machine_config(machine: &MachineConfig) -> Result<Self, ConfigError> {
        let config = machine.dispenser_config()?;
        Self::new(config, machine.recipe_book()?, machine.inventory()?)
    }

    fn power(&self) -> RwLockReadGuard<'_, Power> {
        self.power.read().unwrap_or_else(|poisoned| {
            tracing::error!("Power lock poisoned - recovering");
            poisoned.into_inner()
        })
    }

    fn power_mut(&self) -> RwLockWriteGuard<'_, Power> {
        self.power.write().unwrap_or_else(|poisoned| {
            tracing::error!("Power lock poisoned - recovering");
            poisoned.into_inner()
        })
    }

    /// Switch on. Idempotent.
    pub fn start(&self) {
        let mut power = self.power_mut();
        if !power.is_on() {
            tracing::info!("Dispenser switched on");
        }
        *power = Power::On;
    }

    /// Shut the outlets down with a grace period of twice the brew duration,
    /// then switch off whether or not they drained.
    ///
    /// New batches are refused from the moment this is called, and a batch
    /// already in progress finishes before the outlets start draining.
    /// The outlets cannot be restarted; a later `start` switches the machine
    /// back on but every accepted beverage will end as `DispatchFailed`.
    pub async fn stop(&self) -> ShutdownOutcome {
        {
            let mut power = self.power_mut();
            if power.is_on() {
                tracing::info!("Dispenser stopping, refusing new requests");
            }
            *power = Power::Stopping;
        }

        let outcome = self.outlets.shutdown(self.config.grace_period()).await;
        if !outcome.is_clean() {
            tracing::warn!(?outcome, "Unable to shut off cleanly");
        }
        *self.power_mut() = Power::Off;
        tracing::info!("Dispenser switched off");
        outcome
    }

    pub fn is_on(&self) -> bool {
        self.power().is_on()
    }

    /// Serve `names` first come, first served.
    ///
    /// Each beverage is fully decided before the next one is looked at, so an
    /// earlier entry can never lose stock to a later entry of the same batch.
    /// Failures are per beverage and never abort the batch. Returns without
    /// waiting for brews to finish.
    pub fn request_batch<S: AsRef<str>>(&self, names: &[S]) -> BatchReport {
        // Held for the whole batch so `stop` cannot switch off mid-batch.
        let power = self.power();
        if !power.is_on() {
            tracing::info!("Dispenser is not on, please switch it on first");
            return BatchReport::MachineOff;
        }

        let outcomes = names
            .iter()
            .map(|name| self.request_one(name.as_ref()))
            .collect();
        drop(power);

        BatchReport::Processed(outcomes)
    }

    fn request_one(&self, name: &str) -> BeverageOutcome {
        let beverage = name.to_string();

        let Some(recipe) = self.recipes.lookup(name) else {
            tracing::warn!(%beverage, "No composition data exists for beverage");
            return BeverageOutcome::UnknownBeverage { beverage };
        };

        if let Err(shortfall) = self.inventory.reserve_if_available(recipe) {
            tracing::info!(
                %beverage,
                missing = ?shortfall.names(),
                "Can not serve {beverage} because {shortfall}"
            );
            return BeverageOutcome::Insufficient {
                beverage,
                shortfall,
            };
        }

        tracing::info!(%beverage, "Finding outlet to prepare beverage...");
        match self.outlets.submit(BrewTask::new(name)) {
            Ok(()) => BeverageOutcome::Dispatched { beverage },
            Err(error) => {
                tracing::warn!(
                    %beverage,
                    error = %error,
                    "Unable to submit beverage because machine is off; reserved ingredients are not refunded"
                );
                BeverageOutcome::DispatchFailed { beverage, error }
            }
        }
    }

    /// Add stock. Safe to call while batches are being served.
    pub fn refill_ingredients<I, S>(&self, delta: I) -> Result<(), RefillError>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        self.inventory.refill(delta)
    }

    pub fn report_inventory(&self) -> InventoryReport {
        InventoryReport::from(self.inventory.snapshot())
    }

    pub fn status(&self) -> DispenserStatus {
        DispenserStatus {
            power: *self.power(),
            outlets: self.outlets.stats(),
        }
    }

    pub fn recipes(&self) -> &RecipeBook {
        &self.recipes
    }

    pub fn config(&self) -> &DispenserConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::sync::Barrier;
    use std::time::Duration;

    fn map(pairs: &[(&str, u32)]) -> IndexMap<String, u32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    /// `{water: 100, milk: 50}` with `tea -> {water: 50}` and
    /// `coffee -> {water: 50, milk: 60}`.
    fn tea_and_coffee(stock: &[(&str, u32)], outlets: usize) -> Dispenser {
        let mut compositions = IndexMap::new();
        compositions.insert("tea".to_string(), map(&[("water", 50)]));
        compositions.insert("coffee".to_string(), map(&[("water", 50), ("milk", 60)]));

        Dispenser::new(
            DispenserConfig::new(outlets).with_brew_duration(Duration::from_millis(10)),
            RecipeBook::from_compositions(compositions).unwrap(),
            Inventory::new(map(stock)).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn starts_off_and_rejects_whole_batch() {
        let dispenser = tea_and_coffee(&[("water", 100), ("milk", 50)], 1);
        assert!(!dispenser.is_on());

        let report = dispenser.request_batch(&["tea", "coffee"]);
        assert!(report.is_machine_off());
        assert!(report.outcomes().is_empty());
        assert_eq!(dispenser.report_inventory().get("water"), Some(100));
        assert_eq!(dispenser.status().outlets.queued, 0);
        assert_eq!(dispenser.status().outlets.brewed, 0);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let dispenser = tea_and_coffee(&[("water", 100)], 1);
        dispenser.start();
        dispenser.start();
        assert!(dispenser.is_on());
        assert_eq!(dispenser.status().power, Power::On);
    }

    #[tokio::test]
    async fn tea_then_coffee_scenario() {
        let dispenser = tea_and_coffee(&[("water", 100), ("milk", 50)], 2);
        dispenser.start();

        let report = dispenser.request_batch(&["tea", "coffee"]);
        let outcomes = report.outcomes();
        assert_eq!(
            outcomes[0],
            BeverageOutcome::Dispatched {
                beverage: "tea".to_string()
            }
        );
        let BeverageOutcome::Insufficient { beverage, shortfall } = &outcomes[1] else {
            panic!("expected coffee to be short, got {:?}", outcomes[1]);
        };
        assert_eq!(beverage, "coffee");
        assert_eq!(shortfall.names(), ["milk"]);
        assert_eq!(shortfall.shortfalls()[0].required, 60);
        assert_eq!(shortfall.shortfalls()[0].available, 50);

        let stock = dispenser.report_inventory();
        assert_eq!(stock.get("water"), Some(50));
        assert_eq!(stock.get("milk"), Some(50));
    }

    #[tokio::test]
    async fn earlier_entry_wins_scarce_stock() {
        for _ in 0..20 {
            let dispenser = tea_and_coffee(&[("water", 50), ("milk", 100)], 2);
            dispenser.start();

            let report = dispenser.request_batch(&["coffee", "tea"]);
            assert_eq!(report.dispatched().collect::<Vec<_>>(), ["coffee"]);
            assert!(matches!(
                report.outcomes()[1],
                BeverageOutcome::Insufficient { .. }
            ));
            assert_eq!(dispenser.report_inventory().get("water"), Some(0));
        }
    }

    #[tokio::test]
    async fn unknown_beverage_leaves_stock_alone() {
        let dispenser = tea_and_coffee(&[("water", 100), ("milk", 50)], 1);
        dispenser.start();

        let report = dispenser.request_batch(&["hot_damn", "tea"]);
        assert_eq!(
            report.outcomes()[0],
            BeverageOutcome::UnknownBeverage {
                beverage: "hot_damn".to_string()
            }
        );
        assert!(report.outcomes()[1].is_dispatched());
        assert_eq!(dispenser.report_inventory().get("water"), Some(50));
    }

    #[tokio::test]
    async fn dispatch_failure_keeps_deduction() {
        let dispenser = tea_and_coffee(&[("water", 100)], 1);
        dispenser.start();
        dispenser.outlets.shutdown(Duration::from_secs(1)).await;

        let report = dispenser.request_batch(&["tea"]);
        assert_eq!(
            report.outcomes()[0],
            BeverageOutcome::DispatchFailed {
                beverage: "tea".to_string(),
                error: SubmitError::Closed {
                    beverage: "tea".to_string()
                },
            }
        );
        assert_eq!(dispenser.report_inventory().get("water"), Some(50));
    }

    #[tokio::test]
    async fn stop_switches_off_and_drains() {
        let dispenser = tea_and_coffee(&[("water", 200)], 2);
        dispenser.start();
        assert_eq!(dispenser.request_batch(&["tea", "tea"]).dispatched().count(), 2);

        tokio::time::timeout(Duration::from_secs(5), async {
            while dispenser.status().outlets.brewed < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("brews never finished");

        let outcome = dispenser.stop().await;
        assert_eq!(outcome, ShutdownOutcome::Drained);
        assert!(!dispenser.is_on());

        assert!(dispenser.request_batch(&["tea"]).is_machine_off());
        assert_eq!(dispenser.report_inventory().get("water"), Some(100));
    }

    #[tokio::test(start_paused = true)]
    async fn requests_during_stop_are_refused_without_deduction() {
        let dispenser = Dispenser::new(
            DispenserConfig::new(1).with_brew_duration(Duration::from_millis(300)),
            RecipeBook::from_compositions(IndexMap::from([(
                "tea".to_string(),
                map(&[("water", 50)]),
            )]))
            .unwrap(),
            Inventory::new(map(&[("water", 200)])).unwrap(),
        )
        .unwrap();
        dispenser.start();
        assert!(dispenser.request_batch(&["tea"]).outcomes()[0].is_dispatched());

        let during_stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            (dispenser.status().power, dispenser.request_batch(&["tea", "tea"]))
        };
        let (outcome, (power, report)) = tokio::join!(dispenser.stop(), during_stop);

        assert_eq!(power, Power::Stopping);
        assert!(report.is_machine_off());
        assert_eq!(outcome, ShutdownOutcome::Drained);
        assert_eq!(dispenser.status().power, Power::Off);
        assert_eq!(dispenser.status().outlets.brewed, 1);
        assert_eq!(dispenser.report_inventory().get("water"), Some(150));
    }

    #[tokio::test]
    async fn refill_then_report() {
        let dispenser = tea_and_coffee(&[("water", 10), ("milk", 50)], 1);
        dispenser.refill_ingredients([("water", 90), ("sugar", 5)]).unwrap();

        let stock = dispenser.report_inventory();
        assert_eq!(stock.get("water"), Some(100));
        assert_eq!(stock.get("milk"), Some(50));
        assert_eq!(stock.get("sugar"), Some(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_single_tea_batches_serve_exactly_one() {
        for _ in 0..20 {
            let dispenser = tea_and_coffee(&[("water", 50)], 2);
            dispenser.start();
            let barrier = &Barrier::new(2);
            let dispenser = &dispenser;

            let reports: Vec<BatchReport> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        s.spawn(move || {
                            barrier.wait();
                            dispenser.request_batch(&["tea"])
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let served = reports.iter().flat_map(|r| r.dispatched()).count();
            let short = reports
                .iter()
                .flat_map(|r| r.outcomes())
                .filter(|o| matches!(o, BeverageOutcome::Insufficient { .. }))
                .count();
            assert_eq!(served, 1);
            assert_eq!(short, 1);
            assert_eq!(dispenser.report_inventory().get("water"), Some(0));
        }
    }
}
