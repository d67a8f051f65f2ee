//! Brew tasks and outlet identity.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Stable identity of one outlet, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutletId(usize);

impl OutletId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for OutletId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "outlet-{}", self.0)
    }
}

/// How a brew ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrewOutcome {
    Brewed,
    /// Cancelled after the shutdown deadline passed.
    Abandoned,
}

/// One accepted beverage waiting for, or occupying, an outlet.
///
/// Ingredients were deducted when the task was created; finishing or
/// abandoning it has no effect on stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrewTask {
    beverage: String,
}

impl BrewTask {
    pub fn new(beverage: impl Into<String>) -> Self {
        Self {
            beverage: beverage.into(),
        }
    }

    pub fn beverage(&self) -> &str {
        &self.beverage
    }

    pub(crate) async fn brew(
        self,
        outlet: OutletId,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> BrewOutcome {
        tracing::info!(%outlet, beverage = %self.beverage, "Preparing beverage...");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(%outlet, beverage = %self.beverage, "Beverage was interrupted");
                BrewOutcome::Abandoned
            }
            _ = tokio::time::sleep(duration) => {
                tracing::info!(%outlet, beverage = %self.beverage, "Beverage is prepared");
                BrewOutcome::Brewed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outlet_id_display() {
        assert_eq!(OutletId::new(2).to_string(), "outlet-2");
        assert_eq!(OutletId::new(2).index(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn brew_runs_for_duration() {
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let outcome = BrewTask::new("hot_tea")
            .brew(OutletId::new(0), Duration::from_secs(5), &cancel)
            .await;

        assert_eq!(outcome, BrewOutcome::Brewed);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancelled_brew_is_abandoned() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = BrewTask::new("hot_tea")
            .brew(OutletId::new(0), Duration::from_secs(60), &cancel)
            .await;

        assert_eq!(outcome, BrewOutcome::Abandoned);
    }
}
