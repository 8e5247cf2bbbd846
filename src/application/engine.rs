//! Engine - the trading loop
//!
//! One polling loop owns the strategy; a tick runs to completion before
//! the next is considered, so at most one trade is ever in flight. A
//! second, independent loop publishes periodic price and balance events
//! for feed subscribers. Shutdown is cooperative: the current tick
//! finishes, no new tick starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::events::{EventBus, FeedEvent};
use crate::ports::chain::ChainPort;
use crate::ports::price::PricePort;
use crate::strategy::{ReactiveStrategy, StrategyError, TickOutcome};

pub struct Engine {
    strategy: ReactiveStrategy,
    chain: Arc<dyn ChainPort>,
    prices: Arc<dyn PricePort>,
    bus: EventBus,
    tick_interval: Duration,
    broadcast_interval: Duration,
}

impl Engine {
    pub fn new(
        strategy: ReactiveStrategy,
        chain: Arc<dyn ChainPort>,
        prices: Arc<dyn PricePort>,
        bus: EventBus,
        tick_interval: Duration,
        broadcast_interval: Duration,
    ) -> Self {
        Self {
            strategy,
            chain,
            prices,
            bus,
            tick_interval,
            broadcast_interval,
        }
    }

    /// Run until shutdown is signalled or persistence fails.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), StrategyError> {
        let broadcaster = tokio::spawn(broadcast_loop(
            self.chain.clone(),
            self.prices.clone(),
            self.bus.clone(),
            self.broadcast_interval,
            shutdown.clone(),
        ));

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                // Checked first so a pending shutdown always wins over
                // starting another tick.
                biased;
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested, finishing current tick");
                    break Ok(());
                }
                _ = interval.tick() => {
                    match self.strategy.tick().await {
                        Ok(TickOutcome::Traded(record)) => {
                            self.bus.publish(FeedEvent::trade(&record));
                        }
                        Ok(TickOutcome::Skipped(reason)) => {
                            tracing::debug!("No trade this tick: {reason}");
                        }
                        Err(e) => {
                            // Persistence failures are fatal: trading on
                            // that cannot be recorded risks a double trade
                            // after restart.
                            tracing::error!(error = %e, "Stopping trading loop");
                            break Err(e);
                        }
                    }
                }
            }
        };

        broadcaster.abort();
        tracing::info!("Engine stopped");
        result
    }
}

/// Periodic price/balance feed, decoupled from the trading cadence.
/// Failures here are logged and skipped; the feed is best-effort.
async fn broadcast_loop(
    chain: Arc<dyn ChainPort>,
    prices: Arc<dyn PricePort>,
    bus: EventBus,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if bus.subscriber_count() == 0 {
                    continue;
                }
                match prices.price().await {
                    Ok(snapshot) => bus.publish(FeedEvent::price(&snapshot)),
                    Err(e) => tracing::debug!(error = %e, "Feed price refresh failed"),
                }
                match chain.balances().await {
                    Ok(balance) => bus.publish(FeedEvent::balance(&balance)),
                    Err(e) => tracing::debug!(error = %e, "Feed balance refresh failed"),
                }
            }
        }
    }
}
