//! Ticker-driven sweeper (`spec.md` §4.6.4, §2.7). Runs as a background
//! tokio task spawned from `main`; failures are logged and retried on the
//! next tick rather than propagated.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::SessionEngine;

pub async fn run(engine: Arc<SessionEngine>, sweep_interval: Duration) {
    let mut ticker = tokio::time::interval(sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let swept = engine.sweep_expired().await;
        if swept > 0 {
            tracing::info!(swept, "reaper: sweep complete");
        }
    }
}
