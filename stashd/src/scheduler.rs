//! Periodic ledger sweeps.
//!
//! Every tick runs the slot lifecycle, then deposit and withdrawal expiry.
//! A failed sweep is logged and simply runs again on the next tick.

use stash_domain::{now_unix, UnixSeconds};
use stash_engine::{EngineError, Exchange, SweepReport};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one tick changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub slots: SweepReport,
    pub deposits_expired: u64,
    pub withdrawals_expired: u64,
}

/// Run sweeps every `interval` until `shutdown` fires.
pub async fn run_sweeps(exchange: Exchange, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = interval.as_secs(), "Sweep scheduler started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = sweep_once(&exchange, now_unix()).await;
                if report != TickReport::default() {
                    info!(?report, "Sweep applied changes");
                }
            }
        }
    }
    debug!("Sweep scheduler stopped");
}

/// One pass of every sweep at time `now`; failures are logged, not returned.
pub async fn sweep_once(exchange: &Exchange, now: UnixSeconds) -> TickReport {
    let mut report = TickReport::default();

    match exchange.sweep_slots(now).await {
        Ok(slots) => report.slots = slots,
        Err(e) => log_failure("slots", &e),
    }
    match exchange.sweep_deposits(now).await {
        Ok(expired) => report.deposits_expired = expired,
        Err(e) => log_failure("deposits", &e),
    }
    match exchange.sweep_withdrawals(now).await {
        Ok(expired) => report.withdrawals_expired = expired,
        Err(e) => log_failure("withdrawals", &e),
    }

    report
}

fn log_failure(sweep: &str, err: &EngineError) {
    if err.is_fatal() {
        error!(sweep, error = %err, "Sweep hit a custody violation");
    } else {
        warn!(sweep, error = %err, "Sweep failed, retrying next tick");
    }
}
