use crate::communication::shutdown::ShutdownSignal;
use crate::monitoring::query::JunctionView;
use log::{debug, info};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Logs a lane statistics block every `period` until shutdown or until the
/// kernel stops answering.
pub async fn run_stats_reporter(view: JunctionView, period: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reports = 0u64;
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                let Ok(snapshot) = view.snapshot().await else {
                    break;
                };
                info!("[STATS]\n{}", snapshot.report());
                reports += 1;
            }
        }
    }
    debug!("[STATS] reporter stopped after {} reports", reports);
}
