use super::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Fixed-rate broadcast loop.
///
/// Wakes at a wall-clock cadence independent of message arrival and runs
/// one fanout per tick. The scheduler owns its task: dropping it cancels
/// the loop, so the tick cannot outlive the server that spawned it.
pub struct Scheduler {
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub fn spawn(registry: Arc<Registry>, hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(hz));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                registry.fanout().await;
            }
        });
        log::info!("broadcasting snapshots at {}hz", hz);
        Self { handle }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
