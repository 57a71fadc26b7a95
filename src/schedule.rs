//! Cancellable repeating tasks bound to the lifetime of their owner.
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Handle to a repeating task. Dropping it cancels the timer; requests the
/// task already dispatched keep running and are discarded by their owner.
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Runs `tick` every `every`, first after one full period. Each tick is
    /// spawned on its own, so a slow round trip never delays the next tick.
    pub fn every<F, Fut>(name: &'static str, every: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tokio::spawn(tick());
            }
        });
        debug!(task = name, ?every, "scheduled task started");
        Self { name, handle }
    }

    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(task = self.name, "scheduled task cancelled");
    }
}
