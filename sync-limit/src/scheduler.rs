use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio::time::interval_at;
use tokio::time::sleep;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::clock::WindowClock;
use crate::coordinator::SyncCoordinator;
use crate::store::CounterStore;
use crate::transport::ClusterTransport;

const WINDOW: Duration = Duration::from_secs(60);

/// Where the reset timer stands relative to the wall-clock minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Resets run on the bootstrap period; the alignment timer is armed.
    PreAlignment,
    /// Resets run once a minute, on the minute.
    Aligned,
}

/// Drives window resets and reconciliation rounds from a single loop.
///
/// The loop handles one timer event at a time: a sync round (fan-out plus the
/// merge that follows) completes before the next reset or sync tick is looked
/// at.
pub struct Scheduler<T> {
    store: Arc<CounterStore>,
    coordinator: SyncCoordinator<T>,
    clock: Arc<dyn WindowClock>,
    sync_interval: Duration,
    bootstrap_reset_interval: Duration,
    resets: Counter<u64>,
}

fn ticker(period: Duration, missed: MissedTickBehavior) -> Interval {
    // Unlike `interval`, do not fire immediately.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(missed);
    ticker
}

// A reset held up by a slow sync round still fires, but the ones after it
// stay on the original schedule.
fn reset_ticker(period: Duration) -> Interval {
    ticker(period, MissedTickBehavior::Skip)
}

impl<T> Scheduler<T>
where
    T: ClusterTransport,
{
    pub fn new(
        store: Arc<CounterStore>,
        coordinator: SyncCoordinator<T>,
        clock: Arc<dyn WindowClock>,
        sync_interval: Duration,
        bootstrap_reset_interval: Duration,
    ) -> Self {
        let meter = global::meter("scheduler");
        Self {
            store,
            coordinator,
            clock,
            sync_interval,
            bootstrap_reset_interval,
            resets: meter.u64_counter("window_resets").build(),
        }
    }

    /// Run for the lifetime of the process.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let until_aligned = self.clock.until_next_minute();
        let align = sleep(until_aligned);
        let mut reset = reset_ticker(self.bootstrap_reset_interval);
        let mut sync = ticker(self.sync_interval, MissedTickBehavior::Delay);
        let mut phase = Phase::PreAlignment;

        tokio::pin!(align);
        tokio::pin!(shutdown);

        info!(
            sync_interval = ?self.sync_interval,
            bootstrap_reset_interval = ?self.bootstrap_reset_interval,
            until_aligned = ?until_aligned,
            peers = self.coordinator.peers().len(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler shutting down");
                    break;
                }
                _ = &mut align, if phase == Phase::PreAlignment => {
                    phase = Phase::Aligned;
                    reset = reset_ticker(WINDOW);
                    info!("window resets aligned to the minute");
                }
                _ = reset.tick() => {
                    self.reset_window(phase);
                }
                _ = sync.tick() => {
                    self.sync_round().await;
                }
            }
        }
    }

    fn reset_window(&self, phase: Phase) {
        debug!(?phase, "window reset");
        self.store.reset_window();
        self.resets.add(1, &[]);
    }

    async fn sync_round(&self) {
        match self.coordinator.run_round().await {
            Ok(report) if !report.is_idle() => {
                debug!(
                    records = report.records,
                    accepted = report.accepted,
                    conflicts = report.conflicts,
                    absorbed = report.absorbed,
                    failures = report.failures.len(),
                    "sync round finished"
                );
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "error syncing counters"),
        }
        self.store.merge_pending();
    }
}
