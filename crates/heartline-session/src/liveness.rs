//! Liveness ticker: re-evaluates dead/alive on a wall-clock cadence.
//!
//! A heartbeat goes stale without any new event arriving, so the view has to
//! be refreshed on a timer as well as on every heartbeat change.

use std::sync::Arc;
use std::time::Duration;

use heartline_core::Heartbeat;
use heartline_core::liveness::LivenessSnapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default refresh period.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(1);

/// Wall-clock source in epoch milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

/// The system clock via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Spawn the ticker. The returned receiver always holds the snapshot for the
/// current heartbeat, refreshed every `period` and on each heartbeat change.
pub fn spawn_liveness(
    mut heartbeat_rx: watch::Receiver<Heartbeat>,
    clock: Arc<dyn Clock>,
    period: Duration,
    cancel: CancellationToken,
) -> (watch::Receiver<LivenessSnapshot>, JoinHandle<()>) {
    let initial = LivenessSnapshot::evaluate(&heartbeat_rx.borrow_and_update(), clock.now_ms());
    let (tx, rx) = watch::channel(initial);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = heartbeat_rx.changed(), if heartbeat_open => {
                    if changed.is_err() {
                        heartbeat_open = false;
                        continue;
                    }
                }
                _ = ticker.tick() => {}
            }

            let heartbeat = *heartbeat_rx.borrow_and_update();
            let snapshot = LivenessSnapshot::evaluate(&heartbeat, clock.now_ms());
            tx.send_if_modified(|current| {
                if *current == snapshot {
                    return false;
                }
                if current.dead != snapshot.dead {
                    tracing::info!(dead = snapshot.dead, ago = %snapshot.ago, "liveness changed");
                }
                *current = snapshot;
                true
            });
        }
    });

    (rx, handle)
}
