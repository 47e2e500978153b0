use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use acd_core::Timestamp;

const TICK_CHANNEL_CAPACITY: usize = 64;
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Source of the current wall-clock reading.
pub trait WallClock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Reads the local system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now_local()
    }
}

/// Clock whose reading only changes when told to. Clones share the reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, at: Timestamp) {
        *self.current.write() = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.write();
        if let Some(next) = current.as_naive().checked_add_signed(by) {
            *current = Timestamp::new(next);
        }
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.read()
    }
}

/// One sample of the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTick {
    pub sequence: u64,
    pub at: Timestamp,
}

/// Samples a [`WallClock`] at a fixed cadence and fans the readings out.
pub struct ClockSource;

impl ClockSource {
    /// Starts ticking. The first tick is emitted immediately.
    ///
    /// A zero interval is raised to one millisecond.
    pub fn spawn(clock: Arc<dyn WallClock>, interval: Duration) -> ClockHandle {
        let interval = if interval < MIN_TICK_INTERVAL {
            warn!(requested_ms = interval.as_millis() as u64, "tick interval too small, clamping");
            MIN_TICK_INTERVAL
        } else {
            interval
        };
        let (sender, _) = broadcast::channel(TICK_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(tick_loop(clock, interval, sender.clone(), stop_rx));

        info!(interval_ms = interval.as_millis() as u64, "clock source started");

        ClockHandle {
            sender,
            stop: stop_tx,
            task,
        }
    }
}

/// Handle to a running [`ClockSource`]. Dropping it stops the ticker.
pub struct ClockHandle {
    sender: broadcast::Sender<ClockTick>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ClockHandle {
    /// Adds an independent subscriber. Each receiver sees every tick sent after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<ClockTick> {
        self.sender.subscribe()
    }

    /// Stops ticking and waits for the ticker task to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
        info!("clock source stopped");
    }
}

async fn tick_loop(
    clock: Arc<dyn WallClock>,
    period: Duration,
    sender: broadcast::Sender<ClockTick>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let tick = ClockTick { sequence, at: clock.now() };
                // No subscribers is not an error; the next tick is sampled anyway.
                if sender.send(tick).is_err() {
                    debug!(sequence, "clock tick had no subscribers");
                }
                sequence += 1;
            }
        }
    }
}
