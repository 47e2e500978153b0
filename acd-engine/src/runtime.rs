use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use acd_core::{CoreConfig, FormulaVariant, Timestamp};

use crate::clock::{ClockHandle, ClockSource, ClockTick, WallClock};
use crate::error::EngineError;
use crate::formula::ComputationResult;
use crate::presenter::{clock_display, ClockDisplay};
use crate::scheduler::{EngineEvent, EngineSnapshot, RecomputeScheduler};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Live clock reading published to display subscribers, including while editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveClock {
    pub at: Timestamp,
    pub display: ClockDisplay,
    pub editing: bool,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    SelectVariant(FormulaVariant, Reply<bool>),
    Calculate(Reply<Result<ComputationResult, EngineError>>),
    BeginEdit(Reply<Option<Timestamp>>),
    UpdateDraft(String, Reply<Result<Timestamp, EngineError>>),
    ApplyEdit(Reply<Result<ComputationResult, EngineError>>),
    CancelEdit(Reply<Result<(), EngineError>>),
    Snapshot(Reply<EngineSnapshot>),
}

enum Step {
    Shutdown,
    Tick(Result<ClockTick, RecvError>),
    Command(Option<Command>),
}

/// Handle used by UI/controller code to drive a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<EngineEvent>,
    clock: broadcast::Sender<LiveClock>,
    shutting_down: Arc<AtomicBool>,
}

impl EngineHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, EngineError> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Err(EngineError::ShuttingDown);
        }
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| EngineError::ShuttingDown)?;
        rx.await.map_err(|_| EngineError::ShuttingDown)
    }

    /// Result, progress and notice events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Live clock ticks, independent of recompute activity.
    pub fn subscribe_clock(&self) -> broadcast::Receiver<LiveClock> {
        self.clock.subscribe()
    }

    /// Returns `true` when the new variant was selected and evaluated.
    pub async fn select_variant(&self, variant: FormulaVariant) -> Result<bool, EngineError> {
        self.request(|reply| Command::SelectVariant(variant, reply))
            .await
    }

    pub async fn calculate(&self) -> Result<ComputationResult, EngineError> {
        self.request(Command::Calculate).await?
    }

    /// Enters editing and returns the draft snapshot.
    pub async fn begin_edit(&self) -> Result<Timestamp, EngineError> {
        self.request(Command::BeginEdit)
            .await?
            .ok_or(EngineError::NotEditing)
    }

    pub async fn update_draft(&self, raw: impl Into<String>) -> Result<Timestamp, EngineError> {
        let raw = raw.into();
        self.request(|reply| Command::UpdateDraft(raw, reply))
            .await?
    }

    pub async fn apply_edit(&self) -> Result<ComputationResult, EngineError> {
        self.request(Command::ApplyEdit).await?
    }

    pub async fn cancel_edit(&self) -> Result<(), EngineError> {
        self.request(Command::CancelEdit).await?
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        self.request(Command::Snapshot).await
    }
}

/// Single owner of the engine state.
///
/// Ticks and user commands are handled one at a time on one task; a tick
/// that is already queued is handled before a command queued after it.
pub struct EngineRuntime {
    handle: EngineHandle,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
    clock: Option<ClockHandle>,
}

impl EngineRuntime {
    /// Starts the engine on an existing tick subscription.
    pub fn start(
        seed: Timestamp,
        variant: FormulaVariant,
        ticks: broadcast::Receiver<ClockTick>,
    ) -> Self {
        Self::start_with_scheduler(RecomputeScheduler::new(seed, variant), ticks)
    }

    /// Starts a clock source from `config` and an engine seeded from `clock`.
    pub fn start_with_clock(config: &CoreConfig, clock: Arc<dyn WallClock>) -> Self {
        let seed = clock.now();
        let source = ClockSource::spawn(clock, config.tick_interval);
        let mut runtime = Self::start(seed, config.default_variant, source.subscribe());
        runtime.clock = Some(source);
        runtime
    }

    pub fn start_with_scheduler(
        scheduler: RecomputeScheduler,
        ticks: broadcast::Receiver<ClockTick>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (clock_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shutting_down = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());

        let handle = EngineHandle {
            commands: commands_tx,
            events: events.clone(),
            clock: clock_tx.clone(),
            shutting_down: shutting_down.clone(),
        };

        info!(
            committed = %scheduler.session().committed(),
            variant = %scheduler.variant(),
            "engine runtime started"
        );

        let task = tokio::spawn(event_loop(
            scheduler,
            Some(ticks),
            commands_rx,
            events,
            clock_tx,
            notify.clone(),
            shutting_down,
        ));

        Self {
            handle,
            notify,
            task,
            clock: None,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub async fn shutdown(self) {
        self.handle.shutting_down.store(true, Ordering::Relaxed);
        self.notify.notify_one();
        if let Err(err) = self.task.await {
            error!("engine loop crashed: {:?}", err);
        }
        if let Some(clock) = self.clock {
            clock.stop().await;
        }
        info!("engine runtime stopped");
    }
}

async fn next_tick(
    ticks: &mut Option<broadcast::Receiver<ClockTick>>,
) -> Result<ClockTick, RecvError> {
    match ticks {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn event_loop(
    mut scheduler: RecomputeScheduler,
    mut ticks: Option<broadcast::Receiver<ClockTick>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<EngineEvent>,
    clock: broadcast::Sender<LiveClock>,
    notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
) {
    publish(&events, scheduler.drain_events());

    loop {
        if shutting_down.load(Ordering::Relaxed) {
            break;
        }

        let step = tokio::select! {
            biased;
            _ = notify.notified() => Step::Shutdown,
            received = next_tick(&mut ticks) => Step::Tick(received),
            command = commands.recv() => Step::Command(command),
        };

        match step {
            Step::Shutdown => break,
            Step::Tick(Ok(tick)) => {
                let _ = clock.send(LiveClock {
                    at: tick.at,
                    display: clock_display(&tick.at),
                    editing: scheduler.session().is_editing(),
                });
                scheduler.on_tick(tick.at);
            }
            Step::Tick(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "engine fell behind the clock, ticks skipped");
            }
            Step::Tick(Err(RecvError::Closed)) => {
                info!("clock source closed, automatic refresh stopped");
                ticks = None;
            }
            Step::Command(Some(command)) => handle_command(&mut scheduler, &clock, command),
            Step::Command(None) => {
                debug!("all engine handles dropped");
                break;
            }
        }

        publish(&events, scheduler.drain_events());
    }
}

fn handle_command(
    scheduler: &mut RecomputeScheduler,
    clock: &broadcast::Sender<LiveClock>,
    command: Command,
) {
    match command {
        Command::SelectVariant(variant, reply) => {
            let _ = reply.send(scheduler.select_variant(variant));
        }
        Command::Calculate(reply) => {
            let _ = reply.send(scheduler.calculate());
        }
        Command::BeginEdit(reply) => {
            scheduler.begin_edit();
            let _ = reply.send(scheduler.session().draft());
        }
        Command::UpdateDraft(raw, reply) => {
            let _ = reply.send(scheduler.update_draft(&raw));
        }
        Command::ApplyEdit(reply) => {
            let outcome = scheduler.apply_edit();
            if let Ok(result) = &outcome {
                let _ = clock.send(LiveClock {
                    at: result.timestamp,
                    display: clock_display(&result.timestamp),
                    editing: false,
                });
            }
            let _ = reply.send(outcome);
        }
        Command::CancelEdit(reply) => {
            let _ = reply.send(scheduler.cancel_edit());
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(scheduler.snapshot());
        }
    }
}

fn publish(events: &broadcast::Sender<EngineEvent>, drained: Vec<EngineEvent>) {
    for event in drained {
        // Nobody listening is fine; state is still readable through snapshots.
        let _ = events.send(event);
    }
}
