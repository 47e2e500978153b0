// End-to-end flows through the runtime with a real clock source on paused tokio time.
use std::sync::Arc;
use std::time::Duration;

use acd::{
    CoreConfig, EngineEvent, EngineRuntime, FormulaVariant, LiveClock, ManualClock,
    RecomputeTrigger, Timestamp,
};
use tokio::sync::broadcast;

fn ts(raw: &str) -> Timestamp {
    Timestamp::parse(raw).expect("valid timestamp")
}

fn config(variant: FormulaVariant) -> CoreConfig {
    CoreConfig {
        tick_interval: Duration::from_secs(1),
        default_variant: variant,
        ..CoreConfig::default()
    }
}

async fn wait_for_clock(
    clock: &mut broadcast::Receiver<LiveClock>,
    predicate: impl Fn(&LiveClock) -> bool,
) -> LiveClock {
    loop {
        let live = clock.recv().await.expect("clock still running");
        if predicate(&live) {
            return live;
        }
    }
}

fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test(start_paused = true)]
async fn follows_minute_boundaries_silently() {
    let wall = ManualClock::new(ts("2024-03-15T14:30:00"));
    let runtime = EngineRuntime::start_with_clock(&config(FormulaVariant::Bypass), Arc::new(wall.clone()));
    let handle = runtime.handle();
    let mut clock = handle.subscribe_clock();

    let initial = handle.snapshot().await.unwrap();
    assert_eq!(initial.result.unwrap().code, "9848");
    let mut events = handle.subscribe_events();

    wall.set(ts("2024-03-15T14:30:30"));
    wait_for_clock(&mut clock, |live| live.at.second() == 30).await;
    assert_eq!(handle.snapshot().await.unwrap().committed, ts("2024-03-15T14:30"));
    assert!(drain(&mut events).is_empty());

    wall.set(ts("2024-03-15T14:31:00"));
    let live = wait_for_clock(&mut clock, |live| live.at.minute() == 31).await;
    assert_eq!(live.display.time, "14:31:00");
    assert_eq!(live.display.date, "15/03/2024");

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.committed, ts("2024-03-15T14:31"));
    assert_eq!(snapshot.result.unwrap().code, "1890");
    assert!(snapshot.notice.is_none());

    let emitted = drain(&mut events);
    assert_eq!(emitted.len(), 1);
    assert!(matches!(
        emitted[0],
        EngineEvent::ResultChanged { trigger: RecomputeTrigger::ClockTick, .. }
    ));

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn editing_suspends_refresh_but_not_the_live_clock() {
    let wall = ManualClock::new(ts("2024-03-15T14:30:00"));
    let runtime = EngineRuntime::start_with_clock(&config(FormulaVariant::Bypass), Arc::new(wall.clone()));
    let handle = runtime.handle();
    let mut clock = handle.subscribe_clock();

    let before = handle.snapshot().await.unwrap();
    handle.begin_edit().await.unwrap();
    let mut events = handle.subscribe_events();

    wall.set(ts("2024-03-15T14:35:00"));
    let live = wait_for_clock(&mut clock, |live| live.at.minute() == 35).await;
    assert!(live.editing);

    let during = handle.snapshot().await.unwrap();
    assert_eq!(during.committed, before.committed);
    assert_eq!(during.result, before.result);
    assert_eq!(during.draft, Some(ts("2024-03-15T14:30")));
    assert!(drain(&mut events).is_empty());

    handle.cancel_edit().await.unwrap();
    let after_cancel = handle.snapshot().await.unwrap();
    assert_eq!(after_cancel.committed, before.committed);
    assert_eq!(after_cancel.result, before.result);
    assert!(after_cancel.draft.is_none());

    // Back in live mode the next tick sees a new minute and catches up.
    wait_for_clock(&mut clock, |live| !live.editing).await;
    let caught_up = handle.snapshot().await.unwrap();
    assert_eq!(caught_up.committed, ts("2024-03-15T14:35"));

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn apply_recomputes_even_within_the_same_minute() {
    let wall = ManualClock::new(ts("2024-03-15T14:30:00"));
    let runtime = EngineRuntime::start_with_clock(&config(FormulaVariant::Menu), Arc::new(wall.clone()));
    let handle = runtime.handle();

    handle.begin_edit().await.unwrap();
    let mut events = handle.subscribe_events();
    handle.update_draft("2024-03-15T14:30").await.unwrap();
    let result = handle.apply_edit().await.unwrap();
    assert_eq!(result.code, "0876");

    let emitted = drain(&mut events);
    assert_eq!(emitted.first(), Some(&EngineEvent::Calculating));
    assert!(emitted.iter().any(|event| matches!(
        event,
        EngineEvent::ResultChanged { trigger: RecomputeTrigger::ApplyEdit, .. }
    )));
    assert!(emitted
        .iter()
        .any(|event| matches!(event, EngineEvent::Notice(notice) if notice.is_success())));

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn applied_time_holds_only_until_the_clock_changes_minute() {
    let wall = ManualClock::new(ts("2024-03-15T14:30:00"));
    let runtime = EngineRuntime::start_with_clock(&config(FormulaVariant::Bypass), Arc::new(wall.clone()));
    let handle = runtime.handle();
    let mut clock = handle.subscribe_clock();

    handle.begin_edit().await.unwrap();
    handle.update_draft("2030-01-01T09:30").await.unwrap();
    handle.apply_edit().await.unwrap();
    let applied = wait_for_clock(&mut clock, |live| live.at.year() == 2030).await;
    assert_eq!(applied.display.date, "01/01/2030");

    // Same minute field as the applied value: the edit survives the tick.
    wall.set(ts("2024-03-15T14:30:10"));
    wait_for_clock(&mut clock, |live| live.at.second() == 10).await;
    assert_eq!(handle.snapshot().await.unwrap().committed, ts("2030-01-01T09:30"));

    // A different minute field brings the engine back to wall-clock time.
    wall.set(ts("2024-03-15T14:31:00"));
    wait_for_clock(&mut clock, |live| live.at.minute() == 31).await;
    assert_eq!(handle.snapshot().await.unwrap().committed, ts("2024-03-15T14:31"));

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn variant_switch_keeps_committed_time() {
    let wall = ManualClock::new(ts("2024-03-15T14:30:00"));
    let runtime = EngineRuntime::start_with_clock(&config(FormulaVariant::Bypass), Arc::new(wall));
    let handle = runtime.handle();

    let before = handle.snapshot().await.unwrap();
    let mut events = handle.subscribe_events();
    assert!(handle.select_variant(FormulaVariant::Menu).await.unwrap());

    let after = handle.snapshot().await.unwrap();
    assert_eq!(after.committed, before.committed);
    assert_eq!(after.result.unwrap().code, "0876");
    assert!(after.notice.is_none());
    assert!(drain(&mut events)
        .iter()
        .all(|event| matches!(event, EngineEvent::ResultChanged { trigger: RecomputeTrigger::VariantChange, .. })));

    runtime.shutdown().await;
}
