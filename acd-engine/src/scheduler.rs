use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use acd_core::{FormulaVariant, Timestamp};

use crate::error::EngineError;
use crate::formula::{self, ComputationResult};
use crate::session::EditSession;

pub const SUCCESS_MESSAGE: &str = "Password calculated successfully";
pub const FAILURE_MESSAGE: &str = "Calculation failed";

/// Signature of the code derivation used by the scheduler.
pub type Evaluator = fn(&Timestamp, FormulaVariant) -> Result<ComputationResult, EngineError>;

/// Whether a recompute reports status to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeMode {
    /// Background refresh: result only, no progress indicator, no notice.
    Silent,
    /// User-initiated: progress indicator plus a success or failure notice.
    Explicit,
}

/// What caused a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeTrigger {
    Startup,
    ClockTick,
    VariantChange,
    Calculate,
    ApplyEdit,
}

impl RecomputeTrigger {
    pub fn mode(&self) -> RecomputeMode {
        match self {
            RecomputeTrigger::Startup
            | RecomputeTrigger::ClockTick
            | RecomputeTrigger::VariantChange => RecomputeMode::Silent,
            RecomputeTrigger::Calculate | RecomputeTrigger::ApplyEdit => RecomputeMode::Explicit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Failure,
}

/// Transient user-facing status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Failure,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == NoticeKind::Success
    }
}

/// Observable consequences of a scheduler operation, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Calculating,
    ResultChanged {
        result: ComputationResult,
        trigger: RecomputeTrigger,
    },
    Notice(Notice),
}

/// Read model of the scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub committed: Timestamp,
    pub draft: Option<Timestamp>,
    pub variant: FormulaVariant,
    pub result: Option<ComputationResult>,
    pub calculating: bool,
    pub notice: Option<Notice>,
    pub recorded_minute: u32,
}

/// Owns the engine state and decides when the formula runs.
pub struct RecomputeScheduler {
    session: EditSession,
    variant: FormulaVariant,
    result: Option<ComputationResult>,
    recorded_minute: u32,
    calculating: bool,
    notice: Option<Notice>,
    evaluator: Evaluator,
    outbox: Vec<EngineEvent>,
}

impl RecomputeScheduler {
    /// Seeds the session and computes the first result silently.
    pub fn new(seed: Timestamp, variant: FormulaVariant) -> Self {
        Self::with_evaluator(seed, variant, formula::evaluate)
    }

    pub fn with_evaluator(seed: Timestamp, variant: FormulaVariant, evaluator: Evaluator) -> Self {
        let mut scheduler = Self {
            session: EditSession::new(seed),
            variant,
            result: None,
            recorded_minute: seed.minute(),
            calculating: false,
            notice: None,
            evaluator,
            outbox: Vec::new(),
        };
        scheduler.recompute(seed, variant, RecomputeTrigger::Startup);
        scheduler
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn variant(&self) -> FormulaVariant {
        self.variant
    }

    pub fn result(&self) -> Option<&ComputationResult> {
        self.result.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            committed: self.session.committed(),
            draft: self.session.draft(),
            variant: self.variant,
            result: self.result.clone(),
            calculating: self.calculating,
            notice: self.notice.clone(),
            recorded_minute: self.recorded_minute,
        }
    }

    /// Takes the events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Clock-driven refresh. Only acts when live and the minute moved.
    ///
    /// Returns whether a new result was committed.
    pub fn on_tick(&mut self, at: Timestamp) -> bool {
        if self.session.is_editing() {
            debug!(tick = %at, "tick ignored while editing");
            return false;
        }
        if at.minute() == self.recorded_minute {
            return false;
        }
        let committed = self.recompute(at, self.variant, RecomputeTrigger::ClockTick);
        if committed {
            self.session.follow_clock(at);
        }
        committed
    }

    /// Switches formula and recomputes silently. Re-selecting the current variant is a no-op.
    ///
    /// The selection only sticks when the new variant evaluates, so the
    /// selected variant and the shown result never disagree.
    pub fn select_variant(&mut self, variant: FormulaVariant) -> bool {
        if variant == self.variant {
            return false;
        }
        info!(from = %self.variant, to = %variant, "variant selected");
        self.recompute(self.session.committed(), variant, RecomputeTrigger::VariantChange)
    }

    /// Explicit "calculate" action on the committed timestamp.
    pub fn calculate(&mut self) -> Result<ComputationResult, EngineError> {
        let at = self.session.committed();
        if self.recompute(at, self.variant, RecomputeTrigger::Calculate) {
            self.result.clone().ok_or_else(|| {
                EngineError::ComputationFailure("result missing after recompute".into())
            })
        } else {
            Err(EngineError::ComputationFailure(FAILURE_MESSAGE.into()))
        }
    }

    pub fn begin_edit(&mut self) {
        self.session.begin_edit();
    }

    /// Replaces the draft from raw input. Bad input is reported and the old draft kept.
    pub fn update_draft(&mut self, raw: &str) -> Result<Timestamp, EngineError> {
        match self.session.update_draft_str(raw) {
            Ok(()) => self.session.draft().ok_or(EngineError::NotEditing),
            Err(err @ EngineError::InvalidTimestampInput(_)) => {
                self.report(Notice::failure(err.to_string()));
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn cancel_edit(&mut self) -> Result<(), EngineError> {
        self.session.cancel()
    }

    /// Commits the draft and recomputes explicitly, regardless of the recorded minute.
    ///
    /// If the draft cannot be evaluated the session stays in editing and the
    /// committed timestamp and previous result are retained.
    pub fn apply_edit(&mut self) -> Result<ComputationResult, EngineError> {
        let draft = self.session.draft().ok_or(EngineError::NotEditing)?;
        if !self.recompute(draft, self.variant, RecomputeTrigger::ApplyEdit) {
            return Err(EngineError::ComputationFailure(FAILURE_MESSAGE.into()));
        }
        self.session.apply()?;
        self.result
            .clone()
            .ok_or_else(|| EngineError::ComputationFailure("result missing after recompute".into()))
    }

    /// Evaluates `at` under `variant` and stores both along with the result on success.
    ///
    /// Failures never clear the previous result. Silent failures are only logged.
    fn recompute(
        &mut self,
        at: Timestamp,
        variant: FormulaVariant,
        trigger: RecomputeTrigger,
    ) -> bool {
        let mode = trigger.mode();
        if mode == RecomputeMode::Explicit {
            self.calculating = true;
            self.notice = None;
            self.outbox.push(EngineEvent::Calculating);
        }

        let succeeded = match (self.evaluator)(&at, variant) {
            Ok(result) => {
                self.variant = variant;
                self.recorded_minute = at.minute();
                match mode {
                    RecomputeMode::Silent => {
                        debug!(?trigger, at = %at, variant = %self.variant, code = %result.code, "silent recompute")
                    }
                    RecomputeMode::Explicit => {
                        info!(?trigger, at = %at, variant = %self.variant, code = %result.code, "password calculated")
                    }
                }
                self.result = Some(result.clone());
                self.outbox
                    .push(EngineEvent::ResultChanged { result, trigger });
                if mode == RecomputeMode::Explicit {
                    self.report(Notice::success(SUCCESS_MESSAGE));
                }
                true
            }
            Err(err) => {
                match mode {
                    RecomputeMode::Silent => {
                        debug!(?trigger, at = %at, %variant, error = %err, "silent recompute skipped")
                    }
                    RecomputeMode::Explicit => {
                        warn!(?trigger, at = %at, error = %err, "explicit recompute failed");
                        self.report(Notice::failure(FAILURE_MESSAGE));
                    }
                }
                false
            }
        };

        if mode == RecomputeMode::Explicit {
            self.calculating = false;
        }
        succeeded
    }

    fn report(&mut self, notice: Notice) {
        self.notice = Some(notice.clone());
        self.outbox.push(EngineEvent::Notice(notice));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    thread_local! {
        static BROKEN: Cell<bool> = const { Cell::new(false) };
    }

    fn ts(raw: &str) -> Timestamp {
        Timestamp::parse(raw).unwrap()
    }

    fn failing(_: &Timestamp, _: FormulaVariant) -> Result<ComputationResult, EngineError> {
        Err(EngineError::ComputationFailure("boom".into()))
    }

    fn fails_in_2030(
        at: &Timestamp,
        variant: FormulaVariant,
    ) -> Result<ComputationResult, EngineError> {
        if at.year() == 2030 {
            Err(EngineError::ComputationFailure("boom".into()))
        } else {
            formula::evaluate(at, variant)
        }
    }

    fn fails_for_menu(
        at: &Timestamp,
        variant: FormulaVariant,
    ) -> Result<ComputationResult, EngineError> {
        match variant {
            FormulaVariant::Menu => Err(EngineError::ComputationFailure("boom".into())),
            FormulaVariant::Bypass => formula::evaluate(at, variant),
        }
    }

    fn fails_when_broken(
        at: &Timestamp,
        variant: FormulaVariant,
    ) -> Result<ComputationResult, EngineError> {
        if BROKEN.with(Cell::get) {
            Err(EngineError::ComputationFailure("boom".into()))
        } else {
            formula::evaluate(at, variant)
        }
    }

    fn scheduler() -> RecomputeScheduler {
        let mut scheduler = RecomputeScheduler::new(ts("2024-03-15T14:30"), FormulaVariant::Bypass);
        scheduler.drain_events();
        scheduler
    }

    fn has_explicit_feedback(events: &[EngineEvent]) -> bool {
        events
            .iter()
            .any(|event| matches!(event, EngineEvent::Calculating | EngineEvent::Notice(_)))
    }

    #[test]
    fn startup_computes_silently() {
        let mut scheduler = RecomputeScheduler::new(ts("2024-03-15T14:30"), FormulaVariant::Bypass);
        assert_eq!(scheduler.result().unwrap().code, "9848");
        assert!(scheduler.notice().is_none());
        assert!(!has_explicit_feedback(&scheduler.drain_events()));
    }

    #[test]
    fn tick_within_same_minute_is_a_no_op() {
        let mut scheduler = scheduler();
        assert!(!scheduler.on_tick(ts("2024-03-15T14:30:45")));
        assert_eq!(scheduler.session().committed(), ts("2024-03-15T14:30"));
        assert!(scheduler.drain_events().is_empty());
    }

    #[test]
    fn minute_change_recomputes_silently() {
        let mut scheduler = scheduler();
        assert!(scheduler.on_tick(ts("2024-03-15T14:31:00")));

        assert_eq!(scheduler.session().committed(), ts("2024-03-15T14:31"));
        assert_eq!(scheduler.result().unwrap().code, "1890");
        assert!(scheduler.notice().is_none());

        let events = scheduler.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            EngineEvent::ResultChanged { trigger: RecomputeTrigger::ClockTick, .. }
        ));
    }

    #[test]
    fn ticks_are_ignored_while_editing() {
        let mut scheduler = scheduler();
        let before = scheduler.result().cloned();
        scheduler.begin_edit();

        assert!(!scheduler.on_tick(ts("2024-03-15T14:31")));
        assert!(!scheduler.on_tick(ts("2024-03-15T14:32")));

        assert_eq!(scheduler.session().committed(), ts("2024-03-15T14:30"));
        assert_eq!(scheduler.result().cloned(), before);
        assert!(scheduler.drain_events().is_empty());
    }

    #[test]
    fn cancel_leaves_state_identical() {
        let mut scheduler = scheduler();
        let before = scheduler.snapshot();

        scheduler.begin_edit();
        scheduler.update_draft("2030-06-01T08:15").unwrap();
        scheduler.on_tick(ts("2024-03-15T14:45"));
        scheduler.cancel_edit().unwrap();

        assert_eq!(scheduler.snapshot(), before);
    }

    #[test]
    fn apply_forces_recompute_even_for_same_minute() {
        let mut scheduler = scheduler();
        scheduler.begin_edit();
        scheduler.update_draft("2025-01-01T09:30").unwrap();
        scheduler.drain_events();

        let result = scheduler.apply_edit().unwrap();
        assert_eq!(result.timestamp, ts("2025-01-01T09:30"));
        assert_eq!(scheduler.session().committed(), ts("2025-01-01T09:30"));
        assert!(!scheduler.session().is_editing());
        assert!(scheduler.notice().unwrap().is_success());

        let events = scheduler.drain_events();
        assert_eq!(events[0], EngineEvent::Calculating);
        assert!(matches!(
            events[1],
            EngineEvent::ResultChanged { trigger: RecomputeTrigger::ApplyEdit, .. }
        ));
        assert_eq!(events[2], EngineEvent::Notice(Notice::success(SUCCESS_MESSAGE)));
    }

    #[test]
    fn apply_without_edit_is_rejected() {
        let mut scheduler = scheduler();
        assert_eq!(scheduler.apply_edit().unwrap_err(), EngineError::NotEditing);
        assert!(scheduler.drain_events().is_empty());
    }

    #[test]
    fn malformed_draft_reports_without_touching_result() {
        let mut scheduler = scheduler();
        let before = scheduler.result().cloned();
        scheduler.begin_edit();

        let err = scheduler.update_draft("2024-13-45T99:99").unwrap_err();
        assert!(matches!(err, EngineError::InvalidTimestampInput(_)));
        assert_eq!(scheduler.notice().unwrap().kind, NoticeKind::Failure);
        assert_eq!(scheduler.result().cloned(), before);
        assert_eq!(scheduler.session().draft(), Some(ts("2024-03-15T14:30")));
        assert_eq!(
            scheduler.notice().unwrap().message,
            "Invalid date/time input: 2024-13-45T99:99"
        );
    }

    #[test]
    fn variant_change_recomputes_silently_without_moving_time() {
        let mut scheduler = scheduler();
        assert!(scheduler.select_variant(FormulaVariant::Menu));

        assert_eq!(scheduler.session().committed(), ts("2024-03-15T14:30"));
        assert_eq!(scheduler.result().unwrap().code, "0876");
        assert_eq!(scheduler.result().unwrap().variant, FormulaVariant::Menu);
        assert!(!has_explicit_feedback(&scheduler.drain_events()));

        assert!(!scheduler.select_variant(FormulaVariant::Menu));
        assert!(scheduler.drain_events().is_empty());
    }

    #[test]
    fn explicit_calculate_sets_success_notice() {
        let mut scheduler = scheduler();
        let result = scheduler.calculate().unwrap();
        assert_eq!(result.code, "9848");

        let snapshot = scheduler.snapshot();
        assert!(!snapshot.calculating);
        assert_eq!(snapshot.notice, Some(Notice::success(SUCCESS_MESSAGE)));
        assert!(has_explicit_feedback(&scheduler.drain_events()));
    }

    #[test]
    fn explicit_failure_keeps_previous_result() {
        let mut scheduler =
            RecomputeScheduler::with_evaluator(ts("2024-03-15T14:30"), FormulaVariant::Bypass, fails_in_2030);
        let before = scheduler.result().cloned();
        scheduler.begin_edit();
        scheduler.update_draft("2030-06-01T08:15").unwrap();

        let err = scheduler.apply_edit().unwrap_err();
        assert!(matches!(err, EngineError::ComputationFailure(_)));
        assert_eq!(scheduler.result().cloned(), before);
        assert_eq!(scheduler.session().committed(), ts("2024-03-15T14:30"));
        assert!(scheduler.session().is_editing());
        assert_eq!(scheduler.notice(), Some(&Notice::failure(FAILURE_MESSAGE)));
        assert!(!scheduler.snapshot().calculating);
    }

    #[test]
    fn silent_failure_is_swallowed() {
        let mut scheduler =
            RecomputeScheduler::with_evaluator(ts("2024-03-15T14:30"), FormulaVariant::Bypass, failing);
        assert!(scheduler.result().is_none());
        scheduler.drain_events();

        assert!(!scheduler.on_tick(ts("2024-03-15T14:31")));
        assert!(scheduler.notice().is_none());
        assert!(scheduler.drain_events().is_empty());
        assert_eq!(scheduler.session().committed(), ts("2024-03-15T14:30"));
    }

    #[test]
    fn failed_variant_switch_keeps_previous_selection() {
        let mut scheduler = RecomputeScheduler::with_evaluator(
            ts("2024-03-15T14:30"),
            FormulaVariant::Bypass,
            fails_for_menu,
        );
        scheduler.drain_events();

        assert!(!scheduler.select_variant(FormulaVariant::Menu));
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.variant, FormulaVariant::Bypass);
        assert_eq!(snapshot.result.unwrap().variant, FormulaVariant::Bypass);
        assert!(snapshot.notice.is_none());
        assert!(scheduler.drain_events().is_empty());
    }

    #[test]
    fn explicit_calculate_failure_reports_and_keeps_result() {
        let mut scheduler = RecomputeScheduler::with_evaluator(
            ts("2024-03-15T14:30"),
            FormulaVariant::Bypass,
            fails_when_broken,
        );
        let before = scheduler.result().cloned();
        assert!(before.is_some());
        scheduler.drain_events();

        BROKEN.with(|broken| broken.set(true));
        let err = scheduler.calculate().unwrap_err();
        BROKEN.with(|broken| broken.set(false));

        assert_eq!(err, EngineError::ComputationFailure(FAILURE_MESSAGE.into()));
        assert_eq!(scheduler.result().cloned(), before);
        assert_eq!(scheduler.notice(), Some(&Notice::failure(FAILURE_MESSAGE)));
        assert!(!scheduler.snapshot().calculating);
        assert_eq!(
            scheduler.drain_events(),
            vec![
                EngineEvent::Calculating,
                EngineEvent::Notice(Notice::failure(FAILURE_MESSAGE)),
            ]
        );
    }
}
