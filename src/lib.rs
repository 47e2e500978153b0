//! ACD: time-driven passcode engine.
//!
//! A 4-digit code is derived from a calendar timestamp and a formula
//! variant, and kept in step with the wall clock unless the user has taken
//! manual control of the time input.
//!
//! # Architecture
//!
//! * `acd-core`: `Timestamp`, `FormulaVariant`, errors, configuration, logging
//! * `acd-engine`: formula, clock source, edit session, recompute scheduler,
//!   presenter and the single-owner runtime
//! * `acd-cli`: the `acd` command-line front end

pub use acd_core::{config, errors, logging, AcdError, CoreConfig, FormulaVariant, Timestamp};
pub use acd_engine::{
    clock, compute, evaluate, formula, presenter, runtime, scheduler, session, ClockSource,
    ClockTick, ComputationResult, EditSession, EditState, EngineError, EngineEvent, EngineHandle,
    EngineRuntime, EngineSnapshot, LiveClock, ManualClock, Notice, NoticeKind, RecomputeMode,
    RecomputeScheduler, RecomputeTrigger, SystemClock, WallClock,
};

