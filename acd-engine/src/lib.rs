//! ACD engine - derives 4-digit passcodes from wall-clock time and keeps
//! them in step with the clock unless the user is editing the time input.

pub mod clock;
pub mod error;
pub mod formula;
pub mod presenter;
pub mod runtime;
pub mod scheduler;
pub mod session;

pub use clock::{ClockHandle, ClockSource, ClockTick, ManualClock, SystemClock, WallClock};
pub use error::EngineError;
pub use formula::{compute, evaluate, ComputationResult};
pub use presenter::{clock_display, ClockDisplay};
pub use runtime::{EngineHandle, EngineRuntime, LiveClock};
pub use scheduler::{
    EngineEvent, EngineSnapshot, Notice, NoticeKind, RecomputeMode, RecomputeScheduler,
    RecomputeTrigger,
};
pub use session::{EditSession, EditState};
