use serde::{Deserialize, Serialize};

use acd_core::Timestamp;

use crate::formula::ComputationResult;

/// Live clock as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDisplay {
    /// `HH:MM:SS`
    pub time: String,
    /// `DD/MM/YYYY`
    pub date: String,
}

pub fn clock_display(at: &Timestamp) -> ClockDisplay {
    ClockDisplay {
        time: at.as_naive().format("%H:%M:%S").to_string(),
        date: at.as_naive().format("%d/%m/%Y").to_string(),
    }
}

/// Value to pre-fill a `datetime-local` style input with.
pub fn input_value(at: &Timestamp) -> String {
    at.to_input_string()
}

/// One-line summary of a result, e.g. `ACD Menu Password 2024-03-15T14:30 -> 0876`.
pub fn result_line(result: &ComputationResult) -> String {
    format!(
        "{} {} -> {}",
        result.variant.label(),
        result.timestamp.to_input_string(),
        result.code
    )
}
