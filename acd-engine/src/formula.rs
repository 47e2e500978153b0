use serde::{Deserialize, Serialize};

use acd_core::{FormulaVariant, Timestamp};

use crate::error::EngineError;

const CODE_DIGITS: usize = 4;
const CODE_MODULUS: u64 = 10_000;

/// Outcome of one formula evaluation.
///
/// `password_type` and `full_calculation` are reserved display slots. They
/// are part of the shape consumers read but are never populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationResult {
    pub variant: FormulaVariant,
    pub timestamp: Timestamp,
    pub code: String,
    pub password_type: Option<String>,
    pub full_calculation: Option<String>,
}

/// Derives the 4-digit code for `timestamp` under `variant`.
///
/// Seconds are ignored. Only the last four decimal digits of `|value|` are
/// kept, left padded with zeros.
pub fn compute(timestamp: &Timestamp, variant: FormulaVariant) -> Result<String, EngineError> {
    let value = raw_value(timestamp, variant)?;
    Ok(format!(
        "{:0width$}",
        value.unsigned_abs() % CODE_MODULUS,
        width = CODE_DIGITS
    ))
}

/// Runs [`compute`] and wraps the code with the inputs that produced it.
pub fn evaluate(
    timestamp: &Timestamp,
    variant: FormulaVariant,
) -> Result<ComputationResult, EngineError> {
    let code = compute(timestamp, variant)?;
    Ok(ComputationResult {
        variant,
        timestamp: *timestamp,
        code,
        password_type: None,
        full_calculation: None,
    })
}

fn raw_value(timestamp: &Timestamp, variant: FormulaVariant) -> Result<i64, EngineError> {
    let year = i64::from(timestamp.year());
    let month = i64::from(timestamp.month());
    let day = i64::from(timestamp.day());
    let hour = i64::from(timestamp.hour());
    let minute = i64::from(timestamp.minute());

    let value = match variant {
        FormulaVariant::Bypass => {
            let left = sum(&[year, month, day])?;
            let right = sum(&[hour, minute])?;
            left.checked_mul(right)
        }
        FormulaVariant::Menu => sum(&[year, month, day, hour, minute])?
            .checked_mul(10)
            .and_then(|scaled| scaled.checked_sub(hour))
            .and_then(|value| value.checked_add(minute)),
    };

    value.ok_or_else(|| overflow(variant))
}

fn sum(terms: &[i64]) -> Result<i64, EngineError> {
    terms
        .iter()
        .try_fold(0i64, |acc, term| acc.checked_add(*term))
        .ok_or_else(|| EngineError::ComputationFailure("arithmetic overflow".into()))
}

fn overflow(variant: FormulaVariant) -> EngineError {
    EngineError::ComputationFailure(format!("arithmetic overflow in {variant} formula"))
}
