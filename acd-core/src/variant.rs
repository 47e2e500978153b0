use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AcdError;

/// Selectable passcode formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaVariant {
    /// `(yyyy+mm+dd)*(hh+mm)`
    #[default]
    Bypass,
    /// `(yyyy+mm+dd+hh+mm)*10-hh+mm`
    Menu,
}

impl FormulaVariant {
    pub const ALL: [FormulaVariant; 2] = [FormulaVariant::Bypass, FormulaVariant::Menu];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaVariant::Bypass => "bypass",
            FormulaVariant::Menu => "menu",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FormulaVariant::Bypass => "ACD Bypass Password",
            FormulaVariant::Menu => "ACD Menu Password",
        }
    }

    pub fn formula(&self) -> &'static str {
        match self {
            FormulaVariant::Bypass => "(yyyy+mm+dd)*(hh+mm)",
            FormulaVariant::Menu => "(yyyy+mm+dd+hh+mm)*10-hh+mm",
        }
    }
}

impl fmt::Display for FormulaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormulaVariant {
    type Err = AcdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bypass" | "a" => Ok(FormulaVariant::Bypass),
            "menu" | "b" => Ok(FormulaVariant::Menu),
            other => Err(AcdError::InvalidVariant(other.to_string())),
        }
    }
}
