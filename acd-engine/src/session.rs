use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use acd_core::Timestamp;

use crate::error::EngineError;

/// Whether the time input is following the clock or held by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EditState {
    Live,
    Editing { draft: Timestamp },
}

/// Committed timestamp plus an optional in-progress draft.
///
/// A draft exists exactly while the session is [`EditState::Editing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSession {
    committed: Timestamp,
    state: EditState,
}

impl EditSession {
    pub fn new(seed: Timestamp) -> Self {
        Self {
            committed: seed,
            state: EditState::Live,
        }
    }

    pub fn committed(&self) -> Timestamp {
        self.committed
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn draft(&self) -> Option<Timestamp> {
        match self.state {
            EditState::Editing { draft } => Some(draft),
            EditState::Live => None,
        }
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, EditState::Editing { .. })
    }

    /// Takes a snapshot of the committed timestamp as the draft.
    ///
    /// Calling this while already editing discards the old draft and starts over.
    pub fn begin_edit(&mut self) {
        if self.is_editing() {
            debug!("edit restarted, previous draft discarded");
        }
        self.state = EditState::Editing {
            draft: self.committed,
        };
        info!(draft = %self.committed, "edit started");
    }

    pub fn update_draft(&mut self, value: Timestamp) -> Result<(), EngineError> {
        match &mut self.state {
            EditState::Editing { draft } => {
                *draft = value;
                debug!(draft = %value, "draft updated");
                Ok(())
            }
            EditState::Live => Err(EngineError::NotEditing),
        }
    }

    /// Parses raw input from the time-input surface into the draft.
    ///
    /// A malformed value leaves the previous draft in place.
    pub fn update_draft_str(&mut self, raw: &str) -> Result<(), EngineError> {
        if !self.is_editing() {
            return Err(EngineError::NotEditing);
        }
        let value = Timestamp::parse(raw).map_err(|err| {
            warn!(input = raw, "rejected draft input");
            EngineError::from(err)
        })?;
        self.update_draft(value)
    }

    /// Commits the draft and returns to live mode.
    pub fn apply(&mut self) -> Result<Timestamp, EngineError> {
        let draft = self.draft().ok_or(EngineError::NotEditing)?;
        self.committed = draft;
        self.state = EditState::Live;
        info!(committed = %draft, "edit applied");
        Ok(draft)
    }

    /// Discards the draft; the committed timestamp is untouched.
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        if !self.is_editing() {
            return Err(EngineError::NotEditing);
        }
        self.state = EditState::Live;
        info!("edit cancelled");
        Ok(())
    }

    /// Follows the clock. Refused while editing.
    pub(crate) fn follow_clock(&mut self, at: Timestamp) -> bool {
        if self.is_editing() {
            return false;
        }
        self.committed = at;
        true
    }
}
