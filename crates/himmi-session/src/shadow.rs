//! Side-by-side comparison of a primary and a shadow model response
//!
//! ```text
//! Idle -> AwaitingResponse -> Comparing -> Resolved -> Idle
//!              |                  |
//!              +---> Idle <-------+  (failure, abandonment, clear)
//! ```

use himmi_client::{Preference, PreferenceRecord};

use crate::error::ShadowError;

/// Observable phase of the comparison state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPhase {
    Idle,
    AwaitingResponse,
    Comparing,
    Resolved,
}

/// A primary response paired with the shadow model's answer to the same prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowComparison {
    pub prompt: String,
    pub primary_model: String,
    pub primary_response: String,
    pub shadow_model: String,
    pub shadow_response: String,
    pub resolved: bool,
}

impl ShadowComparison {
    fn preference(&self, choice: Preference) -> PreferenceRecord {
        PreferenceRecord {
            prompt: self.prompt.clone(),
            primary_model: self.primary_model.clone(),
            primary_response: self.primary_response.clone(),
            shadow_model: self.shadow_model.clone(),
            shadow_response: self.shadow_response.clone(),
            user_preference: choice,
        }
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Awaiting {
        prompt: String,
        primary_model: String,
    },
    Comparing(ShadowComparison),
    Resolved(ShadowComparison),
}

/// Drives one comparison at a time
#[derive(Debug, Default)]
pub struct ShadowComparisonController {
    state: State,
}

impl ShadowComparisonController {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn phase(&self) -> ShadowPhase {
        match self.state {
            State::Idle => ShadowPhase::Idle,
            State::Awaiting { .. } => ShadowPhase::AwaitingResponse,
            State::Comparing(_) => ShadowPhase::Comparing,
            State::Resolved(_) => ShadowPhase::Resolved,
        }
    }

    /// The comparison currently shown to the user, if any
    pub const fn comparison(&self) -> Option<&ShadowComparison> {
        match &self.state {
            State::Comparing(comparison) | State::Resolved(comparison) => Some(comparison),
            _ => None,
        }
    }

    /// Start a shadow-mode request
    ///
    /// Any comparison still awaiting a vote is discarded first.
    pub fn begin_request(&mut self, prompt: &str, primary_model: &str) {
        if let Some(discarded) = self.clear() {
            tracing::debug!(
                shadow_model = %discarded.shadow_model,
                "discarding unresolved shadow comparison"
            );
        }

        self.state = State::Awaiting {
            prompt: prompt.to_owned(),
            primary_model: primary_model.to_owned(),
        };
    }

    /// Publish the comparison once both responses are known
    pub fn present(
        &mut self,
        primary_response: &str,
        shadow_model: &str,
        shadow_response: &str,
    ) -> Result<&ShadowComparison, ShadowError> {
        let State::Awaiting { prompt, primary_model } = std::mem::take(&mut self.state) else {
            return Err(ShadowError::NotAwaiting);
        };

        self.state = State::Comparing(ShadowComparison {
            prompt,
            primary_model,
            primary_response: primary_response.to_owned(),
            shadow_model: shadow_model.to_owned(),
            shadow_response: shadow_response.to_owned(),
            resolved: false,
        });

        self.comparison().ok_or(ShadowError::NotComparing)
    }

    /// Drop a pending request whose response carried no shadow answer or failed
    pub fn abandon(&mut self) -> bool {
        if matches!(self.state, State::Awaiting { .. }) {
            self.state = State::Idle;
            true
        } else {
            false
        }
    }

    /// Record the user's choice, resolving the comparison exactly once
    pub fn submit_vote(&mut self, choice: Preference) -> Result<PreferenceRecord, ShadowError> {
        let State::Comparing(mut comparison) = std::mem::take(&mut self.state) else {
            return Err(ShadowError::NotComparing);
        };

        comparison.resolved = true;
        let record = comparison.preference(choice);
        self.state = State::Resolved(comparison);

        Ok(record)
    }

    /// Return to idle after a resolved comparison has been shown
    pub fn acknowledge(&mut self) {
        if matches!(self.state, State::Resolved(_)) {
            self.state = State::Idle;
        }
    }

    /// Reset to idle, returning a comparison that was never voted on
    pub fn clear(&mut self) -> Option<ShadowComparison> {
        match std::mem::take(&mut self.state) {
            State::Comparing(comparison) => Some(comparison),
            _ => None,
        }
    }
}
