#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Playground session engine
//!
//! [`CompletionSession`] runs turns against a [`CompletionBackend`] and
//! folds the decoded events into a shared [`SessionContext`]: the
//! conversation, running usage and cost, cache-hit inference and the
//! shadow comparison awaiting a vote.

mod backend;
pub mod background;
pub mod cache;
mod context;
pub mod conversation;
mod error;
mod session;
pub mod shadow;
pub mod usage;

pub use backend::CompletionBackend;
pub use background::{BalanceTracker, PreferenceRecorder};
pub use cache::CacheClassifier;
pub use context::SessionContext;
pub use conversation::{ConversationModel, Message, StreamInProgress};
pub use error::{ShadowError, TurnError};
pub use session::{CompletionSession, DEFAULT_KEY_PREFIX, TurnOutcome, TurnRequest};
pub use shadow::{ShadowComparison, ShadowComparisonController, ShadowPhase};
pub use usage::{SessionStats, UsageAccumulator};
