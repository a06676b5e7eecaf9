//! Shared, observable state of one playground session

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use himmi_client::ChatMessage;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheClassifier;
use crate::conversation::{ConversationModel, Message};
use crate::error::TurnError;
use crate::shadow::{ShadowComparison, ShadowComparisonController, ShadowPhase};
use crate::usage::{SessionStats, UsageAccumulator};

pub(crate) const CANCELLED_MARKER: &str = "Error: request cancelled";

/// Conversation, usage and comparison state shared between a session's
/// turns and whatever renders it
///
/// Cloning is cheap and every clone observes the same session. Each
/// mutation bumps a revision that [`SessionContext::subscribe`] receivers
/// are notified of.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<SessionState>,
    revision: watch::Sender<u64>,
}

#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) conversation: ConversationModel,
    pub(crate) usage: UsageAccumulator,
    pub(crate) cache: CacheClassifier,
    pub(crate) shadow: ShadowComparisonController,
    /// Bumped on clear; turns started in an older epoch may no longer mutate
    epoch: u64,
    in_flight: Option<InFlight>,
}

struct InFlight {
    epoch: u64,
    token: CancellationToken,
}

/// Handle returned when a turn is admitted
pub(crate) struct Admission {
    pub(crate) epoch: u64,
    pub(crate) token: CancellationToken,
    pub(crate) history: Vec<ChatMessage>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                revision,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.lock())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let result = f(&mut self.lock());
        self.inner.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
        result
    }

    /// Apply a mutation on behalf of the turn started in `epoch`
    ///
    /// Returns `None` without touching state if the session was cleared
    /// since then.
    pub(crate) fn apply<R>(&self, epoch: u64, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let mut state = self.lock();
        if state.epoch != epoch {
            return None;
        }

        let result = f(&mut state);
        drop(state);
        self.inner.revision.send_modify(|revision| *revision = revision.wrapping_add(1));

        Some(result)
    }

    /// Admit a new turn
    ///
    /// Appends the user message and an empty assistant placeholder, and
    /// moves the shadow controller to awaiting when `shadow_model` is set.
    pub(crate) fn admit(&self, text: &str, shadow_model: Option<&str>) -> Result<Admission, TurnError> {
        let mut state = self.lock();
        if state.in_flight.is_some() {
            return Err(TurnError::SessionBusy);
        }

        state
            .conversation
            .begin_turn(text)
            .map_err(|_| TurnError::SessionBusy)?;

        if let Some(model) = shadow_model {
            state.shadow.begin_request(text, model);
        }

        let token = CancellationToken::new();
        let epoch = state.epoch;
        state.in_flight = Some(InFlight {
            epoch,
            token: token.clone(),
        });
        let history = state.conversation.history();

        drop(state);
        self.inner.revision.send_modify(|revision| *revision = revision.wrapping_add(1));

        Ok(Admission { epoch, token, history })
    }

    /// Release the turn started in `epoch`
    ///
    /// A message it left streaming is finalized as cancelled.
    pub(crate) fn release(&self, epoch: u64) {
        self.write(|state| {
            if state.epoch == epoch {
                if state.conversation.fail(CANCELLED_MARKER) {
                    tracing::debug!("turn ended before its message was finalized");
                }
                state.shadow.abandon();
            }

            if state.in_flight.as_ref().is_some_and(|f| f.epoch == epoch) {
                state.in_flight = None;
            }
        });
    }

    /// Copy of the conversation for rendering
    pub fn snapshot(&self) -> Vec<Message> {
        self.read(|state| state.conversation.messages().to_vec())
    }

    pub fn stats(&self) -> SessionStats {
        self.read(|state| state.usage.stats())
    }

    /// Responses inferred to have been served from cache
    pub fn cache_hits(&self) -> u64 {
        self.read(|state| state.cache.hits())
    }

    /// Usage records seen, cached or not
    pub fn cache_observations(&self) -> u64 {
        self.read(|state| state.cache.observed())
    }

    pub fn comparison(&self) -> Option<ShadowComparison> {
        self.read(|state| state.shadow.comparison().cloned())
    }

    pub fn shadow_phase(&self) -> ShadowPhase {
        self.read(|state| state.shadow.phase())
    }

    /// Whether a turn is in flight
    pub fn is_busy(&self) -> bool {
        self.read(|state| state.in_flight.is_some())
    }

    /// Receiver notified after every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Cancel the in-flight turn, if any
    ///
    /// The turn finalizes its message with a cancellation marker.
    pub fn cancel(&self) -> bool {
        self.read(|state| {
            state.in_flight.as_ref().is_some_and(|in_flight| {
                in_flight.token.cancel();
                true
            })
        })
    }

    /// Empty the conversation and reset statistics
    ///
    /// An in-flight turn is cancelled and none of its later events are
    /// applied.
    pub fn clear(&self) {
        self.write(|state| {
            state.epoch = state.epoch.wrapping_add(1);
            if let Some(in_flight) = state.in_flight.take() {
                in_flight.token.cancel();
            }

            state.conversation.clear();
            state.usage.reset();
            state.cache.reset();
            state.shadow.clear();
        });

        tracing::info!("conversation cleared");
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.read(|state| {
            f.debug_struct("SessionContext")
                .field("messages", &state.conversation.len())
                .field("stats", &state.usage.stats())
                .field("shadow", &state.shadow.phase())
                .field("busy", &state.in_flight.is_some())
                .finish()
        })
    }
}
