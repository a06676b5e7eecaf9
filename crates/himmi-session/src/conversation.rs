//! Ordered conversation history with a single streaming tail

use himmi_client::{ChatMessage, Role};

/// One entry of the visible conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Response inferred to have been served from cache
    pub cached: bool,
    /// No further content will be appended
    pub finalized: bool,
    /// Content ends in an error marker rather than a model answer
    pub failed: bool,
}

impl Message {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            cached: false,
            finalized: true,
            failed: false,
        }
    }

    fn placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            cached: false,
            finalized: false,
            failed: false,
        }
    }
}

/// Returned when a turn is started while the previous assistant message is
/// still receiving content
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("an assistant message is still streaming")]
pub struct StreamInProgress;

/// Conversation history
///
/// At most one message is unfinalized, and if one exists it is the last.
#[derive(Debug, Clone, Default)]
pub struct ConversationModel {
    messages: Vec<Message>,
}

impl ConversationModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The trailing assistant message, if it is still streaming
    pub fn streaming(&self) -> Option<&Message> {
        self.messages.last().filter(|m| !m.finalized)
    }

    fn streaming_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut().filter(|m| !m.finalized)
    }

    /// Append a finalized user message followed by an empty assistant
    /// placeholder that will receive the response
    pub fn begin_turn(&mut self, text: impl Into<String>) -> Result<(), StreamInProgress> {
        if self.streaming().is_some() {
            return Err(StreamInProgress);
        }

        self.messages.push(Message::user(text));
        self.messages.push(Message::placeholder());

        Ok(())
    }

    /// Append a content fragment to the streaming message
    ///
    /// Returns `false` when no message is streaming.
    pub fn append_delta(&mut self, text: &str) -> bool {
        match self.streaming_mut() {
            Some(message) => {
                message.content.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Replace the streaming message's content in one step
    pub fn replace_content(&mut self, content: impl Into<String>) -> bool {
        match self.streaming_mut() {
            Some(message) => {
                message.content = content.into();
                true
            }
            None => false,
        }
    }

    pub fn set_cached(&mut self, cached: bool) -> bool {
        match self.streaming_mut() {
            Some(message) => {
                message.cached = cached;
                true
            }
            None => false,
        }
    }

    /// Finalize the streaming message, returning `false` if there was none
    pub fn finalize(&mut self) -> bool {
        match self.streaming_mut() {
            Some(message) => {
                message.finalized = true;
                true
            }
            None => false,
        }
    }

    /// Finalize the streaming message with an error marker
    ///
    /// Content already received is kept and the marker is appended after it.
    pub fn fail(&mut self, marker: &str) -> bool {
        match self.streaming_mut() {
            Some(message) => {
                if !message.content.is_empty() {
                    message.content.push_str("\n\n");
                }
                message.content.push_str(marker);
                message.failed = true;
                message.finalized = true;
                true
            }
            None => false,
        }
    }

    /// Messages sent as context for the next request
    ///
    /// Only finalized, non-empty messages are included; failed responses
    /// are left out.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.finalized && !m.failed && !m.content.is_empty())
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
