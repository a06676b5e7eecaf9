use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// -- Chat completion request types --

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human turn
    User,
    /// Model turn
    Assistant,
}

/// Message sent to the gateway as conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: Role,
    /// Plain-text content
    pub content: String,
}

impl ChatMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat completion request body
///
/// The bearer credential travels in the `Authorization` header, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// Model slug
    pub model: String,
    /// Full history including the new user turn
    pub messages: Vec<ChatMessage>,
    /// Ask for an event stream
    pub stream: bool,
    /// Ask the gateway to also run a shadow model
    pub shadow_mode: bool,
}

impl ChatRequest {
    /// Build a request; shadow-mode requests are never streamed
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, shadow_mode: bool) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: !shadow_mode,
            shadow_mode,
        }
    }
}

// -- Response types --

/// Token usage reported by the gateway
///
/// Missing fields count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Tokens consumed by the prompt
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens generated in the completion
    #[serde(default)]
    pub completion_tokens: u64,
}

impl UsageRecord {
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

/// One `data:` frame of an event-stream response (`OpenAI` chunk shape)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    /// Delta choices
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    /// Usage, usually on the final chunk
    #[serde(default)]
    pub usage: Option<UsageRecord>,
    /// Error reported mid-stream
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Choice within a streaming chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChoice {
    /// Delta content
    #[serde(default)]
    pub delta: StreamDelta,
    /// Finish reason (on final chunk)
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta content within a streaming choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDelta {
    /// Incremental text content
    #[serde(default)]
    pub content: Option<String>,
}

/// Complete JSON response returned in place of a stream
///
/// Shadow-mode requests and cache hits collapse to this shape; shadow
/// responses additionally carry the shadow model and its answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompletionPayload {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Model that served the primary answer
    #[serde(default)]
    pub model: Option<String>,
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<UsageRecord>,
    /// Shadow model slug
    #[serde(default)]
    pub shadow_model: Option<String>,
    /// Shadow model answer
    #[serde(default)]
    pub shadow_response: Option<String>,
}

impl CompletionPayload {
    /// Primary answer text, empty when absent
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default()
    }

    /// Shadow model and answer, when both are present
    pub fn shadow(&self) -> Option<(&str, &str)> {
        Some((self.shadow_model.as_deref()?, self.shadow_response.as_deref()?))
    }
}

/// A single non-streamed completion choice
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Choice {
    /// Generated message
    #[serde(default)]
    pub message: ChoiceMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message in a response choice
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChoiceMessage {
    /// Text content
    #[serde(default)]
    pub content: Option<String>,
}

// -- Model catalog types --

/// Per-million-token pricing of the model selected for a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingInfo {
    /// Cost of one million prompt tokens
    pub input_cost_per_million_tokens: f64,
    /// Cost of one million completion tokens
    pub output_cost_per_million_tokens: f64,
}

impl PricingInfo {
    pub const fn new(input_cost_per_million_tokens: f64, output_cost_per_million_tokens: f64) -> Self {
        Self {
            input_cost_per_million_tokens,
            output_cost_per_million_tokens,
        }
    }
}

/// Catalog entry from the control plane
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    /// Catalog identifier
    #[serde(default)]
    pub id: Option<u64>,
    /// Display name
    pub name: String,
    /// Slug sent as `model` in completion requests
    pub slug: String,
    /// Context window in tokens
    #[serde(default)]
    pub context_length: Option<u64>,
    /// Company that publishes the model
    #[serde(default)]
    pub company: Option<Company>,
    /// Provider mappings, cheapest route first
    #[serde(default)]
    pub mappings: Vec<ProviderMapping>,
}

impl ModelInfo {
    /// Pricing of the first provider mapping, zero when unmapped
    pub fn pricing(&self) -> PricingInfo {
        self.mappings
            .first()
            .map(|m| PricingInfo::new(m.input_token_cost, m.output_token_cost))
            .unwrap_or_default()
    }

    /// Name of the publishing company
    pub fn provider(&self) -> Option<&str> {
        self.company.as_ref().map(|c| c.name.as_str())
    }
}

/// Company that publishes a model
#[derive(Debug, Clone, Deserialize)]
pub struct Company {
    pub name: String,
}

/// Route of a model through an upstream provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderMapping {
    /// Cost of one million prompt tokens
    #[serde(default)]
    pub input_token_cost: f64,
    /// Cost of one million completion tokens
    #[serde(default)]
    pub output_token_cost: f64,
}

/// Distinct company names across the catalog, sorted
pub fn providers(models: &[ModelInfo]) -> Vec<String> {
    models
        .iter()
        .filter_map(ModelInfo::provider)
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// -- Identity types --

/// User status from the identity collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct UserStatus {
    pub id: u64,
    #[serde(default)]
    pub email: Option<String>,
    /// Remaining balance
    pub credits: f64,
}

// -- Analytics types --

/// Which side of a shadow comparison the user preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Primary,
    Shadow,
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Shadow => f.write_str("shadow"),
        }
    }
}

impl FromStr for Preference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "shadow" => Ok(Self::Shadow),
            other => Err(format!("unknown preference '{other}', expected 'primary' or 'shadow'")),
        }
    }
}

/// Preference submitted after a shadow comparison vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub prompt: String,
    pub primary_model: String,
    pub primary_response: String,
    pub shadow_model: String,
    pub shadow_response: String,
    pub user_preference: Preference,
}
