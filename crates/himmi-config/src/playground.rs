use serde::Deserialize;

/// Session defaults for the interactive playground
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaygroundConfig {
    /// User whose credit balance is refreshed after each turn
    #[serde(default)]
    pub user_id: Option<u64>,
    /// Model slug selected at startup
    #[serde(default)]
    pub default_model: Option<String>,
    /// Start sessions with shadow comparison enabled
    #[serde(default)]
    pub shadow_mode: bool,
}
