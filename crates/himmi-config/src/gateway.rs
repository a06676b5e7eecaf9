use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Literal prefix every playground API key carries
pub const DEFAULT_API_KEY_PREFIX: &str = "sk-or-v1-";

/// Inference gateway connection settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the OpenAI-compatible gateway
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// API key used when none is given on the command line
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Prefix a key must start with before any request is made
    #[serde(default = "default_api_key_prefix")]
    pub api_key_prefix: String,
    /// Overall deadline for a single turn (e.g. "90s"); unbounded when absent
    #[serde(default)]
    pub request_timeout: Option<String>,
    /// TCP connect deadline
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_prefix: default_api_key_prefix(),
            request_timeout: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Parsed overall request deadline
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn request_timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.request_timeout.as_deref().map(parse_duration).transpose()
    }

    /// Parsed connect deadline
    ///
    /// # Errors
    ///
    /// Returns an error if the duration string is malformed
    pub fn connect_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.connect_timeout)
    }
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    duration_str::parse(s).map_err(|e| anyhow::anyhow!("invalid duration '{s}': {e}"))
}

fn default_base_url() -> Url {
    Url::parse("http://localhost:4000").expect("must be a valid URL")
}

fn default_api_key_prefix() -> String {
    DEFAULT_API_KEY_PREFIX.to_owned()
}

fn default_connect_timeout() -> String {
    "10s".to_owned()
}
