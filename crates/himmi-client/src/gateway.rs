use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::decoder::{self, BodyKind, EventStream};
use crate::error::{ClientError, Result};
use crate::http::{content_type, handle_error, make_url};
use crate::types::ChatRequest;

/// Deadlines applied to every gateway request
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    /// Overall deadline covering the whole streamed body
    pub request: Option<Duration>,
    /// TCP connect deadline
    pub connect: Option<Duration>,
}

/// Client for the OpenAI-compatible inference gateway
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: Url,
    http: reqwest::Client,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: Url, timeouts: Timeouts) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = timeouts.request {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = timeouts.connect {
            builder = builder.connect_timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Gateway base URL
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send a chat completion request and decode the response
    ///
    /// The returned sequence is an event stream or a single fallback
    /// payload depending on the response `Content-Type`, not on
    /// `request.stream`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Gateway` for a non-success status and
    /// `ClientError::Http` if the request cannot be sent
    pub async fn chat_completions(&self, request: &ChatRequest, api_key: &SecretString) -> Result<EventStream> {
        let url = make_url(&self.base_url, "/v1/chat/completions");

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            shadow_mode = request.shadow_mode,
            "sending chat completion"
        );

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret().trim()))
            .json(request)
            .send()
            .await?;

        let response = handle_error(response).await?;
        let kind = BodyKind::resolve(content_type(&response), request.stream);

        tracing::debug!(?kind, "decoding completion response");

        Ok(decoder::decode(kind, response.bytes_stream()))
    }
}
