use async_trait::async_trait;
use himmi_client::{ChatRequest, ClientError, EventStream, GatewayClient};
use secrecy::SecretString;

/// Source of completion events for a session
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send `request` and return its decoded events
    async fn complete(&self, request: &ChatRequest, api_key: &SecretString) -> Result<EventStream, ClientError>;
}

#[async_trait]
impl CompletionBackend for GatewayClient {
    async fn complete(&self, request: &ChatRequest, api_key: &SecretString) -> Result<EventStream, ClientError> {
        self.chat_completions(request, api_key).await
    }
}
