use async_trait::async_trait;

/// Text-completion endpoint used to classify user messages.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, instruction: &str, text: &str) -> Result<String, LlmClientError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
