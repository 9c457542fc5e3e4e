use async_trait::async_trait;

use crate::domain::{RunId, RunStatus, ThreadId};

/// External conversational engine holding one thread per conversation.
#[async_trait]
pub trait AssistantEngine: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadId, AssistantEngineError>;

    async fn append_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), AssistantEngineError>;

    async fn create_run(&self, thread_id: &ThreadId) -> Result<RunId, AssistantEngineError>;

    async fn run_status(
        &self,
        thread_id: &ThreadId,
        run_id: &RunId,
    ) -> Result<RunStatus, AssistantEngineError>;

    /// Text of the most recent assistant message on the thread.
    async fn latest_assistant_reply(
        &self,
        thread_id: &ThreadId,
    ) -> Result<String, AssistantEngineError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantEngineError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("http {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
