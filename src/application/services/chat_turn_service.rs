use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{
    AssistantEngine, AssistantEngineError, ConversationRepository, RepositoryError,
};
use crate::domain::{
    AnonymousUserId, Conversation, ConversationId, Message, MessageId, MessageRole, RunId,
    RunStatus, ThreadBinding, ThreadId,
};
use crate::infrastructure::observability::sanitize_message;

use super::{ClassificationDispatcher, ClassificationRequest, ErrorKind};

/// Bounded wait applied while a run is queued or in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RunPollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatTurnConfig {
    pub max_message_length: usize,
    pub title_max_chars: usize,
    pub poll_policy: RunPollPolicy,
}

impl Default for ChatTurnConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            title_max_chars: 50,
            poll_policy: RunPollPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub conversation_id: Option<ConversationId>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: ConversationId,
    pub thread_id: ThreadId,
    pub response: String,
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
}

enum RunOutcome {
    Completed,
    TimedOut { attempts: u32 },
}

pub struct ChatTurnService {
    conversation_repository: Arc<dyn ConversationRepository>,
    assistant: Arc<dyn AssistantEngine>,
    dispatcher: ClassificationDispatcher,
    config: ChatTurnConfig,
}

impl ChatTurnService {
    pub fn new(
        conversation_repository: Arc<dyn ConversationRepository>,
        assistant: Arc<dyn AssistantEngine>,
        dispatcher: ClassificationDispatcher,
        config: ChatTurnConfig,
    ) -> Self {
        Self {
            conversation_repository,
            assistant,
            dispatcher,
            config,
        }
    }

    /// Runs one chat turn end to end.
    ///
    /// Input and ownership are checked before any write. The user message is
    /// persisted only once the engine has produced a reply or the poll budget
    /// ran out; an upstream failure leaves no message behind. Classification of
    /// the stored user message is queued and never affects the result.
    #[tracing::instrument(
        skip(self, request),
        fields(conversation_id = ?request.conversation_id.map(|id| id.as_i64()))
    )]
    pub async fn submit_turn(&self, request: TurnRequest) -> Result<TurnOutcome, ChatTurnError> {
        let user_id =
            AnonymousUserId::parse(request.user_id.trim()).map_err(ChatTurnError::Validation)?;
        let message = self.validate_message(&request.message)?;

        tracing::debug!(prompt = %sanitize_message(message), "Processing chat turn");

        let conversation = self
            .resolve_conversation(&user_id, request.conversation_id, message)
            .await?;
        let conversation_id = conversation.id;
        let thread_id = self.ensure_thread(conversation).await?;

        self.assistant
            .append_user_message(&thread_id, message)
            .await?;
        let run_id = self.assistant.create_run(&thread_id).await?;

        if let RunOutcome::TimedOut { attempts } = self.wait_for_run(&thread_id, &run_id).await? {
            let user_message = self
                .append(conversation_id, MessageRole::User, message)
                .await?;
            self.dispatch_classification(&user_message);
            tracing::warn!(
                %conversation_id,
                %run_id,
                attempts,
                "Assistant run did not complete in time"
            );
            return Err(ChatTurnError::Timeout {
                conversation_id,
                attempts,
            });
        }

        let response = self.assistant.latest_assistant_reply(&thread_id).await?;

        let user_message = self
            .append(conversation_id, MessageRole::User, message)
            .await?;
        let assistant_message = self
            .append(conversation_id, MessageRole::Assistant, &response)
            .await?;

        self.dispatch_classification(&user_message);

        tracing::info!(%conversation_id, %thread_id, "Chat turn completed");

        Ok(TurnOutcome {
            conversation_id,
            thread_id,
            response,
            user_message_id: user_message.id,
            assistant_message_id: assistant_message.id,
        })
    }

    fn validate_message<'a>(&self, message: &'a str) -> Result<&'a str, ChatTurnError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatTurnError::Validation("message is empty".to_string()));
        }
        let length = message.chars().count();
        if length > self.config.max_message_length {
            return Err(ChatTurnError::Validation(format!(
                "message too long ({} characters, max {})",
                length, self.config.max_message_length
            )));
        }
        Ok(message)
    }

    async fn resolve_conversation(
        &self,
        user_id: &AnonymousUserId,
        conversation_id: Option<ConversationId>,
        message: &str,
    ) -> Result<Conversation, ChatTurnError> {
        match conversation_id {
            Some(id) => {
                let conversation = self
                    .conversation_repository
                    .get_conversation(id)
                    .await?
                    .ok_or(ChatTurnError::ConversationNotFound(id))?;
                if !conversation.is_owned_by(user_id) {
                    tracing::warn!(conversation_id = %id, "Conversation accessed by another user");
                    return Err(ChatTurnError::Forbidden(id));
                }
                Ok(conversation)
            }
            None => {
                let title = Conversation::title_from_message(message, self.config.title_max_chars);
                let conversation = self
                    .conversation_repository
                    .create_conversation(user_id, &title)
                    .await?;
                tracing::info!(conversation_id = %conversation.id, "Conversation created");
                Ok(conversation)
            }
        }
    }

    /// Returns the conversation's thread, creating and binding one first if needed.
    /// The binding is persisted before any message is sent so a retry reuses it.
    async fn ensure_thread(&self, conversation: Conversation) -> Result<ThreadId, ChatTurnError> {
        if let Some(thread_id) = conversation.thread_id {
            return Ok(thread_id);
        }

        let thread_id = self.assistant.create_thread().await?;
        match self
            .conversation_repository
            .bind_thread(conversation.id, &thread_id)
            .await
        {
            Ok(ThreadBinding::Bound) | Ok(ThreadBinding::AlreadyBound) => {
                tracing::debug!(conversation_id = %conversation.id, %thread_id, "Thread bound");
                Ok(thread_id)
            }
            Err(RepositoryError::ConstraintViolation(_)) => {
                // A concurrent first turn bound its own thread first.
                let winner = self
                    .conversation_repository
                    .get_conversation(conversation.id)
                    .await?
                    .and_then(|c| c.thread_id)
                    .ok_or(ChatTurnError::ConversationNotFound(conversation.id))?;
                tracing::warn!(
                    conversation_id = %conversation.id,
                    discarded_thread_id = %thread_id,
                    %winner,
                    "Thread already bound by a concurrent turn"
                );
                Ok(winner)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn wait_for_run(
        &self,
        thread_id: &ThreadId,
        run_id: &RunId,
    ) -> Result<RunOutcome, ChatTurnError> {
        let policy = self.config.poll_policy;
        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
            let status = self.assistant.run_status(thread_id, run_id).await?;
            tracing::trace!(attempt, status = %status, "Polled run status");

            if status == RunStatus::Completed {
                return Ok(RunOutcome::Completed);
            }
            if !status.is_pending() {
                return Err(ChatTurnError::RunFailed(status));
            }
        }
        Ok(RunOutcome::TimedOut {
            attempts: policy.max_attempts,
        })
    }

    async fn append(
        &self,
        conversation_id: ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, ChatTurnError> {
        Ok(self
            .conversation_repository
            .append_message(conversation_id, role, content)
            .await?)
    }

    fn dispatch_classification(&self, message: &Message) {
        self.dispatcher.dispatch(ClassificationRequest {
            message_id: message.id,
            conversation_id: message.conversation_id,
            message_content: message.content.clone(),
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatTurnError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),
    #[error("conversation {0} belongs to another user")]
    Forbidden(ConversationId),
    #[error("assistant: {0}")]
    Upstream(#[from] AssistantEngineError),
    #[error("assistant run ended with status {0}")]
    RunFailed(RunStatus),
    #[error("assistant run still pending after {attempts} polls")]
    Timeout {
        conversation_id: ConversationId,
        attempts: u32,
    },
    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),
}

impl ChatTurnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatTurnError::Validation(_) => ErrorKind::Validation,
            ChatTurnError::ConversationNotFound(_) => ErrorKind::NotFound,
            ChatTurnError::Forbidden(_) => ErrorKind::Forbidden,
            ChatTurnError::Upstream(AssistantEngineError::InvalidResponse(_)) => {
                ErrorKind::UpstreamFormat
            }
            ChatTurnError::Upstream(_) | ChatTurnError::RunFailed(_) => ErrorKind::Upstream,
            ChatTurnError::Timeout { .. } => ErrorKind::Timeout,
            ChatTurnError::Repository(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
