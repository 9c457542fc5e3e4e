use std::sync::Arc;

use crate::application::ports::{ConversationRepository, RepositoryError};
use crate::domain::{
    AnonymousUserId, Conversation, ConversationId, ConversationSummary, MAX_TITLE_CHARS, Message,
    PageRequest, Pagination,
};

use super::ErrorKind;

#[derive(Debug, Clone, Copy)]
pub struct ListingConfig {
    pub preview_chars: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            preview_chars: 50,
            default_page_size: 10,
            max_page_size: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationListItem {
    pub summary: ConversationSummary,
    pub preview: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConversationPage {
    pub conversations: Vec<ConversationListItem>,
    pub pagination: Pagination,
}

/// User-facing conversation management. Every operation is scoped to the
/// anonymous user that owns the conversation.
pub struct ConversationService {
    repository: Arc<dyn ConversationRepository>,
    config: ListingConfig,
}

impl ConversationService {
    pub fn new(repository: Arc<dyn ConversationRepository>, config: ListingConfig) -> Self {
        Self { repository, config }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        user_id: &str,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<ConversationPage, ConversationServiceError> {
        let user_id = parse_user(user_id)?;
        let page = PageRequest::clamped(
            page,
            per_page,
            self.config.default_page_size,
            self.config.max_page_size,
        );

        let total = self.repository.count_by_user(&user_id).await?;
        let conversations = self
            .repository
            .list_by_user(&user_id, page)
            .await?
            .into_iter()
            .map(|summary| ConversationListItem {
                preview: summary.preview(self.config.preview_chars),
                summary,
            })
            .collect();

        Ok(ConversationPage {
            conversations,
            pagination: page.pagination(total),
        })
    }

    #[tracing::instrument(skip(self, title), fields(conversation_id = %id))]
    pub async fn rename(
        &self,
        user_id: &str,
        id: ConversationId,
        title: &str,
    ) -> Result<Conversation, ConversationServiceError> {
        let user_id = parse_user(user_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(ConversationServiceError::Validation(
                "title is required".to_string(),
            ));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ConversationServiceError::Validation(format!(
                "title too long (max {} characters)",
                MAX_TITLE_CHARS
            )));
        }

        let mut conversation = self.owned(&user_id, id).await?;
        self.repository.rename_conversation(id, title).await?;
        conversation.title = title.to_string();

        tracing::info!("Conversation renamed");
        Ok(conversation)
    }

    #[tracing::instrument(skip(self), fields(conversation_id = %id))]
    pub async fn delete(
        &self,
        user_id: &str,
        id: ConversationId,
    ) -> Result<(), ConversationServiceError> {
        let user_id = parse_user(user_id)?;
        self.owned(&user_id, id).await?;
        self.repository.delete_conversation(id).await?;

        tracing::info!("Conversation deleted");
        Ok(())
    }

    /// Back-office deletion, without the ownership check.
    #[tracing::instrument(skip(self), fields(conversation_id = %id))]
    pub async fn remove(&self, id: ConversationId) -> Result<(), ConversationServiceError> {
        self.repository
            .get_conversation(id)
            .await?
            .ok_or(ConversationServiceError::NotFound(id))?;
        self.repository.delete_conversation(id).await?;

        tracing::info!("Conversation deleted by an administrator");
        Ok(())
    }

    /// Messages of an owned conversation, oldest first.
    #[tracing::instrument(skip(self), fields(conversation_id = %id))]
    pub async fn history(
        &self,
        user_id: &str,
        id: ConversationId,
    ) -> Result<(Conversation, Vec<Message>), ConversationServiceError> {
        let user_id = parse_user(user_id)?;
        let conversation = self.owned(&user_id, id).await?;
        let messages = self.repository.get_messages(id).await?;
        Ok((conversation, messages))
    }

    async fn owned(
        &self,
        user_id: &AnonymousUserId,
        id: ConversationId,
    ) -> Result<Conversation, ConversationServiceError> {
        let conversation = self
            .repository
            .get_conversation(id)
            .await?
            .ok_or(ConversationServiceError::NotFound(id))?;
        if !conversation.is_owned_by(user_id) {
            tracing::warn!(conversation_id = %id, "Conversation accessed by another user");
            return Err(ConversationServiceError::Forbidden(id));
        }
        Ok(conversation)
    }
}

fn parse_user(user_id: &str) -> Result<AnonymousUserId, ConversationServiceError> {
    AnonymousUserId::parse(user_id.trim()).map_err(ConversationServiceError::Validation)
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),
    #[error("conversation {0} belongs to another user")]
    Forbidden(ConversationId),
    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),
}

impl ConversationServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversationServiceError::Validation(_) => ErrorKind::Validation,
            ConversationServiceError::NotFound(_) => ErrorKind::NotFound,
            ConversationServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ConversationServiceError::Repository(e) if e.is_not_found() => ErrorKind::NotFound,
            ConversationServiceError::Repository(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
