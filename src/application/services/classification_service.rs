use std::sync::Arc;

use serde_json::Value;

use crate::application::ports::{
    AnalysisRepository, ConversationRepository, LlmClient, LlmClientError, RepositoryError,
};
use crate::domain::{
    AnalysisId, ConversationId, EmotionClassification, MessageId, MessageRole, NewEmotionAnalysis,
};

use super::ErrorKind;

pub const CLASSIFICATION_INSTRUCTION: &str = r#"Tu analyses le message d'une personne qui contacte un service de soutien.
Réponds uniquement avec un objet JSON, sans texte autour, contenant exactement ces quatre champs :
- "sentiment" : "positif", "neutre" ou "negatif"
- "emotion" : "tristesse", "peur", "colere", "honte", "soulagement", "confusion" ou "espoir"
- "urgence" : un entier de 1 (aucune urgence) à 5 (danger immédiat)
- "type_violence" : "cyberharcelement", "revenge_porn", "racisme", "islamophobie", "violence_physique", "autre" ou "aucun"
Exemple : {"sentiment":"negatif","emotion":"peur","urgence":4,"type_violence":"cyberharcelement"}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub message_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationOutcome {
    pub analysis_id: AnalysisId,
    pub classification: EmotionClassification,
}

pub struct ClassificationService {
    conversation_repository: Arc<dyn ConversationRepository>,
    analysis_repository: Arc<dyn AnalysisRepository>,
    llm_client: Arc<dyn LlmClient>,
}

impl ClassificationService {
    pub fn new(
        conversation_repository: Arc<dyn ConversationRepository>,
        analysis_repository: Arc<dyn AnalysisRepository>,
        llm_client: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            conversation_repository,
            analysis_repository,
            llm_client,
        }
    }

    /// Classifies one user message and stores the normalized result.
    ///
    /// All preconditions are checked before the classifier is called: the
    /// message must exist, belong to `conversation_id`, have the `user` role and
    /// not be analysed yet.
    #[tracing::instrument(
        skip(self, request),
        fields(message_id = %request.message_id, conversation_id = %request.conversation_id)
    )]
    pub async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<ClassificationOutcome, ClassificationError> {
        let content = request.message_content.trim();
        if content.is_empty() {
            return Err(ClassificationError::Validation(
                "message_content is required".to_string(),
            ));
        }

        let message = self
            .conversation_repository
            .get_message(request.message_id)
            .await
            .map_err(ClassificationError::Repository)?
            .ok_or(ClassificationError::MessageNotFound(request.message_id))?;

        if message.role != MessageRole::User {
            return Err(ClassificationError::Validation(
                "only user messages are analysed".to_string(),
            ));
        }

        if message.conversation_id != request.conversation_id {
            return Err(ClassificationError::Validation(format!(
                "message {} does not belong to conversation {}",
                message.id, request.conversation_id
            )));
        }

        if self
            .analysis_repository
            .find_by_message(message.id)
            .await
            .map_err(ClassificationError::Repository)?
            .is_some()
        {
            return Err(ClassificationError::AlreadyAnalyzed(message.id));
        }

        let raw_response = self
            .llm_client
            .complete(CLASSIFICATION_INSTRUCTION, content)
            .await?;

        let candidate =
            parse_classifier_output(&raw_response).map_err(ClassificationError::UpstreamFormat)?;
        let classification = EmotionClassification::normalize(&candidate);
        if classification.to_json() != candidate {
            tracing::debug!(
                raw = %raw_response,
                "Classifier output coerced onto the taxonomy"
            );
        }

        let stored = self
            .analysis_repository
            .insert_analysis(&NewEmotionAnalysis {
                message_id: message.id,
                conversation_id: message.conversation_id,
                classification,
                raw_response,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::ConstraintViolation(_) => {
                    ClassificationError::AlreadyAnalyzed(message.id)
                }
                other => ClassificationError::Repository(other),
            })?;

        tracing::info!(
            analysis_id = %stored.id,
            sentiment = %classification.sentiment,
            emotion = %classification.emotion,
            urgency = %classification.urgency,
            violence_type = %classification.violence_type,
            "Message classified"
        );

        Ok(ClassificationOutcome {
            analysis_id: stored.id,
            classification,
        })
    }
}

/// Extracts the JSON object from a classifier response, tolerating a
/// surrounding markdown code fence.
pub fn parse_classifier_output(raw: &str) -> Result<Value, String> {
    let payload = strip_code_fences(raw);
    let value: Value = serde_json::from_str(payload).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err(format!("expected a JSON object, got: {}", payload));
    }
    Ok(value)
}

pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = match rest.split_once('\n') {
        Some((tag, body)) if !tag.trim_start().starts_with('{') => body,
        Some(_) => rest,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("message {0} is already analysed")]
    AlreadyAnalyzed(MessageId),
    #[error("classifier: {0}")]
    Upstream(#[from] LlmClientError),
    #[error("unparseable classifier output: {0}")]
    UpstreamFormat(String),
    #[error("repository: {0}")]
    Repository(RepositoryError),
}

impl ClassificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassificationError::Validation(_) => ErrorKind::Validation,
            ClassificationError::MessageNotFound(_) => ErrorKind::NotFound,
            ClassificationError::AlreadyAnalyzed(_) => ErrorKind::Conflict,
            ClassificationError::Upstream(_) => ErrorKind::Upstream,
            ClassificationError::UpstreamFormat(_) => ErrorKind::UpstreamFormat,
            ClassificationError::Repository(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
