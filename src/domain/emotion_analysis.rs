use chrono::{DateTime, Utc};

use super::{AnalysisId, ConversationId, EmotionClassification, MessageId};

#[derive(Debug, Clone)]
pub struct EmotionAnalysis {
    pub id: AnalysisId,
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub classification: EmotionClassification,
    pub raw_response: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Analysis awaiting insertion. Only a normalized classification can be stored.
#[derive(Debug, Clone)]
pub struct NewEmotionAnalysis {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub classification: EmotionClassification,
    pub raw_response: String,
}
