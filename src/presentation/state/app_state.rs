use std::sync::Arc;

use crate::application::services::{
    ChatTurnService, ClassificationService, ConversationService, ReportingService,
};

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub chat_turn_service: Arc<ChatTurnService>,
    pub classification_service: Arc<ClassificationService>,
    pub conversation_service: Arc<ConversationService>,
    pub reporting_service: Arc<ReportingService>,
}
