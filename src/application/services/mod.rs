mod chat_turn_service;
mod classification_service;
mod classification_worker;
mod conversation_service;
mod error_kind;
mod reporting_service;

pub use chat_turn_service::{
    ChatTurnConfig, ChatTurnError, ChatTurnService, RunPollPolicy, TurnOutcome, TurnRequest,
};
pub use classification_service::{
    CLASSIFICATION_INSTRUCTION, ClassificationError, ClassificationOutcome, ClassificationRequest,
    ClassificationService, parse_classifier_output, strip_code_fences,
};
pub use classification_worker::{
    ClassificationDispatcher, ClassificationWorker, classification_channel, requeue_unanalyzed,
};
pub use conversation_service::{
    ConversationListItem, ConversationPage, ConversationService, ConversationServiceError,
    ListingConfig,
};
pub use error_kind::ErrorKind;
pub use reporting_service::{
    ConversationDetail, Dashboard, DashboardAverages, EmotionReport, FlaggedConversationPage,
    ReportingError, ReportingService, ReviewedMessage, UserDetail, UserEmotions, UserPage,
    analysis_filter,
};
