mod anonymous_user_id;
mod conversation;
mod conversation_id;
mod emotion_analysis;
mod message;
mod message_id;
mod message_role;
mod page;
mod report;
mod run_status;
mod taxonomy;
mod thread_id;

pub use anonymous_user_id::AnonymousUserId;
pub use conversation::{
    Conversation, ConversationSummary, MAX_TITLE_CHARS, ThreadBinding, truncate_chars,
};
pub use conversation_id::ConversationId;
pub use emotion_analysis::{EmotionAnalysis, NewEmotionAnalysis};
pub use message::Message;
pub use message_id::{AnalysisId, MessageId};
pub use message_role::MessageRole;
pub use page::{PageRequest, Pagination};
pub use report::{
    ActivityTotals, AnalysisField, AnalysisFilter, AnalysisSummary, DailyActivity, DailyCount,
    FlaggedConversation, FlaggedMessage, ReportPeriod, UrgencyStats, UserActivity, UserOverview,
    ValueCount, days_back, round_one_decimal, start_of_day,
};
pub use run_status::RunStatus;
pub use taxonomy::{EmotionClassification, Emotion, Sentiment, Urgency, ViolenceType};
pub use thread_id::{RunId, ThreadId};
