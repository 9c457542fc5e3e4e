mod analysis_repository;
mod assistant_engine;
mod conversation_repository;
mod llm_client;
mod repository_error;

pub use analysis_repository::AnalysisRepository;
pub use assistant_engine::{AssistantEngine, AssistantEngineError};
pub use conversation_repository::ConversationRepository;
pub use llm_client::{LlmClient, LlmClientError};
pub use repository_error::RepositoryError;
