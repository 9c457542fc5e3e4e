mod in_memory_store;
mod pg_analysis_repository;
mod pg_conversation_repository;
mod pg_pool;

pub use in_memory_store::InMemoryStore;
pub use pg_analysis_repository::PgAnalysisRepository;
pub use pg_conversation_repository::PgConversationRepository;
pub use pg_pool::{create_pool, run_migrations};
