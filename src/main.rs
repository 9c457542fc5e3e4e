use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use soutien::application::ports::{AnalysisRepository, ConversationRepository};
use soutien::application::services::{
    ChatTurnService, ClassificationService, ClassificationWorker, ConversationService,
    ReportingService, classification_channel, requeue_unanalyzed,
};
use soutien::infrastructure::llm::{OpenAiAssistantClient, OpenAiChatClient};
use soutien::infrastructure::observability::{TracingConfig, init_tracing};
use soutien::infrastructure::persistence::{
    InMemoryStore, PgAnalysisRepository, PgConversationRepository, create_pool, run_migrations,
};
use soutien::presentation::{AppState, Environment, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let settings = Settings::load(environment).context("Failed to load configuration")?;

    init_tracing(
        &TracingConfig::from_settings(environment, &settings.logging),
        settings.server.port,
    );

    let (conversation_repository, analysis_repository) = build_repositories(&settings).await?;

    let assistant = Arc::new(
        OpenAiAssistantClient::new(&settings.assistant)
            .context("Failed to build assistant client")?,
    );
    let classifier = Arc::new(
        OpenAiChatClient::new(&settings.classifier)
            .context("Failed to build classifier client")?,
    );
    if settings.assistant.api_key.is_empty() || settings.assistant.assistant_id.is_empty() {
        tracing::warn!("Assistant credentials are not configured, chat turns will fail");
    }

    let classification_service = Arc::new(ClassificationService::new(
        Arc::clone(&conversation_repository),
        Arc::clone(&analysis_repository),
        classifier,
    ));

    let (dispatcher, receiver) = classification_channel(settings.classification.queue_capacity);
    let worker = ClassificationWorker::new(
        receiver,
        Arc::clone(&classification_service),
        settings.classification_timeout(),
    );
    tokio::spawn(worker.run());

    if settings.classification.backfill_on_startup {
        match requeue_unanalyzed(
            analysis_repository.as_ref(),
            &dispatcher,
            settings.classification.backfill_limit,
        )
        .await
        {
            Ok(queued) => tracing::info!(queued, "Classification backfill done"),
            Err(e) => tracing::warn!(error = %e, "Classification backfill failed"),
        }
    }

    let chat_turn_service = Arc::new(ChatTurnService::new(
        Arc::clone(&conversation_repository),
        assistant,
        dispatcher,
        settings.chat_turn_config(),
    ));
    let conversation_service = Arc::new(ConversationService::new(
        Arc::clone(&conversation_repository),
        settings.listing_config(),
    ));
    let reporting_service = Arc::new(ReportingService::new(
        Arc::clone(&conversation_repository),
        Arc::clone(&analysis_repository),
        settings.chat.default_page_size,
        settings.chat.max_page_size,
    ));

    let router = create_router(AppState {
        chat_turn_service,
        classification_service,
        conversation_service,
        reporting_service,
    });

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}

async fn build_repositories(
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn ConversationRepository>, Arc<dyn AnalysisRepository>)> {
    if settings.database.url.trim().is_empty() {
        tracing::warn!("No database configured, using the in-memory store");
        let store = Arc::new(InMemoryStore::new());
        let conversations: Arc<dyn ConversationRepository> = store.clone();
        let analyses: Arc<dyn AnalysisRepository> = store;
        return Ok((conversations, analyses));
    }

    let pool = create_pool(&settings.database.url, settings.database.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let conversations: Arc<dyn ConversationRepository> =
        Arc::new(PgConversationRepository::new(pool.clone()));
    let analyses: Arc<dyn AnalysisRepository> = Arc::new(PgAnalysisRepository::new(pool));
    Ok((conversations, analyses))
}
