use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use soutien::application::ports::{
    AssistantEngine, AssistantEngineError, ConversationRepository, LlmClient, LlmClientError,
};
use soutien::application::services::{
    ChatTurnConfig, ChatTurnService, ClassificationRequest, ClassificationService,
    RunPollPolicy, classification_channel,
};
use soutien::domain::{
    AnonymousUserId, ConversationId, Message, MessageRole, RunId, RunStatus, ThreadId,
};
use soutien::infrastructure::persistence::InMemoryStore;

pub const USER_A: &str = "3f2b6c1e-8d4a-4f7b-9c2e-1a5d6e7f8091";
pub const USER_B: &str = "b7e4a9d2-1c3f-4e8a-a6b5-0d9c8e7f6a54";

pub fn user(raw: &str) -> AnonymousUserId {
    AnonymousUserId::parse(raw).expect("valid test user id")
}

pub fn fast_chat_config(max_attempts: u32) -> ChatTurnConfig {
    ChatTurnConfig {
        poll_policy: RunPollPolicy {
            interval: Duration::ZERO,
            max_attempts,
        },
        ..ChatTurnConfig::default()
    }
}

/// Assistant engine returning run statuses from a script, then `final_status` forever.
pub struct ScriptedAssistant {
    script: Mutex<VecDeque<RunStatus>>,
    final_status: RunStatus,
    reply: String,
    fail_create_thread: bool,
    threads_created: AtomicUsize,
    runs_created: AtomicUsize,
    status_polls: AtomicUsize,
    appended: Mutex<Vec<(ThreadId, String)>>,
}

impl ScriptedAssistant {
    fn new(script: Vec<RunStatus>, final_status: RunStatus, reply: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            final_status,
            reply: reply.to_string(),
            fail_create_thread: false,
            threads_created: AtomicUsize::new(0),
            runs_created: AtomicUsize::new(0),
            status_polls: AtomicUsize::new(0),
            appended: Mutex::new(Vec::new()),
        }
    }

    pub fn completing(reply: &str) -> Self {
        Self::new(
            vec![RunStatus::Queued, RunStatus::InProgress],
            RunStatus::Completed,
            reply,
        )
    }

    pub fn never_completing() -> Self {
        Self::new(vec![RunStatus::Queued], RunStatus::InProgress, "")
    }

    pub fn ending_with(status: RunStatus) -> Self {
        Self::new(vec![RunStatus::InProgress], status, "")
    }

    pub fn unreachable() -> Self {
        Self {
            fail_create_thread: true,
            ..Self::completing("")
        }
    }

    pub fn threads_created(&self) -> usize {
        self.threads_created.load(Ordering::SeqCst)
    }

    pub fn runs_created(&self) -> usize {
        self.runs_created.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> usize {
        self.status_polls.load(Ordering::SeqCst)
    }

    pub fn appended(&self) -> Vec<(ThreadId, String)> {
        self.appended.lock().expect("lock").clone()
    }
}

#[async_trait::async_trait]
impl AssistantEngine for ScriptedAssistant {
    async fn create_thread(&self) -> Result<ThreadId, AssistantEngineError> {
        if self.fail_create_thread {
            return Err(AssistantEngineError::ApiRequestFailed(
                "connection refused".to_string(),
            ));
        }
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ThreadId::new(format!("thread_{}", n)))
    }

    async fn append_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), AssistantEngineError> {
        self.appended
            .lock()
            .expect("lock")
            .push((thread_id.clone(), content.to_string()));
        Ok(())
    }

    async fn create_run(&self, _thread_id: &ThreadId) -> Result<RunId, AssistantEngineError> {
        let n = self.runs_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RunId::new(format!("run_{}", n)))
    }

    async fn run_status(
        &self,
        _thread_id: &ThreadId,
        _run_id: &RunId,
    ) -> Result<RunStatus, AssistantEngineError> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().expect("lock").pop_front();
        Ok(next.unwrap_or(self.final_status))
    }

    async fn latest_assistant_reply(
        &self,
        _thread_id: &ThreadId,
    ) -> Result<String, AssistantEngineError> {
        Ok(self.reply.clone())
    }
}

/// Assistant that lets a concurrent turn bind `winner` to the conversation
/// just before its own thread is created, then behaves like `inner`.
pub struct ThreadRaceAssistant {
    pub inner: ScriptedAssistant,
    store: Arc<InMemoryStore>,
    conversation_id: ConversationId,
    winner: ThreadId,
}

impl ThreadRaceAssistant {
    pub fn new(
        inner: ScriptedAssistant,
        store: Arc<InMemoryStore>,
        conversation_id: ConversationId,
        winner: ThreadId,
    ) -> Self {
        Self {
            inner,
            store,
            conversation_id,
            winner,
        }
    }
}

#[async_trait::async_trait]
impl AssistantEngine for ThreadRaceAssistant {
    async fn create_thread(&self) -> Result<ThreadId, AssistantEngineError> {
        self.store
            .bind_thread(self.conversation_id, &self.winner)
            .await
            .expect("concurrent bind");
        self.inner.create_thread().await
    }

    async fn append_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), AssistantEngineError> {
        self.inner.append_user_message(thread_id, content).await
    }

    async fn create_run(&self, thread_id: &ThreadId) -> Result<RunId, AssistantEngineError> {
        self.inner.create_run(thread_id).await
    }

    async fn run_status(
        &self,
        thread_id: &ThreadId,
        run_id: &RunId,
    ) -> Result<RunStatus, AssistantEngineError> {
        self.inner.run_status(thread_id, run_id).await
    }

    async fn latest_assistant_reply(
        &self,
        thread_id: &ThreadId,
    ) -> Result<String, AssistantEngineError> {
        self.inner.latest_assistant_reply(thread_id).await
    }
}

/// Classifier answering every request with the same raw text.
pub struct CannedLlm {
    response: String,
    calls: AtomicUsize,
}

impl CannedLlm {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, _instruction: &str, _text: &str) -> Result<String, LlmClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

pub struct FailingLlm;

#[async_trait::async_trait]
impl LlmClient for FailingLlm {
    async fn complete(&self, _instruction: &str, _text: &str) -> Result<String, LlmClientError> {
        Err(LlmClientError::ApiRequestFailed("HTTP 503".to_string()))
    }
}

pub struct ChatFixture {
    pub store: Arc<InMemoryStore>,
    pub assistant: Arc<ScriptedAssistant>,
    pub service: ChatTurnService,
    pub classification_queue: mpsc::Receiver<ClassificationRequest>,
}

impl ChatFixture {
    pub fn new(assistant: ScriptedAssistant, config: ChatTurnConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let assistant = Arc::new(assistant);
        let (dispatcher, classification_queue) = classification_channel(16);
        let service = ChatTurnService::new(
            store.clone(),
            assistant.clone(),
            dispatcher,
            config,
        );
        Self {
            store,
            assistant,
            service,
            classification_queue,
        }
    }

    pub fn queued_classifications(&mut self) -> Vec<ClassificationRequest> {
        let mut queued = Vec::new();
        while let Ok(request) = self.classification_queue.try_recv() {
            queued.push(request);
        }
        queued
    }
}

pub fn classification_service(
    store: &Arc<InMemoryStore>,
    llm: Arc<dyn LlmClient>,
) -> ClassificationService {
    ClassificationService::new(store.clone(), store.clone(), llm)
}

/// Creates a conversation for `owner` holding the given (role, content) messages.
pub async fn seed_conversation(
    store: &InMemoryStore,
    owner: &str,
    title: &str,
    messages: &[(MessageRole, &str)],
) -> (ConversationId, Vec<Message>) {
    let conversation = store
        .create_conversation(&user(owner), title)
        .await
        .expect("create conversation");
    let mut stored = Vec::new();
    for (role, content) in messages {
        stored.push(
            store
                .append_message(conversation.id, *role, content)
                .await
                .expect("append message"),
        );
    }
    (conversation.id, stored)
}
