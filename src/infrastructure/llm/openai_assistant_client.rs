use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::application::ports::{AssistantEngine, AssistantEngineError};
use crate::domain::{RunId, RunStatus, ThreadId};
use crate::presentation::config::AssistantSettings;

/// Assistants API (v2) client: one thread per conversation, runs polled by id.
pub struct OpenAiAssistantClient {
    client: Client,
    base_url: String,
    api_key: String,
    assistant_id: String,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct RunResponse {
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Deserialize)]
struct MessageText {
    value: String,
}

impl OpenAiAssistantClient {
    pub fn new(settings: &AssistantSettings) -> Result<Self, AssistantEngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| AssistantEngineError::ApiRequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            assistant_id: settings.assistant_id.clone(),
        })
    }

    fn apply_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, AssistantEngineError> {
        let response = self
            .apply_headers(request)
            .send()
            .await
            .map_err(|e| AssistantEngineError::ApiRequestFailed(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| AssistantEngineError::InvalidResponse(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, AssistantEngineError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AssistantEngineError::RateLimited);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(AssistantEngineError::HttpStatus {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

#[async_trait]
impl AssistantEngine for OpenAiAssistantClient {
    #[tracing::instrument(skip(self))]
    async fn create_thread(&self) -> Result<ThreadId, AssistantEngineError> {
        let created: IdResponse = self
            .send(
                self.client
                    .post(format!("{}/threads", self.base_url))
                    .json(&json!({})),
            )
            .await?;
        Ok(ThreadId::new(created.id))
    }

    #[tracing::instrument(skip(self, content), fields(thread_id = %thread_id))]
    async fn append_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), AssistantEngineError> {
        let _: IdResponse = self
            .send(
                self.client
                    .post(format!("{}/threads/{}/messages", self.base_url, thread_id))
                    .json(&json!({ "role": "user", "content": content })),
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(thread_id = %thread_id))]
    async fn create_run(&self, thread_id: &ThreadId) -> Result<RunId, AssistantEngineError> {
        let run: IdResponse = self
            .send(
                self.client
                    .post(format!("{}/threads/{}/runs", self.base_url, thread_id))
                    .json(&json!({ "assistant_id": self.assistant_id })),
            )
            .await?;
        Ok(RunId::new(run.id))
    }

    async fn run_status(
        &self,
        thread_id: &ThreadId,
        run_id: &RunId,
    ) -> Result<RunStatus, AssistantEngineError> {
        let run: RunResponse = self
            .send(self.client.get(format!(
                "{}/threads/{}/runs/{}",
                self.base_url, thread_id, run_id
            )))
            .await?;
        run.status
            .parse()
            .map_err(AssistantEngineError::InvalidResponse)
    }

    #[tracing::instrument(skip(self), fields(thread_id = %thread_id))]
    async fn latest_assistant_reply(
        &self,
        thread_id: &ThreadId,
    ) -> Result<String, AssistantEngineError> {
        let messages: MessageList = self
            .send(
                self.client
                    .get(format!("{}/threads/{}/messages", self.base_url, thread_id))
                    .query(&[("order", "desc"), ("limit", "20")]),
            )
            .await?;

        latest_text(messages).ok_or_else(|| {
            AssistantEngineError::InvalidResponse("no assistant text on thread".to_string())
        })
    }
}

/// First text part of the newest assistant message. Listings are newest first.
fn latest_text(messages: MessageList) -> Option<String> {
    messages
        .data
        .into_iter()
        .filter(|m| m.role == "assistant")
        .find_map(|m| {
            m.content
                .into_iter()
                .filter(|c| c.kind == "text")
                .find_map(|c| c.text.map(|t| t.value))
        })
}
