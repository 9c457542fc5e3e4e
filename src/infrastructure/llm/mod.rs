mod openai_assistant_client;
mod openai_chat_client;

pub use openai_assistant_client::OpenAiAssistantClient;
pub use openai_chat_client::OpenAiChatClient;
