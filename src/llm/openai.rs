//! OpenAI chat implementation, used for judge models.

use super::{ChatMessage, ChatModel, LlmOptions, Role};
use crate::error::{PlotlineError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;

/// Create an OpenAI client with a request timeout.
fn create_client(api_key: &str, timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Client::with_config(OpenAIConfig::new().with_api_key(api_key)).with_http_client(http_client))
}

/// Chat model served by the OpenAI API.
pub struct OpenAIChat {
    client: Client<OpenAIConfig>,
    model: String,
    options: LlmOptions,
}

impl OpenAIChat {
    pub fn new(api_key: &str, model: &str, options: LlmOptions) -> Result<Self> {
        Ok(Self {
            client: create_client(api_key, options.request_timeout)?,
            model: model.to_string(),
            options,
        })
    }

    fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let converted: ChatCompletionRequestMessage = match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| PlotlineError::OpenAI(e.to_string()))?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| PlotlineError::OpenAI(e.to_string()))?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| PlotlineError::OpenAI(e.to_string()))?
                .into(),
        };
        Ok(converted)
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    #[instrument(skip(self, messages), fields(model = %self.model))]
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let messages = messages
            .iter()
            .map(Self::to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.options.temperature)
            .build()
            .map_err(|e| PlotlineError::OpenAI(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PlotlineError::OpenAI(format!("Failed to generate response: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| PlotlineError::Llm("Empty response from OpenAI".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
