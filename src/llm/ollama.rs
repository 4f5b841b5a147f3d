//! Ollama chat implementation.

use super::{ChatMessage, ChatModel, LlmOptions};
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Chat model served by Ollama (`POST /api/chat`).
pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    options: LlmOptions,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    temperature: f32,
    num_ctx: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaChat {
    /// Create a chat client; the request timeout applies to every call.
    pub fn new(base_url: &str, model: &str, options: LlmOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options,
        })
    }

    pub fn options(&self) -> &LlmOptions {
        &self.options
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: RequestOptions {
                temperature: self.options.temperature,
                num_ctx: self.options.context_window,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PlotlineError::Llm(format!(
                "Ollama returned {} for model {}: {}",
                status, self.model, body
            )));
        }

        let body: ChatResponse = response.json().await?;
        debug!("Received {} chars from {}", body.message.content.len(), self.model);
        Ok(body.message.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "llama3:instruct",
            messages: &messages,
            stream: false,
            options: RequestOptions {
                temperature: 1.0,
                num_ctx: 4096,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["options"]["num_ctx"], 4096);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_client_keeps_options() {
        let options = LlmOptions {
            request_timeout: Duration::from_secs(30),
            temperature: 1.0,
            context_window: 4096,
        };
        let chat = OllamaChat::new("http://localhost:11434/", "llama2", options.clone()).unwrap();
        assert_eq!(chat.options(), &options);
        assert_eq!(chat.model_name(), "llama2");
    }
}
