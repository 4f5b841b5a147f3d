//! Chat model access.
//!
//! Models are addressed by selector strings: `oll_<model>` for models served
//! by Ollama (`oll_llama3_instruct` runs `llama3:instruct`) and
//! `openai_<model>` for OpenAI chat models.

mod ollama;
mod openai;

pub use ollama::OllamaChat;
pub use openai::OpenAIChat;

use crate::config::LlmSettings;
use crate::error::{PlotlineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Trait for chat completion backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a conversation and return the assistant's reply.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model name as sent to the runtime.
    fn model_name(&self) -> &str;

    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(&[ChatMessage::user(prompt)]).await
    }
}

/// Request options for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmOptions {
    pub request_timeout: Duration,
    pub temperature: f32,
    pub context_window: u32,
}

impl LlmOptions {
    /// Options for `model`, starting from the configured defaults.
    ///
    /// Mistral models get an 8192-token window; llama2 gets a 30 s timeout.
    pub fn for_model(settings: &LlmSettings, model: &str) -> Self {
        let mut options = Self {
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            temperature: settings.temperature,
            context_window: settings.context_window,
        };

        let family = model.split([':', '_']).next().unwrap_or(model);
        match family {
            "mistral" => options.context_window = 8192,
            "llama2" => options.request_timeout = Duration::from_secs(30),
            _ => {}
        }
        options
    }
}

/// A parsed model selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSpec {
    Ollama(String),
    OpenAI(String),
}

impl std::str::FromStr for ModelSpec {
    type Err = PlotlineError;

    fn from_str(selector: &str) -> Result<Self> {
        if let Some(name) = selector.strip_prefix("oll_") {
            if name.is_empty() {
                return Err(PlotlineError::UnsupportedBackend(format!("model '{}'", selector)));
            }
            Ok(ModelSpec::Ollama(name.replacen('_', ":", 1)))
        } else if let Some(name) = selector.strip_prefix("openai_") {
            if name.is_empty() {
                return Err(PlotlineError::UnsupportedBackend(format!("model '{}'", selector)));
            }
            Ok(ModelSpec::OpenAI(name.to_string()))
        } else {
            Err(PlotlineError::UnsupportedBackend(format!(
                "model '{}' (expected an 'oll_' or 'openai_' prefix)",
                selector
            )))
        }
    }
}

/// Build a chat model from a selector string.
pub fn load_llm(selector: &str, settings: &LlmSettings) -> Result<Arc<dyn ChatModel>> {
    match selector.parse::<ModelSpec>()? {
        ModelSpec::Ollama(model) => {
            let options = LlmOptions::for_model(settings, &model);
            Ok(Arc::new(OllamaChat::new(&settings.ollama_url, &model, options)?))
        }
        ModelSpec::OpenAI(model) => {
            let api_key = settings.openai_api_key.clone().ok_or_else(|| {
                PlotlineError::Config(
                    "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
                )
            })?;
            let mut options = LlmOptions::for_model(settings, &model);
            options.temperature = 0.0;
            Ok(Arc::new(OpenAIChat::new(&api_key, &model, options)?))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted chat model for tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with queued answers (or echoes the last user message when the
    /// queue is empty) and records every request.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
            self.requests.lock().unwrap().push(messages.to_vec());
            if let Some(reply) = self.replies.lock().unwrap().pop_front() {
                return Ok(reply);
            }
            let last = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(format!("echo: {}", last))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}
