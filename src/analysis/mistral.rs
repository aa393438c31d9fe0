//! Mistral chat completions transport for the advisory classifier

use serde::{Deserialize, Serialize};

use crate::config::AdvisorySettings;
use crate::error::{Result, VisTraceError};

use super::advisory::{AdvisoryClassifier, AdvisoryRequest};

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Advisory classifier backed by the Mistral API
pub struct MistralAdvisor {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
}

impl MistralAdvisor {
    pub fn new(settings: &AdvisorySettings, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key_env: settings.api_key_env.clone(),
            api_key,
        })
    }

    /// Read the API key from the configured environment variable. A missing
    /// key leaves the advisor in place but every consultation fails.
    pub fn from_env(settings: &AdvisorySettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; advisory confirmation will be unavailable",
                settings.api_key_env
            );
        }
        Self::new(settings, api_key)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl AdvisoryClassifier for MistralAdvisor {
    fn name(&self) -> String {
        format!("mistral/{}", self.model)
    }

    fn consult(&self, request: &AdvisoryRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VisTraceError::Advisory(format!("{} is not set", self.api_key_env)))?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
        };

        tracing::debug!("Consulting {} for the {} decision", self.model, request.family);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(VisTraceError::Advisory(format!("API error {}: {}", status, text)));
        }

        let reply: ChatResponse = response.json()?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| VisTraceError::Advisory("empty reply".to_string()))
    }
}

impl std::fmt::Debug for MistralAdvisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralAdvisor")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}
