use std::time::Duration;

use serde::{Deserialize, Serialize};
use tutor_core::config::ProviderSettings;
use tutor_core::error::{codes, AppError};

use super::Llm;
use crate::provider::{CallCodes, ProviderClient};

const GENERATE_CODES: CallCodes = CallCodes {
    failed: codes::AI_GENERATION_FAILED,
    timeout: codes::AI_GENERATION_TIMEOUT,
};

/// Chat-completions client. Every prompt is sent as one user message; no streaming.
#[derive(Debug, Clone)]
pub struct OpenRouterLlm {
    client: ProviderClient,
    temperature: f32,
}

impl OpenRouterLlm {
    pub fn new(client: ProviderClient, temperature: f32) -> Self {
        Self {
            client,
            temperature,
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, AppError> {
        if settings.api_key.is_none() {
            return Err(AppError::new(
                codes::CONFIG_MISSING,
                "OPENROUTER_API_KEY is required for generation",
            ));
        }
        let client = ProviderClient::new(
            &settings.llm_base_url,
            settings.api_key.clone(),
            Duration::from_secs(settings.generate_timeout_secs),
        )?;
        Ok(Self::new(client, settings.temperature))
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Llm for OpenRouterLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let req = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new(codes::AI_GENERATION_FAILED, "Failed to encode chat request")
                .with_details(e.to_string())
        })?;

        let resp: ChatResponse = self
            .client
            .post_json("chat/completions", body, GENERATE_CODES)?;
        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AppError::new(
                codes::AI_GENERATION_FAILED,
                "Chat completion was empty",
            )
            .with_details(format!("model={model}")));
        }
        Ok(text)
    }
}
