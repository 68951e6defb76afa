//! HTTP client for the OpenAI-compatible inference server.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::application::ports::ModelEndpoint;

/// Per-request ceiling for the readiness check.
pub const LIST_MODELS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    id: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HttpModelEndpoint {
    http: Client,
}

impl HttpModelEndpoint {
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl ModelEndpoint for HttpModelEndpoint {
    async fn list_models(&self, base_url: &str) -> Result<Vec<String>> {
        let url = format!("{base_url}/models");
        let response = self
            .http
            .get(&url)
            .timeout(LIST_MODELS_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;
        let body: ModelsResponse = response.json().await.context("parsing model list")?;
        Ok(body.data.into_iter().map(|m| m.id).collect())
    }

    async fn chat_probe(
        &self,
        base_url: &str,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{base_url}/chat/completions");
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: 10,
        };
        let response = self
            .http
            .post(&url)
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()?;
        let body: ChatResponse = response.json().await.context("parsing chat completion")?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "(no response)".to_string()))
    }
}
