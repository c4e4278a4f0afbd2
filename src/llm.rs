//! Generator Client
//!
//! The generator is an external capability behind a fixed request/response
//! contract: prompt + model id in, raw text + token counters out. One
//! OpenAI-compatible implementation covers both hosted APIs and local
//! servers exposing `/chat/completions`.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw generator output plus usage counters for the observable surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorResponse {
    pub raw_text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

#[async_trait]
pub trait GeneratorClient: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> Result<GeneratorResponse>;
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl GeneratorClient for OpenAiCompatClient {
    async fn generate(&self, prompt: &str, model: &str) -> Result<GeneratorResponse> {
        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Llm(format!("generator call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Llm(format!("failed to parse generator response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EngineError::Llm("no content in generator response".to_string()))?;

        let tokens_in = response_json["usage"]["prompt_tokens"].as_u64().unwrap_or(0);
        let tokens_out = response_json["usage"]["completion_tokens"]
            .as_u64()
            .unwrap_or(0);

        Ok(GeneratorResponse {
            raw_text: content.trim().to_string(),
            tokens_in,
            tokens_out,
        })
    }
}
