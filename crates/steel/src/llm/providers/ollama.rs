// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use async_trait::async_trait;
use chrono::Utc;
use llm_contracts::{
    CompletionRequest, CompletionResponse, Embedder, EmbeddingRequest, EmbeddingResponse,
    LLMError, LLMResult, TextCompleter, Usage,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout_seconds: u64,
    /// Extra attempts after the first on transport failures, 5xx and 429.
    pub max_retries: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            timeout_seconds: 30,
            max_retries: 0,
        }
    }
}

/// Ollama-backed text completion and embedding.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> LLMResult<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::Configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: OllamaConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            timeout,
        })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn build_chat_payload(&self, request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": request.messages(),
            "stream": false
        });

        let generation = &request.generation_config;
        let mut options = serde_json::Map::new();
        if let Some(max_tokens) = generation.max_tokens {
            options.insert("num_predict".into(), json!(max_tokens));
        }
        if let Some(temperature) = generation.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        if let Some(stop) = &generation.stop_sequences {
            options.insert("stop".into(), json!(stop));
        }
        if !options.is_empty() {
            payload["options"] = Value::Object(options);
        }
        payload
    }

    fn parse_chat_response(
        &self,
        request: &CompletionRequest,
        data: &Value,
        started: Instant,
    ) -> LLMResult<CompletionResponse> {
        let content = data["message"]["content"].as_str().ok_or_else(|| {
            LLMError::Provider("Failed to extract content from Ollama response".to_string())
        })?;
        let count = |key: &str| u32::try_from(data[key].as_u64().unwrap_or(0)).unwrap_or(u32::MAX);

        Ok(CompletionResponse {
            id: Uuid::new_v4(),
            request_id: request.id,
            content: content.to_string(),
            model_used: data["model"]
                .as_str()
                .unwrap_or(&self.config.model)
                .to_string(),
            usage: Usage::new(count("prompt_eval_count"), count("eval_count")),
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            created_at: Utc::now(),
        })
    }

    async fn post_with_retry(&self, endpoint: &str, payload: &Value) -> LLMResult<Value> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            debug!(attempt = attempt + 1, endpoint, "Sending request to Ollama API");

            let response =
                tokio::time::timeout(self.timeout, self.client.post(&url).json(payload).send())
                    .await;

            let error = match response {
                Ok(Ok(resp)) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<Value>().await.map_err(|e| {
                            LLMError::Serialisation(format!("Failed to parse JSON response: {e}"))
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let message = format!("Ollama API error {status}: {body}");
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        LLMError::Unavailable(message)
                    } else {
                        LLMError::Provider(message)
                    }
                }
                Ok(Err(e)) if e.is_timeout() => LLMError::Timeout,
                Ok(Err(e)) if e.is_connect() => {
                    LLMError::Unavailable(format!("Failed to connect to Ollama: {e}"))
                }
                Ok(Err(e)) => LLMError::Network(format!("Request failed: {e}")),
                Err(_) => {
                    warn!("Request to Ollama API timed out after {:?}", self.timeout);
                    LLMError::Timeout
                }
            };

            if !error.is_transport() {
                return Err(error);
            }
            if attempt < self.config.max_retries {
                let wait = Duration::from_millis(250 * 2_u64.pow(attempt.min(4)));
                debug!(error = %error, ?wait, "Retrying Ollama request");
                tokio::time::sleep(wait).await;
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(LLMError::Timeout))
    }

    /// Lists installed models; fails when Ollama is unreachable or has none.
    pub async fn health_check(&self) -> LLMResult<Vec<String>> {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LLMError::Unavailable(format!("Failed to connect to Ollama: {e}")))?;
        if !response.status().is_success() {
            return Err(LLMError::Provider(format!(
                "Ollama health check failed: {}",
                response.status()
            )));
        }
        let data: Value = response.json().await.map_err(|e| {
            LLMError::Serialisation(format!("Failed to parse models response: {e}"))
        })?;
        let models: Vec<String> = data["models"]
            .as_array()
            .ok_or_else(|| {
                LLMError::Provider("Invalid response format from Ollama /api/tags".to_string())
            })?
            .iter()
            .filter_map(|model| model["name"].as_str().map(str::to_string))
            .collect();
        if models.is_empty() {
            warn!("Ollama is running but no models are available");
            return Err(LLMError::Provider("No models available in Ollama".to_string()));
        }
        info!("Ollama connected with {} models available", models.len());
        Ok(models)
    }
}

#[async_trait]
impl TextCompleter for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> LLMResult<CompletionResponse> {
        let started = Instant::now();
        let payload = self.build_chat_payload(&request);
        let data = self.post_with_retry("/api/chat", &payload).await?;
        let response = self.parse_chat_response(&request, &data, started)?;
        debug!(
            model = %response.model_used,
            tokens = response.usage.total_tokens,
            elapsed_ms = response.processing_time_ms,
            "Ollama completion received"
        );
        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, request: EmbeddingRequest) -> LLMResult<EmbeddingResponse> {
        let payload = json!({
            "model": self.config.embedding_model,
            "prompt": request.text,
        });
        let data = self.post_with_retry("/api/embeddings", &payload).await?;
        let vector: Vec<f32> = data["embedding"]
            .as_array()
            .ok_or_else(|| LLMError::Provider("Ollama response has no embedding".to_string()))?
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    LLMError::Serialisation("Embedding contains a non-numeric value".to_string())
                })
            })
            .collect::<LLMResult<_>>()?;
        if vector.is_empty() {
            return Err(LLMError::Provider("Ollama returned an empty embedding".to_string()));
        }
        Ok(EmbeddingResponse {
            request_id: request.id,
            vector,
            model_used: self.config.embedding_model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }
}
