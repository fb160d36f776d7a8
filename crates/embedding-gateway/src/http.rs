//! Real HTTP-backed `EmbeddingGateway`: two embedding endpoints plus an
//! Anthropic-style LLM endpoint, in the shape of
//! `ob-agentic::anthropic_client::AnthropicClient` (`call_api`,
//! `call_api_with_tool`) generalized to also cover the node/relation
//! embedding calls that `AnthropicClient` has no equivalent for.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::normalize::normalize;
use crate::{CallOptions, EmbeddingGateway, LlmStructuredResponse};

const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-20250514";
const LLM_SCHEMA_RETRY_MAX: u32 = 2;

#[derive(Clone)]
pub struct HttpEmbeddingGateway {
    client: reqwest::Client,
    node_endpoint: String,
    relation_endpoint: String,
    llm_api_key: String,
    llm_model: String,
    node_cache: Arc<Mutex<HashMap<u64, Arc<OnceCell<Vec<f32>>>>>>,
    relation_cache: Arc<Mutex<HashMap<u64, Arc<OnceCell<Vec<f32>>>>>>,
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

impl HttpEmbeddingGateway {
    pub fn new(node_endpoint: String, relation_endpoint: String, llm_api_key: String) -> Self {
        Self::with_model(node_endpoint, relation_endpoint, llm_api_key, DEFAULT_LLM_MODEL)
    }

    pub fn with_model(
        node_endpoint: String,
        relation_endpoint: String,
        llm_api_key: String,
        llm_model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            node_endpoint,
            relation_endpoint,
            llm_api_key,
            llm_model: llm_model.into(),
            node_cache: Arc::new(Mutex::new(HashMap::new())),
            relation_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let node_endpoint = std::env::var("NODE_EMBEDDING_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("NODE_EMBEDDING_ENDPOINT not set"))?;
        let relation_endpoint = std::env::var("RELATION_EMBEDDING_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("RELATION_EMBEDDING_ENDPOINT not set"))?;
        let llm_api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;
        let llm_model =
            std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());
        Ok(Self::with_model(node_endpoint, relation_endpoint, llm_api_key, llm_model))
    }

    async fn call_embedding_endpoint(&self, endpoint: &str, text: &str) -> GatewayResult<Vec<f32>> {
        #[derive(Deserialize)]
        struct EmbedResponse {
            embedding: Vec<f32>,
        }

        let response = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await
            .map_err(|e| GatewayError::EmbeddingUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(GatewayError::EmbeddingUnavailable(format!(
                "embedding endpoint returned {status}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::EmbeddingUnavailable(e.to_string()))?;

        Ok(normalize(parsed.embedding))
    }

    async fn cached_embed(
        &self,
        cache: &Arc<Mutex<HashMap<u64, Arc<OnceCell<Vec<f32>>>>>>,
        endpoint: &str,
        text: &str,
        opts: CallOptions,
    ) -> GatewayResult<Vec<f32>> {
        if opts.bypass_cache {
            return self.call_embedding_endpoint(endpoint, text).await;
        }

        let key = hash_text(text);
        let cell = {
            let mut guard = cache.lock().unwrap();
            cell_for(&mut guard, key)
        };

        cell.get_or_try_init(|| self.call_embedding_endpoint(endpoint, text))
            .await
            .cloned()
    }

    async fn call_llm(&self, system_prompt: &str, user_prompt: &str) -> GatewayResult<String> {
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.llm_api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": &self.llm_model,
                "max_tokens": 1024,
                "system": system_prompt,
                "messages": [{"role": "user", "content": user_prompt}]
            }))
            .send()
            .await
            .map_err(|e| GatewayError::LLMUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::LLMUnavailable(format!("{status}: {body}")));
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::LLMUnavailable(e.to_string()))?;

        api_response
            .content
            .first()
            .and_then(|c| c.text.clone())
            .ok_or_else(|| GatewayError::LLMUnavailable("empty response from LLM".to_string()))
    }
}

fn cell_for(
    guard: &mut HashMap<u64, Arc<OnceCell<Vec<f32>>>>,
    key: u64,
) -> Arc<OnceCell<Vec<f32>>> {
    guard.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
}

#[async_trait]
impl EmbeddingGateway for HttpEmbeddingGateway {
    async fn embed_node_with(&self, text: &str, opts: CallOptions) -> GatewayResult<Vec<f32>> {
        self.cached_embed(&self.node_cache, &self.node_endpoint, text, opts).await
    }

    async fn embed_relation_with(&self, text: &str, opts: CallOptions) -> GatewayResult<Vec<f32>> {
        self.cached_embed(&self.relation_cache, &self.relation_endpoint, text, opts)
            .await
    }

    async fn llm_structured(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> GatewayResult<LlmStructuredResponse> {
        let system_prompt = format!(
            "Respond with a single JSON object matching this JSON Schema exactly. \
             No markdown code fences, no commentary, JSON only.\n\nSchema:\n{}",
            serde_json::to_string_pretty(schema).unwrap_or_default()
        );

        let mut last_err = String::new();
        for attempt in 1..=LLM_SCHEMA_RETRY_MAX {
            let raw = self.call_llm(&system_prompt, prompt).await?;
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(parsed) => return Ok(LlmStructuredResponse { raw, parsed }),
                Err(e) => {
                    last_err = e.to_string();
                    warn!(attempt, "LLM response failed schema parse: {last_err}");
                    debug!(raw = %raw, "raw LLM response");
                }
            }
        }
        Err(GatewayError::SchemaConformance(last_err))
    }
}
