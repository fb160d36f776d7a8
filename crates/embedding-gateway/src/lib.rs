//! Embedding Gateway (C2, §4.2). Deterministic, typed access to two
//! external embedding models and one LLM. Structured mirror of
//! `ob-agentic`'s `LlmClient` trait (`anthropic_client.rs`), extended with
//! the node/relation embedding calls §4.2 requires.

pub mod error;
pub mod http;
pub mod mock;
pub mod normalize;

pub use error::{GatewayError, GatewayResult};

use async_trait::async_trait;
use serde_json::Value;

/// Result of `llm_structured`: the verbatim response plus the parsed view,
/// per §4.2 ("surfaces the final response verbatim plus a parsed view").
#[derive(Debug, Clone)]
pub struct LlmStructuredResponse {
    pub raw: String,
    pub parsed: Value,
}

/// Call-site options. `bypass_cache` lets a caller force a fresh embedding
/// for debugging (§4.2: "the cache must be bypassable per call").
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    pub bypass_cache: bool,
}

#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    async fn embed_node(&self, text: &str) -> GatewayResult<Vec<f32>> {
        self.embed_node_with(text, CallOptions::default()).await
    }
    async fn embed_node_with(&self, text: &str, opts: CallOptions) -> GatewayResult<Vec<f32>>;

    async fn embed_relation(&self, text: &str) -> GatewayResult<Vec<f32>> {
        self.embed_relation_with(text, CallOptions::default()).await
    }
    async fn embed_relation_with(&self, text: &str, opts: CallOptions) -> GatewayResult<Vec<f32>>;

    /// Calls an external chat/completion endpoint, expecting the response
    /// to parse to `schema`. Retries on parse failure up to a small bound
    /// (§4.2). `schema` is a JSON Schema object describing the expected
    /// shape; callers pass the prompt that should produce it.
    async fn llm_structured(
        &self,
        prompt: &str,
        schema: &Value,
    ) -> GatewayResult<LlmStructuredResponse>;
}
