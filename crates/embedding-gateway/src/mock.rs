//! Deterministic in-memory gateway for tests, the embedding-gateway
//! counterpart of `graph-store::mock::MockGraphStore`. Embeddings are
//! derived from a hash of the input text so the same text always embeds to
//! the same vector, and semantically similar fixtures can be made to embed
//! close together by sharing a prefix.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::normalize::normalize;
use crate::{CallOptions, EmbeddingGateway, LlmStructuredResponse};

const DIM: usize = 16;

fn hash_embed(text: &str) -> Vec<f32> {
    let mut state: u64 = 1469598103934665603;
    let mut out = vec![0.0f32; DIM];
    for (i, byte) in text.bytes().enumerate() {
        state ^= byte as u64;
        state = state.wrapping_mul(1099511628211);
        out[i % DIM] += ((state % 1000) as f32 / 1000.0) - 0.5;
    }
    normalize(out)
}

/// Mock gateway. `fail_llm` can be flipped at runtime to simulate a
/// degraded-LLM scenario without tearing down the fixture.
pub struct MockEmbeddingGateway {
    fail_llm: Arc<AtomicBool>,
    fail_embeddings: Arc<AtomicBool>,
    llm_response: Arc<std::sync::Mutex<Value>>,
    artificial_delay_ms: Arc<AtomicU64>,
}

impl Default for MockEmbeddingGateway {
    fn default() -> Self {
        Self {
            fail_llm: Arc::new(AtomicBool::new(false)),
            fail_embeddings: Arc::new(AtomicBool::new(false)),
            llm_response: Arc::new(std::sync::Mutex::new(serde_json::json!({}))),
            artificial_delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl MockEmbeddingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that lets a test flip LLM availability after construction.
    pub fn llm_failure_switch(&self) -> Arc<AtomicBool> {
        self.fail_llm.clone()
    }

    pub fn embedding_failure_switch(&self) -> Arc<AtomicBool> {
        self.fail_embeddings.clone()
    }

    /// Sets the canned value `llm_structured` returns when not failing.
    pub fn set_llm_response(&self, value: Value) {
        *self.llm_response.lock().unwrap() = value;
    }

    /// Makes every call sleep for `delay` before resolving, for exercising
    /// deadline/timeout behavior in callers without a real slow backend.
    pub fn set_artificial_delay(&self, delay: Duration) {
        self.artificial_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn apply_delay(&self) {
        let ms = self.artificial_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl EmbeddingGateway for MockEmbeddingGateway {
    async fn embed_node_with(&self, text: &str, _opts: CallOptions) -> GatewayResult<Vec<f32>> {
        self.apply_delay().await;
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(GatewayError::EmbeddingUnavailable("mock forced failure".into()));
        }
        Ok(hash_embed(text))
    }

    async fn embed_relation_with(&self, text: &str, _opts: CallOptions) -> GatewayResult<Vec<f32>> {
        self.apply_delay().await;
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(GatewayError::EmbeddingUnavailable("mock forced failure".into()));
        }
        Ok(hash_embed(&format!("relation::{text}")))
    }

    async fn llm_structured(
        &self,
        _prompt: &str,
        _schema: &Value,
    ) -> GatewayResult<LlmStructuredResponse> {
        self.apply_delay().await;
        if self.fail_llm.load(Ordering::SeqCst) {
            return Err(GatewayError::LLMUnavailable("mock forced failure".into()));
        }
        let parsed = self.llm_response.lock().unwrap().clone();
        Ok(LlmStructuredResponse { raw: parsed.to_string(), parsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_embeds_identically() {
        let gw = MockEmbeddingGateway::new();
        let a = gw.embed_node("provision about termination").await.unwrap();
        let b = gw.embed_node("provision about termination").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn llm_failure_switch_forces_error() {
        let gw = MockEmbeddingGateway::new();
        let switch = gw.llm_failure_switch();
        assert!(gw.llm_structured("x", &serde_json::json!({})).await.is_ok());
        switch.store(true, Ordering::SeqCst);
        assert!(gw.llm_structured("x", &serde_json::json!({})).await.is_err());
    }
}
