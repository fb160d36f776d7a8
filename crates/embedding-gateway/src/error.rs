use retrieval_types::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("LLM unavailable: {0}")]
    LLMUnavailable(String),

    #[error("LLM response did not conform to schema after retries: {0}")]
    SchemaConformance(String),
}

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::EmbeddingUnavailable(m) => EngineError::EmbeddingUnavailable(m),
            GatewayError::LLMUnavailable(m) => EngineError::LLMUnavailable(m),
            GatewayError::SchemaConformance(m) => EngineError::LLMUnavailable(m),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
