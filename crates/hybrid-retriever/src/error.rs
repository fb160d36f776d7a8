use retrieval_types::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("no search channel succeeded for domain {domain_id}")]
    SearchUnavailable { domain_id: String },
}

impl From<RetrieverError> for EngineError {
    fn from(err: RetrieverError) -> Self {
        match err {
            RetrieverError::SearchUnavailable { domain_id } => {
                EngineError::SearchUnavailable { domain: domain_id, reason: "all channels failed".into() }
            }
        }
    }
}

pub type RetrieverResult<T> = Result<T, RetrieverError>;
