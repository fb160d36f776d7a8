use retrieval_types::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    #[error("not enough embedded provisions to bootstrap ({have} < {need})")]
    InsufficientData { have: usize, need: usize },

    #[error("graph store error: {0}")]
    GraphStore(#[from] graph_store::GraphStoreError),

    #[error("embedding gateway error: {0}")]
    Gateway(#[from] embedding_gateway::GatewayError),

    #[error("registry constraint violated: {0}")]
    Constraint(String),
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DomainNotFound(id) => EngineError::NotFound(id),
            RegistryError::InsufficientData { have, need } => EngineError::ConstraintViolation(
                format!("insufficient embedded provisions to bootstrap ({have} < {need})"),
            ),
            RegistryError::GraphStore(e) => e.into(),
            RegistryError::Gateway(e) => e.into(),
            RegistryError::Constraint(m) => EngineError::ConstraintViolation(m),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
