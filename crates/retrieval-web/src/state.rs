//! Shared axum state: just the orchestrator. It's generic over its
//! backends rather than a trait object, since the engine only ever runs
//! against one concrete `GraphStore`/`EmbeddingGateway` pair per process.

use std::sync::Arc;

use embedding_gateway::EmbeddingGateway;
use graph_store::GraphStore;
use orchestrator::Orchestrator;

pub struct AppState<G: GraphStore, E: EmbeddingGateway> {
    pub orchestrator: Arc<Orchestrator<G, E>>,
}

impl<G: GraphStore, E: EmbeddingGateway> Clone for AppState<G, E> {
    fn clone(&self) -> Self {
        Self { orchestrator: self.orchestrator.clone() }
    }
}
