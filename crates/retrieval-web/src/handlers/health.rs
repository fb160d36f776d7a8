//! `GET /healthz` — liveness plus a cheap readiness signal (domain count).

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use embedding_gateway::EmbeddingGateway;
use graph_store::GraphStore;

use crate::state::AppState;

pub async fn healthz<G, E>(State(state): State<AppState<G, E>>) -> Json<Value>
where
    G: GraphStore + 'static,
    E: EmbeddingGateway + 'static,
{
    let domains = state.orchestrator.domain_count().await;
    Json(json!({
        "status": "ok",
        "domains": domains,
    }))
}
