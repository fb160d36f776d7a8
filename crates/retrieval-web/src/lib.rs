//! HTTP surface (§6.1, §6.3) over the orchestrator: axum router
//! construction with no auth layer — this engine has no notion of a
//! caller identity.

pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use embedding_gateway::EmbeddingGateway;
use graph_store::GraphStore;

pub use state::AppState;

/// Builds the full router: `POST /search`, `POST /search/stream`, and
/// `GET /healthz`, with request tracing and a permissive CORS layer.
pub fn build_router<G, E>(state: AppState<G, E>) -> Router
where
    G: GraphStore + 'static,
    E: EmbeddingGateway + 'static,
{
    Router::new()
        .route("/search", post(handlers::search::search::<G, E>))
        .route("/search/stream", post(handlers::search::search_stream::<G, E>))
        .route("/healthz", get(handlers::health::healthz::<G, E>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
