//! `POST /search` — synchronous request/response, and `POST /search/stream`
//! — SSE progress events (§6.1, §6.3), the streaming counterpart.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use embedding_gateway::EmbeddingGateway;
use graph_store::GraphStore;
use retrieval_types::result::{SearchRequest, SearchResponse};

use crate::error::AppError;
use crate::state::AppState;

pub async fn search<G, E>(
    State(state): State<AppState<G, E>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError>
where
    G: GraphStore + 'static,
    E: EmbeddingGateway + 'static,
{
    let response = state.orchestrator.handle_query(request, None).await?;
    Ok(Json(response))
}

/// Streams the same pipeline's [`ProgressEvent`](retrieval_types::ProgressEvent)
/// sequence as SSE frames, ending in exactly one `complete`/`error` frame
/// (§4.6.6). The orchestrator itself pushes every event onto the channel;
/// this handler only owns turning the receiver into a byte stream.
pub async fn search_stream<G, E>(
    State(state): State<AppState<G, E>>,
    Json(request): Json<SearchRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    G: GraphStore + 'static,
    E: EmbeddingGateway + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    // The pipeline runs detached in its own task, so dropping the SSE
    // stream (client disconnect) would otherwise leave it running to
    // completion in the background. A watcher task notices the sender's
    // peer (the receiver half) going away and cancels the pipeline.
    let cancel = CancellationToken::new();
    let watcher_cancel = cancel.clone();
    let watcher_tx = tx.clone();
    tokio::spawn(async move {
        watcher_tx.closed().await;
        watcher_cancel.cancel();
    });

    tokio::spawn(async move {
        let _ = state.orchestrator.handle_query_cancellable(request, Some(tx), cancel).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event("message").data(payload))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
