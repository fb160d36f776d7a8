//! Orchestrator (C6, §4.6). Owns the end-to-end request pipeline: query
//! routing, primary per-domain search, an optional A2A collaboration
//! round, result merging and enrichment, optional synthesis, and
//! incremental progress events. Every other component (C1-C5) is a pure
//! dependency injected at construction rather than owned state.

pub mod a2a;
pub mod quality;
pub mod routing;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use domain_registry::DomainRegistry;
use embedding_gateway::EmbeddingGateway;
use graph_store::GraphStore;
use hybrid_retriever::{HybridRetriever, RetrievalHit, RetrieverInputs};
use rae::RelationshipExpander;
use retrieval_types::config::EngineConfig;
use retrieval_types::domain::DomainId;
use retrieval_types::events::{ProgressEvent, SearchStage};
use retrieval_types::provision::ProvisionId;
use retrieval_types::result::{RetrievedProvision, SearchRequest, SearchResponse, SearchStats, SynthesizedAnswer, MAX_LIMIT};
use retrieval_types::{EngineError, EngineResult};

pub struct Orchestrator<G: GraphStore, E: EmbeddingGateway> {
    store: Arc<G>,
    gateway: Arc<E>,
    registry: Arc<DomainRegistry<G, E>>,
    retriever: HybridRetriever<G>,
    expander: RelationshipExpander<G>,
    config: EngineConfig,
}

impl<G: GraphStore, E: EmbeddingGateway> Orchestrator<G, E> {
    pub fn new(store: Arc<G>, gateway: Arc<E>, registry: Arc<DomainRegistry<G, E>>, config: EngineConfig) -> Self {
        let retriever = HybridRetriever::new(
            store.clone(),
            config.rrf_k,
            config.node_sim_floor,
            config.expansion_factor,
            config.excluded_section_tokens.clone(),
        );
        let expander = RelationshipExpander::new(store.clone(), config.similarity_threshold, config.max_expanded);
        Self {
            store,
            gateway,
            registry,
            retriever,
            expander,
            config,
        }
    }

    /// Number of domains currently registered, used by `/healthz` as a
    /// cheap readiness signal (bootstrap must have run before the engine
    /// can answer anything).
    pub async fn domain_count(&self) -> usize {
        self.registry.all_domains().await.len()
    }

    /// Runs the full pipeline for one request under `request.timeout_ms`
    /// (or the configured default), emitting progress on `progress` as it
    /// goes. `progress` is fire-and-forget: a dropped receiver never fails
    /// the request. Exactly one terminal event (`Complete` or `Error`) is
    /// sent, always last (§4.6.6, §5). Never externally cancellable; use
    /// [`Self::handle_query_cancellable`] when a caller (e.g. a dropped SSE
    /// connection) needs to abort the pipeline early.
    pub async fn handle_query(
        &self,
        request: SearchRequest,
        progress: Option<UnboundedSender<ProgressEvent>>,
    ) -> EngineResult<SearchResponse> {
        self.handle_query_cancellable(request, progress, CancellationToken::new()).await
    }

    /// Same as [`Self::handle_query`], but also races the pipeline against
    /// `cancel`. Cancelling propagates to both the deadline timer and any
    /// in-flight A2A peer fan-out (§5), yielding [`EngineError::Cancelled`]
    /// rather than [`EngineError::Deadline`] — distinct error kinds for
    /// "the caller gave up" versus "we ran out of time".
    #[instrument(skip(self, progress, cancel))]
    pub async fn handle_query_cancellable(
        &self,
        request: SearchRequest,
        progress: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancellationToken,
    ) -> EngineResult<SearchResponse> {
        let deadline_ms = request.timeout_ms.unwrap_or(self.config.request_deadline_ms);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            timed_out = tokio::time::timeout(Duration::from_millis(deadline_ms), self.run(request, progress.clone(), cancel.clone())) => {
                timed_out.unwrap_or(Err(EngineError::Deadline))
            }
        };

        if let Err(e) = &result {
            self.emit_error(&progress, e, None);
        }
        result
    }

    async fn run(
        &self,
        request: SearchRequest,
        progress: Option<UnboundedSender<ProgressEvent>>,
        cancel: CancellationToken,
    ) -> EngineResult<SearchResponse> {
        let started_at = Instant::now();
        let limit = (request.limit.clamp(1, MAX_LIMIT)) as usize;

        let domains = self.registry.all_domains().await;
        if domains.is_empty() {
            return Err(EngineError::NotInitialized);
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let node_query_vec = self.gateway.embed_node(&request.query).await?;
        let rel_query_vec = self.gateway.embed_relation(&request.query).await?;

        let mut llm_calls = 0u32;

        let (candidates, route_calls) = routing::route(
            self.gateway.as_ref(),
            &request.query,
            &node_query_vec,
            &domains,
            self.config.route_candidates,
            self.config.llm_weight,
        )
        .await;
        llm_calls += route_calls;

        let primary_id = candidates.first().ok_or(EngineError::NotInitialized)?.domain_id.clone();

        self.emit(
            &progress,
            ProgressEvent::Started {
                primary_domain: primary_id.clone(),
                peers: Vec::new(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        );

        let primary_hits = self
            .search_domain(&primary_id, &request.query, &node_query_vec, &rel_query_vec, limit, &progress)
            .await?;
        let mut domains_queried = 1u32;
        let mut a2a_triggered = false;

        let mut merged: HashMap<ProvisionId, RetrievedProvision> = HashMap::new();
        for enriched in self.enrich(&primary_id, primary_hits, false).await? {
            merged.insert(enriched.provision_id.clone(), enriched);
        }

        let primary_quality = quality::score_from_merged(&merged, &self.config);
        if primary_quality < self.config.quality_floor || merged.len() < self.config.min_results {
            let primary_label = domains.iter().find(|d| d.id == primary_id).map(|d| d.label.clone()).unwrap_or_default();
            let peer_labels: Vec<(DomainId, String)> = candidates
                .iter()
                .skip(1)
                .filter(|c| c.domain_id != primary_id)
                .take(self.config.peer_candidates)
                .map(|c| {
                    let label = domains.iter().find(|d| d.id == c.domain_id).map(|d| d.label.clone()).unwrap_or_default();
                    (c.domain_id.clone(), label)
                })
                .collect();

            let (targets, decision_calls) =
                a2a::decide(self.gateway.as_ref(), &request.query, &primary_label, &peer_labels, self.config.max_peers).await;
            llm_calls += decision_calls;

            if !targets.is_empty() {
                a2a_triggered = true;
                let target_ids: Vec<DomainId> = targets
                    .iter()
                    .filter_map(|t| peer_labels.iter().find(|(_, label)| label == &t.domain_label).map(|(id, _)| id.clone()))
                    .collect();

                self.emit(&progress, ProgressEvent::A2aStarted { targets: target_ids.clone() });

                // Bounded depth (§4.6.3): each peer is searched directly via
                // `search_peer`, which never itself calls into A2A, so
                // collaboration cannot cascade past this one hop. Peers are
                // fanned out concurrently, bounded by `max_peers`, and the
                // whole fan-out is abandoned promptly if `cancel` fires.
                let peer_futures = target_ids.iter().zip(&targets).map(|(target_id, target)| {
                    self.search_peer(target_id, &target.refined_query, &node_query_vec, &rel_query_vec, limit)
                });
                let peer_results = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    results = futures::future::join_all(peer_futures) => results,
                };

                for (target_id, result) in target_ids.iter().zip(peer_results) {
                    match result {
                        Ok(peer_enriched) => {
                            domains_queried += 1;
                            self.emit(
                                &progress,
                                ProgressEvent::A2aPeerCompleted {
                                    target: target_id.clone(),
                                    result_count: peer_enriched.len(),
                                },
                            );
                            for provision in peer_enriched {
                                merged
                                    .entry(provision.provision_id.clone())
                                    .and_modify(|existing| *existing = existing.clone().merge(provision.clone()))
                                    .or_insert(provision);
                            }
                        }
                        Err(e) => {
                            warn!(domain = %target_id, error = %e, "A2A peer search failed, continuing without it");
                        }
                    }
                }
            }
        }

        let mut results: Vec<RetrievedProvision> = merged.into_values().collect();
        results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap().then_with(|| a.provision_id.cmp(&b.provision_id)));
        results.truncate(limit);

        self.emit(
            &progress,
            ProgressEvent::Searching {
                stage: SearchStage::Enrichment,
                progress: SearchStage::Enrichment.progress(),
            },
        );

        if results.is_empty() {
            return Err(EngineError::NoResults);
        }

        let synthesized_answer = if request.synthesize {
            self.emit(&progress, ProgressEvent::Synthesizing);
            llm_calls += 1;
            Some(self.synthesize(&request.query, &results).await)
        } else {
            None
        };

        let stats = SearchStats {
            domains_queried,
            a2a_triggered,
            llm_calls,
            elapsed_ms: started_at.elapsed().as_millis() as u64,
        };

        let response = SearchResponse {
            results,
            stats,
            primary_domain: primary_id,
            synthesized_answer,
        };

        self.emit(
            &progress,
            ProgressEvent::Complete {
                results: response.results.clone(),
                stats: response.stats.clone(),
                primary_domain: response.primary_domain.clone(),
                synthesized_answer: response.synthesized_answer.clone(),
            },
        );

        Ok(response)
    }

    /// Runs C4 (hybrid retrieval) then C5 (relationship expansion) for one
    /// domain and merges their outputs, keyed by provision id, keeping the
    /// higher similarity and unioning stage tags (§4.6.2).
    async fn search_domain(
        &self,
        domain_id: &str,
        query: &str,
        node_query_vec: &[f32],
        rel_query_vec: &[f32],
        limit: usize,
        progress: &Option<UnboundedSender<ProgressEvent>>,
    ) -> EngineResult<Vec<RetrievalHit>> {
        let member_ids: HashSet<ProvisionId> = self.store.members_of(domain_id).await?.into_iter().collect();

        let hits = self
            .retriever
            .search(RetrieverInputs {
                query,
                node_query_vec,
                rel_query_vec,
                member_ids: &member_ids,
                limit,
            })
            .await?;

        self.emit(progress, ProgressEvent::Searching { stage: SearchStage::ExactMatch, progress: SearchStage::ExactMatch.progress() });
        self.emit(progress, ProgressEvent::Searching { stage: SearchStage::NodeEmbedding, progress: SearchStage::NodeEmbedding.progress() });
        self.emit(progress, ProgressEvent::Searching { stage: SearchStage::RelationEmbedding, progress: SearchStage::RelationEmbedding.progress() });

        let seeds: Vec<(ProvisionId, f32)> = hits.iter().take(self.config.rae_seeds).map(|h| (h.provision_id.clone(), h.similarity)).collect();
        let expanded = self.expander.expand(&seeds, node_query_vec).await?;

        self.emit(progress, ProgressEvent::Searching { stage: SearchStage::Expansion, progress: SearchStage::Expansion.progress() });

        let mut by_id: HashMap<ProvisionId, RetrievalHit> = HashMap::new();
        for hit in hits {
            by_id.insert(hit.provision_id.clone(), hit);
        }
        for expanded_hit in expanded {
            let tag = format!("expansion.{}", expanded_hit.discovery_kind.as_str());
            by_id
                .entry(expanded_hit.provision_id.clone())
                .and_modify(|existing| {
                    if expanded_hit.relevance > existing.similarity {
                        existing.similarity = expanded_hit.relevance;
                    }
                    if !existing.stages.contains(&tag) {
                        existing.stages.push(tag.clone());
                    }
                })
                .or_insert_with(|| RetrievalHit {
                    provision_id: expanded_hit.provision_id,
                    similarity: expanded_hit.relevance,
                    stages: vec![tag],
                });
        }

        let mut out: Vec<RetrievalHit> = by_id.into_values().collect();
        out.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap().then_with(|| a.provision_id.cmp(&b.provision_id)));
        out.truncate(limit);
        Ok(out)
    }

    /// One peer leg of A2A collaboration (§4.6.3): re-embeds the refined
    /// query, searches and expands within the peer domain, and enriches the
    /// result. Falls back to the primary query's embeddings if re-embedding
    /// the refined query fails, rather than failing the whole peer.
    async fn search_peer(
        &self,
        domain_id: &str,
        refined_query: &str,
        fallback_node_vec: &[f32],
        fallback_rel_vec: &[f32],
        limit: usize,
    ) -> EngineResult<Vec<RetrievedProvision>> {
        let node_vec = self.gateway.embed_node(refined_query).await.unwrap_or_else(|_| fallback_node_vec.to_vec());
        let rel_vec = self.gateway.embed_relation(refined_query).await.unwrap_or_else(|_| fallback_rel_vec.to_vec());
        let hits = self.search_domain(domain_id, refined_query, &node_vec, &rel_vec, limit, &None).await?;
        self.enrich(domain_id, hits, true).await
    }

    /// Fills display fields from the graph (§4.6.4). Missing provisions
    /// (shouldn't happen, but `batch_get_provisions` degrades silently) are
    /// simply dropped from the result set rather than surfacing a `None`.
    async fn enrich(&self, domain_id: &str, hits: Vec<RetrievalHit>, via_a2a: bool) -> EngineResult<Vec<RetrievedProvision>> {
        let ids: Vec<ProvisionId> = hits.iter().map(|h| h.provision_id.clone()).collect();
        let provisions = self.store.batch_get_provisions(&ids).await?;
        let by_id: HashMap<ProvisionId, _> = provisions.into_iter().map(|p| (p.id.clone(), p)).collect();

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let provision = by_id.get(&hit.provision_id)?;
                Some(RetrievedProvision {
                    provision_id: hit.provision_id,
                    content: provision.content.clone(),
                    document_title: provision.document_title.clone(),
                    provision_path: provision.provision_path.clone(),
                    provision_number: provision.provision_number.clone(),
                    similarity: hit.similarity,
                    stages: hit.stages.into_iter().collect(),
                    source_domain: domain_id.to_string(),
                    via_a2a,
                })
            })
            .collect())
    }

    /// Calls the LLM for a grounded summary of the top `SYNTH_TOPN` results
    /// (§4.6.5). Falls back to `SynthesizedAnswer::fallback` on any
    /// failure, which is always safe since synthesis never gates whether
    /// results themselves are returned.
    async fn synthesize(&self, query: &str, results: &[RetrievedProvision]) -> SynthesizedAnswer {
        let top: Vec<&RetrievedProvision> = results.iter().take(self.config.synth_topn).collect();
        let context: Vec<_> = top
            .iter()
            .map(|p| {
                json!({
                    "identifier": p.provision_id,
                    "content": p.content,
                })
            })
            .collect();

        let prompt = format!(
            "A user asked: \"{query}\"\n\nAnswer using only the following provisions, citing their \
             identifiers:\n{}",
            serde_json::to_string_pretty(&context).unwrap_or_default()
        );

        let schema = json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "detailed_answer": {"type": "string"},
                "cited_identifiers": {"type": "array", "items": {"type": "string"}},
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
            },
            "required": ["summary", "detailed_answer", "cited_identifiers", "confidence"]
        });

        match self.gateway.llm_structured(&prompt, &schema).await {
            Ok(response) => match serde_json::from_value::<SynthesisResponse>(response.parsed) {
                Ok(parsed) => SynthesizedAnswer {
                    summary: parsed.summary,
                    detailed_answer: parsed.detailed_answer,
                    cited_identifiers: parsed.cited_identifiers,
                    confidence: parsed.confidence,
                    fallback: false,
                },
                Err(e) => {
                    warn!(error = %e, "synthesis response did not match schema, falling back");
                    SynthesizedAnswer::fallback(results)
                }
            },
            Err(e) => {
                warn!(error = %e, "synthesis LLM call failed, falling back");
                SynthesizedAnswer::fallback(results)
            }
        }
    }

    fn emit(&self, progress: &Option<UnboundedSender<ProgressEvent>>, event: ProgressEvent) {
        if let Some(tx) = progress {
            let _ = tx.send(event);
        }
    }

    fn emit_error(&self, progress: &Option<UnboundedSender<ProgressEvent>>, err: &EngineError, partial_results: Option<Vec<RetrievedProvision>>) {
        self.emit(
            progress,
            ProgressEvent::Error {
                kind: err.kind_str().to_string(),
                message: err.user_message(),
                partial_results,
            },
        );
    }
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    summary: String,
    detailed_answer: String,
    cited_identifiers: Vec<ProvisionId>,
    confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding_gateway::mock::MockEmbeddingGateway;
    use graph_store::mock::MockGraphStore;
    use retrieval_types::graph::HierarchyEdge;
    use retrieval_types::provision::Provision;

    fn provision(id: &str, embedding: Vec<f32>, number: &str) -> Provision {
        Provision {
            id: id.to_string(),
            content: format!("content for {id}"),
            node_embedding: Some(embedding),
            secondary_embedding: None,
            document_title: "Statute".to_string(),
            provision_path: id.to_string(),
            provision_number: number.to_string(),
        }
    }

    fn test_config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.bootstrap_min_provisions = 4;
        cfg.kmeans_k_min = 2;
        cfg.kmeans_k_max = 3;
        cfg.kmeans_init_runs = 4;
        cfg.label_sample_size = 2;
        cfg.min_domain_size = 1;
        cfg.max_domain_size = 50;
        cfg.rae_seeds = 3;
        cfg.min_results = 1;
        cfg.quality_floor = 0.0;
        cfg.route_candidates = 5;
        cfg.max_expanded = 50;
        cfg
    }

    async fn build_orchestrator() -> Orchestrator<MockGraphStore, MockEmbeddingGateway> {
        let store = Arc::new(
            MockGraphStore::builder()
                .provision(provision("Statute/Art.1", vec![1.0, 0.0], "1"))
                .provision(provision("Statute/Art.2", vec![0.98, 0.02], "2"))
                .provision(provision("Tax/Art.1", vec![0.0, 1.0], "1"))
                .provision(provision("Tax/Art.2", vec![0.02, 0.98], "2"))
                .hierarchy_edge(HierarchyEdge {
                    parent_id: "Statute/Art.1".into(),
                    child_id: "Statute/Art.2".into(),
                    position: 0,
                    relation_embedding: None,
                    semantic_type: None,
                    keywords: vec![],
                })
                .build(),
        );
        let gateway = Arc::new(MockEmbeddingGateway::new());
        let config = test_config();
        let registry = Arc::new(DomainRegistry::new(store.clone(), gateway.clone(), config.clone()));
        registry.bootstrap().await.unwrap();

        Orchestrator::new(store, gateway, registry, config)
    }

    #[tokio::test]
    async fn returns_not_initialized_when_no_domains_exist() {
        let store = Arc::new(MockGraphStore::builder().build());
        let gateway = Arc::new(MockEmbeddingGateway::new());
        let config = test_config();
        let registry = Arc::new(DomainRegistry::new(store.clone(), gateway.clone(), config.clone()));
        let orchestrator = Orchestrator::new(store, gateway, registry, config);

        let request = SearchRequest {
            query: "Article 1".to_string(),
            limit: 5,
            synthesize: false,
            timeout_ms: None,
        };
        let err = orchestrator.handle_query(request, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized));
    }

    #[tokio::test]
    async fn handle_query_returns_results_for_a_seeded_corpus() {
        let orchestrator = build_orchestrator().await;
        let request = SearchRequest {
            query: "Article 1".to_string(),
            limit: 5,
            synthesize: false,
            timeout_ms: None,
        };
        let response = orchestrator.handle_query(request, None).await.unwrap();
        assert!(!response.results.is_empty());
        assert!(response.stats.domains_queried >= 1);
    }

    #[tokio::test]
    async fn progress_events_end_with_exactly_one_terminal_event() {
        let orchestrator = build_orchestrator().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let request = SearchRequest {
            query: "Article 1".to_string(),
            limit: 5,
            synthesize: false,
            timeout_ms: None,
        };
        orchestrator.handle_query(request, Some(tx)).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminal_count, 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn a_slow_gateway_trips_the_request_deadline() {
        let store = Arc::new(
            MockGraphStore::builder()
                .provision(provision("Statute/Art.1", vec![1.0, 0.0], "1"))
                .provision(provision("Statute/Art.2", vec![0.98, 0.02], "2"))
                .provision(provision("Tax/Art.1", vec![0.0, 1.0], "1"))
                .provision(provision("Tax/Art.2", vec![0.02, 0.98], "2"))
                .build(),
        );
        let gateway = Arc::new(MockEmbeddingGateway::new());
        let config = test_config();
        let registry = Arc::new(DomainRegistry::new(store.clone(), gateway.clone(), config.clone()));
        registry.bootstrap().await.unwrap();

        gateway.set_artificial_delay(std::time::Duration::from_millis(200));
        let orchestrator = Orchestrator::new(store, gateway, registry, config);

        let request = SearchRequest {
            query: "Article 1".to_string(),
            limit: 5,
            synthesize: false,
            timeout_ms: Some(10),
        };
        let err = orchestrator.handle_query(request, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Deadline));
    }

    #[tokio::test]
    async fn cancelling_the_token_yields_cancelled_not_deadline() {
        let orchestrator = build_orchestrator().await;
        let request = SearchRequest {
            query: "Article 1".to_string(),
            limit: 5,
            synthesize: false,
            timeout_ms: None,
        };
        let token = CancellationToken::new();
        token.cancel();
        let err = orchestrator.handle_query_cancellable(request, None, token).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
