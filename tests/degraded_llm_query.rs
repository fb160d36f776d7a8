//! End-to-end: when the LLM is unavailable, synthesis degrades to the
//! conventional fallback answer instead of failing the request, and
//! routing degrades to centroid-only scoring instead of failing the
//! query (§4.6.1, §4.6.5, §8.3 scenario "degraded LLM").

use std::sync::Arc;

use domain_registry::DomainRegistry;
use embedding_gateway::mock::MockEmbeddingGateway;
use graph_store::mock::MockGraphStore;
use retrieval_types::config::EngineConfig;
use retrieval_types::provision::Provision;
use retrieval_types::result::SearchRequest;

fn provision(id: &str, number: &str, embedding: Vec<f32>) -> Provision {
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

#[tokio::test]
async fn llm_outage_falls_back_instead_of_failing_the_request() {
    let store = Arc::new(
        MockGraphStore::builder()
            .provision(provision("Statute/Art.1", "1", vec![1.0, 0.0]))
            .provision(provision("Statute/Art.2", "2", vec![0.98, 0.02]))
            .provision(provision("Tax/Art.1", "1", vec![0.0, 1.0]))
            .provision(provision("Tax/Art.2", "2", vec![0.02, 0.98]))
            .build(),
    );
    let gateway = Arc::new(MockEmbeddingGateway::new());
    let config = test_config();
    let registry = Arc::new(DomainRegistry::new(store.clone(), gateway.clone(), config.clone()));
    // Bootstrap while the LLM still "works" so domain naming (which only
    // affects labels, never correctness) isn't itself exercising the
    // outage path.
    registry.bootstrap().await.unwrap();

    let llm_switch = gateway.llm_failure_switch();
    llm_switch.store(true, std::sync::atomic::Ordering::SeqCst);

    let orchestrator = orchestrator::Orchestrator::new(store, gateway, registry, config);
    let request = SearchRequest {
        query: "Article 1".to_string(),
        limit: 5,
        synthesize: true,
        timeout_ms: None,
    };
    let response = orchestrator.handle_query(request, None).await.unwrap();

    assert!(!response.results.is_empty(), "routing should still return results via centroid fallback");
    let answer = response.synthesized_answer.expect("synthesis was requested");
    assert!(answer.fallback, "synthesis should fall back when the LLM is down");
    assert_eq!(answer.confidence, 0.0);
}
