//! End-to-end: a query with no identifier present relies purely on
//! embedding similarity to find its seed, and the relationship expander
//! then pulls in a child provision that direct search alone would not
//! have surfaced — a parent/child edge always costs zero regardless of
//! embeddings (§4.5 RAE, §8.3 scenario "semantic query with expansion").
//!
//! A single domain is forced (`kmeans_k_min == kmeans_k_max == 1`) so the
//! test exercises expansion itself rather than query routing, which is
//! covered separately by the cross-domain A2A scenario.

use std::sync::Arc;

use domain_registry::DomainRegistry;
use embedding_gateway::mock::MockEmbeddingGateway;
use embedding_gateway::EmbeddingGateway;
use graph_store::mock::MockGraphStore;
use retrieval_types::config::EngineConfig;
use retrieval_types::graph::HierarchyEdge;
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
    cfg.kmeans_k_min = 1;
    cfg.kmeans_k_max = 1;
    cfg.kmeans_init_runs = 4;
    cfg.label_sample_size = 4;
    cfg.min_domain_size = 1;
    cfg.max_domain_size = 50;
    cfg.rae_seeds = 3;
    cfg.min_results = 1;
    cfg.quality_floor = 0.0;
    cfg.route_candidates = 5;
    cfg.max_expanded = 50;
    cfg.node_sim_floor = 0.9;
    cfg.similarity_threshold = 0.0;
    cfg
}

#[tokio::test]
async fn child_provision_is_pulled_in_by_expansion() {
    let gateway = Arc::new(MockEmbeddingGateway::new());
    let query = "scope of the planning permission";

    // The parent's embedding is exactly the query's own embedding, so it
    // clears the 0.9 node-similarity floor directly. The child's and the
    // decoys' embeddings come from unrelated text, so they fall below the
    // floor and can only be reached through the free parent/child edge.
    let parent_vec = gateway.embed_node(query).await.unwrap();
    let child_vec = gateway.embed_node("an unrelated clause about harbor fees").await.unwrap();
    let decoy1_vec = gateway.embed_node("a filler clause about livestock imports").await.unwrap();
    let decoy2_vec = gateway.embed_node("a filler clause about postal routes").await.unwrap();

    let store = Arc::new(
        MockGraphStore::builder()
            .provision(provision("Statute/Art.17", "17", parent_vec))
            .provision(provision("Statute/Art.17(2)", "17(2)", child_vec))
            .provision(provision("Statute/Art.40", "40", decoy1_vec))
            .provision(provision("Statute/Art.41", "41", decoy2_vec))
            .hierarchy_edge(HierarchyEdge {
                parent_id: "Statute/Art.17".into(),
                child_id: "Statute/Art.17(2)".into(),
                position: 0,
                relation_embedding: None,
                semantic_type: None,
                keywords: vec![],
            })
            .build(),
    );
    let config = test_config();
    let registry = Arc::new(DomainRegistry::new(store.clone(), gateway.clone(), config.clone()));
    registry.bootstrap().await.unwrap();
    assert_eq!(registry.all_domains().await.len(), 1);

    let orchestrator = orchestrator::Orchestrator::new(store, gateway, registry, config);
    let request = SearchRequest {
        query: query.to_string(),
        limit: 5,
        synthesize: false,
        timeout_ms: None,
    };
    let response = orchestrator.handle_query(request, None).await.unwrap();

    assert!(response.results.iter().any(|r| r.provision_id == "Statute/Art.17"));
    let child = response
        .results
        .iter()
        .find(|r| r.provision_id == "Statute/Art.17(2)")
        .expect("child should be reachable via expansion");
    assert!(
        child.stages.iter().any(|s| s.starts_with("expansion")),
        "child should be tagged as discovered via expansion, got {:?}",
        child.stages
    );
    assert!(response.results.iter().all(|r| !r.provision_id.contains("Art.40") && !r.provision_id.contains("Art.41")));
}
