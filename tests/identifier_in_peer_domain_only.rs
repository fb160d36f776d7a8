//! End-to-end: the queried identifier exists in only one of the two
//! domains. Collaboration is forced (as in the cross-domain A2A test),
//! so both domains always get searched and the identifier is found
//! wherever it lives, whether that turns out to be the primary domain
//! or the lone peer (§4.6.3, §8.3 scenario "identifier in peer domain
//! only").

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
    cfg.kmeans_k_max = 2;
    cfg.kmeans_init_runs = 4;
    cfg.label_sample_size = 2;
    cfg.min_domain_size = 1;
    cfg.max_domain_size = 50;
    cfg.rae_seeds = 3;
    cfg.min_results = 1;
    cfg.route_candidates = 5;
    cfg.peer_candidates = 4;
    cfg.max_peers = 2;
    cfg.max_expanded = 50;
    cfg.quality_floor = 1.1;
    cfg
}

#[tokio::test]
async fn identifier_only_present_in_one_domain_is_still_found() {
    // "Article 99" exists only under Tax; Statute never carries it.
    let store = Arc::new(
        MockGraphStore::builder()
            .provision(provision("Statute/Art.1", "1", vec![1.0, 0.0]))
            .provision(provision("Statute/Art.2", "2", vec![0.98, 0.02]))
            .provision(provision("Tax/Art.99", "99", vec![0.0, 1.0]))
            .provision(provision("Tax/Art.2", "2", vec![0.02, 0.98]))
            .build(),
    );
    let gateway = Arc::new(MockEmbeddingGateway::new());
    let config = test_config();
    let registry = Arc::new(DomainRegistry::new(store.clone(), gateway.clone(), config.clone()));
    registry.bootstrap().await.unwrap();

    let domains = registry.all_domains().await;
    assert_eq!(domains.len(), 2);
    let targets: Vec<_> = domains
        .iter()
        .map(|d| {
            serde_json::json!({
                "domain_label": d.label,
                "refined_query": "Article 99",
                "reason": "primary domain search was weak",
            })
        })
        .collect();
    gateway.set_llm_response(serde_json::json!({
        "should_collaborate": true,
        "targets": targets,
    }));

    let orchestrator = orchestrator::Orchestrator::new(store, gateway, registry, config);
    let request = SearchRequest {
        query: "Article 99".to_string(),
        limit: 10,
        synthesize: false,
        timeout_ms: None,
    };
    let response = orchestrator.handle_query(request, None).await.unwrap();

    assert_eq!(response.stats.domains_queried, 2);
    let hit = response
        .results
        .iter()
        .find(|r| r.provision_id == "Tax/Art.99")
        .expect("identifier should be found even though it lives in only one domain");
    assert!(hit.stages.contains("exact_match"));
}
