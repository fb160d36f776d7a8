//! Hybrid Retriever (C4, §4.4). Per-domain search: exact-identifier,
//! node-embedding, relation-embedding, and optional container-level
//! channels run concurrently and are fused with reciprocal rank fusion.

pub mod error;
pub mod identifier;
pub mod rrf;

pub use error::{RetrieverError, RetrieverResult};

use std::collections::HashSet;

use tracing::{instrument, warn};

use graph_store::GraphStore;
use retrieval_types::provision::ProvisionId;

/// One fused, scored hit, before C5 expansion or C6 enrichment.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub provision_id: ProvisionId,
    pub similarity: f32,
    pub stages: Vec<String>,
}

pub struct RetrieverInputs<'a> {
    pub query: &'a str,
    pub node_query_vec: &'a [f32],
    pub rel_query_vec: &'a [f32],
    pub member_ids: &'a HashSet<ProvisionId>,
    pub limit: usize,
}

pub struct HybridRetriever<G: GraphStore> {
    store: std::sync::Arc<G>,
    rrf_k: f32,
    node_sim_floor: f32,
    expansion_factor: usize,
    excluded_section_tokens: Vec<String>,
}

impl<G: GraphStore> HybridRetriever<G> {
    pub fn new(
        store: std::sync::Arc<G>,
        rrf_k: f32,
        node_sim_floor: f32,
        expansion_factor: usize,
        excluded_section_tokens: Vec<String>,
    ) -> Self {
        Self {
            store,
            rrf_k,
            node_sim_floor,
            expansion_factor,
            excluded_section_tokens,
        }
    }

    #[instrument(skip(self, inputs))]
    pub async fn search(&self, inputs: RetrieverInputs<'_>) -> RetrieverResult<Vec<RetrievalHit>> {
        let expanded_k = (inputs.limit * self.expansion_factor).max(inputs.limit);

        let (exact, node, relation) = tokio::join!(
            self.exact_match_channel(inputs.query, inputs.member_ids),
            self.node_embedding_channel(inputs.node_query_vec, expanded_k, inputs.member_ids),
            self.relation_embedding_channel(inputs.rel_query_vec, expanded_k, inputs.member_ids),
        );

        let mut channels: Vec<(&str, rrf::ChannelRanking)> = Vec::new();
        let mut any_succeeded = false;

        match exact {
            Ok(ranking) => {
                any_succeeded = true;
                if !ranking.is_empty() {
                    channels.push(("exact_match", ranking));
                }
            }
            Err(e) => warn!(error = %e, "exact-match channel failed, degrading to empty"),
        }
        match node {
            Ok(ranking) => {
                any_succeeded = true;
                channels.push(("node_embedding", ranking));
            }
            Err(e) => warn!(error = %e, "node-embedding channel failed, degrading to empty"),
        }
        match relation {
            Ok(ranking) => {
                any_succeeded = true;
                channels.push(("relation_embedding", ranking));
            }
            Err(e) => warn!(error = %e, "relation-embedding channel failed, degrading to empty"),
        }

        if !any_succeeded {
            return Err(RetrieverError::SearchUnavailable {
                domain_id: "unknown".to_string(),
            });
        }

        let fused = rrf::fuse(&channels, self.rrf_k, inputs.limit * 4);

        let hits: Vec<RetrievalHit> = fused
            .into_iter()
            .filter(|item| !self.is_excluded(&item.provision_id))
            .take(inputs.limit)
            .map(|item| RetrievalHit {
                provision_id: item.provision_id,
                similarity: item.best_similarity,
                stages: item.stages,
            })
            .collect();

        Ok(hits)
    }

    /// §4.4 "Domain/section filtering": identifiers containing any
    /// excluded token are dropped after fusion, uniformly for primary and
    /// peer (A2A) searches.
    fn is_excluded(&self, identifier: &str) -> bool {
        let lower = identifier.to_lowercase();
        self.excluded_section_tokens
            .iter()
            .any(|token| lower.contains(&token.to_lowercase()))
    }

    async fn exact_match_channel(
        &self,
        query: &str,
        member_ids: &HashSet<ProvisionId>,
    ) -> Result<rrf::ChannelRanking, graph_store::GraphStoreError> {
        let Some(token) = identifier::parse(query) else {
            return Ok(Vec::new());
        };
        let pattern = token.as_identifier_regex();
        let hits = self.store.find_by_identifier_pattern(&pattern).await?;
        Ok(hits
            .into_iter()
            .filter(|p| member_ids.contains(&p.id) && token.matches_identifier(&p.id))
            .map(|p| (p.id, 1.0))
            .collect())
    }

    async fn node_embedding_channel(
        &self,
        query_vec: &[f32],
        k: usize,
        member_ids: &HashSet<ProvisionId>,
    ) -> Result<rrf::ChannelRanking, graph_store::GraphStoreError> {
        let hits = self
            .store
            .vector_search_provisions(query_vec, k, Some(member_ids))
            .await?;
        Ok(hits.into_iter().filter(|(_, sim)| *sim >= self.node_sim_floor).collect())
    }

    async fn relation_embedding_channel(
        &self,
        query_vec: &[f32],
        k: usize,
        member_ids: &HashSet<ProvisionId>,
    ) -> Result<rrf::ChannelRanking, graph_store::GraphStoreError> {
        let hits = self.store.vector_search_relations(query_vec, k).await?;
        Ok(hits.into_iter().filter(|(id, _)| member_ids.contains(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_store::mock::MockGraphStore;
    use retrieval_types::graph::HierarchyEdge;
    use retrieval_types::provision::Provision;

    fn provision(id: &str, embedding: Vec<f32>) -> Provision {
        Provision {
            id: id.to_string(),
            content: format!("content {id}"),
            node_embedding: Some(embedding),
            secondary_embedding: None,
            document_title: String::new(),
            provision_path: String::new(),
            provision_number: id.to_string(),
        }
    }

    fn member_set(ids: &[&str]) -> HashSet<ProvisionId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn exact_match_wins_over_semantic_ties() {
        let store = std::sync::Arc::new(
            MockGraphStore::builder()
                .provision(provision("Statute/Art.17", vec![1.0, 0.0]))
                .provision(provision("Statute/Art.18", vec![0.9, 0.1]))
                .build(),
        );
        let retriever = HybridRetriever::new(store, 60.0, 0.3, 3, vec![]);
        let members = member_set(&["Statute/Art.17", "Statute/Art.18"]);
        let hits = retriever
            .search(RetrieverInputs {
                query: "Article 17",
                node_query_vec: &[0.9, 0.1],
                rel_query_vec: &[0.9, 0.1],
                member_ids: &members,
                limit: 5,
            })
            .await
            .unwrap();
        assert_eq!(hits[0].provision_id, "Statute/Art.17");
        assert!(hits[0].stages.contains(&"exact_match".to_string()));
    }

    #[tokio::test]
    async fn excluded_section_tokens_are_dropped_after_fusion() {
        let store = std::sync::Arc::new(
            MockGraphStore::builder()
                .provision(provision("Statute/Transitional.1", vec![1.0, 0.0]))
                .provision(provision("Statute/Art.5", vec![0.95, 0.05]))
                .build(),
        );
        let retriever = HybridRetriever::new(store, 60.0, 0.3, 3, vec!["transitional".to_string()]);
        let members = member_set(&["Statute/Transitional.1", "Statute/Art.5"]);
        let hits = retriever
            .search(RetrieverInputs {
                query: "zoning provisions",
                node_query_vec: &[1.0, 0.0],
                rel_query_vec: &[1.0, 0.0],
                member_ids: &members,
                limit: 5,
            })
            .await
            .unwrap();
        assert!(hits.iter().all(|h| !h.provision_id.contains("Transitional")));
    }

    #[tokio::test]
    async fn relation_channel_resolves_edges_to_child_ids_within_members() {
        let store = std::sync::Arc::new(
            MockGraphStore::builder()
                .provision(provision("root", vec![0.0, 1.0]))
                .provision(provision("child", vec![1.0, 0.0]))
                .hierarchy_edge(HierarchyEdge {
                    parent_id: "root".into(),
                    child_id: "child".into(),
                    position: 0,
                    relation_embedding: Some(vec![1.0, 0.0]),
                    semantic_type: None,
                    keywords: vec![],
                })
                .build(),
        );
        let retriever = HybridRetriever::new(store, 60.0, 0.9, 3, vec![]);
        let members = member_set(&["child"]);
        let hits = retriever
            .search(RetrieverInputs {
                query: "irrelevant",
                node_query_vec: &[0.0, 0.0],
                rel_query_vec: &[1.0, 0.0],
                member_ids: &members,
                limit: 5,
            })
            .await
            .unwrap();
        assert!(hits.iter().any(|h| h.provision_id == "child"));
    }
}
