//! In-memory `GraphStore` for tests (§8, SPEC_FULL.md §10.5). Lets C3–C6
//! be exercised deterministically without a live Postgres instance.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use retrieval_types::graph::{EdgeKind, HierarchyEdge, Neighbor};
use retrieval_types::provision::{Provision, ProvisionId};
use retrieval_types::DomainInfo;

use crate::error::{GraphStoreError, GraphStoreResult};
use crate::{GraphStore, MemberFilter, ScoredId};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Default)]
struct MockState {
    provisions: HashMap<ProvisionId, Provision>,
    /// parent_id -> ordered child ids
    children: HashMap<ProvisionId, Vec<ProvisionId>>,
    /// child_id -> parent_id
    parents: HashMap<ProvisionId, ProvisionId>,
    hierarchy_edges: HashMap<(ProvisionId, ProvisionId), HierarchyEdge>,
    /// undirected cross-document pairs
    cross_document: Vec<(ProvisionId, ProvisionId)>,
    domains: HashMap<String, DomainInfo>,
    assignments: HashMap<ProvisionId, String>,
    assignment_similarity: HashMap<ProvisionId, f32>,
}

pub struct MockGraphStore {
    state: RwLock<MockState>,
}

impl Default for MockGraphStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(MockState::default()),
        }
    }
}

impl MockGraphStore {
    pub fn builder() -> MockGraphStoreBuilder {
        MockGraphStoreBuilder::default()
    }
}

#[derive(Default)]
pub struct MockGraphStoreBuilder {
    state: MockState,
}

impl MockGraphStoreBuilder {
    pub fn provision(mut self, p: Provision) -> Self {
        self.state.provisions.insert(p.id.clone(), p);
        self
    }

    pub fn hierarchy_edge(mut self, edge: HierarchyEdge) -> Self {
        self.state
            .children
            .entry(edge.parent_id.clone())
            .or_default()
            .push(edge.child_id.clone());
        self.state
            .parents
            .insert(edge.child_id.clone(), edge.parent_id.clone());
        self.state
            .hierarchy_edges
            .insert((edge.parent_id.clone(), edge.child_id.clone()), edge);
        self
    }

    pub fn cross_document(mut self, a: impl Into<ProvisionId>, b: impl Into<ProvisionId>) -> Self {
        self.state.cross_document.push((a.into(), b.into()));
        self
    }

    pub fn domain(mut self, domain: DomainInfo) -> Self {
        self.state.domains.insert(domain.id.clone(), domain);
        self
    }

    pub fn assign(mut self, provision_id: impl Into<ProvisionId>, domain_id: impl Into<String>, similarity: f32) -> Self {
        let pid = provision_id.into();
        self.state.assignments.insert(pid.clone(), domain_id.into());
        self.state.assignment_similarity.insert(pid, similarity);
        self
    }

    pub fn build(self) -> MockGraphStore {
        MockGraphStore {
            state: RwLock::new(self.state),
        }
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn get_provision(&self, id: &str) -> GraphStoreResult<Provision> {
        self.state
            .read()
            .unwrap()
            .provisions
            .get(id)
            .cloned()
            .ok_or_else(|| GraphStoreError::NotFound(id.to_string()))
    }

    async fn batch_get_provisions(&self, ids: &[ProvisionId]) -> GraphStoreResult<Vec<Provision>> {
        let state = self.state.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.provisions.get(id).cloned())
            .collect())
    }

    async fn vector_search_provisions(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: MemberFilter<'_>,
    ) -> GraphStoreResult<Vec<ScoredId>> {
        let state = self.state.read().unwrap();
        let mut scored: Vec<ScoredId> = state
            .provisions
            .values()
            .filter(|p| filter.map(|f| f.contains(&p.id)).unwrap_or(true))
            .filter_map(|p| {
                p.node_embedding
                    .as_ref()
                    .map(|emb| (p.id.clone(), cosine(query_vec, emb)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn vector_search_relations(
        &self,
        query_vec: &[f32],
        k: usize,
    ) -> GraphStoreResult<Vec<ScoredId>> {
        let state = self.state.read().unwrap();
        let mut scored: Vec<ScoredId> = state
            .hierarchy_edges
            .values()
            .filter_map(|edge| {
                edge.relation_embedding
                    .as_ref()
                    .map(|emb| (edge.child_id.clone(), cosine(query_vec, emb)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_neighbors(&self, provision_id: &str) -> GraphStoreResult<Vec<Neighbor>> {
        let state = self.state.read().unwrap();
        let mut neighbors = Vec::new();

        if let Some(parent_id) = state.parents.get(provision_id) {
            let edge = state
                .hierarchy_edges
                .get(&(parent_id.clone(), provision_id.to_string()));
            neighbors.push(Neighbor {
                id: parent_id.clone(),
                kind: EdgeKind::Parent,
                relation_embedding: edge.and_then(|e| e.relation_embedding.clone()),
                semantic_type: edge.and_then(|e| e.semantic_type),
                node_embedding: state.provisions.get(parent_id).and_then(|p| p.node_embedding.clone()),
            });

            if let Some(siblings) = state.children.get(parent_id) {
                for sibling_id in siblings {
                    if sibling_id == provision_id {
                        continue;
                    }
                    let sib_edge = state
                        .hierarchy_edges
                        .get(&(parent_id.clone(), sibling_id.clone()));
                    neighbors.push(Neighbor {
                        id: sibling_id.clone(),
                        kind: EdgeKind::Sibling,
                        relation_embedding: sib_edge.and_then(|e| e.relation_embedding.clone()),
                        semantic_type: sib_edge.and_then(|e| e.semantic_type),
                        node_embedding: state
                            .provisions
                            .get(sibling_id)
                            .and_then(|p| p.node_embedding.clone()),
                    });
                }
            }
        }

        if let Some(children) = state.children.get(provision_id) {
            for child_id in children {
                let edge = state
                    .hierarchy_edges
                    .get(&(provision_id.to_string(), child_id.clone()));
                neighbors.push(Neighbor {
                    id: child_id.clone(),
                    kind: EdgeKind::Child,
                    relation_embedding: edge.and_then(|e| e.relation_embedding.clone()),
                    semantic_type: edge.and_then(|e| e.semantic_type),
                    node_embedding: state.provisions.get(child_id).and_then(|p| p.node_embedding.clone()),
                });
            }
        }

        for (a, b) in &state.cross_document {
            let other = if a == provision_id {
                Some(b)
            } else if b == provision_id {
                Some(a)
            } else {
                None
            };
            if let Some(other_id) = other {
                neighbors.push(Neighbor {
                    id: other_id.clone(),
                    kind: EdgeKind::CrossDocument,
                    relation_embedding: None,
                    semantic_type: None,
                    node_embedding: state.provisions.get(other_id).and_then(|p| p.node_embedding.clone()),
                });
            }
        }

        Ok(neighbors)
    }

    async fn find_by_identifier_pattern(&self, pattern: &str) -> GraphStoreResult<Vec<Provision>> {
        let re = regex::Regex::new(pattern)
            .map_err(|e| GraphStoreError::ConstraintViolation(format!("bad pattern: {e}")))?;
        let state = self.state.read().unwrap();
        let mut hits: Vec<Provision> = state
            .provisions
            .values()
            .filter(|p| re.is_match(&p.id) || re.is_match(&p.provision_number))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hits)
    }

    async fn upsert_domain(&self, domain: &DomainInfo) -> GraphStoreResult<()> {
        self.state
            .write()
            .unwrap()
            .domains
            .insert(domain.id.clone(), domain.clone());
        Ok(())
    }

    async fn replace_assignments(
        &self,
        domain_id: &str,
        provision_ids: &[ProvisionId],
        similarities: &[f32],
    ) -> GraphStoreResult<()> {
        if provision_ids.len() != similarities.len() {
            return Err(GraphStoreError::ConstraintViolation(
                "provision_ids and similarities must have equal length".into(),
            ));
        }
        let mut state = self.state.write().unwrap();
        state.assignments.retain(|_, d| d != domain_id);
        let live: std::collections::HashSet<ProvisionId> = state.assignments.keys().cloned().collect();
        state.assignment_similarity.retain(|pid, _| live.contains(pid));
        for (pid, sim) in provision_ids.iter().zip(similarities) {
            state.assignments.insert(pid.clone(), domain_id.to_string());
            state.assignment_similarity.insert(pid.clone(), *sim);
        }
        Ok(())
    }

    async fn delete_domain(&self, domain_id: &str) -> GraphStoreResult<()> {
        let mut state = self.state.write().unwrap();
        if state.assignments.values().any(|d| d == domain_id) {
            return Err(GraphStoreError::ConstraintViolation(format!(
                "domain {domain_id} still has assigned provisions"
            )));
        }
        state.domains.remove(domain_id);
        Ok(())
    }

    async fn list_domains(&self) -> GraphStoreResult<Vec<DomainInfo>> {
        Ok(self.state.read().unwrap().domains.values().cloned().collect())
    }

    async fn count_embedded_provisions(&self) -> GraphStoreResult<usize> {
        Ok(self
            .state
            .read()
            .unwrap()
            .provisions
            .values()
            .filter(|p| p.node_embedding.is_some())
            .count())
    }

    async fn members_of(&self, domain_id: &str) -> GraphStoreResult<Vec<ProvisionId>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .assignments
            .iter()
            .filter(|(_, d)| d.as_str() == domain_id)
            .map(|(pid, _)| pid.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect())
    }

    async fn sample_node_embeddings(
        &self,
        limit: usize,
        domain_id: Option<&str>,
    ) -> GraphStoreResult<Vec<(ProvisionId, Vec<f32>)>> {
        let state = self.state.read().unwrap();
        let mut out: Vec<(ProvisionId, Vec<f32>)> = state
            .provisions
            .values()
            .filter(|p| p.node_embedding.is_some())
            .filter(|p| match domain_id {
                Some(d) => state.assignments.get(&p.id).map(|x| x.as_str()) == Some(d),
                None => true,
            })
            .map(|p| (p.id.clone(), p.node_embedding.clone().unwrap()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out.truncate(limit);
        Ok(out)
    }
}
