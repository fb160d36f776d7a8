//! Relationship-Aware Expander (C5, §4.5). A single-source Dijkstra-like
//! walk over the hierarchy graph, seeded from C4's top hits, with
//! edge-type-specific costs and a similarity-threshold cutoff.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::instrument;

use graph_store::{GraphStore, GraphStoreError};
use retrieval_types::graph::EdgeKind;
use retrieval_types::provision::ProvisionId;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `parent`/`child`/`cross_document` are structurally implied and cost
/// nothing; `sibling` costs the cosine distance between the query and
/// whichever embedding is available; every other kind is unreachable
/// (§4.5).
fn edge_cost(kind: EdgeKind, node_query_vec: &[f32], relation_embedding: Option<&[f32]>, node_embedding: Option<&[f32]>) -> f32 {
    match kind {
        EdgeKind::Parent | EdgeKind::Child | EdgeKind::CrossDocument => 0.0,
        EdgeKind::Sibling => {
            let sim = relation_embedding
                .map(|rel| cosine(node_query_vec, rel))
                .or_else(|| node_embedding.map(|emb| cosine(node_query_vec, emb)))
                .unwrap_or(0.0);
            1.0 - sim
        }
    }
}

#[derive(Debug, Clone)]
struct HeapEntry {
    cost: f32,
    provision_id: ProvisionId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.provision_id == other.provision_id
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `BinaryHeap` is a max-heap; we want the lowest cost first, with ties
/// broken by provision id ascending (§4.5 "Ordering and tie-breaks"), so
/// `Ord` here is reversed relative to natural cost order.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.provision_id.cmp(&self.provision_id))
    }
}

#[derive(Debug, Clone)]
pub struct ExpandedHit {
    pub provision_id: ProvisionId,
    pub relevance: f32,
    pub discovery_kind: EdgeKind,
}

pub struct RelationshipExpander<G: GraphStore> {
    store: std::sync::Arc<G>,
    similarity_threshold: f32,
    max_expanded: usize,
}

impl<G: GraphStore> RelationshipExpander<G> {
    pub fn new(store: std::sync::Arc<G>, similarity_threshold: f32, max_expanded: usize) -> Self {
        Self {
            store,
            similarity_threshold,
            max_expanded,
        }
    }

    /// `seeds` is the top-`RAE_SEEDS` hits from C4, as `(provision_id,
    /// similarity)`. Returns expansion hits for every reached node other
    /// than the seeds themselves (§4.5 "Output").
    #[instrument(skip(self, seeds, node_query_vec))]
    pub async fn expand(
        &self,
        seeds: &[(ProvisionId, f32)],
        node_query_vec: &[f32],
    ) -> Result<Vec<ExpandedHit>, GraphStoreError> {
        let seed_ids: HashSet<ProvisionId> = seeds.iter().map(|(id, _)| id.clone()).collect();

        let mut heap = BinaryHeap::new();
        let mut dist: HashMap<ProvisionId, f32> = HashMap::new();
        let mut via: HashMap<ProvisionId, EdgeKind> = HashMap::new();
        let mut reached: HashSet<ProvisionId> = HashSet::new();

        for (seed_id, seed_sim) in seeds {
            let cost = 1.0 - seed_sim;
            if dist.get(seed_id).map(|&d| cost < d).unwrap_or(true) {
                dist.insert(seed_id.clone(), cost);
                heap.push(HeapEntry {
                    cost,
                    provision_id: seed_id.clone(),
                });
            }
        }

        while let Some(HeapEntry { cost: cost_u, provision_id: u }) = heap.pop() {
            if reached.contains(&u) {
                continue;
            }
            if 1.0 - cost_u < self.similarity_threshold {
                break;
            }
            if reached.len() >= self.max_expanded {
                break;
            }
            reached.insert(u.clone());

            let neighbors = self.store.get_neighbors(&u).await?;
            for neighbor in neighbors {
                let cost = edge_cost(
                    neighbor.kind,
                    node_query_vec,
                    neighbor.relation_embedding.as_deref(),
                    neighbor.node_embedding.as_deref(),
                );
                let alt = cost_u + cost;
                let better = dist.get(&neighbor.id).map(|&d| alt < d).unwrap_or(true);
                if better {
                    dist.insert(neighbor.id.clone(), alt);
                    via.insert(neighbor.id.clone(), neighbor.kind);
                    heap.push(HeapEntry {
                        cost: alt,
                        provision_id: neighbor.id,
                    });
                }
            }
        }

        let mut hits: Vec<ExpandedHit> = reached
            .into_iter()
            .filter(|id| !seed_ids.contains(id))
            .filter_map(|id| {
                let cost = *dist.get(&id)?;
                let discovery_kind = *via.get(&id)?;
                Some(ExpandedHit {
                    provision_id: id,
                    relevance: 1.0 - cost,
                    discovery_kind,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            dist[&a.provision_id]
                .partial_cmp(&dist[&b.provision_id])
                .unwrap()
                .then_with(|| a.provision_id.cmp(&b.provision_id))
        });

        Ok(hits)
    }
}
