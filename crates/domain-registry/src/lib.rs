//! Domain Registry (C3, §4.3). Owns the set of domains in memory and their
//! materialization in the graph: bootstrap, k-means initialization,
//! incremental assignment, and the rebalance/split/merge maintenance pass.

pub mod error;
pub mod kmeans;
pub mod naming;

pub use error::{RegistryError, RegistryResult};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use embedding_gateway::EmbeddingGateway;
use graph_store::GraphStore;
use retrieval_types::config::EngineConfig;
use retrieval_types::domain::{DomainId, DomainInfo};
use retrieval_types::provision::ProvisionId;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Owns `domains`, `provision_to_domain`, and a bounded embedding cache
/// (§4.3 "State"). The embedding cache here is the map of provision id to
/// node embedding seen during the current bulk operation; it is not a
/// general-purpose cache and is dropped between calls.
pub struct DomainRegistry<G: GraphStore, E: EmbeddingGateway> {
    store: Arc<G>,
    gateway: Arc<E>,
    config: EngineConfig,
    domains: RwLock<HashMap<DomainId, DomainInfo>>,
    provision_to_domain: RwLock<HashMap<ProvisionId, DomainId>>,
}

impl<G: GraphStore, E: EmbeddingGateway> DomainRegistry<G, E> {
    pub fn new(store: Arc<G>, gateway: Arc<E>, config: EngineConfig) -> Self {
        Self {
            store,
            gateway,
            config,
            domains: RwLock::new(HashMap::new()),
            provision_to_domain: RwLock::new(HashMap::new()),
        }
    }

    pub async fn domain(&self, id: &str) -> Option<DomainInfo> {
        self.domains.read().await.get(id).cloned()
    }

    pub async fn all_domains(&self) -> Vec<DomainInfo> {
        self.domains.read().await.values().cloned().collect()
    }

    pub async fn domain_of(&self, provision_id: &str) -> Option<DomainId> {
        self.provision_to_domain.read().await.get(provision_id).cloned()
    }

    /// On first use: loads any existing domains from the graph. If none
    /// exist and there are enough embedded provisions, runs
    /// `kmeans_initialize` (§4.3).
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> RegistryResult<()> {
        let existing = self.store.list_domains().await?;
        if !existing.is_empty() {
            info!(count = existing.len(), "loaded existing domains from graph");
            let mut domains = self.domains.write().await;
            let mut reverse = self.provision_to_domain.write().await;
            for domain in existing {
                for pid in self.store.members_of(&domain.id).await? {
                    reverse.insert(pid, domain.id.clone());
                }
                domains.insert(domain.id.clone(), domain);
            }
            return Ok(());
        }

        let embedded = self.store.count_embedded_provisions().await?;
        if embedded < self.config.bootstrap_min_provisions {
            info!(embedded, need = self.config.bootstrap_min_provisions, "not enough data to bootstrap yet");
            return Ok(());
        }

        self.kmeans_initialize().await
    }

    /// Samples provision embeddings; for each k in the configured range
    /// runs k-means with a fixed seed and restarts; picks k maximizing
    /// silhouette score; writes domains; labels each via the LLM (§4.3).
    #[instrument(skip(self))]
    pub async fn kmeans_initialize(&self) -> RegistryResult<()> {
        let sample_limit = (self.config.max_domains * self.config.max_domain_size).max(self.config.bootstrap_min_provisions);
        let sample = self.store.sample_node_embeddings(sample_limit, None).await?;
        if sample.len() < self.config.bootstrap_min_provisions {
            return Err(RegistryError::InsufficientData {
                have: sample.len(),
                need: self.config.bootstrap_min_provisions,
            });
        }

        let ids: Vec<ProvisionId> = sample.iter().map(|(id, _)| id.clone()).collect();
        let vectors: Vec<Vec<f32>> = sample.into_iter().map(|(_, v)| v).collect();

        let (centroids, assignment, k) = kmeans::best_k_by_silhouette(
            &vectors,
            self.config.kmeans_k_min,
            self.config.kmeans_k_max,
            self.config.kmeans_init_runs,
        );
        info!(k, n = vectors.len(), "kmeans_initialize selected k");

        let mut clusters: Vec<Vec<(ProvisionId, f32)>> = vec![Vec::new(); k];
        for (i, &c) in assignment.iter().enumerate() {
            let sim = cosine(&vectors[i], &centroids[c]);
            clusters[c].push((ids[i].clone(), sim));
        }

        let mut new_domains = Vec::new();
        for (c, members) in clusters.into_iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let domain_id = format!("domain-{c:03}");
            let label = self
                .name_domain_via_llm(&domain_id, &members.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>(), &centroids[c])
                .await;
            let mut info = DomainInfo::new(domain_id.clone(), label, centroids[c].clone());
            info.cardinality = members.len();
            new_domains.push((info, members));
        }

        for (info, members) in &new_domains {
            self.store.upsert_domain(info).await?;
            let (ids, sims): (Vec<_>, Vec<_>) = members.iter().cloned().unzip();
            self.store.replace_assignments(&info.id, &ids, &sims).await?;
        }

        let mut domains = self.domains.write().await;
        let mut reverse = self.provision_to_domain.write().await;
        for (info, members) in new_domains {
            for (pid, _) in &members {
                reverse.insert(pid.clone(), info.id.clone());
            }
            domains.insert(info.id.clone(), info);
        }

        Ok(())
    }

    /// For each provision in order: compute similarity to every centroid;
    /// join the best domain if it clears `SIMILARITY_JOIN_THRESHOLD`,
    /// otherwise seed a new singleton domain (§4.3).
    #[instrument(skip(self, provision_ids))]
    pub async fn assign_incremental(&self, provision_ids: &[ProvisionId]) -> RegistryResult<()> {
        let provisions = self.store.batch_get_provisions(provision_ids).await?;

        for provision in provisions {
            let Some(embedding) = provision.node_embedding.clone() else {
                warn!(id = %provision.id, "skipping provision with no node embedding");
                continue;
            };

            let best = {
                let domains = self.domains.read().await;
                domains
                    .values()
                    .map(|d| (d.id.clone(), cosine(&embedding, &d.centroid)))
                    .fold(None, |acc: Option<(DomainId, f32)>, (id, sim)| match acc {
                        Some((best_id, best_sim)) => {
                            if sim > best_sim || (sim == best_sim && id < best_id) {
                                Some((id, sim))
                            } else {
                                Some((best_id, best_sim))
                            }
                        }
                        None => Some((id, sim)),
                    })
            };

            match best {
                Some((domain_id, sim)) if sim >= self.config.similarity_join_threshold => {
                    self.add_to_domain(&domain_id, &provision.id, sim).await?;
                }
                _ => {
                    self.seed_singleton_domain(&provision.id, embedding).await?;
                }
            }
        }
        Ok(())
    }

    async fn add_to_domain(&self, domain_id: &str, provision_id: &str, similarity: f32) -> RegistryResult<()> {
        let mut members = self.store.members_of(domain_id).await?;
        if !members.iter().any(|m| m == provision_id) {
            members.push(provision_id.to_string());
        }
        let sims: Vec<f32> = {
            let domains = self.domains.read().await;
            let centroid = domains
                .get(domain_id)
                .map(|d| d.centroid.clone())
                .ok_or_else(|| RegistryError::DomainNotFound(domain_id.to_string()))?;
            let provisions = self.store.batch_get_provisions(&members).await?;
            provisions
                .iter()
                .map(|p| p.node_embedding.as_ref().map(|e| cosine(e, &centroid)).unwrap_or(similarity))
                .collect()
        };
        self.store.replace_assignments(domain_id, &members, &sims).await?;

        let mut domains = self.domains.write().await;
        if let Some(info) = domains.get_mut(domain_id) {
            info.cardinality = members.len();
            info.updated_at = chrono::Utc::now();
        }
        self.provision_to_domain
            .write()
            .await
            .insert(provision_id.to_string(), domain_id.to_string());
        Ok(())
    }

    async fn seed_singleton_domain(&self, provision_id: &str, embedding: Vec<f32>) -> RegistryResult<()> {
        let domain_id = format!("domain-{}", uuid::Uuid::new_v4().simple());
        let label = self
            .name_domain_via_llm(&domain_id, std::slice::from_ref(&provision_id.to_string()), &embedding)
            .await;
        let mut info = DomainInfo::new(domain_id.clone(), label, embedding);
        info.cardinality = 1;

        self.store.upsert_domain(&info).await?;
        self.store
            .replace_assignments(&info.id, &[provision_id.to_string()], &[1.0])
            .await?;

        self.domains.write().await.insert(info.id.clone(), info.clone());
        self.provision_to_domain
            .write()
            .await
            .insert(provision_id.to_string(), info.id);
        Ok(())
    }

    /// Maintenance pass: split oversized domains (largest first), merge
    /// undersized ones into their nearest neighbor by centroid similarity,
    /// loop until no operation applies or the iteration bound is hit
    /// (§4.3 "Ordering and tie-breaks": splits before merges each round).
    #[instrument(skip(self))]
    pub async fn rebalance(&self) -> RegistryResult<()> {
        const MAX_ITERATIONS: usize = 25;

        for iteration in 0..MAX_ITERATIONS {
            let mut oversized: Vec<DomainInfo> = self
                .domains
                .read()
                .await
                .values()
                .filter(|d| d.cardinality > self.config.max_domain_size)
                .cloned()
                .collect();
            oversized.sort_by(|a, b| b.cardinality.cmp(&a.cardinality).then(a.id.cmp(&b.id)));

            let mut did_work = false;
            for domain in &oversized {
                self.split(&domain.id).await?;
                did_work = true;
            }

            let undersized: Vec<DomainInfo> = self
                .domains
                .read()
                .await
                .values()
                .filter(|d| d.cardinality < self.config.min_domain_size)
                .cloned()
                .collect();

            for domain in &undersized {
                if self.domains.read().await.len() <= 1 {
                    break;
                }
                let target = self.closest_domain(&domain.id, &domain.centroid).await;
                if let Some(target_id) = target {
                    self.merge(&domain.id, &target_id).await?;
                    did_work = true;
                }
            }

            if !did_work {
                info!(iteration, "rebalance converged");
                break;
            }
        }
        Ok(())
    }

    async fn closest_domain(&self, exclude: &str, centroid: &[f32]) -> Option<DomainId> {
        self.domains
            .read()
            .await
            .values()
            .filter(|d| d.id != exclude)
            .map(|d| (d.id.clone(), cosine(centroid, &d.centroid)))
            .fold(None, |acc: Option<(DomainId, f32)>, (id, sim)| match acc {
                Some((best_id, best_sim)) if best_sim >= sim => Some((best_id, best_sim)),
                _ => Some((id, sim)),
            })
            .map(|(id, _)| id)
    }

    /// Runs 2-means on the domain's member embeddings; creates two new
    /// domains; labels each via the LLM; deletes the original; updates all
    /// assignment edges (§4.3). Transactional: graph writes for the two new
    /// domains are performed before the original is deleted, and if any
    /// step fails the in-memory state is left untouched.
    #[instrument(skip(self))]
    pub async fn split(&self, domain_id: &str) -> RegistryResult<()> {
        let member_ids = self.store.members_of(domain_id).await?;
        let provisions = self.store.batch_get_provisions(&member_ids).await?;
        let embedded: Vec<(ProvisionId, Vec<f32>)> = provisions
            .into_iter()
            .filter_map(|p| p.node_embedding.map(|e| (p.id, e)))
            .collect();

        if embedded.len() < 2 {
            return Ok(());
        }

        let vectors: Vec<Vec<f32>> = embedded.iter().map(|(_, v)| v.clone()).collect();
        let (centroids, assignment) = kmeans::kmeans(&vectors, 2, self.config.kmeans_init_runs);

        let mut clusters: Vec<Vec<(ProvisionId, f32)>> = vec![Vec::new(); 2];
        for (i, &c) in assignment.iter().enumerate() {
            let sim = cosine(&vectors[i], &centroids[c]);
            clusters[c].push((embedded[i].0.clone(), sim));
        }

        if clusters.iter().any(|c| c.is_empty()) {
            warn!(domain_id, "split produced an empty cluster, skipping");
            return Ok(());
        }

        let mut new_domains = Vec::new();
        for (c, members) in clusters.into_iter().enumerate() {
            let new_id = format!("{domain_id}-split{c}");
            let label = self
                .name_domain_via_llm(&new_id, &members.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>(), &centroids[c])
                .await;
            let mut info = DomainInfo::new(new_id, label, centroids[c].clone());
            info.cardinality = members.len();
            new_domains.push((info, members));
        }

        for (info, members) in &new_domains {
            self.store.upsert_domain(info).await?;
            let (ids, sims): (Vec<_>, Vec<_>) = members.iter().cloned().unzip();
            self.store.replace_assignments(&info.id, &ids, &sims).await?;
        }
        self.store.delete_domain(domain_id).await?;

        let mut domains = self.domains.write().await;
        let mut reverse = self.provision_to_domain.write().await;
        domains.remove(domain_id);
        for (info, members) in new_domains {
            for (pid, _) in &members {
                reverse.insert(pid.clone(), info.id.clone());
            }
            domains.insert(info.id.clone(), info);
        }
        Ok(())
    }

    /// Chooses the larger domain as the surviving id, moves all of `b`'s
    /// provisions to it, recomputes the centroid, deletes `b` (§4.3).
    #[instrument(skip(self))]
    pub async fn merge(&self, domain_a: &str, domain_b: &str) -> RegistryResult<()> {
        let (domain_a, domain_b) = {
            let domains = self.domains.read().await;
            let a = domains
                .get(domain_a)
                .ok_or_else(|| RegistryError::DomainNotFound(domain_a.to_string()))?;
            let b = domains
                .get(domain_b)
                .ok_or_else(|| RegistryError::DomainNotFound(domain_b.to_string()))?;
            if a.cardinality >= b.cardinality {
                (a.id.clone(), b.id.clone())
            } else {
                (b.id.clone(), a.id.clone())
            }
        };

        let survivor_members = self.store.members_of(&domain_a).await?;
        let absorbed_members = self.store.members_of(&domain_b).await?;
        let mut all_members = survivor_members;
        all_members.extend(absorbed_members);
        all_members.sort();
        all_members.dedup();

        let provisions = self.store.batch_get_provisions(&all_members).await?;
        let embeddings: Vec<&[f32]> = provisions
            .iter()
            .filter_map(|p| p.node_embedding.as_deref())
            .collect();
        let new_centroid = if embeddings.is_empty() {
            self.domains
                .read()
                .await
                .get(&domain_a)
                .map(|d| d.centroid.clone())
                .unwrap_or_default()
        } else {
            kmeans::centroid_of_public(&embeddings)
        };

        let sims: Vec<f32> = provisions
            .iter()
            .map(|p| {
                p.node_embedding
                    .as_ref()
                    .map(|e| cosine(e, &new_centroid))
                    .unwrap_or(0.0)
            })
            .collect();

        self.store.replace_assignments(&domain_a, &all_members, &sims).await?;
        self.store.delete_domain(&domain_b).await?;

        let mut domains = self.domains.write().await;
        domains.remove(&domain_b);
        if let Some(info) = domains.get_mut(&domain_a) {
            info.centroid = new_centroid;
            info.cardinality = all_members.len();
            info.updated_at = chrono::Utc::now();
        }
        drop(domains);

        let mut reverse = self.provision_to_domain.write().await;
        for pid in &all_members {
            reverse.insert(pid.clone(), domain_a.clone());
        }
        Ok(())
    }

    /// Selects up to `LABEL_SAMPLE_SIZE` provisions nearest the centroid;
    /// asks the LLM for a short human-readable label; falls back to a
    /// synthesized generic label on LLM failure (§4.3).
    async fn name_domain_via_llm(&self, domain_id: &str, members: &[ProvisionId], centroid: &[f32]) -> String {
        match naming::name_domain(
            self.gateway.as_ref(),
            self.store.as_ref(),
            members,
            centroid,
            self.config.label_sample_size,
        )
        .await
        {
            Ok(label) => label,
            Err(e) => {
                warn!(domain_id, error = %e, "LLM labeling failed, falling back to generic label");
                naming::fallback_label(domain_id, members.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding_gateway::mock::MockEmbeddingGateway;
    use graph_store::mock::MockGraphStore;
    use retrieval_types::provision::Provision;

    fn provision(id: &str, x: f32, y: f32) -> Provision {
        let raw = vec![x, y];
        let n = (x * x + y * y).sqrt();
        let embedding = if n > 0.0 { vec![x / n, y / n] } else { raw };
        Provision {
            id: id.to_string(),
            content: format!("content for {id}"),
            node_embedding: Some(embedding),
            secondary_embedding: None,
            document_title: String::new(),
            provision_path: String::new(),
            provision_number: String::new(),
        }
    }

    fn config_for_small_corpus() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.bootstrap_min_provisions = 4;
        cfg.kmeans_k_min = 2;
        cfg.kmeans_k_max = 3;
        cfg.kmeans_init_runs = 4;
        cfg.label_sample_size = 2;
        cfg.min_domain_size = 1;
        cfg.max_domain_size = 10;
        cfg
    }

    fn two_cluster_store() -> MockGraphStore {
        MockGraphStore::builder()
            .provision(provision("a1", 1.0, 0.01))
            .provision(provision("a2", 0.98, 0.02))
            .provision(provision("b1", 0.01, 1.0))
            .provision(provision("b2", 0.02, 0.99))
            .build()
    }

    #[tokio::test]
    async fn bootstrap_runs_kmeans_when_no_domains_exist() {
        let store = Arc::new(two_cluster_store());
        let gateway = Arc::new(MockEmbeddingGateway::new());
        let registry = DomainRegistry::new(store, gateway, config_for_small_corpus());

        registry.bootstrap().await.unwrap();

        let domains = registry.all_domains().await;
        assert_eq!(domains.len(), 2);
        assert!(registry.domain_of("a1").await.is_some());
        assert!(registry.domain_of("b1").await.is_some());
        assert_ne!(
            registry.domain_of("a1").await,
            registry.domain_of("b1").await
        );
    }

    #[tokio::test]
    async fn bootstrap_skips_when_insufficient_data() {
        let store = Arc::new(MockGraphStore::builder().provision(provision("a1", 1.0, 0.0)).build());
        let gateway = Arc::new(MockEmbeddingGateway::new());
        let registry = DomainRegistry::new(store, gateway, config_for_small_corpus());

        registry.bootstrap().await.unwrap();
        assert!(registry.all_domains().await.is_empty());
    }

    #[tokio::test]
    async fn assign_incremental_joins_existing_domain_above_threshold() {
        let store = Arc::new(two_cluster_store());
        let gateway = Arc::new(MockEmbeddingGateway::new());
        let mut cfg = config_for_small_corpus();
        cfg.similarity_join_threshold = 0.5;
        let registry = DomainRegistry::new(store, gateway, cfg);
        registry.bootstrap().await.unwrap();

        registry.assign_incremental(&["a1".to_string()]).await.unwrap();
        assert_eq!(registry.domain_of("a1").await, registry.domain_of("a2").await);
    }

    #[tokio::test]
    async fn split_divides_an_oversized_domain_into_two() {
        let store = Arc::new(two_cluster_store());
        let gateway = Arc::new(MockEmbeddingGateway::new());
        let registry = DomainRegistry::new(store.clone(), gateway, config_for_small_corpus());
        registry.bootstrap().await.unwrap();

        let domains_before = registry.all_domains().await;
        let target = domains_before.first().unwrap().id.clone();
        registry.split(&target).await.unwrap();

        assert!(registry.domain(&target).await.is_none());
    }

    #[tokio::test]
    async fn merge_keeps_the_larger_domain_id_and_absorbs_the_smaller() {
        let store = Arc::new(two_cluster_store());
        let gateway = Arc::new(MockEmbeddingGateway::new());
        let registry = DomainRegistry::new(store.clone(), gateway, config_for_small_corpus());
        registry.bootstrap().await.unwrap();

        let domains = registry.all_domains().await;
        let a = domains[0].id.clone();
        let b = domains[1].id.clone();
        registry.merge(&a, &b).await.unwrap();

        let remaining = registry.all_domains().await;
        assert_eq!(remaining.len(), 1);
    }
}
