//! Graph Store Adapter (C1, §4.1).
//!
//! The only component that speaks to the underlying labeled property
//! graph. Exposes typed, narrow operations to the rest of the core behind
//! a narrow async trait so callers never see the backing engine.

pub mod error;
pub mod mock;
pub mod retry;

#[cfg(feature = "database")]
pub mod postgres;

pub use error::{GraphStoreError, GraphStoreResult};

use async_trait::async_trait;
use retrieval_types::graph::Neighbor;
use retrieval_types::provision::{Provision, ProvisionId};

/// One hit from a vector or relation search: the id and its cosine
/// similarity against the query vector.
pub type ScoredId = (ProvisionId, f32);

/// Optional filter restricting a vector search to a set of provision ids —
/// used to enforce domain membership (§4.1 `vector_search_provisions`).
pub type MemberFilter<'a> = Option<&'a std::collections::HashSet<ProvisionId>>;

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_provision(&self, id: &str) -> GraphStoreResult<Provision>;

    /// Order is preserved; missing ids are simply absent from the
    /// returned vector rather than failing the whole batch.
    async fn batch_get_provisions(&self, ids: &[ProvisionId]) -> GraphStoreResult<Vec<Provision>>;

    async fn vector_search_provisions(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: MemberFilter<'_>,
    ) -> GraphStoreResult<Vec<ScoredId>>;

    /// Against the hierarchy-edge relation-space index; each edge
    /// resolves to its child provision id.
    async fn vector_search_relations(
        &self,
        query_vec: &[f32],
        k: usize,
    ) -> GraphStoreResult<Vec<ScoredId>>;

    async fn get_neighbors(&self, provision_id: &str) -> GraphStoreResult<Vec<Neighbor>>;

    /// Regex-style match against the identifier's section-number
    /// component (e.g. "Article 17").
    async fn find_by_identifier_pattern(&self, pattern: &str) -> GraphStoreResult<Vec<Provision>>;

    async fn upsert_domain(&self, domain: &retrieval_types::DomainInfo) -> GraphStoreResult<()>;

    /// Atomically drops all existing assignment edges from these
    /// provisions and creates the new ones.
    async fn replace_assignments(
        &self,
        domain_id: &str,
        provision_ids: &[ProvisionId],
        similarities: &[f32],
    ) -> GraphStoreResult<()>;

    /// Fails if any assignment still points at this domain — caller must
    /// reassign first (§4.1).
    async fn delete_domain(&self, domain_id: &str) -> GraphStoreResult<()>;

    /// All domain nodes currently materialized, used by
    /// `DomainRegistry::bootstrap` (§4.3).
    async fn list_domains(&self) -> GraphStoreResult<Vec<retrieval_types::DomainInfo>>;

    /// All provision ids with a node embedding, used to decide whether
    /// `kmeans_initialize` has enough data to run (§4.3).
    async fn count_embedded_provisions(&self) -> GraphStoreResult<usize>;

    /// Every provision id currently assigned to `domain_id`, in no
    /// particular order.
    async fn members_of(&self, domain_id: &str) -> GraphStoreResult<Vec<ProvisionId>>;

    /// Up to `limit` embedded provisions, for `kmeans_initialize`'s sample
    /// and for re-clustering a domain's members during `split` (§4.3).
    /// `None` restricts the sample to one domain's members.
    async fn sample_node_embeddings(
        &self,
        limit: usize,
        domain_id: Option<&str>,
    ) -> GraphStoreResult<Vec<(ProvisionId, Vec<f32>)>>;
}
