//! Domain partition node (§3.1, §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DomainId = String;

/// A partition of the corpus, represented as a node with a centroid and a
/// member list (membership itself lives in `DomainRegistry`, not here —
/// `DomainInfo` carries only what is materialized onto the graph node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainInfo {
    pub id: DomainId,
    pub label: String,
    pub cardinality: usize,
    pub centroid: Vec<f32>,
    pub neighbor_domains: Vec<DomainId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DomainInfo {
    pub fn new(id: impl Into<DomainId>, label: impl Into<String>, centroid: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            label: label.into(),
            cardinality: 0,
            centroid,
            neighbor_domains: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
