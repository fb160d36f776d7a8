//! Edge types and neighbor payloads (§3.1, consumed heavily by C5/RAE).

use serde::{Deserialize, Serialize};

use crate::provision::ProvisionId;

/// Discrete "semantic type" label carried by hierarchy edges that have a
/// relation-space embedding (§3.1 invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Detail,
    Exception,
    Reference,
    Condition,
    Addition,
    General,
}

/// Payload carried on a hierarchy edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub parent_id: ProvisionId,
    pub child_id: ProvisionId,
    pub position: u32,
    pub relation_embedding: Option<Vec<f32>>,
    pub semantic_type: Option<SemanticType>,
    pub keywords: Vec<String>,
}

/// The kind of edge returned by `get_neighbors` (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Parent,
    Sibling,
    Child,
    CrossDocument,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Sibling => "sibling",
            Self::Child => "child",
            Self::CrossDocument => "cross_document",
        }
    }
}

/// One neighbor returned by `GraphStore::get_neighbors` (§4.1), carrying
/// enough payload that C5 can compute an edge cost without a second
/// round-trip for the common case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: ProvisionId,
    pub kind: EdgeKind,
    pub relation_embedding: Option<Vec<f32>>,
    pub semantic_type: Option<SemanticType>,
    /// Populated lazily by the expander via a batched `batch_get_provisions`
    /// call when `relation_embedding` is absent and the sibling-edge cost
    /// must fall back to node-embedding cosine (§4.5).
    pub node_embedding: Option<Vec<f32>>,
}
