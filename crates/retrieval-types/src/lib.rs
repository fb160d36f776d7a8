//! Shared types for the multi-domain legal provision retrieval engine.
//!
//! Every component (C1–C6) speaks these types instead of its own ad-hoc
//! structs.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod graph;
pub mod provision;
pub mod result;

pub use config::EngineConfig;
pub use domain::{DomainId, DomainInfo};
pub use error::{EngineError, EngineResult};
pub use events::ProgressEvent;
pub use graph::{EdgeKind, HierarchyEdge, Neighbor, SemanticType};
pub use provision::{DocumentClass, Provision, ProvisionId};
pub use result::{RetrievedProvision, SearchStats, SynthesizedAnswer};
