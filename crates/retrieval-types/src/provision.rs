//! Corpus graph node types (§3.1 of SPEC_FULL.md).

use serde::{Deserialize, Serialize};

/// Stable external key: `document_title` + path of section labels including
/// the provision's own label, e.g. `"Planning Statute/Art. 17(2)"`.
pub type ProvisionId = String;

/// A top-level legal instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentClass {
    Statute,
    Decree,
    Rule,
}

/// A Document node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub class: DocumentClass,
}

/// An inner hierarchical grouping of provisions (chapter, section, article
/// head). No textual content beyond a heading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionContainer {
    pub id: String,
    pub label: String,
    pub position: u32,
    pub node_embedding: Option<Vec<f32>>,
}

/// The leaf unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provision {
    pub id: ProvisionId,
    pub content: String,
    pub node_embedding: Option<Vec<f32>>,
    pub secondary_embedding: Option<Vec<f32>>,

    /// Denormalized display fields (§3.1). Absence is never fatal; callers
    /// default to `""`.
    #[serde(default)]
    pub document_title: String,
    #[serde(default)]
    pub provision_path: String,
    #[serde(default)]
    pub provision_number: String,
}

impl Provision {
    /// Display fields default to empty strings rather than `Option` so that
    /// result enrichment (§4.6.4) never has to special-case a missing field.
    pub fn display_document_title(&self) -> &str {
        &self.document_title
    }
}

/// Finer-grained children of a provision (items, sub-items). Same attribute
/// shape as `Provision`, used as retrieval context only — never a direct
/// retrieval target.
pub type SubProvision = Provision;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_fields_default_to_empty() {
        let p = Provision {
            id: "S/Art.1".into(),
            content: "General".into(),
            node_embedding: None,
            secondary_embedding: None,
            document_title: String::new(),
            provision_path: String::new(),
            provision_number: String::new(),
        };
        assert_eq!(p.display_document_title(), "");
    }
}
