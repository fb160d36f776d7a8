//! Response shapes for `/search` and `/search/stream` (§6.1).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::provision::ProvisionId;

/// One fused, enriched result (§4.4 fusion, §4.5 expansion merge, §4.6.4
/// enrichment, §4.6.3 A2A merge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedProvision {
    pub provision_id: ProvisionId,
    pub content: String,
    pub document_title: String,
    pub provision_path: String,
    pub provision_number: String,
    pub similarity: f32,
    /// Channels/expansion stages this result appeared in, e.g.
    /// `["exact_match", "expansion.sibling"]`.
    pub stages: BTreeSet<String>,
    pub source_domain: String,
    pub via_a2a: bool,
}

impl RetrievedProvision {
    /// Dedupe-merge per §4.6.3 step 4 / §9 "Result merging semantics":
    /// higher similarity wins, stage tags union, `via_a2a` becomes true if
    /// either contributor came from a peer. Commutative and associative.
    pub fn merge(mut self, other: Self) -> Self {
        debug_assert_eq!(self.provision_id, other.provision_id);
        if other.similarity > self.similarity {
            self.similarity = other.similarity;
        }
        self.stages.extend(other.stages);
        self.via_a2a = self.via_a2a || other.via_a2a;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchStats {
    pub domains_queried: u32,
    pub a2a_triggered: bool,
    pub llm_calls: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub summary: String,
    pub detailed_answer: String,
    pub cited_identifiers: Vec<ProvisionId>,
    pub confidence: f32,
    /// `true` when the LLM call failed and this is the conventional
    /// fallback answer (§4.6.5).
    pub fallback: bool,
}

impl SynthesizedAnswer {
    pub fn fallback(results: &[RetrievedProvision]) -> Self {
        Self {
            summary: "here are the top results".to_string(),
            detailed_answer: format!(
                "Synthesis was unavailable; returning {} matching provision(s) ranked by similarity.",
                results.len()
            ),
            cited_identifiers: results.iter().map(|r| r.provision_id.clone()).collect(),
            confidence: 0.0,
            fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub synthesize: bool,
    pub timeout_ms: Option<u64>,
}

fn default_limit() -> u32 {
    10
}

pub const MAX_LIMIT: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<RetrievedProvision>,
    pub stats: SearchStats,
    pub primary_domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesized_answer: Option<SynthesizedAnswer>,
}
