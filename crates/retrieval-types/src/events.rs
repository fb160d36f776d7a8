//! Incremental progress events (§4.6.6, §6.3). Serialized as SSE frames by
//! `retrieval-web`; also returned verbatim (as the final `complete`/`error`
//! frame's payload) from the synchronous `/search` endpoint.

use serde::{Deserialize, Serialize};

use crate::result::{RetrievedProvision, SearchStats, SynthesizedAnswer};

/// `stage` values recognized in `searching` events (§6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStage {
    ExactMatch,
    NodeEmbedding,
    RelationEmbedding,
    Expansion,
    Enrichment,
}

impl SearchStage {
    /// Monotonic progress value associated with this stage reaching
    /// completion, per the sequence fixed in §4.6.6.
    pub fn progress(&self) -> f32 {
        match self {
            Self::ExactMatch => 0.2,
            Self::NodeEmbedding => 0.4,
            Self::RelationEmbedding => 0.6,
            Self::Expansion => 0.8,
            Self::Enrichment => 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        primary_domain: String,
        peers: Vec<String>,
        timestamp: i64,
    },
    Searching {
        stage: SearchStage,
        progress: f32,
    },
    A2aStarted {
        targets: Vec<String>,
    },
    A2aPeerCompleted {
        target: String,
        result_count: usize,
    },
    Synthesizing,
    Complete {
        results: Vec<RetrievedProvision>,
        stats: SearchStats,
        primary_domain: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        synthesized_answer: Option<SynthesizedAnswer>,
    },
    Error {
        kind: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        partial_results: Option<Vec<RetrievedProvision>>,
    },
}

impl ProgressEvent {
    /// `true` for the two terminal variants; a query's event sequence
    /// fires exactly one of these, always last (§4.6.6, invariant tested
    /// in `orchestrator`'s property tests).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// `None` for non-`searching` events — progress monotonicity is only
    /// asserted across `Searching` frames (§8.1).
    pub fn progress_value(&self) -> Option<f32> {
        match self {
            Self::Searching { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_progress_is_monotonic_in_declared_order() {
        let stages = [
            SearchStage::ExactMatch,
            SearchStage::NodeEmbedding,
            SearchStage::RelationEmbedding,
            SearchStage::Expansion,
            SearchStage::Enrichment,
        ];
        let progresses: Vec<f32> = stages.iter().map(|s| s.progress()).collect();
        for window in progresses.windows(2) {
            assert!(window[1] > window[0]);
        }
    }

    #[test]
    fn only_terminal_variants_report_terminal() {
        assert!(!ProgressEvent::Synthesizing.is_terminal());
        assert!(ProgressEvent::Error {
            kind: "Deadline".into(),
            message: "timed out".into(),
            partial_results: None,
        }
        .is_terminal());
    }
}
