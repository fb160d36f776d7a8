//! Result quality scoring (§4.6.2): decides whether the primary domain's
//! results are good enough to skip A2A collaboration.

use std::collections::HashMap;

use hybrid_retriever::RetrievalHit;
use retrieval_types::config::EngineConfig;
use retrieval_types::provision::ProvisionId;
use retrieval_types::result::RetrievedProvision;

/// `w1 * mean(top_K similarities) + w2 * min(1, |results| / K) + w3 * (1 if
/// an exact-match hit is present else 0)`, where `K = max(1,
/// config.min_results)` (§4.6.2).
pub fn score(hits: &[RetrievalHit], config: &EngineConfig) -> f32 {
    let k = config.min_results.max(1);
    let top_k = &hits[..hits.len().min(k)];
    let mean_similarity = if top_k.is_empty() {
        0.0
    } else {
        top_k.iter().map(|h| h.similarity).sum::<f32>() / top_k.len() as f32
    };
    let coverage = (hits.len() as f32 / k as f32).min(1.0);
    let has_exact_hit = hits.iter().any(|h| h.stages.iter().any(|s| s == "exact_match"));

    config.quality_weight_similarity * mean_similarity
        + config.quality_weight_count * coverage
        + config.quality_weight_exact * if has_exact_hit { 1.0 } else { 0.0 }
}

/// Same formula as [`score`], applied to the already-enriched primary
/// result set the orchestrator holds mid-pipeline (§4.6.2).
pub fn score_from_merged(merged: &HashMap<ProvisionId, RetrievedProvision>, config: &EngineConfig) -> f32 {
    let k = config.min_results.max(1);
    let mut similarities: Vec<f32> = merged.values().map(|p| p.similarity).collect();
    similarities.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let top_k = &similarities[..similarities.len().min(k)];
    let mean_similarity = if top_k.is_empty() { 0.0 } else { top_k.iter().sum::<f32>() / top_k.len() as f32 };
    let coverage = (merged.len() as f32 / k as f32).min(1.0);
    let has_exact_hit = merged.values().any(|p| p.stages.contains("exact_match"));

    config.quality_weight_similarity * mean_similarity
        + config.quality_weight_count * coverage
        + config.quality_weight_exact * if has_exact_hit { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, similarity: f32, stages: &[&str]) -> RetrievalHit {
        RetrievalHit {
            provision_id: id.to_string(),
            similarity,
            stages: stages.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn exact_match_and_full_coverage_score_near_one() {
        let mut cfg = EngineConfig::default();
        cfg.min_results = 2;
        let hits = vec![hit("a", 0.95, &["exact_match"]), hit("b", 0.9, &["node_embedding"])];
        let s = score(&hits, &cfg);
        assert!(s > 0.9, "expected a high score, got {s}");
    }

    #[test]
    fn empty_results_score_to_zero() {
        let cfg = EngineConfig::default();
        assert_eq!(score(&[], &cfg), 0.0);
    }

    #[test]
    fn sparse_low_similarity_results_score_low() {
        let mut cfg = EngineConfig::default();
        cfg.min_results = 5;
        let hits = vec![hit("a", 0.2, &["node_embedding"])];
        let s = score(&hits, &cfg);
        assert!(s < 0.3, "expected a low score, got {s}");
    }
}
