//! Reciprocal rank fusion (§4.4 "Fusion"): each channel contributes a
//! ranked list; items accumulate `1 / (RRF_K + rank)` across channels, with
//! an additive bonus for exact-match hits so they dominate ties.

use std::collections::HashMap;

use retrieval_types::provision::ProvisionId;

/// One channel's ranked output: `(provision_id, similarity)`, already
/// sorted best-first. `rank` is derived from position, not passed in.
pub type ChannelRanking = Vec<(ProvisionId, f32)>;

pub struct FusedItem {
    pub provision_id: ProvisionId,
    pub rrf_score: f32,
    pub best_similarity: f32,
    pub stages: Vec<String>,
}

const EXACT_MATCH_BONUS: f32 = 1000.0;

/// Fuses named channels and truncates to `limit`. `exact_match_stage`, if
/// present among `channels`, receives `EXACT_MATCH_BONUS` added to its RRF
/// contribution per §4.4 ("exact match does not participate in S" and "is
/// also injected with an additive bonus so exact hits dominate ties").
pub fn fuse(channels: &[(&str, ChannelRanking)], rrf_k: f32, limit: usize) -> Vec<FusedItem> {
    let mut scores: HashMap<ProvisionId, f32> = HashMap::new();
    let mut best_sim: HashMap<ProvisionId, f32> = HashMap::new();
    let mut stages: HashMap<ProvisionId, Vec<String>> = HashMap::new();

    for (name, ranking) in channels {
        for (rank, (id, sim)) in ranking.iter().enumerate() {
            let mut contribution = 1.0 / (rrf_k + rank as f32 + 1.0);
            if *name == "exact_match" {
                contribution += EXACT_MATCH_BONUS;
            }
            *scores.entry(id.clone()).or_insert(0.0) += contribution;
            let entry = best_sim.entry(id.clone()).or_insert(*sim);
            if *sim > *entry {
                *entry = *sim;
            }
            stages.entry(id.clone()).or_default().push(name.to_string());
        }
    }

    let mut fused: Vec<FusedItem> = scores
        .into_iter()
        .map(|(id, score)| FusedItem {
            best_similarity: *best_sim.get(&id).unwrap_or(&0.0),
            stages: stages.remove(&id).unwrap_or_default(),
            provision_id: id,
            rrf_score: score,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap()
            .then_with(|| a.provision_id.cmp(&b.provision_id))
    });
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_dominates_ties() {
        let channels = vec![
            ("node_embedding", vec![("a".to_string(), 0.9), ("b".to_string(), 0.85)]),
            ("exact_match", vec![("b".to_string(), 1.0)]),
        ];
        let fused = fuse(&channels, 60.0, 10);
        assert_eq!(fused[0].provision_id, "b");
    }

    #[test]
    fn items_carry_every_stage_they_appeared_in() {
        let channels = vec![
            ("node_embedding", vec![("a".to_string(), 0.9)]),
            ("relation_embedding", vec![("a".to_string(), 0.8)]),
        ];
        let fused = fuse(&channels, 60.0, 10);
        assert_eq!(fused[0].stages.len(), 2);
        assert!(fused[0].stages.contains(&"node_embedding".to_string()));
        assert!(fused[0].stages.contains(&"relation_embedding".to_string()));
    }

    #[test]
    fn fusion_truncates_to_limit() {
        let channels = vec![(
            "node_embedding",
            (0..20).map(|i| (format!("p{i}"), 0.5)).collect(),
        )];
        let fused = fuse(&channels, 60.0, 5);
        assert_eq!(fused.len(), 5);
    }
}
