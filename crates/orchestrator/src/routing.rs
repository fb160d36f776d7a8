//! Query routing (§4.6.1): a centroid pre-filter followed by an LLM
//! self-assessment pass per candidate domain, combined into one ranking.

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use embedding_gateway::EmbeddingGateway;
use retrieval_types::domain::{DomainId, DomainInfo};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Clone)]
pub struct RouteCandidate {
    pub domain_id: DomainId,
    pub centroid_similarity: f32,
    pub combined: f32,
}

#[derive(Debug, Deserialize)]
struct SelfAssessment {
    #[allow(dead_code)]
    can_answer: bool,
    confidence: f32,
    #[allow(dead_code)]
    reasoning: String,
}

/// Ranks `domains` by centroid similarity to the query, keeps the top
/// `route_candidates`, then asks the LLM to self-assess each one and folds
/// that into `combined = llm_weight * confidence + (1 - llm_weight) *
/// centroid_similarity` (§4.6.1). Degrades a candidate to its centroid-only
/// score if the LLM call or its response fails — routing never fails the
/// request outright, since the centroid ranking alone is always usable.
pub async fn route<E: EmbeddingGateway>(
    gateway: &E,
    query: &str,
    node_query_vec: &[f32],
    domains: &[DomainInfo],
    route_candidates: usize,
    llm_weight: f32,
) -> (Vec<RouteCandidate>, u32) {
    let mut ranked: Vec<(DomainInfo, f32)> = domains
        .iter()
        .map(|d| (d.clone(), cosine(node_query_vec, &d.centroid)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.id.cmp(&b.0.id)));
    ranked.truncate(route_candidates);

    let schema = json!({
        "type": "object",
        "properties": {
            "can_answer": {"type": "boolean"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
            "reasoning": {"type": "string"}
        },
        "required": ["can_answer", "confidence", "reasoning"]
    });

    let mut llm_calls = 0u32;
    let mut candidates = Vec::with_capacity(ranked.len());
    for (domain, centroid_sim) in ranked {
        let prompt = format!(
            "A user asked: \"{query}\"\n\nDomain \"{}\" groups legal provisions on a shared \
             topic. Could this domain plausibly contain the answer? Respond with your confidence \
             in [0,1] and a short reason.",
            domain.label
        );
        llm_calls += 1;
        let combined = match gateway.llm_structured(&prompt, &schema).await {
            Ok(response) => match serde_json::from_value::<SelfAssessment>(response.parsed) {
                Ok(assessment) => llm_weight * assessment.confidence + (1.0 - llm_weight) * centroid_sim,
                Err(e) => {
                    warn!(domain = %domain.id, error = %e, "routing response did not match schema, degrading to centroid score");
                    centroid_sim
                }
            },
            Err(e) => {
                warn!(domain = %domain.id, error = %e, "routing LLM call failed, degrading to centroid score");
                centroid_sim
            }
        };
        candidates.push(RouteCandidate {
            domain_id: domain.id,
            centroid_similarity: centroid_sim,
            combined,
        });
    }

    candidates.sort_by(|a, b| b.combined.partial_cmp(&a.combined).unwrap().then_with(|| a.domain_id.cmp(&b.domain_id)));
    (candidates, llm_calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding_gateway::mock::MockEmbeddingGateway;
    use retrieval_types::domain::DomainInfo;

    fn domain(id: &str, x: f32, y: f32) -> DomainInfo {
        DomainInfo::new(id, format!("{id}-label"), vec![x, y])
    }

    #[tokio::test]
    async fn degrades_to_centroid_score_when_llm_unavailable() {
        let gateway = MockEmbeddingGateway::new();
        let switch = gateway.llm_failure_switch();
        switch.store(true, std::sync::atomic::Ordering::SeqCst);

        let domains = vec![domain("a", 1.0, 0.0), domain("b", 0.0, 1.0)];
        let (candidates, _) = route(&gateway, "query", &[1.0, 0.0], &domains, 5, 0.7).await;

        assert_eq!(candidates[0].domain_id, "a");
        assert_eq!(candidates[0].combined, candidates[0].centroid_similarity);
    }

    #[tokio::test]
    async fn truncates_to_route_candidates() {
        let gateway = MockEmbeddingGateway::new();
        let domains = vec![domain("a", 1.0, 0.0), domain("b", 0.9, 0.1), domain("c", 0.0, 1.0)];
        let (candidates, _) = route(&gateway, "query", &[1.0, 0.0], &domains, 2, 0.5).await;
        assert_eq!(candidates.len(), 2);
    }
}
