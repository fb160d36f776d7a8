//! Agent-to-agent collaboration (§4.6.3). An LLM decides whether peer
//! domains should be consulted after a weak primary search; fan-out is
//! capped at `max_peers` and peer searches never themselves trigger a
//! further round (bounded depth: depth 0 can delegate, depth 1 cannot).

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use embedding_gateway::EmbeddingGateway;
use retrieval_types::domain::DomainId;

#[derive(Debug, Clone, Deserialize)]
pub struct A2aTarget {
    pub domain_label: String,
    pub refined_query: String,
    #[allow(dead_code)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct A2aDecision {
    should_collaborate: bool,
    #[serde(default)]
    targets: Vec<A2aTarget>,
}

/// Returns up to `max_peers` targets the LLM proposed, filtered to the
/// candidate peer labels actually on offer. Any LLM failure, or a decision
/// not to collaborate, yields an empty list rather than an error — A2A is
/// strictly additive (§4.6.3).
pub async fn decide<E: EmbeddingGateway>(
    gateway: &E,
    query: &str,
    primary_label: &str,
    peer_labels: &[(DomainId, String)],
    max_peers: usize,
) -> (Vec<A2aTarget>, u32) {
    if peer_labels.is_empty() {
        return (Vec::new(), 0);
    }

    let schema = json!({
        "type": "object",
        "properties": {
            "should_collaborate": {"type": "boolean"},
            "targets": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "domain_label": {"type": "string"},
                        "refined_query": {"type": "string"},
                        "reason": {"type": "string"}
                    },
                    "required": ["domain_label", "refined_query", "reason"]
                }
            }
        },
        "required": ["should_collaborate", "targets"]
    });

    let candidate_labels: Vec<&str> = peer_labels.iter().map(|(_, label)| label.as_str()).collect();
    let prompt = format!(
        "A user asked: \"{query}\"\n\nThe primary domain \"{primary_label}\" did not return a \
         confident answer. Other available domains: {candidate_labels:?}. Should any of them be \
         consulted too? If so, name up to {max_peers} of them with a refined query for each."
    );

    match gateway.llm_structured(&prompt, &schema).await {
        Ok(response) => match serde_json::from_value::<A2aDecision>(response.parsed) {
            Ok(decision) if decision.should_collaborate => {
                let mut targets = decision.targets;
                targets.retain(|t| candidate_labels.contains(&t.domain_label.as_str()));
                targets.truncate(max_peers);
                (targets, 1)
            }
            Ok(_) => (Vec::new(), 1),
            Err(e) => {
                warn!(error = %e, "A2A decision response did not match schema, skipping collaboration");
                (Vec::new(), 1)
            }
        },
        Err(e) => {
            warn!(error = %e, "A2A decision LLM call failed, skipping collaboration");
            (Vec::new(), 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding_gateway::mock::MockEmbeddingGateway;

    #[tokio::test]
    async fn empty_peer_list_short_circuits_without_an_llm_call() {
        let gateway = MockEmbeddingGateway::new();
        let (targets, calls) = decide(&gateway, "q", "Planning", &[], 2).await;
        assert!(targets.is_empty());
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_no_collaboration() {
        let gateway = MockEmbeddingGateway::new();
        gateway.llm_failure_switch().store(true, std::sync::atomic::Ordering::SeqCst);
        let peers = vec![("d2".to_string(), "Taxation".to_string())];
        let (targets, _) = decide(&gateway, "q", "Planning", &peers, 2).await;
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn targets_not_among_the_offered_candidates_are_dropped() {
        let gateway = MockEmbeddingGateway::new();
        gateway.set_llm_response(serde_json::json!({
            "should_collaborate": true,
            "targets": [
                {"domain_label": "Taxation", "refined_query": "q2", "reason": "r"},
                {"domain_label": "Nonexistent", "refined_query": "q3", "reason": "r"}
            ]
        }));
        let peers = vec![("d2".to_string(), "Taxation".to_string())];
        let (targets, _) = decide(&gateway, "q", "Planning", &peers, 2).await;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].domain_label, "Taxation");
    }
}
