//! `name_domain_via_llm` (§4.3): picks the provisions nearest a centroid,
//! asks the LLM for a short label with a strict length bound, and falls
//! back to a synthesized generic label if the LLM is unavailable or
//! returns something unusable.

use embedding_gateway::EmbeddingGateway;
use graph_store::GraphStore;
use retrieval_types::provision::ProvisionId;
use serde::Deserialize;
use serde_json::json;

const MAX_LABEL_LEN: usize = 60;

#[derive(Debug, Deserialize)]
struct LabelResponse {
    label: String,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Selects up to `sample_size` provisions nearest `centroid` and asks the
/// LLM for a short human-readable label.
pub async fn name_domain<G: GraphStore, E: EmbeddingGateway>(
    gateway: &E,
    store: &G,
    members: &[ProvisionId],
    centroid: &[f32],
    sample_size: usize,
) -> anyhow::Result<String> {
    let provisions = store.batch_get_provisions(members).await?;
    let mut scored: Vec<_> = provisions
        .into_iter()
        .filter_map(|p| p.node_embedding.as_ref().map(|e| (cosine(e, centroid), p)))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    scored.truncate(sample_size);

    let samples: Vec<_> = scored
        .iter()
        .map(|(_, p)| {
            json!({
                "identifier": p.id,
                "content_snippet": p.content.chars().take(160).collect::<String>(),
            })
        })
        .collect();

    let prompt = format!(
        "These legal provisions belong to the same topical cluster. Propose a short, \
         human-readable label (max {MAX_LABEL_LEN} characters) describing the shared topic.\n\n\
         Provisions:\n{}",
        serde_json::to_string_pretty(&samples)?
    );

    let schema = json!({
        "type": "object",
        "properties": {
            "label": {"type": "string", "maxLength": MAX_LABEL_LEN}
        },
        "required": ["label"]
    });

    let response = gateway.llm_structured(&prompt, &schema).await?;
    let parsed: LabelResponse = serde_json::from_value(response.parsed)?;
    let label = parsed.label.trim().to_string();
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        anyhow::bail!("LLM returned an unusable label: {label:?}");
    }
    Ok(label)
}

/// A synthesized generic label, used when LLM labeling fails (§4.3).
pub fn fallback_label(domain_id: &str, cardinality: usize) -> String {
    format!("Unlabeled cluster {domain_id} ({cardinality} provisions)")
}
