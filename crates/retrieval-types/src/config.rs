//! Tunables (§6.4). Loaded from an optional YAML file and overlaid with
//! environment variables via `std::env::var(...).unwrap_or_else(...)`
//! calls.

use serde::{Deserialize, Serialize};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_domains: usize,
    pub max_domains: usize,
    pub min_domain_size: usize,
    pub max_domain_size: usize,
    pub bootstrap_min_provisions: usize,
    pub kmeans_init_runs: usize,
    pub kmeans_k_min: usize,
    pub kmeans_k_max: usize,
    pub label_sample_size: usize,

    pub similarity_join_threshold: f32,
    pub similarity_threshold: f32,
    pub node_sim_floor: f32,
    pub rrf_k: f32,
    pub expansion_factor: usize,
    pub max_expanded: usize,
    pub rae_seeds: usize,
    pub excluded_section_tokens: Vec<String>,

    pub route_candidates: usize,
    pub peer_candidates: usize,
    pub max_peers: usize,
    pub llm_weight: f32,
    pub quality_floor: f32,
    pub min_results: usize,
    pub synth_topn: usize,
    pub quality_weight_similarity: f32,
    pub quality_weight_count: f32,
    pub quality_weight_exact: f32,

    pub retry_max: u32,
    pub llm_timeout_ms: u64,
    pub request_deadline_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_domains: 2,
            max_domains: 64,
            min_domain_size: 50,
            max_domain_size: 500,
            bootstrap_min_provisions: 100,
            kmeans_init_runs: 8,
            kmeans_k_min: 2,
            kmeans_k_max: 20,
            label_sample_size: 8,

            similarity_join_threshold: 0.70,
            similarity_threshold: 0.75,
            node_sim_floor: 0.50,
            rrf_k: 60.0,
            expansion_factor: 3,
            max_expanded: 200,
            rae_seeds: 5,
            excluded_section_tokens: vec![
                "transitional".to_string(),
                "supplementary".to_string(),
            ],

            route_candidates: 5,
            peer_candidates: 4,
            max_peers: 2,
            llm_weight: 0.7,
            quality_floor: 0.60,
            min_results: 3,
            synth_topn: 10,
            quality_weight_similarity: 0.5,
            quality_weight_count: 0.3,
            quality_weight_exact: 0.2,

            retry_max: 3,
            llm_timeout_ms: 5_000,
            request_deadline_ms: 30_000,
        }
    }
}

impl EngineConfig {
    /// Load from an optional YAML file, then overlay process environment
    /// variables for the subset of fields that are commonly tuned per
    /// deployment (§6.4 names every option as "environment or config
    /// file").
    pub fn from_file_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_string(),
                    source,
                })?;
                serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_string(),
                    source,
                })?
            }
            None => Self::default(),
        };
        cfg.overlay_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay a handful of commonly-tuned options from the process
    /// environment via `std::env::var(key).unwrap_or_else(|_| default)`.
    /// Malformed values are ignored in favor of the file/default value
    /// rather than panicking at startup.
    fn overlay_env(&mut self) {
        macro_rules! overlay {
            ($field:ident, $key:literal) => {
                if let Ok(raw) = std::env::var($key) {
                    if let Ok(parsed) = raw.parse() {
                        self.$field = parsed;
                    }
                }
            };
        }
        overlay!(min_domain_size, "MIN_DOMAIN_SIZE");
        overlay!(max_domain_size, "MAX_DOMAIN_SIZE");
        overlay!(similarity_join_threshold, "SIMILARITY_JOIN_THRESHOLD");
        overlay!(similarity_threshold, "SIMILARITY_THRESHOLD");
        overlay!(node_sim_floor, "NODE_SIM_FLOOR");
        overlay!(rrf_k, "RRF_K");
        overlay!(route_candidates, "ROUTE_CANDIDATES");
        overlay!(peer_candidates, "PEER_CANDIDATES");
        overlay!(max_peers, "MAX_PEERS");
        overlay!(llm_weight, "LLM_WEIGHT");
        overlay!(quality_floor, "QUALITY_FLOOR");
        overlay!(synth_topn, "SYNTH_TOPN");
        overlay!(retry_max, "RETRY_MAX");
        if let Ok(raw) = std::env::var("EXCLUDED_SECTION_TOKENS") {
            self.excluded_section_tokens = raw.split(',').map(|s| s.trim().to_string()).collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_domains > self.max_domains {
            return Err(ConfigError::Invalid(
                "min_domains must be <= max_domains".into(),
            ));
        }
        if self.min_domain_size >= self.max_domain_size {
            return Err(ConfigError::Invalid(
                "min_domain_size must be < max_domain_size".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.llm_weight) {
            return Err(ConfigError::Invalid("llm_weight must be in [0,1]".into()));
        }
        let w_sum =
            self.quality_weight_similarity + self.quality_weight_count + self.quality_weight_exact;
        if (w_sum - 1.0).abs() > 1e-3 {
            return Err(ConfigError::Invalid(format!(
                "quality weights must sum to 1.0, got {w_sum}"
            )));
        }
        if self.kmeans_k_min > self.kmeans_k_max {
            return Err(ConfigError::Invalid(
                "kmeans_k_min must be <= kmeans_k_max".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_domain_size_bounds() {
        let mut cfg = EngineConfig::default();
        cfg.min_domain_size = cfg.max_domain_size;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_quality_weights_not_summing_to_one() {
        let mut cfg = EngineConfig::default();
        cfg.quality_weight_similarity = 0.9;
        assert!(cfg.validate().is_err());
    }
}
