// fraudsig/src/config.rs
//
// Engine configuration + validated risk weights.
//
// EngineConfig carries tunables with sane defaults and may be loaded from a
// JSON file (every field optional). RiskWeights has no defaults at all: every
// key is required and validated once at construction, because a silently
// zeroed weight would turn a misconfiguration into a zero-risk account.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SignatureError};

// ── Engine configuration ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_ttl_secs:        i64,   // signature TTL (5 minutes)
    pub cache_capacity:        usize, // oldest entries evicted past this
    pub refresh_interval_secs: u64,   // batched SCC/community/centrality refresh
    pub velocity_half_rate:    f64,   // tx/hour at which velocity_score = 0.5
    pub louvain_max_passes:    u32,
    pub louvain_min_gain:      f64,
    pub pagerank_damping:      f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs:        300,
            cache_capacity:        100_000,
            refresh_interval_secs: 60,
            velocity_half_rate:    5.0,
            louvain_max_passes:    20,
            louvain_min_gain:      1e-7,
            pagerank_damping:      0.85,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: EngineConfig = serde_json::from_str(&raw)?;
        cfg.validate()?;
        info!("Loaded engine config from {}", path.display());
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs <= 0 {
            return Err(SignatureError::Configuration("cache_ttl_secs must be > 0".into()));
        }
        if self.cache_capacity == 0 {
            return Err(SignatureError::Configuration("cache_capacity must be > 0".into()));
        }
        if !(self.velocity_half_rate.is_finite() && self.velocity_half_rate > 0.0) {
            return Err(SignatureError::Configuration(
                "velocity_half_rate must be a positive number".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.pagerank_damping) {
            return Err(SignatureError::Configuration(
                "pagerank_damping must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

// ── Risk weights ──────────────────────────────────────────────────────────────

pub const CENTRALITY_WEIGHT: &str = "centrality_weight";
pub const CYCLE_WEIGHT:      &str = "cycle_weight";
pub const COMMUNITY_WEIGHT:  &str = "community_weight";

/// Weights applied by the RiskEngine. Only constructible through validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<String, f64>")]
pub struct RiskWeights {
    centrality_weight: f64,
    cycle_weight:      f64,
    community_weight:  f64,
}

impl RiskWeights {
    pub fn new(centrality_weight: f64, cycle_weight: f64, community_weight: f64) -> Result<Self> {
        for (name, w) in [
            (CENTRALITY_WEIGHT, centrality_weight),
            (CYCLE_WEIGHT, cycle_weight),
            (COMMUNITY_WEIGHT, community_weight),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(SignatureError::Configuration(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, w
                )));
            }
        }
        Ok(Self { centrality_weight, cycle_weight, community_weight })
    }

    pub fn centrality_weight(&self) -> f64 { self.centrality_weight }
    pub fn cycle_weight(&self) -> f64 { self.cycle_weight }
    pub fn community_weight(&self) -> f64 { self.community_weight }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let map: HashMap<String, f64> = serde_json::from_str(&raw)?;
        let weights = Self::try_from(map)?;
        info!(
            "Loaded risk weights from {}: centrality={} cycle={} community={}",
            path.display(), weights.centrality_weight, weights.cycle_weight, weights.community_weight
        );
        Ok(weights)
    }
}

impl TryFrom<HashMap<String, f64>> for RiskWeights {
    type Error = SignatureError;

    fn try_from(map: HashMap<String, f64>) -> Result<Self> {
        let required = |key: &str| {
            map.get(key).copied().ok_or_else(|| {
                SignatureError::Configuration(format!("missing required weight `{}`", key))
            })
        };
        Self::new(
            required(CENTRALITY_WEIGHT)?,
            required(CYCLE_WEIGHT)?,
            required(COMMUNITY_WEIGHT)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_weights_from_complete_map() {
        let w = RiskWeights::try_from(map(&[
            ("centrality_weight", 0.2),
            ("cycle_weight", 0.5),
            ("community_weight", 0.3),
        ]))
        .unwrap();
        assert_eq!(w.centrality_weight(), 0.2);
        assert_eq!(w.cycle_weight(), 0.5);
        assert_eq!(w.community_weight(), 0.3);
    }

    #[test]
    fn test_missing_weight_is_configuration_error() {
        let err = RiskWeights::try_from(map(&[
            ("centrality_weight", 0.2),
            ("cycle_weight", 0.5),
        ]))
        .unwrap_err();
        match err {
            SignatureError::Configuration(msg) => assert!(msg.contains("community_weight")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_or_nan_weight_rejected() {
        assert!(RiskWeights::new(-0.1, 0.5, 0.3).is_err());
        assert!(RiskWeights::new(0.1, f64::NAN, 0.3).is_err());
    }

    #[test]
    fn test_weights_deserialize_validates() {
        let ok: RiskWeights = serde_json::from_str(
            r#"{"centrality_weight":0.2,"cycle_weight":0.5,"community_weight":0.3}"#,
        )
        .unwrap();
        assert_eq!(ok.cycle_weight(), 0.5);

        let missing = serde_json::from_str::<RiskWeights>(
            r#"{"centrality_weight":0.2,"cycle_weight":0.5}"#,
        );
        assert!(missing.is_err());
    }

    #[test]
    fn test_engine_config_partial_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"cache_ttl_secs": 60}"#).unwrap();
        assert_eq!(cfg.cache_ttl_secs, 60);
        assert_eq!(cfg.cache_capacity, 100_000);
        assert!(cfg.validate().is_ok());

        let bad = EngineConfig { velocity_half_rate: 0.0, ..EngineConfig::default() };
        assert!(matches!(bad.validate(), Err(SignatureError::Configuration(_))));
    }
}
