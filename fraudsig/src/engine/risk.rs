// fraudsig/src/engine/risk.rs
//
// Weighted network risk for downstream consumers.
//
//   network_risk = centrality · centrality_weight
//                + cycle_risk · cycle_weight
//                + community  · community_weight
//
// Weights arrive pre-validated (RiskWeights cannot exist with a missing key).
// Unlike signature generation this path does not degrade: a weighted score
// silently reading 0.0 would look like a clean account.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::analytics::community::HIGH_DENSITY;
use crate::config::RiskWeights;
use crate::engine::composer::{
    cycle_factor, SignatureComposer, FACTOR_HIGH_DENSITY, MAX_FACTORS, TAG_CIRCULAR_FLOW,
    TAG_NETWORK_CLUSTER, TAG_UNKNOWN,
};
use crate::error::Result;
use crate::events::{NodeMetrics, RiskOutput, RiskVector};

pub const NETWORK_RISK: &str = "network_risk";
pub const TAG_NETWORK_HUB: &str = "Network Hub";
pub const HIGH_CENTRALITY: f64 = 0.8;

pub fn centrality_factor(score: f64) -> String {
    format!("High network centrality: {:.2}", score)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RiskSubscores {
    pub centrality: f64,
    pub cycle:      f64,
    pub community:  f64,
}

impl RiskSubscores {
    pub fn from_metrics(metrics: &NodeMetrics, centrality: f64) -> Self {
        Self {
            centrality,
            cycle:     metrics.cycles.cycle_risk,
            community: metrics.community.risk_score,
        }
    }

    /// Weighted components in tie-break order: cycle, community, centrality.
    pub fn weighted(&self, w: &RiskWeights) -> [(&'static str, f64); 3] {
        [
            (TAG_CIRCULAR_FLOW,   self.cycle * w.cycle_weight()),
            (TAG_NETWORK_CLUSTER, self.community * w.community_weight()),
            (TAG_NETWORK_HUB,     self.centrality * w.centrality_weight()),
        ]
    }

    pub fn network_risk(&self, w: &RiskWeights) -> f64 {
        self.weighted(w).iter().map(|(_, v)| v).sum()
    }
}

pub fn derive_output(
    metrics: &NodeMetrics,
    centrality: f64,
    weights: &RiskWeights,
    now: DateTime<Utc>,
) -> RiskOutput {
    let sub = RiskSubscores::from_metrics(metrics, centrality);
    let components = sub.weighted(weights);

    let mut best: Option<(&str, f64)> = None;
    for (tag, v) in components {
        if v > 0.0 && best.map_or(true, |(_, b)| v > b) {
            best = Some((tag, v));
        }
    }

    let mut factors = Vec::new();
    if metrics.cycles.is_in_cycle {
        factors.push(cycle_factor(metrics.cycles.cycle_length));
    }
    if metrics.community.density > HIGH_DENSITY {
        factors.push(FACTOR_HIGH_DENSITY.to_string());
    }
    if centrality > HIGH_CENTRALITY {
        factors.push(centrality_factor(centrality));
    }
    factors.truncate(MAX_FACTORS);

    let mut risk_vector = RiskVector::new();
    risk_vector.insert(NETWORK_RISK, sub.network_risk(weights));

    RiskOutput {
        fraud_tag:            best.map_or(TAG_UNKNOWN, |(tag, _)| tag).to_string(),
        risk_vector,
        contributing_factors: factors,
        timestamp:            now,
    }
}

pub struct RiskEngine {
    composer: Arc<SignatureComposer>,
}

impl RiskEngine {
    pub fn new(composer: Arc<SignatureComposer>) -> Self {
        Self { composer }
    }

    pub fn evaluate_risk(&self, account_id: &str, weights: &RiskWeights) -> Result<RiskOutput> {
        let (metrics, analytics) = self.composer.metrics_with_analytics(account_id)?;
        let centrality = analytics.centrality(account_id);
        let out = derive_output(&metrics, centrality, weights, Utc::now());
        debug!(
            "Risk evaluated account={} network_risk={:.4} tag={}",
            account_id, out.network_risk(), out.fraud_tag
        );
        Ok(out)
    }
}
