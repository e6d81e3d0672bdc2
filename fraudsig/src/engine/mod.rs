// fraudsig/src/engine/mod.rs
//
// Request-path engine: signature cache, composer, weighted risk.
// `SignaturePipeline` wires one shared graph store, analytics refresher,
// cache, composer and risk engine from an EngineConfig.

pub mod cache;
pub mod composer;
pub mod risk;

use std::collections::HashSet;
use std::sync::Arc;

use crate::analytics::backend::{CpuBackend, GraphBackend};
use crate::analytics::temporal::TemporalAnalyzer;
use crate::analytics::AnalyticsRefresher;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::SignatureOutcome;
use crate::state::graph::GraphStore;

use cache::SignatureCache;
use composer::SignatureComposer;
use risk::RiskEngine;

pub struct SignaturePipeline {
    pub config:    EngineConfig,
    pub graph:     Arc<GraphStore>,
    pub analytics: Arc<AnalyticsRefresher>,
    pub cache:     Arc<SignatureCache>,
    pub composer:  Arc<SignatureComposer>,
    pub risk:      RiskEngine,
}

impl SignaturePipeline {
    pub fn new(config: EngineConfig) -> Self {
        let backend = Arc::new(CpuBackend::from_config(&config));
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: EngineConfig, backend: Arc<dyn GraphBackend>) -> Self {
        let graph     = Arc::new(GraphStore::new());
        let analytics = Arc::new(AnalyticsRefresher::new(Arc::clone(&graph), backend));
        let cache     = Arc::new(SignatureCache::from_config(&config));
        let composer  = Arc::new(SignatureComposer::new(
            Arc::clone(&graph),
            Arc::clone(&analytics),
            Arc::clone(&cache),
            TemporalAnalyzer::new(config.velocity_half_rate),
        ));
        let risk = RiskEngine::new(Arc::clone(&composer));

        Self { config, graph, analytics, cache, composer, risk }
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.refresh_interval_secs.max(1))
    }

    /// Signatures for ring members not yet in `alerted`, against the latest
    /// analytics. Scored accounts are added to `alerted`.
    pub async fn score_new_ring_members(
        &self,
        alerted: &mut HashSet<String>,
    ) -> Result<Vec<(String, SignatureOutcome)>> {
        let Some(analytics) = self.analytics.current() else { return Ok(Vec::new()) };
        let mut scored = Vec::new();
        for (account, _) in analytics.ring_members() {
            if alerted.contains(&account) {
                continue;
            }
            let outcome = self.composer.resolve_signature(&account).await?;
            alerted.insert(account.clone());
            scored.push((account, outcome));
        }
        Ok(scored)
    }
}
