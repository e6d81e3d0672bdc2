// fraudsig/src/engine/composer.rs
//
// Fraud signature composition + cached, coalesced request path.
//
// Evaluation order (fixed priority, never re-sorted by magnitude):
//   1. cycle      in a 3+ member SCC    → circular_flow_risk
//   2. community  density > 0.7         → community_risk
//   3. temporal   velocity_score > 0.8  → velocity_risk
//
// fraud_tag = highest risk_vector entry (ties → earlier in evaluation order)
// mapped through TAG_TABLE; empty vector → "Unknown Pattern".
//
// Request path: cache → per-account single-flight lock → cache re-check →
// metrics (precomputed analytics + per-request temporal pass) → compose →
// cache. The cache is only written with a finished signature, so a caller
// abandoning the request can never leave a partial entry behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::analytics::community::HIGH_DENSITY;
use crate::analytics::temporal::TemporalAnalyzer;
use crate::analytics::{AnalyticsRefresher, AnalyticsSnapshot};
use crate::engine::cache::SignatureCache;
use crate::error::{Result, SignatureError};
use crate::events::{FraudSignature, NodeMetrics, RiskVector, SignatureOutcome, SignatureSource};
use crate::state::graph::GraphStore;

pub const CIRCULAR_FLOW_RISK: &str = "circular_flow_risk";
pub const COMMUNITY_RISK:     &str = "community_risk";
pub const VELOCITY_RISK:      &str = "velocity_risk";

pub const TAG_CIRCULAR_FLOW: &str = "Circular Fund Flow";
pub const TAG_NETWORK_CLUSTER: &str = "Suspicious Network Cluster";
pub const TAG_VELOCITY: &str = "Velocity Anomaly";
pub const TAG_UNKNOWN: &str = "Unknown Pattern";
pub const TAG_COMPLEX: &str = "Complex Fraud Pattern";

pub const MAX_FACTORS: usize = 3;

// Evaluation order doubles as tie-break priority
const TAG_TABLE: &[(&str, &str)] = &[
    (CIRCULAR_FLOW_RISK, TAG_CIRCULAR_FLOW),
    (COMMUNITY_RISK,     TAG_NETWORK_CLUSTER),
    (VELOCITY_RISK,      TAG_VELOCITY),
];

pub const FACTOR_HIGH_DENSITY: &str = "High-density transaction cluster detected";

pub fn cycle_factor(cycle_length: usize) -> String {
    format!("Part of {}-node circular fund flow", cycle_length)
}

pub fn velocity_factor(tx_per_hour: f64) -> String {
    format!("Abnormal transaction velocity: {:?} tx/hour", tx_per_hour)
}

// ── Pure composition ──────────────────────────────────────────────────────────

fn priority(key: &str) -> usize {
    TAG_TABLE.iter().position(|(k, _)| *k == key).unwrap_or(TAG_TABLE.len())
}

/// Pure function of the risk vector.
pub fn fraud_tag(risk_vector: &RiskVector) -> String {
    let mut best: Option<(&str, f64)> = None;
    for (key, score) in risk_vector.iter() {
        let better = match best {
            None => true,
            Some((bk, bs)) => score > bs || (score == bs && priority(key) < priority(bk)),
        };
        if better {
            best = Some((key, score));
        }
    }

    match best {
        None => TAG_UNKNOWN.to_string(),
        Some((key, _)) => TAG_TABLE
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, tag)| tag.to_string())
            .unwrap_or_else(|| TAG_COMPLEX.to_string()),
    }
}

pub fn compose(metrics: &NodeMetrics, now: DateTime<Utc>) -> FraudSignature {
    let mut risk_vector = RiskVector::new();
    let mut factors = Vec::new();

    if metrics.cycles.is_in_cycle {
        risk_vector.insert(CIRCULAR_FLOW_RISK, metrics.cycles.cycle_risk);
        factors.push(cycle_factor(metrics.cycles.cycle_length));
    }
    if metrics.community.density > HIGH_DENSITY {
        risk_vector.insert(COMMUNITY_RISK, metrics.community.risk_score);
        factors.push(FACTOR_HIGH_DENSITY.to_string());
    }
    if metrics.temporal.high_velocity {
        risk_vector.insert(VELOCITY_RISK, metrics.temporal.velocity_score);
        factors.push(velocity_factor(metrics.temporal.tx_per_hour));
    }
    factors.truncate(MAX_FACTORS);

    FraudSignature {
        fraud_tag:            fraud_tag(&risk_vector),
        risk_vector,
        contributing_factors: factors,
        timestamp:            now,
    }
}

// ── Single-flight slot ────────────────────────────────────────────────────────

/// Holds one account's in-flight lock; removes the map entry on drop once
/// nobody else is waiting on it (including when the request is cancelled).
struct InflightSlot<'a> {
    map:  &'a DashMap<String, Arc<AsyncMutex<()>>>,
    key:  &'a str,
    lock: Option<Arc<AsyncMutex<()>>>,
}

impl<'a> InflightSlot<'a> {
    fn acquire(map: &'a DashMap<String, Arc<AsyncMutex<()>>>, key: &'a str) -> Self {
        let lock = map.entry(key.to_string()).or_default().clone();
        Self { map, key, lock: Some(lock) }
    }

    fn lock(&self) -> Arc<AsyncMutex<()>> {
        // Always Some until drop
        self.lock.clone().unwrap_or_default()
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        self.lock.take();
        self.map.remove_if(self.key, |_, l| Arc::strong_count(l) == 1);
    }
}

// ── Composer service ──────────────────────────────────────────────────────────

pub struct SignatureComposer {
    graph:     Arc<GraphStore>,
    analytics: Arc<AnalyticsRefresher>,
    cache:     Arc<SignatureCache>,
    temporal:  TemporalAnalyzer,
    inflight:  DashMap<String, Arc<AsyncMutex<()>>>,

    pub computations: AtomicU64,
    pub degraded:     AtomicU64,
}

impl SignatureComposer {
    pub fn new(
        graph: Arc<GraphStore>,
        analytics: Arc<AnalyticsRefresher>,
        cache: Arc<SignatureCache>,
        temporal: TemporalAnalyzer,
    ) -> Self {
        Self {
            graph,
            analytics,
            cache,
            temporal,
            inflight:     DashMap::new(),
            computations: AtomicU64::new(0),
            degraded:     AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &SignatureCache { &self.cache }

    /// Metrics together with the analytics snapshot they were read from.
    pub(crate) fn metrics_with_analytics(
        &self,
        account_id: &str,
    ) -> Result<(NodeMetrics, Arc<AnalyticsSnapshot>)> {
        let snapshot = self.graph.snapshot()?;
        let analytics = self
            .analytics
            .current()
            .ok_or_else(|| SignatureError::analytic("analytics not ready: no refresh has completed"))?;
        let temporal = self.temporal.analyze(&snapshot, account_id)?;

        let metrics = NodeMetrics {
            cycles:    analytics.cycle(account_id),
            community: analytics.community(account_id),
            temporal,
        };
        Ok((metrics, analytics))
    }

    /// Raw, unmodified subscores for one account.
    pub fn get_node_metrics(&self, account_id: &str) -> Result<NodeMetrics> {
        self.metrics_with_analytics(account_id).map(|(m, _)| m)
    }

    /// Signature plus provenance. Only NotInitialized is returned as an error.
    pub async fn resolve_signature(&self, account_id: &str) -> Result<SignatureOutcome> {
        if !self.graph.is_initialized() {
            return Err(SignatureError::NotInitialized);
        }
        if let Some(signature) = self.cache.get(account_id) {
            return Ok(SignatureOutcome { signature, source: SignatureSource::Cached });
        }

        let slot = InflightSlot::acquire(&self.inflight, account_id);
        let lock = slot.lock();
        let _guard = lock.lock().await;

        // Someone else may have finished while we waited
        if let Some(signature) = self.cache.get(account_id) {
            return Ok(SignatureOutcome { signature, source: SignatureSource::Cached });
        }
        self.compute(account_id)
    }

    /// Primary entry point. Never fails for unknown accounts or analytic
    /// failures; fails only if the graph store was never initialized.
    pub async fn get_fraud_signature(&self, account_id: &str) -> Result<FraudSignature> {
        Ok(self.resolve_signature(account_id).await?.signature)
    }

    fn compute(&self, account_id: &str) -> Result<SignatureOutcome> {
        self.computations.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();

        match self.get_node_metrics(account_id) {
            Ok(metrics) => {
                let signature = compose(&metrics, now);
                self.cache.put(account_id, signature.clone());
                debug!(
                    "Signature computed account={} tag={} factors={}",
                    account_id, signature.fraud_tag, signature.contributing_factors.len()
                );
                Ok(SignatureOutcome { signature, source: SignatureSource::Computed })
            }
            Err(SignatureError::NotInitialized) => Err(SignatureError::NotInitialized),
            Err(e) => {
                self.degraded.fetch_add(1, Ordering::Relaxed);
                warn!("Signature generation degraded for {}: {}", account_id, e);
                Ok(SignatureOutcome {
                    signature: FraudSignature::unknown(now),
                    source:    SignatureSource::Degraded(e.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::backend::CpuBackend;
    use crate::events::{CommunityResult, CycleResult, TemporalResult, Transaction};
    use chrono::{Duration, TimeZone};

    fn metrics(cycle: Option<usize>, density: f64, tx_per_hour: Option<f64>) -> NodeMetrics {
        let cycles = match cycle {
            Some(n) => crate::analytics::cycles::cycle_result(n),
            None    => CycleResult::default(),
        };
        let temporal = match tx_per_hour {
            Some(r) => {
                let t = TemporalAnalyzer::new(5.0);
                let s = t.velocity_score(r);
                TemporalResult { tx_per_hour: r, high_velocity: s > 0.8, velocity_score: s }
            }
            None => TemporalResult::default(),
        };
        NodeMetrics {
            cycles,
            community: CommunityResult {
                density,
                size: 4,
                risk_score: crate::analytics::community::community_risk(density, 4),
            },
            temporal,
        }
    }

    fn rv(pairs: &[(&str, f64)]) -> RiskVector {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_fraud_tag_table() {
        assert_eq!(fraud_tag(&RiskVector::new()), "Unknown Pattern");
        assert_eq!(
            fraud_tag(&rv(&[("circular_flow_risk", 0.9), ("velocity_risk", 0.5)])),
            "Circular Fund Flow"
        );
        assert_eq!(fraud_tag(&rv(&[("community_risk", 0.3), ("velocity_risk", 0.95)])), "Velocity Anomaly");
        assert_eq!(fraud_tag(&rv(&[("community_risk", 0.6)])), "Suspicious Network Cluster");
        assert_eq!(fraud_tag(&rv(&[("mystery_risk", 0.6)])), "Complex Fraud Pattern");
    }

    #[test]
    fn test_fraud_tag_ties_follow_evaluation_order() {
        assert_eq!(
            fraud_tag(&rv(&[("velocity_risk", 0.7), ("community_risk", 0.7), ("circular_flow_risk", 0.7)])),
            "Circular Fund Flow"
        );
        assert_eq!(
            fraud_tag(&rv(&[("velocity_risk", 0.7), ("community_risk", 0.7)])),
            "Suspicious Network Cluster"
        );
    }

    #[test]
    fn test_three_node_cycle_factor() {
        let sig = compose(&metrics(Some(3), 0.1, None), Utc::now());
        assert_eq!(sig.contributing_factors, vec!["Part of 3-node circular fund flow".to_string()]);
        assert_eq!(sig.risk_vector.get(CIRCULAR_FLOW_RISK), Some(1.0));
        assert_eq!(sig.fraud_tag, "Circular Fund Flow");
    }

    #[test]
    fn test_density_threshold() {
        let dense = compose(&metrics(None, 0.75, None), Utc::now());
        assert_eq!(dense.contributing_factors, vec![FACTOR_HIGH_DENSITY.to_string()]);
        assert!(dense.risk_vector.get(COMMUNITY_RISK).is_some());

        let sparse = compose(&metrics(None, 0.65, None), Utc::now());
        assert!(sparse.contributing_factors.is_empty());
        assert!(sparse.risk_vector.is_empty());
        assert_eq!(sparse.fraud_tag, "Unknown Pattern");
    }

    #[test]
    fn test_all_triggers_keep_priority_order() {
        let sig = compose(&metrics(Some(5), 0.9, Some(42.0)), Utc::now());
        assert_eq!(sig.contributing_factors.len(), 3);
        assert_eq!(sig.contributing_factors[0], "Part of 5-node circular fund flow");
        assert_eq!(sig.contributing_factors[1], FACTOR_HIGH_DENSITY);
        assert_eq!(sig.contributing_factors[2], "Abnormal transaction velocity: 42.0 tx/hour");

        let keys: Vec<&str> = sig.risk_vector.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![CIRCULAR_FLOW_RISK, COMMUNITY_RISK, VELOCITY_RISK]);
    }

    #[test]
    fn test_zero_metrics_is_unknown() {
        let sig = compose(&NodeMetrics::default(), Utc::now());
        assert_eq!(sig.fraud_tag, "Unknown Pattern");
        assert!(sig.risk_vector.is_empty());
        assert!(sig.contributing_factors.is_empty());
    }

    // ── Service ───────────────────────────────────────────────────────────────

    fn ring_txs() -> Vec<Transaction> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut txs = vec![
            Transaction::new("A", "B", 900.0, start),
            Transaction::new("B", "C", 880.0, start + Duration::minutes(5)),
            Transaction::new("C", "A", 860.0, start + Duration::minutes(10)),
        ];
        for i in 0..30 {
            txs.push(Transaction::new("V", format!("m{}", i % 3), 20.0, start + Duration::minutes(i)));
        }
        txs
    }

    fn composer(ttl: Duration, refresh: bool) -> SignatureComposer {
        let graph = Arc::new(GraphStore::new());
        graph.ingest_batch(&ring_txs());
        let analytics = Arc::new(AnalyticsRefresher::new(Arc::clone(&graph), Arc::new(CpuBackend::default())));
        if refresh {
            analytics.refresh().unwrap();
        }
        SignatureComposer::new(
            graph,
            analytics,
            Arc::new(SignatureCache::new(ttl, 1000)),
            TemporalAnalyzer::new(5.0),
        )
    }

    #[tokio::test]
    async fn test_uninitialized_graph_is_fatal() {
        let graph = Arc::new(GraphStore::new());
        let analytics = Arc::new(AnalyticsRefresher::new(Arc::clone(&graph), Arc::new(CpuBackend::default())));
        let c = SignatureComposer::new(
            graph,
            analytics,
            Arc::new(SignatureCache::new(Duration::minutes(5), 10)),
            TemporalAnalyzer::new(5.0),
        );
        assert!(matches!(c.get_fraud_signature("A").await, Err(SignatureError::NotInitialized)));
        assert!(matches!(c.get_node_metrics("A"), Err(SignatureError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_ring_member_signature() {
        let c = composer(Duration::minutes(5), true);
        let sig = c.get_fraud_signature("A").await.unwrap();
        assert_eq!(sig.fraud_tag, "Circular Fund Flow");
        assert!(sig.contributing_factors.contains(&"Part of 3-node circular fund flow".to_string()));
    }

    #[tokio::test]
    async fn test_velocity_account_signature() {
        let c = composer(Duration::minutes(5), true);
        let m = c.get_node_metrics("V").unwrap();
        assert_eq!(m.temporal.tx_per_hour, 30.0);
        assert!(m.temporal.high_velocity);

        let sig = c.get_fraud_signature("V").await.unwrap();
        assert_eq!(sig.fraud_tag, "Velocity Anomaly");
        assert!(sig.contributing_factors.contains(&"Abnormal transaction velocity: 30.0 tx/hour".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_account_is_zero_signal() {
        let c = composer(Duration::minutes(5), true);
        let out = c.resolve_signature("nobody").await.unwrap();
        assert_eq!(out.source, SignatureSource::Computed);
        assert_eq!(out.signature.fraud_tag, "Unknown Pattern");
        assert!(out.signature.risk_vector.is_empty());
        assert!(out.signature.contributing_factors.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_calls_hit_cache() {
        let c = composer(Duration::minutes(5), true);
        let first = c.get_fraud_signature("A").await.unwrap();
        let second = c.resolve_signature("A").await.unwrap();

        assert_eq!(second.source, SignatureSource::Cached);
        assert_eq!(first, second.signature);
        assert_eq!(c.computations.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_recomputes() {
        let c = composer(Duration::milliseconds(40), true);
        c.get_fraud_signature("A").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        let again = c.resolve_signature("A").await.unwrap();

        assert_eq!(again.source, SignatureSource::Computed);
        assert_eq!(c.computations.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_compute_once() {
        const CALLERS: usize = 16;
        let c = Arc::new(composer(Duration::minutes(5), true));

        // Hold the account's lock so every caller misses the cache and queues
        let slot = InflightSlot::acquire(&c.inflight, "A");
        let lock = slot.lock();
        let held = lock.lock().await;

        let mut handles = Vec::new();
        for _ in 0..CALLERS {
            let c = Arc::clone(&c);
            handles.push(tokio::spawn(async move { c.resolve_signature("A").await.unwrap() }));
        }

        // map + slot + local clone, then two clones per queued caller
        let queued = 3 + 2 * CALLERS;
        for _ in 0..1000 {
            if Arc::strong_count(&lock) == queued {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(Arc::strong_count(&lock), queued, "callers did not all queue on the account lock");
        assert_eq!(c.computations.load(Ordering::Relaxed), 0);
        assert!(c.cache().is_empty());

        drop(held);
        drop(lock);
        drop(slot);

        let mut outcomes = Vec::new();
        for h in handles {
            outcomes.push(h.await.unwrap());
        }

        assert_eq!(c.computations.load(Ordering::Relaxed), 1);
        assert_eq!(outcomes.iter().filter(|o| o.source == SignatureSource::Computed).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| o.source == SignatureSource::Cached).count(), CALLERS - 1);
        assert!(outcomes.windows(2).all(|w| w[0].signature == w[1].signature));
        assert!(c.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_missing_analytics_degrades_without_caching() {
        let c = composer(Duration::minutes(5), false);
        let out = c.resolve_signature("A").await.unwrap();

        assert!(out.is_degraded());
        assert_eq!(out.signature.fraud_tag, "Unknown Pattern");
        assert!(out.signature.risk_vector.is_empty());
        assert!(c.cache().is_empty());

        c.resolve_signature("A").await.unwrap();
        assert_eq!(c.computations.load(Ordering::Relaxed), 2);
        assert_eq!(c.degraded.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_cancelled_request_leaves_cache_clean() {
        let c = Arc::new(composer(Duration::minutes(5), true));
        let slot = InflightSlot::acquire(&c.inflight, "A");
        let lock = slot.lock();
        let held = lock.lock().await;

        // Waits on the held lock, then gets abandoned
        let waiter = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.get_fraud_signature("A").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        assert!(c.cache().is_empty());
        assert_eq!(c.computations.load(Ordering::Relaxed), 0);

        drop(held);
        drop(lock);
        drop(slot);
        assert!(c.inflight.is_empty());
        assert!(c.get_fraud_signature("A").await.is_ok());
    }
}
