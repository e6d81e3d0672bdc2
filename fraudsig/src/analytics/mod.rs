// fraudsig/src/analytics/mod.rs
//
// Batched whole-graph analytics.
//
// SCC membership, Louvain communities and centrality are superlinear in the
// edge count, so they never run on the request path. The refresher runs
// them against one committed graph snapshot and publishes an immutable
// AnalyticsSnapshot; signature requests only do map lookups against it
// (plus the cheap per-account temporal pass).

pub mod backend;
pub mod centrality;
pub mod community;
pub mod cycles;
pub mod temporal;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::events::{CommunityResult, CycleResult};
use crate::state::graph::GraphStore;

use backend::GraphBackend;
use community::CommunityAnalyzer;
use cycles::CycleDetector;

// ── Published results ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AnalyticsSnapshot {
    pub graph_version: u64,
    pub computed_at:   DateTime<Utc>,
    pub backend:       &'static str,
    pub modularity:    f64,
    scc_size:          HashMap<String, usize>,
    community_of:      HashMap<String, usize>,
    communities:       Vec<CommunityResult>,
    centrality:        HashMap<String, f64>,
}

impl AnalyticsSnapshot {
    pub fn cycle(&self, account_id: &str) -> CycleResult {
        cycles::cycle_result(self.scc_size.get(account_id).copied().unwrap_or(0))
    }

    pub fn community_id(&self, account_id: &str) -> Option<usize> {
        self.community_of.get(account_id).copied()
    }

    pub fn community(&self, account_id: &str) -> CommunityResult {
        self.community_id(account_id)
            .and_then(|c| self.communities.get(c).copied())
            .unwrap_or_default()
    }

    pub fn centrality(&self, account_id: &str) -> f64 {
        self.centrality.get(account_id).copied().unwrap_or(0.0)
    }

    pub fn n_communities(&self) -> usize { self.communities.len() }

    /// Accounts in a 3+ member SCC, largest ring first.
    pub fn ring_members(&self) -> Vec<(String, usize)> {
        CycleDetector::ring_members(&self.scc_size)
    }
}

// ── Refresher ─────────────────────────────────────────────────────────────────

pub struct AnalyticsRefresher {
    graph:     Arc<GraphStore>,
    backend:   Arc<dyn GraphBackend>,
    published: RwLock<Option<Arc<AnalyticsSnapshot>>>,
    running:   Mutex<()>,
    pub refreshes: AtomicU64,
}

impl AnalyticsRefresher {
    pub fn new(graph: Arc<GraphStore>, backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            graph,
            backend,
            published: RwLock::new(None),
            running:   Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Option<Arc<AnalyticsSnapshot>> {
        self.published.read().clone()
    }

    /// Recompute against the latest committed graph and publish. A no-op
    /// returning the current results when the graph version is unchanged.
    pub fn refresh(&self) -> Result<Arc<AnalyticsSnapshot>> {
        let _guard = self.running.lock();
        let snapshot = self.graph.snapshot()?;

        if let Some(current) = self.current() {
            if current.graph_version == snapshot.version() {
                debug!("Analytics already at graph v{}", current.graph_version);
                return Ok(current);
            }
        }

        let started = Instant::now();
        let sccs = self.backend.strongly_connected_components(&snapshot)?;
        let partition = self.backend.community_partition(&snapshot)?;
        let centrality = self.backend.centrality(&snapshot)?;

        let g = snapshot.graph();
        let scc_size = CycleDetector::scc_sizes(&snapshot, &sccs);
        let communities = CommunityAnalyzer::summarize(&snapshot, &partition);
        let community_of: HashMap<String, usize> = g
            .node_indices()
            .map(|i| (g[i].clone(), partition.assignments[i.index()]))
            .collect();
        let centrality: HashMap<String, f64> = g
            .node_indices()
            .map(|i| (g[i].clone(), centrality.get(i.index()).copied().unwrap_or(0.0)))
            .collect();

        let results = Arc::new(AnalyticsSnapshot {
            graph_version: snapshot.version(),
            computed_at:   Utc::now(),
            backend:       self.backend.name(),
            modularity:    partition.modularity,
            scc_size,
            community_of,
            communities,
            centrality,
        });
        *self.published.write() = Some(Arc::clone(&results));
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        info!(
            "Analytics refreshed: graph_v={} accounts={} communities={} rings={} modularity={:.4} backend={} in {:?}",
            results.graph_version,
            snapshot.node_count(),
            results.n_communities(),
            results.ring_members().len(),
            results.modularity,
            results.backend,
            started.elapsed(),
        );
        Ok(results)
    }

    /// Commit pending ingestion and refresh on a fixed cadence.
    pub async fn refresh_loop(self: Arc<Self>, every: std::time::Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let me = Arc::clone(&self);
            let job = move || {
                me.graph.commit();
                me.refresh()
            };
            match tokio::task::spawn_blocking(job).await {
                Ok(Ok(_))  => {}
                Ok(Err(e)) => error!("Analytics refresh failed: {}", e),
                Err(e)     => error!("Analytics refresh task panicked: {}", e),
            }
        }
    }
}
