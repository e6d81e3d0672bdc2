// fraudsig/src/analytics/backend.rs
//
// Graph capability interface for whole-graph analytics.
//
// The refresher only talks to `dyn GraphBackend`, so an accelerated backend
// (GPU, remote graph engine) can replace the CPU one without touching the
// cycle/community/signature layers. Node ids in results are petgraph
// NodeIndex values of the snapshot the backend was handed.

use petgraph::graph::NodeIndex;

use crate::analytics::{centrality, community};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::state::graph::{EdgeView, GraphSnapshot};

/// Community assignment per node index, renumbered contiguously from 0.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityPartition {
    pub assignments:     Vec<usize>,
    pub num_communities: usize,
    pub modularity:      f64,
}

pub trait GraphBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn nodes<'a>(&self, snapshot: &'a GraphSnapshot) -> Vec<&'a str> {
        snapshot.nodes().collect()
    }

    fn edges<'a>(&self, snapshot: &'a GraphSnapshot) -> Vec<EdgeView<'a>> {
        snapshot.edges().collect()
    }

    fn strongly_connected_components(&self, snapshot: &GraphSnapshot) -> Result<Vec<Vec<NodeIndex>>>;

    fn community_partition(&self, snapshot: &GraphSnapshot) -> Result<CommunityPartition>;

    /// Per-node centrality normalized to [0,1], indexed by NodeIndex.
    fn centrality(&self, snapshot: &GraphSnapshot) -> Result<Vec<f64>>;
}

// ── CPU backend ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CpuBackend {
    pub louvain_max_passes: u32,
    pub louvain_min_gain:   f64,
    pub pagerank_damping:   f64,
}

impl CpuBackend {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            louvain_max_passes: cfg.louvain_max_passes,
            louvain_min_gain:   cfg.louvain_min_gain,
            pagerank_damping:   cfg.pagerank_damping,
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self { Self::from_config(&EngineConfig::default()) }
}

impl GraphBackend for CpuBackend {
    fn name(&self) -> &'static str { "cpu" }

    fn strongly_connected_components(&self, snapshot: &GraphSnapshot) -> Result<Vec<Vec<NodeIndex>>> {
        Ok(petgraph::algo::tarjan_scc(snapshot.graph()))
    }

    fn community_partition(&self, snapshot: &GraphSnapshot) -> Result<CommunityPartition> {
        Ok(community::louvain(snapshot, self.louvain_max_passes, self.louvain_min_gain))
    }

    fn centrality(&self, snapshot: &GraphSnapshot) -> Result<Vec<f64>> {
        centrality::pagerank(snapshot, self.pagerank_damping)
    }
}
