// fraudsig/src/analytics/community.rs
//
// Community detection (Louvain) + per-community density/risk scoring.
//
// Louvain runs on the undirected projection of the transaction graph, edge
// weight = transaction count. Each level does greedy local moves, then
// collapses communities into super-nodes and repeats until nothing moves.
//
// Determinism: nodes are visited in NodeIndex order, candidate communities
// in ascending id order, and a move needs a strictly better gain. A fixed
// snapshot therefore always yields the same partition.
//
// Scoring per community of size s:
//   density    = distinct internal directed pairs / (s·(s-1))     (0 if s = 1)
//   risk_score = density · (1 - exp(-(s - 1) / SIZE_SCALE))

use std::collections::BTreeMap;

use petgraph::visit::EdgeRef;

use crate::analytics::backend::CommunityPartition;
use crate::events::CommunityResult;
use crate::state::graph::GraphSnapshot;

pub const HIGH_DENSITY: f64 = 0.7;
const SIZE_SCALE: f64 = 4.0;
const MAX_LEVELS: usize = 16;

// ── Scoring ───────────────────────────────────────────────────────────────────

pub fn community_risk(density: f64, size: usize) -> f64 {
    if size <= 1 {
        return 0.0;
    }
    let size_factor = 1.0 - (-((size - 1) as f64) / SIZE_SCALE).exp();
    (density * size_factor).clamp(0.0, 1.0)
}

pub struct CommunityAnalyzer;

impl CommunityAnalyzer {
    /// Score every community in the partition. Index = community id.
    pub fn summarize(snapshot: &GraphSnapshot, partition: &CommunityPartition) -> Vec<CommunityResult> {
        let k = partition.num_communities;
        let mut sizes    = vec![0usize; k];
        let mut internal = vec![0usize; k];

        for &c in &partition.assignments {
            sizes[c] += 1;
        }
        for e in snapshot.graph().edge_references() {
            let (a, b) = (e.source().index(), e.target().index());
            if a != b && partition.assignments[a] == partition.assignments[b] {
                internal[partition.assignments[a]] += 1;
            }
        }

        (0..k)
            .map(|c| {
                let s = sizes[c];
                let possible = s * s.saturating_sub(1);
                let density = if possible == 0 { 0.0 } else { internal[c] as f64 / possible as f64 };
                CommunityResult {
                    density,
                    size:       s.max(1),
                    risk_score: community_risk(density, s),
                }
            })
            .collect()
    }
}

// ── Louvain ───────────────────────────────────────────────────────────────────

/// Symmetric weighted adjacency; `self_loops[i]` holds weight internal to a
/// collapsed super-node (counted once per direction, like A_ii).
struct WeightedGraph {
    adj:        Vec<BTreeMap<usize, f64>>,
    self_loops: Vec<f64>,
}

impl WeightedGraph {
    fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let n = snapshot.node_count();
        let mut adj = vec![BTreeMap::new(); n];
        for e in snapshot.graph().edge_references() {
            let (a, b) = (e.source().index(), e.target().index());
            if a == b { continue; }
            let w = e.weight().tx_count as f64;
            *adj[a].entry(b).or_insert(0.0) += w;
            *adj[b].entry(a).or_insert(0.0) += w;
        }
        Self { adj, self_loops: vec![0.0; n] }
    }

    fn len(&self) -> usize { self.adj.len() }

    fn degree(&self, i: usize) -> f64 {
        self.adj[i].values().sum::<f64>() + self.self_loops[i]
    }

    /// Collapse nodes into their communities (ids must be contiguous).
    fn aggregate(&self, membership: &[usize], k: usize) -> Self {
        let mut adj = vec![BTreeMap::new(); k];
        let mut self_loops = vec![0.0; k];
        for i in 0..self.len() {
            let ci = membership[i];
            self_loops[ci] += self.self_loops[i];
            for (&j, &w) in &self.adj[i] {
                let cj = membership[j];
                if ci == cj {
                    self_loops[ci] += w;
                } else {
                    *adj[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }
        Self { adj, self_loops }
    }
}

/// One level of greedy local moves. Returns (membership, moved_any).
fn local_moves(g: &WeightedGraph, max_passes: u32, min_gain: f64) -> (Vec<usize>, bool) {
    let n = g.len();
    let degrees: Vec<f64> = (0..n).map(|i| g.degree(i)).collect();
    let m2: f64 = degrees.iter().sum();
    let mut membership: Vec<usize> = (0..n).collect();
    if m2 == 0.0 {
        return (membership, false);
    }

    let mut tot = degrees.clone();
    let mut moved_any = false;

    for _ in 0..max_passes.max(1) {
        let mut improvement = 0.0;
        let mut moved = false;

        for i in 0..n {
            let current = membership[i];
            let ki = degrees[i];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (&j, &w) in &g.adj[i] {
                *links.entry(membership[j]).or_insert(0.0) += w;
            }

            tot[current] -= ki;
            let stay_gain = links.get(&current).copied().unwrap_or(0.0) - tot[current] * ki / m2;

            let mut best = current;
            let mut best_gain = stay_gain;
            for (&c, &w) in &links {
                if c == current { continue; }
                let gain = w - tot[c] * ki / m2;
                if gain > best_gain + 1e-12 {
                    best = c;
                    best_gain = gain;
                }
            }

            tot[best] += ki;
            if best != current {
                membership[i] = best;
                improvement += best_gain - stay_gain;
                moved = true;
                moved_any = true;
            }
        }

        if !moved || improvement / m2 < min_gain {
            break;
        }
    }

    (membership, moved_any)
}

/// Renumber to contiguous ids in first-appearance order.
fn renumber(membership: &mut [usize]) -> usize {
    let mut map: BTreeMap<usize, usize> = BTreeMap::new();
    let mut next = 0usize;
    for c in membership.iter_mut() {
        let id = *map.entry(*c).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        });
        *c = id;
    }
    next
}

/// Modularity Q = Σ_c [ in_c / 2m - (tot_c / 2m)² ] on the base graph.
pub fn modularity(snapshot: &GraphSnapshot, assignments: &[usize]) -> f64 {
    let g = WeightedGraph::from_snapshot(snapshot);
    let m2: f64 = (0..g.len()).map(|i| g.degree(i)).sum();
    if m2 == 0.0 {
        return 0.0;
    }
    let k = assignments.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut inside = vec![0.0; k];
    let mut tot    = vec![0.0; k];
    for i in 0..g.len() {
        let ci = assignments[i];
        tot[ci] += g.degree(i);
        for (&j, &w) in &g.adj[i] {
            if assignments[j] == ci {
                inside[ci] += w;
            }
        }
    }
    (0..k).map(|c| inside[c] / m2 - (tot[c] / m2).powi(2)).sum()
}

pub fn louvain(snapshot: &GraphSnapshot, max_passes: u32, min_gain: f64) -> CommunityPartition {
    let n = snapshot.node_count();
    if n == 0 {
        return CommunityPartition { assignments: Vec::new(), num_communities: 0, modularity: 0.0 };
    }

    let mut graph = WeightedGraph::from_snapshot(snapshot);
    // Base node → current super-node
    let mut assignments: Vec<usize> = (0..n).collect();

    for _ in 0..MAX_LEVELS {
        let (mut membership, moved) = local_moves(&graph, max_passes, min_gain);
        if !moved {
            break;
        }
        let k = renumber(&mut membership);
        for a in assignments.iter_mut() {
            *a = membership[*a];
        }
        graph = graph.aggregate(&membership, k);
    }

    let num_communities = renumber(&mut assignments);
    let modularity = modularity(snapshot, &assignments);
    CommunityPartition { assignments, num_communities, modularity }
}
