// fraudsig/src/analytics/cycles.rs
//
// Circular fund-flow detection from strongly connected components.
//
// A node is "in a cycle" only when its SCC has 3+ members. A 2-member SCC is
// a reciprocal pair (refund, shared bills) and is not flagged.
//
// Risk curve: shorter rings return money to origin faster, so risk peaks at
// the smallest qualifying ring and decays with length:
//   n <= 2  → 0
//   n >= 3  → exp(-(n - 3) / CYCLE_DECAY)      (1.0 at n = 3, → 0⁺ as n → ∞)

use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use crate::events::CycleResult;
use crate::state::graph::GraphSnapshot;

pub const MIN_CYCLE_SIZE: usize = 3;
const CYCLE_DECAY: f64 = 6.0;

pub fn cycle_risk(scc_size: usize) -> f64 {
    if scc_size < MIN_CYCLE_SIZE {
        return 0.0;
    }
    (-((scc_size - MIN_CYCLE_SIZE) as f64) / CYCLE_DECAY).exp().clamp(0.0, 1.0)
}

pub fn cycle_result(scc_size: usize) -> CycleResult {
    CycleResult {
        is_in_cycle:  scc_size >= MIN_CYCLE_SIZE,
        cycle_length: scc_size,
        cycle_risk:   cycle_risk(scc_size),
    }
}

pub struct CycleDetector;

impl CycleDetector {
    /// SCC size per account id. Accounts absent from the map are unknown
    /// and read as size 0.
    pub fn scc_sizes(snapshot: &GraphSnapshot, sccs: &[Vec<NodeIndex>]) -> HashMap<String, usize> {
        let g = snapshot.graph();
        let mut sizes = HashMap::with_capacity(snapshot.node_count());
        for component in sccs {
            for &idx in component {
                sizes.insert(g[idx].clone(), component.len());
            }
        }
        sizes
    }

    /// Accounts sitting in a qualifying ring, largest ring first.
    pub fn ring_members(sizes: &HashMap<String, usize>) -> Vec<(String, usize)> {
        let mut members: Vec<(String, usize)> = sizes
            .iter()
            .filter(|&(_, &n)| n >= MIN_CYCLE_SIZE)
            .map(|(id, &n)| (id.clone(), n))
            .collect();
        members.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        members
    }
}
