// fraudsig/src/analytics/centrality.rs
//
// Weighted PageRank over the transaction graph — the centrality subscore
// consumed by the RiskEngine. Transition weight = transaction count on the
// edge. Dangling accounts (no outgoing flow) spread their mass uniformly.
// Scores are normalized by the maximum so the top hub reads 1.0.

use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Result, SignatureError};
use crate::state::graph::GraphSnapshot;

const MAX_ITERATIONS: usize = 100;
const TOLERANCE:      f64   = 1e-9;

pub fn pagerank(snapshot: &GraphSnapshot, damping: f64) -> Result<Vec<f64>> {
    let g = snapshot.graph();
    let n = g.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }
    if !(0.0..1.0).contains(&damping) {
        return Err(SignatureError::analytic(format!("pagerank damping out of range: {}", damping)));
    }

    let out_weight: Vec<f64> = g
        .node_indices()
        .map(|i| g.edges_directed(i, Direction::Outgoing).map(|e| e.weight().tx_count as f64).sum())
        .collect();

    let base = (1.0 - damping) / n as f64;
    let mut rank = vec![1.0 / n as f64; n];

    for _ in 0..MAX_ITERATIONS {
        let dangling: f64 = (0..n).filter(|&i| out_weight[i] == 0.0).map(|i| rank[i]).sum();
        let mut next = vec![base + damping * dangling / n as f64; n];

        for e in g.edge_references() {
            let (s, t) = (e.source().index(), e.target().index());
            next[t] += damping * rank[s] * e.weight().tx_count as f64 / out_weight[s];
        }

        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if delta < TOLERANCE {
            break;
        }
    }

    let max = rank.iter().cloned().fold(0.0f64, f64::max);
    if !max.is_finite() || max <= 0.0 {
        return Err(SignatureError::analytic("pagerank did not produce a finite distribution"));
    }
    Ok(rank.into_iter().map(|r| (r / max).clamp(0.0, 1.0)).collect())
}
