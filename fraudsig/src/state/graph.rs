// fraudsig/src/state/graph.rs
//
// Transaction graph store with copy-on-commit snapshots.
//
// Design:
//   - One writer role (ingestion) accumulates into a private petgraph DiGraph
//     behind a mutex. Parallel transactions between the same directed pair
//     fold into one edge carrying count, total amount and booking times.
//   - commit() clones the writer graph into an immutable GraphSnapshot and
//     swaps the published Arc. Readers only ever clone that Arc, so they
//     never wait on ingestion and always see a consistent graph.
//   - Unknown accounts are not errors: lookups return empty edge sets.
//   - No snapshot published yet = NotInitialized, the one fatal condition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::{debug, info, warn};

use crate::error::{Result, SignatureError};
use crate::events::Transaction;

// ── Edge payload ──────────────────────────────────────────────────────────────

/// Accumulated flow for one directed account pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairFlow {
    pub tx_count:     u64,
    pub total_amount: f64,
    pub timestamps:   Vec<DateTime<Utc>>,
}

impl PairFlow {
    fn record(&mut self, tx: &Transaction) {
        self.tx_count += 1;
        self.total_amount += tx.amount;
        self.timestamps.push(tx.booking_time);
    }
}

/// Borrowed view of one edge in a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub flow:   &'a PairFlow,
}

// ── Mutable graph (writer side) ───────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TransactionGraph {
    graph:        DiGraph<String, PairFlow>,
    index:        HashMap<String, NodeIndex>,
    transactions: u64,
}

impl TransactionGraph {
    fn node(&mut self, account_id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(account_id) {
            return idx;
        }
        let idx = self.graph.add_node(account_id.to_string());
        self.index.insert(account_id.to_string(), idx);
        idx
    }

    fn upsert(&mut self, tx: &Transaction) {
        let a = self.node(&tx.sender_account_id);
        let b = self.node(&tx.receiver_account_id);
        match self.graph.find_edge(a, b) {
            Some(e) => self.graph[e].record(tx),
            None => {
                let mut flow = PairFlow::default();
                flow.record(tx);
                self.graph.add_edge(a, b, flow);
            }
        }
        self.transactions += 1;
    }
}

// ── Immutable snapshot (reader side) ──────────────────────────────────────────

#[derive(Debug)]
pub struct GraphSnapshot {
    inner:        TransactionGraph,
    version:      u64,
    committed_at: DateTime<Utc>,
}

impl GraphSnapshot {
    pub fn version(&self) -> u64 { self.version }
    pub fn committed_at(&self) -> DateTime<Utc> { self.committed_at }

    pub fn node_count(&self) -> usize { self.inner.graph.node_count() }
    pub fn edge_count(&self) -> usize { self.inner.graph.edge_count() }
    pub fn transaction_count(&self) -> u64 { self.inner.transactions }

    pub fn contains(&self, account_id: &str) -> bool {
        self.inner.index.contains_key(account_id)
    }

    pub fn node_index(&self, account_id: &str) -> Option<NodeIndex> {
        self.inner.index.get(account_id).copied()
    }

    /// Underlying petgraph graph, for whole-graph algorithms.
    pub fn graph(&self) -> &DiGraph<String, PairFlow> {
        &self.inner.graph
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.graph.node_weights().map(|s| s.as_str())
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        let g = &self.inner.graph;
        g.edge_references().map(move |e| EdgeView {
            source: g[e.source()].as_str(),
            target: g[e.target()].as_str(),
            flow:   e.weight(),
        })
    }

    pub fn out_edges(&self, account_id: &str) -> Vec<EdgeView<'_>> {
        self.directed_edges(account_id, Direction::Outgoing)
    }

    pub fn in_edges(&self, account_id: &str) -> Vec<EdgeView<'_>> {
        self.directed_edges(account_id, Direction::Incoming)
    }

    fn directed_edges(&self, account_id: &str, dir: Direction) -> Vec<EdgeView<'_>> {
        let Some(idx) = self.node_index(account_id) else { return Vec::new() };
        let g = &self.inner.graph;
        g.edges_directed(idx, dir)
            .map(|e| EdgeView {
                source: g[e.source()].as_str(),
                target: g[e.target()].as_str(),
                flow:   e.weight(),
            })
            .collect()
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct GraphStore {
    writer:    Mutex<TransactionGraph>,
    published: RwLock<Option<Arc<GraphSnapshot>>>,
    dirty:     AtomicBool,
    commits:   AtomicU64,

    // Global counters
    pub total_transactions: AtomicU64,
    pub rejected:           AtomicU64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            writer:             Mutex::new(TransactionGraph::default()),
            published:          RwLock::new(None),
            dirty:              AtomicBool::new(false),
            commits:            AtomicU64::new(0),
            total_transactions: AtomicU64::new(0),
            rejected:           AtomicU64::new(0),
        }
    }

    /// Add a transaction to the writer graph. Not visible to readers until
    /// the next commit().
    pub fn upsert_transaction(&self, tx: &Transaction) -> Result<()> {
        if let Err(e) = tx.validate() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        self.writer.lock().upsert(tx);
        self.dirty.store(true, Ordering::Release);
        self.total_transactions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Publish the writer graph as a new immutable snapshot. A clean store
    /// that already has a snapshot returns the current one unchanged.
    pub fn commit(&self) -> Arc<GraphSnapshot> {
        if !self.dirty.load(Ordering::Acquire) {
            if let Some(current) = self.published.read().clone() {
                return current;
            }
        }

        // Writer lock held through publication so versions publish in order.
        let w = self.writer.lock();
        self.dirty.store(false, Ordering::Release);
        let version = self.commits.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(GraphSnapshot {
            inner: w.clone(),
            version,
            committed_at: Utc::now(),
        });
        *self.published.write() = Some(Arc::clone(&snapshot));
        drop(w);

        debug!(
            "Committed graph v{}: {} accounts, {} edges, {} transactions",
            version, snapshot.node_count(), snapshot.edge_count(), snapshot.transaction_count()
        );
        snapshot
    }

    /// Upsert a batch, skipping invalid records, then commit once.
    pub fn ingest_batch<'a, I>(&self, txs: I) -> Arc<GraphSnapshot>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut accepted = 0usize;
        let mut skipped  = 0usize;
        for tx in txs {
            match self.upsert_transaction(tx) {
                Ok(())  => accepted += 1,
                Err(e)  => { skipped += 1; warn!("Skipping transaction: {}", e); }
            }
        }
        let snapshot = self.commit();
        info!(
            "Ingested batch: accepted={} skipped={} graph_v={}",
            accepted, skipped, snapshot.version()
        );
        snapshot
    }

    pub fn snapshot(&self) -> Result<Arc<GraphSnapshot>> {
        self.published.read().clone().ok_or(SignatureError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.published.read().is_some()
    }
}

impl Default for GraphStore { fn default() -> Self { Self::new() } }

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tx(a: &str, b: &str, amount: f64, hour: u32) -> Transaction {
        Transaction::new(a, b, amount, Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_uncommitted_store_is_not_initialized() {
        let store = GraphStore::new();
        assert!(matches!(store.snapshot(), Err(SignatureError::NotInitialized)));
        store.upsert_transaction(&tx("a", "b", 10.0, 1)).unwrap();
        assert!(!store.is_initialized());
        store.commit();
        assert!(store.snapshot().is_ok());
    }

    #[test]
    fn test_parallel_transactions_accumulate() {
        let store = GraphStore::new();
        let snap = store.ingest_batch(&[
            tx("a", "b", 10.0, 1),
            tx("a", "b", 15.0, 2),
            tx("b", "a", 5.0, 3),
        ]);

        assert_eq!(snap.node_count(), 2);
        assert_eq!(snap.edge_count(), 2);
        assert_eq!(snap.transaction_count(), 3);

        let out = snap.out_edges("a");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, "b");
        assert_eq!(out[0].flow.tx_count, 2);
        assert_eq!(out[0].flow.total_amount, 25.0);

        let inc = snap.in_edges("a");
        assert_eq!(inc.len(), 1);
        assert_eq!(inc[0].source, "b");
    }

    #[test]
    fn test_unknown_account_has_empty_edges() {
        let store = GraphStore::new();
        let snap = store.ingest_batch(&[tx("a", "b", 1.0, 1)]);
        assert!(snap.out_edges("ghost").is_empty());
        assert!(snap.in_edges("ghost").is_empty());
        assert!(!snap.contains("ghost"));
    }

    #[test]
    fn test_snapshot_isolated_from_later_upserts() {
        let store = GraphStore::new();
        let before = store.ingest_batch(&[tx("a", "b", 1.0, 1)]);

        store.upsert_transaction(&tx("b", "c", 1.0, 2)).unwrap();
        assert_eq!(before.node_count(), 2);
        assert_eq!(store.snapshot().unwrap().version(), before.version());

        let after = store.commit();
        assert_eq!(after.node_count(), 3);
        assert!(after.version() > before.version());
        assert_eq!(before.node_count(), 2);
    }

    #[test]
    fn test_clean_commit_reuses_snapshot() {
        let store = GraphStore::new();
        let first = store.ingest_batch(&[tx("a", "b", 1.0, 1)]);
        let again = store.commit();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_invalid_transactions_are_counted_and_skipped() {
        let store = GraphStore::new();
        let snap = store.ingest_batch(&[tx("a", "b", -1.0, 1), tx("a", "b", 2.0, 1)]);
        assert_eq!(snap.transaction_count(), 1);
        assert_eq!(store.rejected.load(Ordering::Relaxed), 1);
        assert_eq!(store.total_transactions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_enumerates_nodes_and_edges() {
        let store = GraphStore::new();
        let snap = store.ingest_batch(&[tx("a", "b", 1.0, 1), tx("b", "c", 1.0, 1)]);
        let mut nodes: Vec<&str> = snap.nodes().collect();
        nodes.sort();
        assert_eq!(nodes, vec!["a", "b", "c"]);
        let pairs: Vec<(&str, &str)> = snap.edges().map(|e| (e.source, e.target)).collect();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("a", "b")));
    }
}
