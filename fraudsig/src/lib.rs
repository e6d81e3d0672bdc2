// fraudsig/src/lib.rs
//
// fraudsig: explainable fraud signatures over a transaction graph.
//
//   state::graph  → GraphStore, committed read-only snapshots
//   analytics     → SCC rings, Louvain communities, PageRank (batched),
//                   transaction velocity (per request)
//   engine        → TTL signature cache, composer, weighted risk

pub mod analytics;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ingest;
pub mod state;

pub use config::{EngineConfig, RiskWeights};
pub use engine::SignaturePipeline;
pub use error::{Result, SignatureError};
pub use events::{FraudSignature, NodeMetrics, RiskOutput, SignatureOutcome, SignatureSource, Transaction};
