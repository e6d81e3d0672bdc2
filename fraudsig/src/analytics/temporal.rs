// fraudsig/src/analytics/temporal.rs
//
// Transaction velocity for one account, from its own outgoing edges only —
// cheap enough to run per request, no whole-graph work.
//
//   buckets        = outgoing booking times grouped by UTC hour
//   window         = first bucket ..= last bucket (empty hours count)
//   tx_per_hour    = transactions / hours in window
//   velocity_score = r / (r + half_rate)       (0.5 at r = half_rate)
//   high_velocity  = velocity_score > 0.8      (r > 4·half_rate)

use std::collections::BTreeMap;

use crate::error::{Result, SignatureError};
use crate::events::TemporalResult;
use crate::state::graph::GraphSnapshot;

pub const HIGH_VELOCITY: f64 = 0.8;
const BUCKET_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct TemporalAnalyzer {
    half_rate: f64,
}

impl TemporalAnalyzer {
    pub fn new(half_rate: f64) -> Self {
        Self { half_rate }
    }

    pub fn velocity_score(&self, tx_per_hour: f64) -> f64 {
        if tx_per_hour <= 0.0 {
            return 0.0;
        }
        (tx_per_hour / (tx_per_hour + self.half_rate)).clamp(0.0, 1.0)
    }

    /// Outgoing transaction counts per UTC hour bucket.
    pub fn hourly_counts(snapshot: &GraphSnapshot, account_id: &str) -> Result<BTreeMap<i64, u64>> {
        let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
        for edge in snapshot.out_edges(account_id) {
            if edge.flow.timestamps.len() as u64 != edge.flow.tx_count {
                return Err(SignatureError::analytic(format!(
                    "edge {} → {} has {} timestamps for {} transactions",
                    edge.source, edge.target, edge.flow.timestamps.len(), edge.flow.tx_count
                )));
            }
            for ts in &edge.flow.timestamps {
                *buckets.entry(ts.timestamp().div_euclid(BUCKET_SECS)).or_insert(0) += 1;
            }
        }
        Ok(buckets)
    }

    pub fn analyze(&self, snapshot: &GraphSnapshot, account_id: &str) -> Result<TemporalResult> {
        let buckets = Self::hourly_counts(snapshot, account_id)?;
        let (Some((&first, _)), Some((&last, _))) = (buckets.first_key_value(), buckets.last_key_value())
        else {
            return Ok(TemporalResult::default());
        };

        let total: u64 = buckets.values().sum();
        let hours = (last - first + 1) as f64;
        let tx_per_hour = total as f64 / hours;
        if !tx_per_hour.is_finite() {
            return Err(SignatureError::analytic(format!(
                "non-finite velocity for {}: {} tx over {} h",
                account_id, total, hours
            )));
        }

        let velocity_score = self.velocity_score(tx_per_hour);
        Ok(TemporalResult {
            tx_per_hour,
            high_velocity: velocity_score > HIGH_VELOCITY,
            velocity_score,
        })
    }
}
