// fraudsig/src/events.rs
//
// Shared domain types flowing through fraudsig: inbound transactions,
// per-analyzer results, and the signatures handed to downstream consumers.
// Field names on `Transaction` follow the upstream ingestion feed and must
// stay in sync with it (serde is the wire contract).

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::SignatureError;

// ── Inbound transactions ──────────────────────────────────────────────────────

/// One fund transfer from the ingestion feed. Amounts are positive decimals
/// carried as f64; anything non-finite or <= 0 is rejected on ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender_account_id:   String,
    pub receiver_account_id: String,
    pub amount:              f64,
    pub booking_time:        DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
        booking_time: DateTime<Utc>,
    ) -> Self {
        Self {
            sender_account_id:   sender.into(),
            receiver_account_id: receiver.into(),
            amount,
            booking_time,
        }
    }

    pub fn validate(&self) -> Result<(), SignatureError> {
        if self.sender_account_id.is_empty() || self.receiver_account_id.is_empty() {
            return Err(SignatureError::InvalidTransaction("empty account id".into()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(SignatureError::InvalidTransaction(format!(
                "amount must be positive, got {} ({} → {})",
                self.amount, self.sender_account_id, self.receiver_account_id
            )));
        }
        Ok(())
    }
}

// ── Analyzer results ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleResult {
    pub is_in_cycle:  bool,
    pub cycle_length: usize,
    pub cycle_risk:   f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommunityResult {
    pub density:    f64,
    pub size:       usize,
    pub risk_score: f64,
}

impl Default for CommunityResult {
    /// A node nobody has seen is its own singleton community.
    fn default() -> Self {
        Self { density: 0.0, size: 1, risk_score: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TemporalResult {
    pub tx_per_hour:    f64,
    pub high_velocity:  bool,
    pub velocity_score: f64,
}

/// Raw per-node metrics, as returned by `get_node_metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub cycles:    CycleResult,
    pub community: CommunityResult,
    pub temporal:  TemporalResult,
}

// ── Risk vector ───────────────────────────────────────────────────────────────

/// Named subscores with unique keys. Iteration order is insertion order,
/// which the composer uses as evaluation order (cycle, community, temporal).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RiskVector {
    entries: Vec<(String, f64)>,
}

impl RiskVector {
    pub fn new() -> Self { Self::default() }

    /// Insert or overwrite. Overwriting keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None        => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl<K: Into<String>> FromIterator<(K, f64)> for RiskVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut v = RiskVector::new();
        for (k, score) in iter {
            v.insert(k, score);
        }
        v
    }
}

impl Serialize for RiskVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ── Signatures ────────────────────────────────────────────────────────────────

/// Composed, explainable risk output for one account at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudSignature {
    pub fraud_tag:            String,
    pub risk_vector:          RiskVector,
    pub contributing_factors: Vec<String>,
    pub timestamp:            DateTime<Utc>,
}

impl FraudSignature {
    /// Zero-signal signature: returned for degraded computations.
    pub fn unknown(now: DateTime<Utc>) -> Self {
        Self {
            fraud_tag:            crate::engine::composer::TAG_UNKNOWN.to_string(),
            risk_vector:          RiskVector::new(),
            contributing_factors: Vec::new(),
            timestamp:            now,
        }
    }
}

/// Where a signature came from. Lets callers tell "no risk detected" apart
/// from "computation degraded" without losing the availability-first default.
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureSource {
    Cached,
    Computed,
    Degraded(String),
}

impl std::fmt::Display for SignatureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cached        => write!(f, "cached"),
            Self::Computed      => write!(f, "computed"),
            Self::Degraded(why) => write!(f, "degraded({})", why),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureOutcome {
    pub signature: FraudSignature,
    pub source:    SignatureSource,
}

impl SignatureOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self.source, SignatureSource::Degraded(_))
    }
}

/// RiskEngine output. Same shape as `FraudSignature`, with a single
/// `network_risk` entry in the risk vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskOutput {
    pub fraud_tag:            String,
    pub risk_vector:          RiskVector,
    pub contributing_factors: Vec<String>,
    pub timestamp:            DateTime<Utc>,
}

impl RiskOutput {
    pub fn network_risk(&self) -> f64 {
        self.risk_vector.get(crate::engine::risk::NETWORK_RISK).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_transaction_rejects_non_positive_amount() {
        assert!(Transaction::new("a", "b", 10.0, ts()).validate().is_ok());
        assert!(Transaction::new("a", "b", 0.0, ts()).validate().is_err());
        assert!(Transaction::new("a", "b", -5.0, ts()).validate().is_err());
        assert!(Transaction::new("a", "b", f64::NAN, ts()).validate().is_err());
        assert!(Transaction::new("", "b", 1.0, ts()).validate().is_err());
    }

    #[test]
    fn test_transaction_parses_feed_record() {
        let line = r#"{"sender_account_id":"ACC1","receiver_account_id":"ACC2",
                       "amount":125.5,"booking_time":"2024-03-01T10:00:00Z"}"#;
        let tx: Transaction = serde_json::from_str(line).unwrap();
        assert_eq!(tx.sender_account_id, "ACC1");
        assert_eq!(tx.receiver_account_id, "ACC2");
        assert_eq!(tx.amount, 125.5);
        assert_eq!(tx.booking_time, ts());
    }

    #[test]
    fn test_risk_vector_keeps_insertion_order() {
        let mut v = RiskVector::new();
        v.insert("circular_flow_risk", 0.4);
        v.insert("velocity_risk", 0.9);
        v.insert("circular_flow_risk", 0.6);

        let keys: Vec<&str> = v.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["circular_flow_risk", "velocity_risk"]);
        assert_eq!(v.get("circular_flow_risk"), Some(0.6));
        assert_eq!(v.len(), 2);

        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"circular_flow_risk":0.6,"velocity_risk":0.9}"#);
    }

    #[test]
    fn test_default_community_is_singleton() {
        let c = CommunityResult::default();
        assert_eq!(c.size, 1);
        assert_eq!(c.density, 0.0);
    }
}
