// fraudsig/src/error.rs
//
// Error kinds surfaced by the signature pipeline.
//
// Propagation policy:
//   NotInitialized             — fatal, always reaches the caller
//   AnalyticComputationFailure — recovered by the composer (default signature)
//   Configuration              — fatal, surfaced by weight/config loading
//   InvalidTransaction         — ingest-side rejection of a single record

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("graph store not initialized: no snapshot has been committed")]
    NotInitialized,

    #[error("analytic computation failed: {0}")]
    AnalyticComputationFailure(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SignatureError {
    pub fn analytic(msg: impl Into<String>) -> Self {
        Self::AnalyticComputationFailure(msg.into())
    }

    /// True for failures the composer is allowed to swallow.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AnalyticComputationFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, SignatureError>;
