//! Ledger error types.

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while talking to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger not configured: {0}")]
    NotConfigured(String),

    #[error("Ledger RPC {function} returned {status}: {body}")]
    Rpc {
        function: String,
        status: u16,
        body: String,
    },

    #[error("Ledger rejected the operation: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Transport failures and 5xx/429 answers may succeed on a later attempt.
    /// A business rejection from the procedure never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Network(_) => true,
            LedgerError::Rpc { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// HTTP status reported by the ledger, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            LedgerError::Rpc { status, .. } => Some(*status),
            LedgerError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
