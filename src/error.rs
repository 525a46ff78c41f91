// =============================================================================
// Error taxonomy for the signal engine
// =============================================================================
//
// Two families reach callers:
//   - Data:     malformed or insufficient candle input. The affected symbol
//             is skipped; the batch continues.
//   - Upstream: network / provider failure while fetching candles or the
//             symbol list.
//
// Degenerate indicator math (e.g. zero average loss feeding RSI) never
// surfaces as an error: it resolves through the saturation rule in
// `indicators::rsi`.
// =============================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure raised anywhere along a single symbol's pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("insufficient data: need {required} candles, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("malformed candle data: {0}")]
    MalformedData(String),

    #[error("upstream failure: {0}")]
    Upstream(String),
}

/// Coarse classification carried on batch failure entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Data,
    Upstream,
}

impl SignalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientData { .. } | Self::MalformedData(_) => ErrorKind::Data,
            Self::Upstream(_) => ErrorKind::Upstream,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedData(msg.into())
    }

    /// Guard used by detectors: `got` must be at least `required`.
    pub fn ensure_len(required: usize, got: usize) -> Result<(), Self> {
        if got < required {
            Err(Self::InsufficientData { required, got })
        } else {
            Ok(())
        }
    }
}

impl From<reqwest::Error> for SignalError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream(e.to_string())
    }
}

pub type SignalResult<T> = std::result::Result<T, SignalError>;
