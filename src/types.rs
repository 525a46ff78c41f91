// =============================================================================
// Shared signal vocabulary
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of the prevailing trend, from EMA(14) vs EMA(70).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bullish,
    Bearish,
}

impl Trend {
    /// Classify from the latest fast/slow EMA values. A tie is bearish: the
    /// fast EMA has not yet cleared the slow one.
    pub fn from_emas(fast: f64, slow: f64) -> Self {
        if fast > slow {
            Self::Bullish
        } else {
            Self::Bearish
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Bullish => Self::Bearish,
            Self::Bearish => Self::Bullish,
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
        }
    }
}

/// Suggested manual action attached to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    /// The action that trades with `trend`.
    pub fn with_trend(trend: Trend) -> Self {
        match trend {
            Trend::Bullish => Self::Buy,
            Trend::Bearish => Self::Sell,
        }
    }

    /// The action that fades `trend`.
    pub fn against_trend(trend: Trend) -> Self {
        Self::with_trend(trend.opposite())
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Role of an inferred key price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Support,
    Resistance,
}

/// Direction implied by a price/RSI divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceType {
    /// Lower price low, higher RSI low.
    Bullish,
    /// Higher price high, lower RSI high.
    Bearish,
}
