// =============================================================================
// External data contracts
// =============================================================================
//
// The signal engine never talks to an exchange directly.  It consumes these
// two traits; `binance::client::BinanceClient` is one implementation, tests
// supply in-memory ones.

use async_trait::async_trait;

use super::candle::Candle;
use crate::error::SignalResult;

/// Fetch an oldest-first candle series for `symbol` at `interval`.
///
/// Implementations return `SignalError::Upstream` for transport failures and
/// `SignalError::MalformedData` for payloads that do not normalise.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_candles(&self, symbol: &str, interval: &str) -> SignalResult<Vec<Candle>>;
}

/// List the instruments that can currently be analysed, most liquid first
/// when the implementation supports ranking.
#[async_trait]
pub trait SymbolSource: Send + Sync {
    async fn tradable_symbols(&self) -> SignalResult<Vec<String>>;
}
