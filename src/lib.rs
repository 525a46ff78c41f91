// =============================================================================
// Pair Signals — technical-analysis signal engine for spot crypto pairs
// =============================================================================
//
// Candle history in, one `SignalData` record per symbol out:
//   indicators   EMA, RSI, MACD over closing prices
//   market_data  candle normalisation, session windows, data-source traits
//   analysis     level / structure, divergence & momentum, continuation
//   engine       per-symbol aggregation and fault-tolerant batch runs
//   binance      public REST candle and symbol source
//   api          read-only JSON view of the latest batch
// =============================================================================

pub mod analysis;
pub mod api;
pub mod app_state;
pub mod binance;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod runtime_config;
pub mod types;

pub use engine::{BatchReport, SignalData, SignalEngine, SymbolFailure};
pub use error::{ErrorKind, SignalError, SignalResult};
