pub mod candle;
pub mod session;
pub mod source;

// Re-export the common types for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::{check_series, normalize_klines, Candle, PriceColumns};
pub use session::{Clock, FixedClock, SessionConfig, SessionSchedule, SessionWindow, SystemClock};
pub use source::{CandleSource, SymbolSource};
