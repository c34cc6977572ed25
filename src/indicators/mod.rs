//! Pure technical-indicator functions over an OHLC slice.
//!
//! Every function returns a vector whose length equals the input, with
//! leading `None`s until enough data is available; the value at index `i`
//! is computed from candles `[0..=i]` only. Determinism is a contract:
//! identical input slices yield bit-identical output.

pub mod momentum;
pub mod overlap;
pub mod trend;
pub mod volatility;

pub use momentum::rsi;
pub use overlap::{bollinger, sma, std_dev, BollingerBands};
pub use trend::{adx, DirectionalIndex};
pub use volatility::{atr, true_range};
