pub mod market;
pub mod store;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// The one instrument this engine trades.
pub const SYMBOL: &str = "XAUUSD";

/// One OHLC bar. Identity is `(symbol, timeframe, timestamp)`; the symbol and
/// timeframe travel alongside the slice, not inside each bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Side {
    /// +1 for BUY, −1 for SELL. P&L is `(exit − entry) · sign · lot · 100`.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::str::FromStr for Side {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(EngineError::Validation(format!("unknown side: {other}"))),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candle duration. Serialized with the short store codes (`15m`, `daily`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "60m")]
    H1,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "60m",
            Timeframe::Daily => "daily",
            Timeframe::Weekly => "weekly",
            Timeframe::Monthly => "monthly",
        }
    }

    /// The upstream API's interval name for intraday series.
    pub fn api_interval(self) -> Option<&'static str> {
        match self {
            Timeframe::M1 => Some("1min"),
            Timeframe::M5 => Some("5min"),
            Timeframe::M15 => Some("15min"),
            Timeframe::M30 => Some("30min"),
            Timeframe::H1 => Some("60min"),
            _ => None,
        }
    }

    pub fn is_intraday(self) -> bool {
        self.api_interval().is_some()
    }
}

impl std::str::FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" | "1min" => Ok(Timeframe::M1),
            "5m" | "5min" => Ok(Timeframe::M5),
            "15m" | "15min" => Ok(Timeframe::M15),
            "30m" | "30min" => Ok(Timeframe::M30),
            "60m" | "60min" | "1h" => Ok(Timeframe::H1),
            "daily" | "1d" => Ok(Timeframe::Daily),
            "weekly" | "1w" => Ok(Timeframe::Weekly),
            "monthly" => Ok(Timeframe::Monthly),
            other => Err(EngineError::Validation(format!(
                "unknown timeframe: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much history the upstream returns per series call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSize {
    #[default]
    Compact,
    Full,
}

impl OutputSize {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_parses_both_code_styles() {
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!("15min".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!("daily".parse::<Timeframe>().unwrap(), Timeframe::Daily);
        assert!("2h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn intraday_maps_to_api_interval() {
        assert_eq!(Timeframe::M15.api_interval(), Some("15min"));
        assert_eq!(Timeframe::Daily.api_interval(), None);
        assert!(Timeframe::M1.is_intraday());
        assert!(!Timeframe::Weekly.is_intraday());
    }

    #[test]
    fn side_sign_and_opposite() {
        assert_eq!(Side::Buy.sign(), 1.0);
        assert_eq!(Side::Sell.sign(), -1.0);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::Sell);
        assert!("HOLD".parse::<Side>().is_err());
    }
}
