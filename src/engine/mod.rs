//! Engine control loops: the live session runner and the backtest replay.

pub mod backtest;
pub mod runner;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Risk tier selecting lot size and the stop-distance budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Conservative,
    Medium,
    Risky,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskTier {
    pub max_lot_size: f64,
    pub stop_loss_pips: f64,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Conservative => "conservative",
            RiskLevel::Medium => "medium",
            RiskLevel::Risky => "risky",
        }
    }

    pub fn tier(self) -> RiskTier {
        match self {
            RiskLevel::Conservative => RiskTier {
                max_lot_size: 0.01,
                stop_loss_pips: 200.0,
            },
            RiskLevel::Medium => RiskTier {
                max_lot_size: 0.05,
                stop_loss_pips: 300.0,
            },
            RiskLevel::Risky => RiskTier {
                max_lot_size: 0.10,
                stop_loss_pips: 500.0,
            },
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(RiskLevel::Conservative),
            "medium" => Ok(RiskLevel::Medium),
            "risky" => Ok(RiskLevel::Risky),
            other => Err(EngineError::Validation(format!(
                "unknown risk level: {other}"
            ))),
        }
    }
}

/// For XAUUSD, 10 pips = $1.
pub fn pips_to_price(pips: f64) -> f64 {
    pips / 10.0
}
