//! Risk threshold definitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// The risk limits the engine enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdType {
    DailyLoss,
    MaxDrawdown,
    PositionSize,
    Leverage,
    Volatility,
    Liquidity,
}

impl ThresholdType {
    pub const ALL: [ThresholdType; 6] = [
        ThresholdType::DailyLoss,
        ThresholdType::MaxDrawdown,
        ThresholdType::PositionSize,
        ThresholdType::Leverage,
        ThresholdType::Volatility,
        ThresholdType::Liquidity,
    ];
}

/// Deployment environment a threshold override applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Production,
    Staging,
    Development,
    Testing,
}

/// A single bounded threshold value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub value: Decimal,
    pub min_value: Decimal,
    pub max_value: Decimal,
    pub unit: &'static str,
    pub description: &'static str,
}

impl Threshold {
    /// True when `value` falls inside this threshold's allowed range.
    pub fn in_bounds(&self, value: Decimal) -> bool {
        value >= self.min_value && value <= self.max_value
    }

    /// Base threshold for the given type.
    pub fn default_for(threshold_type: ThresholdType) -> Threshold {
        match threshold_type {
            ThresholdType::DailyLoss => Threshold {
                value: dec!(5.0),
                min_value: dec!(0.1),
                max_value: dec!(20.0),
                unit: "%",
                description: "Maximum portfolio loss per UTC day",
            },
            ThresholdType::MaxDrawdown => Threshold {
                value: dec!(10.0),
                min_value: dec!(1.0),
                max_value: dec!(50.0),
                unit: "%",
                description: "Maximum drawdown from portfolio peak",
            },
            ThresholdType::PositionSize => Threshold {
                value: dec!(2.0),
                min_value: dec!(0.1),
                max_value: dec!(10.0),
                unit: "%",
                description: "Maximum single-position risk as share of balance",
            },
            ThresholdType::Leverage => Threshold {
                value: dec!(3.0),
                min_value: dec!(1.0),
                max_value: dec!(10.0),
                unit: "x",
                description: "Maximum account leverage",
            },
            ThresholdType::Volatility => Threshold {
                value: dec!(5.0),
                min_value: dec!(1.0),
                max_value: dec!(20.0),
                unit: "%",
                description: "Volatility level that flags market stress",
            },
            ThresholdType::Liquidity => Threshold {
                value: dec!(10000.0),
                min_value: dec!(1000.0),
                max_value: dec!(1000000.0),
                unit: "usd",
                description: "Minimum acceptable market liquidity",
            },
        }
    }
}

/// Audit record for one threshold change, applied or rejected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdChange {
    pub threshold_type: ThresholdType,
    pub environment: Environment,
    pub old_value: Decimal,
    pub new_value: Decimal,
    pub changed_by: String,
    pub approved: bool,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_sit_inside_their_bounds() {
        for threshold_type in ThresholdType::ALL {
            let t = Threshold::default_for(threshold_type);
            assert!(t.in_bounds(t.value), "{threshold_type:?} default out of bounds");
        }
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let t = Threshold::default_for(ThresholdType::DailyLoss);
        assert!(t.in_bounds(dec!(0.1)));
        assert!(t.in_bounds(dec!(20.0)));
        assert!(!t.in_bounds(dec!(20.01)));
        assert!(!t.in_bounds(dec!(0.09)));
    }
}
