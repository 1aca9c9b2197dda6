//! Risk management types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Risk management errors
#[derive(Debug, Error)]
pub enum RiskError {
    /// Input rejected before any state changed
    #[error("validation failed: {0}")]
    Validation(String),
    /// A value fell outside its allowed range
    #[error("value {value} outside [{min}, {max}]")]
    OutOfBounds {
        value: Decimal,
        min: Decimal,
        max: Decimal,
        /// Nearest in-range value, for callers that want to retry clamped
        clamped: Decimal,
    },
    /// Operation is invalid in the current lifecycle state
    #[error("state conflict: {0}")]
    StateConflict(String),
    /// Referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// The referenced request's deadline has passed
    #[error("expired: {0}")]
    Expired(String),
    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// A trade the risk engine is asked to vet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeProposal {
    pub pair: String,
    pub side: TradeSide,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    /// Proposed position size in quote currency
    pub position_size: Decimal,
    pub leverage: Decimal,
    pub account_balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Outcome of a layered risk check
#[derive(Debug, Clone, Serialize)]
pub struct RiskCheckResult {
    pub allowed: bool,
    /// Hard failures; any entry forces `allowed == false`
    pub violations: Vec<String>,
    /// Soft findings that do not block the trade
    pub warnings: Vec<String>,
    /// Proposed size after severity scaling, if the trade is allowed
    pub adjusted_position_size: Option<Decimal>,
    /// Set when the trade may proceed only after manual confirmation
    pub confirmation_request_id: Option<Uuid>,
}

impl RiskCheckResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            violations: Vec::new(),
            warnings: Vec::new(),
            adjusted_position_size: None,
            confirmation_request_id: None,
        }
    }

    pub fn violation(&mut self, message: impl Into<String>) {
        self.allowed = false;
        self.violations.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}
