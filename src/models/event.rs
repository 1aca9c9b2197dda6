//! Risk event record and lifecycle

use super::EventMetadata;
use crate::risk::RiskError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of risk-relevant occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskEventType {
    StopLoss,
    TakeProfit,
    PositionSize,
    VolatilityAlert,
    LiquidityAlert,
    PriceDeviation,
    PortfolioLimit,
    LeverageAlert,
    Custom,
}

/// Event severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Lifecycle status of a risk event
///
/// Transitions are one-way except Open ↔ Escalated. Resolved and Ignored
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskEventStatus {
    Open,
    Resolved,
    Ignored,
    Escalated,
}

/// Broad event categorization used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventCategory {
    TradingRisk,
    PortfolioRisk,
    MarketRisk,
    SystemRisk,
    ComplianceRisk,
    Custom,
}

/// Immutable record of a risk-relevant occurrence
///
/// Never deleted; the event table is the audit trail. Status mutations go
/// through `resolve`/`acknowledge`/`escalate`/`ignore` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    /// Event identifier
    pub id: Uuid,
    /// Associated trading pair, e.g. "ETH/USDT"
    pub pair: Option<String>,
    /// Associated coin symbol
    pub coin: Option<String>,
    pub event_type: RiskEventType,
    pub severity: RiskSeverity,
    pub status: RiskEventStatus,
    /// Value that fired the event
    pub trigger_value: Decimal,
    /// Threshold in force when the event fired
    pub threshold_value: Decimal,
    /// Observed value at creation time
    pub current_value: Decimal,
    pub description: String,
    pub category: RiskEventCategory,
    /// Typed payload; `None` for events that carry no structured data
    pub metadata: Option<EventMetadata>,
    pub created_by: String,
    pub acknowledged_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl RiskEvent {
    /// Mark the event resolved. Terminal; sets `resolved_at` exactly once.
    pub fn resolve(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), RiskError> {
        match self.status {
            RiskEventStatus::Resolved | RiskEventStatus::Ignored => Err(RiskError::StateConflict(
                format!("event {} already closed as {:?}", self.id, self.status),
            )),
            _ => {
                self.status = RiskEventStatus::Resolved;
                self.resolved_at = Some(now);
                self.acknowledged_by = Some(actor.to_string());
                Ok(())
            }
        }
    }

    /// Acknowledge the event, returning an escalated event to Open.
    pub fn acknowledge(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), RiskError> {
        match self.status {
            RiskEventStatus::Resolved | RiskEventStatus::Ignored => Err(RiskError::StateConflict(
                format!("event {} already closed as {:?}", self.id, self.status),
            )),
            _ => {
                self.status = RiskEventStatus::Open;
                if self.acknowledged_at.is_none() {
                    self.acknowledged_at = Some(now);
                }
                self.acknowledged_by = Some(actor.to_string());
                Ok(())
            }
        }
    }

    /// Escalate an open event.
    pub fn escalate(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), RiskError> {
        match self.status {
            RiskEventStatus::Resolved | RiskEventStatus::Ignored => Err(RiskError::StateConflict(
                format!("event {} already closed as {:?}", self.id, self.status),
            )),
            _ => {
                self.status = RiskEventStatus::Escalated;
                if self.acknowledged_at.is_none() {
                    self.acknowledged_at = Some(now);
                }
                self.acknowledged_by = Some(actor.to_string());
                Ok(())
            }
        }
    }

    /// Mark the event ignored. Terminal.
    pub fn ignore(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), RiskError> {
        match self.status {
            RiskEventStatus::Resolved | RiskEventStatus::Ignored => Err(RiskError::StateConflict(
                format!("event {} already closed as {:?}", self.id, self.status),
            )),
            _ => {
                self.status = RiskEventStatus::Ignored;
                if self.acknowledged_at.is_none() {
                    self.acknowledged_at = Some(now);
                }
                self.acknowledged_by = Some(actor.to_string());
                Ok(())
            }
        }
    }

    /// True once the event reached a terminal status.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.status,
            RiskEventStatus::Resolved | RiskEventStatus::Ignored
        )
    }
}
