//! Typed event payloads
//!
//! Every risk event carries at most one of these variants. The tag survives
//! serialization so historical events deserialize back into the same shape.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApprovalLevel, RiskSeverity, ShutdownReason, ThresholdType, Urgency};

/// Snapshot of one open position at shutdown time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub pair: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
}

/// Snapshot of one pending order at shutdown time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub pair: String,
    pub side: String,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Trading state captured when a shutdown fires, restored on recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservedState {
    pub open_positions: Vec<PositionSnapshot>,
    pub pending_orders: Vec<OrderSnapshot>,
    pub portfolio_value: Decimal,
    pub taken_at: DateTime<Utc>,
}

/// Structured payload attached to a risk event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventMetadata {
    /// A threshold change awaiting (or past) approval
    ThresholdChangeRequest {
        threshold_type: ThresholdType,
        old_value: Decimal,
        new_value: Decimal,
        requested_by: String,
        approved: Option<bool>,
    },
    /// A request to resume trading after an emergency shutdown
    ResumeRequest {
        shutdown_event_id: Uuid,
        approval_request_id: Uuid,
        urgency: Urgency,
        required_approvals: u32,
        required_level: ApprovalLevel,
    },
    /// One recovery attempt against an active shutdown
    RecoveryAttempt {
        shutdown_event_id: Uuid,
        attempt: u32,
        initiated_by: String,
    },
    /// State preserved at shutdown time
    ShutdownSnapshot {
        reason: ShutdownReason,
        state: PreservedState,
    },
    /// Market conditions that tripped an automatic check
    MarketStress {
        volatility_pct: Decimal,
        liquidity_usd: Decimal,
        severity: RiskSeverity,
    },
    /// Free-form operator note
    Note { text: String },
}
