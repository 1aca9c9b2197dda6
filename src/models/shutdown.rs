//! Emergency shutdown records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of the shutdown state machine
///
/// Active → Shutdown on trigger, Shutdown → Recovery on a recovery attempt,
/// Recovery → Active on completion or Recovery → Shutdown on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShutdownPhase {
    Active,
    Shutdown,
    Recovery,
}

/// Why a shutdown fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShutdownReason {
    Manual,
    DailyLossLimit,
    DrawdownLimit,
    MarketStress,
    SystemFailure,
    ExchangeOutage,
}

/// How aggressively open state gets unwound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShutdownPriority {
    Graceful,
    Immediate,
}

/// Audit record for one complete shutdown episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownRecord {
    pub event_id: Uuid,
    pub reason: ShutdownReason,
    pub priority: ShutdownPriority,
    pub triggered_by: String,
    pub triggered_at: DateTime<Utc>,
    pub recovery_attempts: u32,
    pub recovered_at: Option<DateTime<Utc>>,
}
