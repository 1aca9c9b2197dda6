//! Persistent record types for the risk subsystem
//!
//! Plain data structs with their lifecycle rules; coordination logic lives
//! in the `risk` module.

mod approval;
mod daily_loss;
mod event;
mod metadata;
mod shutdown;
mod threshold;

pub use approval::{Approval, ApprovalLevel, ApprovalRequest, ApprovalStatus, Urgency};
pub use daily_loss::{DailyLossStatus, DailyLossTracking};
pub use event::{RiskEvent, RiskEventCategory, RiskEventStatus, RiskEventType, RiskSeverity};
pub use metadata::{EventMetadata, OrderSnapshot, PositionSnapshot, PreservedState};
pub use shutdown::{ShutdownPhase, ShutdownPriority, ShutdownReason, ShutdownRecord};
pub use threshold::{Environment, Threshold, ThresholdChange, ThresholdType};
