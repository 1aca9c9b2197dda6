//! Risk management core
//!
//! Event logging, thresholds, daily loss tracking, emergency shutdown, and
//! the manual confirmation workflow, composed behind the `RiskManager`
//! facade.

pub mod confirmation;
pub mod daily_loss;
pub mod events;
pub mod manager;
pub mod shutdown;
pub mod thresholds;
mod types;

pub use confirmation::{
    ApprovalOutcome, ConfirmationManager, ConfirmationSettings, SubmitOutcome,
};
pub use daily_loss::{DailyLossManager, DailyLossSettings, DailySummary};
pub use events::{EventLoggerSettings, LogEventParams, NotificationRecord, RiskEventLogger};
pub use manager::{
    ManagerSettings, OverallStatus, RiskManager, RiskMetrics, RiskSettings, RiskStatus,
};
pub use shutdown::{
    ShutdownController, ShutdownOutcome, ShutdownSettings, TradingStateProvider,
};
pub use thresholds::{
    ComplianceStatus, ThresholdChangeOutcome, ThresholdSettings, ThresholdStore,
};
pub use types::{RiskCheckResult, RiskError, TradeProposal, TradeSide};
