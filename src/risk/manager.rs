//! Integrated risk manager facade
//!
//! Composes the event logger, threshold store, daily loss manager, shutdown
//! controller, and confirmation manager into the single decision surface the
//! trading loop consumes. Unlike the daily loss manager, this layer fails
//! CLOSED: anything it cannot positively verify blocks trading.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    EventMetadata, RiskEventCategory, RiskEventType, RiskSeverity, ShutdownPhase,
    ShutdownPriority, ShutdownReason, Threshold, ThresholdType, Urgency,
};
use crate::notify::Notifier;
use crate::risk::confirmation::{ConfirmationManager, ConfirmationSettings, SubmitOutcome};
use crate::risk::daily_loss::{DailyLossManager, DailyLossSettings, DailySummary};
use crate::risk::events::{EventLoggerSettings, LogEventParams, RiskEventLogger};
use crate::risk::shutdown::{
    ShutdownController, ShutdownOutcome, ShutdownSettings, TradingStateProvider,
};
use crate::risk::thresholds::{
    ComplianceStatus, ThresholdChangeOutcome, ThresholdSettings, ThresholdStore,
};
use crate::risk::types::{RiskCheckResult, RiskError, TradeProposal};
use crate::store::RiskStore;

/// Facade-level settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Trades above this fraction of the position-size limit need manual
    /// confirmation even when every hard check passes
    pub confirm_size_factor: Decimal,
    /// Daily loss beyond this fraction of the limit halves position sizing
    pub size_caution_factor: Decimal,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            confirm_size_factor: dec!(0.8),
            size_caution_factor: dec!(0.5),
        }
    }
}

/// Bundle of component settings used to build a [`RiskManager`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub manager: ManagerSettings,
    pub events: EventLoggerSettings,
    pub thresholds: ThresholdSettings,
    pub daily_loss: DailyLossSettings,
    pub shutdown: ShutdownSettings,
    pub confirmation: ConfirmationSettings,
}

/// Overall health reported by `get_risk_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Ok,
    Warning,
    Critical,
}

/// Snapshot of the whole risk subsystem
#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub overall: OverallStatus,
    pub trading_allowed: bool,
    pub shutdown_phase: ShutdownPhase,
    pub daily: Option<DailySummary>,
    pub open_events: usize,
    pub pending_approvals: usize,
    pub thresholds: HashMap<ThresholdType, Threshold>,
}

/// Portfolio-level trade statistics
#[derive(Debug, Clone, Serialize)]
pub struct RiskMetrics {
    pub total_trades: usize,
    pub win_rate_pct: Decimal,
    /// Gross profit over gross loss; `None` with no losing trades
    pub profit_factor: Option<Decimal>,
    /// Mean return over return standard deviation
    pub sharpe_ratio: f64,
    pub max_consecutive_losses: u32,
}

/// The single decision surface over the five risk components
pub struct RiskManager {
    settings: ManagerSettings,
    store: Arc<RiskStore>,
    events: Arc<RiskEventLogger>,
    thresholds: Arc<ThresholdStore>,
    daily_loss: Arc<DailyLossManager>,
    shutdown: Arc<ShutdownController>,
    confirmation: Arc<ConfirmationManager>,
}

impl RiskManager {
    pub fn new(
        settings: RiskSettings,
        notifier: Arc<dyn Notifier>,
        provider: Arc<dyn TradingStateProvider>,
    ) -> Self {
        let store = Arc::new(RiskStore::new());
        let events = Arc::new(RiskEventLogger::new(
            store.clone(),
            notifier.clone(),
            settings.events,
        ));
        let thresholds = Arc::new(ThresholdStore::new(settings.thresholds, events.clone()));
        let daily_loss = Arc::new(DailyLossManager::new(
            store.clone(),
            thresholds.clone(),
            events.clone(),
            settings.daily_loss,
        ));
        let shutdown = Arc::new(ShutdownController::new(
            provider,
            events.clone(),
            thresholds.clone(),
            settings.shutdown,
        ));
        let confirmation = Arc::new(ConfirmationManager::new(
            settings.confirmation,
            events.clone(),
            notifier,
        ));
        Self {
            settings: settings.manager,
            store,
            events,
            thresholds,
            daily_loss,
            shutdown,
            confirmation,
        }
    }

    pub fn store(&self) -> &Arc<RiskStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<RiskEventLogger> {
        &self.events
    }

    pub fn thresholds(&self) -> &Arc<ThresholdStore> {
        &self.thresholds
    }

    pub fn daily_loss(&self) -> &Arc<DailyLossManager> {
        &self.daily_loss
    }

    pub fn shutdown(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }

    pub fn confirmation(&self) -> &Arc<ConfirmationManager> {
        &self.confirmation
    }

    /// Short-circuit conjunction over every gate.
    ///
    /// Fails closed: a gate that cannot be evaluated counts as a denial.
    pub fn is_trading_allowed(&self) -> bool {
        self.is_trading_allowed_at(Utc::now())
    }

    pub fn is_trading_allowed_at(&self, now: DateTime<Utc>) -> bool {
        !self.shutdown.is_trading_blocked()
            && !self.daily_loss.is_trading_halted_at(now)
            && !self.thresholds.has_blocking_violation()
    }

    /// Layered vetting of one trade proposal.
    pub fn check_risk_limits(&self, proposal: &TradeProposal) -> RiskCheckResult {
        self.check_risk_limits_at(proposal, Utc::now())
    }

    pub fn check_risk_limits_at(
        &self,
        proposal: &TradeProposal,
        now: DateTime<Utc>,
    ) -> RiskCheckResult {
        let mut result = RiskCheckResult::allowed();

        if self.shutdown.is_trading_blocked() {
            result.violation(format!(
                "trading blocked: shutdown phase is {:?}",
                self.shutdown.phase()
            ));
        }
        if self.daily_loss.is_trading_halted_at(now) {
            result.violation("trading halted: daily loss limit reached");
        }
        if proposal.account_balance <= Decimal::ZERO {
            result.violation("account balance must be positive");
            return result;
        }
        if proposal.entry_price == proposal.stop_loss_price {
            result.violation("stop loss price equals entry price");
        }

        let size_limit = self.thresholds.get(ThresholdType::PositionSize);
        let size_pct = proposal.position_size / proposal.account_balance * dec!(100);
        match self.thresholds.check_compliance(ThresholdType::PositionSize, size_pct) {
            ComplianceStatus::Breach { threshold, .. } => {
                result.violation(format!(
                    "position is {size_pct:.2}% of balance, limit {threshold}%"
                ));
            }
            ComplianceStatus::Compliant => {
                if size_pct > size_limit.value * self.settings.confirm_size_factor {
                    result.warning(format!(
                        "position {size_pct:.2}% of balance approaches the {}% limit",
                        size_limit.value
                    ));
                }
            }
        }

        if let ComplianceStatus::Breach { threshold, .. } = self
            .thresholds
            .check_compliance(ThresholdType::Leverage, proposal.leverage)
        {
            result.violation(format!(
                "leverage {} exceeds limit {threshold}x",
                proposal.leverage
            ));
        }

        if let Some(summary) = self.daily_loss.daily_summary_at(now) {
            if summary.loss_pct > summary.max_loss_pct * self.settings.size_caution_factor {
                result.warning(format!(
                    "daily loss {:.2}% past half the {}% limit",
                    summary.loss_pct, summary.max_loss_pct
                ));
            }
        }

        if !result.allowed {
            metrics::counter!("risk_checks_rejected_total").increment(1);
            return result;
        }

        // Soft scaling: open severe events shrink the trade instead of
        // blocking it.
        let critical_open = self.store.open_events_at_or_above(RiskSeverity::Critical);
        let medium_open = self.store.open_events_at_or_above(RiskSeverity::Medium);
        let scale = if critical_open > 0 {
            dec!(0.1)
        } else if medium_open > 0 {
            dec!(0.5)
        } else {
            Decimal::ONE
        };
        if scale < Decimal::ONE {
            result.warning(format!(
                "open risk events scale the position by {scale}"
            ));
        }
        result.adjusted_position_size = Some(proposal.position_size * scale);

        // Large trades pass the checks but still wait for an operator.
        if size_pct > size_limit.value * self.settings.confirm_size_factor {
            if let Some(event_id) = self.events.log_at(
                LogEventParams {
                    event_type: RiskEventType::PositionSize,
                    severity: RiskSeverity::Medium,
                    category: RiskEventCategory::TradingRisk,
                    pair: Some(proposal.pair.clone()),
                    coin: None,
                    trigger_value: size_pct,
                    threshold_value: size_limit.value,
                    current_value: size_pct,
                    description: format!("large trade on {} awaiting confirmation", proposal.pair),
                    metadata: None,
                    created_by: "risk_manager".to_string(),
                },
                now,
            ) {
                match self.confirmation.submit_at(
                    event_id,
                    "execute_large_trade",
                    "risk_manager",
                    Urgency::High,
                    RiskSeverity::Medium,
                    now,
                ) {
                    Ok(SubmitOutcome::Pending { request_id })
                    | Ok(SubmitOutcome::AutoApproved { request_id }) => {
                        result.confirmation_request_id = Some(request_id);
                    }
                    Err(err) => {
                        // Fail closed: no confirmation channel, no trade
                        warn!(%err, "confirmation submission failed, blocking trade");
                        result.violation("confirmation required but unavailable");
                    }
                }
            }
        }

        result
    }

    /// Fixed-fractional position sizing, clamped through the risk pipeline.
    ///
    /// Risk budget is the position-size threshold share of the balance,
    /// halved once the day's loss passes the caution fraction of its limit.
    pub fn calculate_position_size(
        &self,
        entry_price: Decimal,
        stop_loss_price: Decimal,
        account_balance: Decimal,
    ) -> Result<Decimal, RiskError> {
        self.calculate_position_size_at(entry_price, stop_loss_price, account_balance, Utc::now())
    }

    pub fn calculate_position_size_at(
        &self,
        entry_price: Decimal,
        stop_loss_price: Decimal,
        account_balance: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, RiskError> {
        if account_balance <= Decimal::ZERO {
            return Err(RiskError::Validation(
                "account balance must be positive".to_string(),
            ));
        }
        let stop_distance = (entry_price - stop_loss_price).abs();
        if stop_distance.is_zero() {
            return Err(RiskError::Validation(
                "stop loss price equals entry price".to_string(),
            ));
        }

        let risk_pct = self.thresholds.get(ThresholdType::PositionSize).value;
        let mut risk_amount = account_balance * risk_pct / dec!(100);
        if let Some(summary) = self.daily_loss.daily_summary_at(now) {
            if summary.loss_pct > summary.max_loss_pct * self.settings.size_caution_factor {
                risk_amount *= dec!(0.5);
            }
        }
        Ok((risk_amount / stop_distance).max(Decimal::ZERO))
    }

    /// Trigger an emergency shutdown through the facade.
    pub fn emergency_shutdown(
        &self,
        reason: ShutdownReason,
        priority: ShutdownPriority,
        triggered_by: &str,
    ) -> Result<ShutdownOutcome, RiskError> {
        self.shutdown.trigger_shutdown(reason, priority, triggered_by)
    }

    /// Ask for trading to resume after a shutdown.
    ///
    /// Raises a resume-request event tied to the active shutdown and routes
    /// it through the confirmation workflow.
    pub fn request_trading_resume(
        &self,
        requested_by: &str,
        urgency: Urgency,
        severity: RiskSeverity,
    ) -> Result<SubmitOutcome, RiskError> {
        self.request_trading_resume_at(requested_by, urgency, severity, Utc::now())
    }

    pub fn request_trading_resume_at(
        &self,
        requested_by: &str,
        urgency: Urgency,
        severity: RiskSeverity,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, RiskError> {
        let record = self.shutdown.current_record().ok_or_else(|| {
            RiskError::StateConflict("no shutdown in force, nothing to resume".to_string())
        })?;

        let event_id = self
            .events
            .log_at(
                LogEventParams {
                    event_type: RiskEventType::Custom,
                    severity,
                    category: RiskEventCategory::SystemRisk,
                    pair: None,
                    coin: None,
                    trigger_value: Decimal::ZERO,
                    threshold_value: Decimal::ZERO,
                    current_value: Decimal::ZERO,
                    description: format!("resume requested after {:?} shutdown", record.reason),
                    metadata: Some(EventMetadata::ResumeRequest {
                        shutdown_event_id: record.event_id,
                        approval_request_id: Uuid::nil(),
                        urgency,
                        required_approvals: 0,
                        required_level: crate::models::ApprovalLevel::Level1,
                    }),
                    created_by: requested_by.to_string(),
                },
                now,
            )
            .ok_or_else(|| {
                RiskError::Internal("event logging disabled, cannot audit resume".to_string())
            })?;

        let outcome = self.confirmation.submit_at(
            event_id,
            "resume_trading",
            requested_by,
            urgency,
            severity,
            now,
        )?;

        // Backfill the request linkage into the event's metadata
        let (request_id, auto) = match &outcome {
            SubmitOutcome::AutoApproved { request_id } => (*request_id, true),
            SubmitOutcome::Pending { request_id } => (*request_id, false),
        };
        let request = self
            .confirmation
            .get_request(request_id)
            .ok_or_else(|| RiskError::Internal("submitted request vanished".to_string()))?;
        self.store.with_event_mut(event_id, |event| {
            if let Some(EventMetadata::ResumeRequest {
                approval_request_id,
                required_approvals,
                required_level,
                ..
            }) = &mut event.metadata
            {
                *approval_request_id = request_id;
                *required_approvals = request.required_approvals;
                *required_level = request.required_level;
            }
            Ok(())
        })?;

        if auto {
            // Auto-approval settles the resume immediately
            self.resolve_resume_events(event_id, record.event_id, requested_by, now)?;
        }
        info!(requested_by, ?urgency, auto, "trading resume requested");
        Ok(outcome)
    }

    fn resolve_resume_events(
        &self,
        resume_event_id: Uuid,
        shutdown_event_id: Uuid,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RiskError> {
        for id in [resume_event_id, shutdown_event_id] {
            match self.events.resolve_event_at(id, actor, now) {
                Ok(()) | Err(RiskError::StateConflict(_)) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    /// Apply a batch of threshold updates, one outcome per type.
    pub fn update_thresholds(
        &self,
        updates: HashMap<ThresholdType, Decimal>,
        changed_by: &str,
    ) -> Vec<(ThresholdType, Result<ThresholdChangeOutcome, RiskError>)> {
        updates
            .into_iter()
            .map(|(threshold_type, value)| {
                (
                    threshold_type,
                    self.thresholds.set(threshold_type, value, changed_by),
                )
            })
            .collect()
    }

    /// Judge market stress; extreme conditions shut trading down.
    ///
    /// Returns true when trading must stop.
    pub fn should_stop_trading(
        &self,
        volatility_pct: Decimal,
        liquidity_usd: Decimal,
    ) -> Result<bool, RiskError> {
        let outcome = self
            .shutdown
            .check_auto_shutdown(volatility_pct, liquidity_usd)?;
        Ok(outcome.is_some() || self.shutdown.is_trading_blocked())
    }

    /// Score one proposal's riskiness from current conditions.
    pub fn assess_trade_risk(
        &self,
        proposal: &TradeProposal,
        volatility_pct: Decimal,
    ) -> RiskSeverity {
        self.assess_trade_risk_at(proposal, volatility_pct, Utc::now())
    }

    pub fn assess_trade_risk_at(
        &self,
        proposal: &TradeProposal,
        volatility_pct: Decimal,
        now: DateTime<Utc>,
    ) -> RiskSeverity {
        let mut score = 0u32;

        let volatility_limit = self.thresholds.get(ThresholdType::Volatility).value;
        if volatility_pct > volatility_limit * dec!(1.5) {
            score += 2;
        } else if volatility_pct > volatility_limit {
            score += 1;
        }

        if proposal.account_balance > Decimal::ZERO {
            let size_pct = proposal.position_size / proposal.account_balance * dec!(100);
            let size_limit = self.thresholds.get(ThresholdType::PositionSize).value;
            if size_pct > size_limit * self.settings.confirm_size_factor {
                score += 1;
            }
        }

        if proposal.entry_price > Decimal::ZERO {
            let stop_pct =
                (proposal.entry_price - proposal.stop_loss_price).abs() / proposal.entry_price
                    * dec!(100);
            // A stop more than 10% away leaves too much room to bleed
            if stop_pct > dec!(10) {
                score += 1;
            }
        }

        if let Some(summary) = self.daily_loss.daily_summary_at(now) {
            if summary.loss_pct > summary.max_loss_pct * self.settings.size_caution_factor {
                score += 1;
            }
        }

        match score {
            0 => RiskSeverity::Low,
            1 => RiskSeverity::Medium,
            2 | 3 => RiskSeverity::High,
            _ => RiskSeverity::Critical,
        }
    }

    /// Maximum peak-to-trough drawdown over an equity curve, in percent.
    ///
    /// Crossing the drawdown threshold triggers an automatic shutdown.
    pub fn calculate_max_drawdown(&self, equity_curve: &[Decimal]) -> Result<Decimal, RiskError> {
        let mut peak = Decimal::ZERO;
        let mut max_drawdown = Decimal::ZERO;
        for &value in equity_curve {
            if value > peak {
                peak = value;
            }
            if peak > Decimal::ZERO {
                let drawdown = (peak - value) / peak * dec!(100);
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        let limit = self.thresholds.get(ThresholdType::MaxDrawdown).value;
        if max_drawdown > limit {
            warn!(%max_drawdown, %limit, "drawdown limit breached");
            self.shutdown.trigger_shutdown(
                ShutdownReason::DrawdownLimit,
                ShutdownPriority::Immediate,
                "risk_manager",
            )?;
        }
        Ok(max_drawdown)
    }

    /// Statistics over a sequence of realized trade results.
    pub fn get_risk_metrics(&self, trade_results: &[Decimal]) -> RiskMetrics {
        let total = trade_results.len();
        let wins = trade_results.iter().filter(|r| **r > Decimal::ZERO).count();
        let gross_profit: Decimal = trade_results
            .iter()
            .filter(|r| **r > Decimal::ZERO)
            .sum();
        let gross_loss: Decimal = trade_results
            .iter()
            .filter(|r| **r < Decimal::ZERO)
            .map(|r| -*r)
            .sum();

        let mut max_consecutive_losses = 0u32;
        let mut streak = 0u32;
        for result in trade_results {
            if *result < Decimal::ZERO {
                streak += 1;
                max_consecutive_losses = max_consecutive_losses.max(streak);
            } else {
                streak = 0;
            }
        }

        let returns: Vec<f64> = trade_results
            .iter()
            .map(|r| r.to_f64().unwrap_or(0.0))
            .collect();
        let sharpe_ratio = if returns.len() > 1 {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
                / (returns.len() - 1) as f64;
            let std_dev = variance.sqrt();
            if std_dev > 0.0 {
                mean / std_dev
            } else {
                0.0
            }
        } else {
            0.0
        };

        RiskMetrics {
            total_trades: total,
            win_rate_pct: if total == 0 {
                Decimal::ZERO
            } else {
                Decimal::from(wins as u64) / Decimal::from(total as u64) * dec!(100)
            },
            profit_factor: if gross_loss.is_zero() {
                None
            } else {
                Some(gross_profit / gross_loss)
            },
            sharpe_ratio,
            max_consecutive_losses,
        }
    }

    /// Aggregated view of the whole subsystem.
    pub fn get_risk_status(&self) -> RiskStatus {
        self.get_risk_status_at(Utc::now())
    }

    pub fn get_risk_status_at(&self, now: DateTime<Utc>) -> RiskStatus {
        let trading_allowed = self.is_trading_allowed_at(now);
        let phase = self.shutdown.phase();
        let open_events = self.store.event_statistics().open;
        let pending_approvals = self.confirmation.pending_requests().len();

        let overall = if phase != ShutdownPhase::Active
            || self.store.open_events_at_or_above(RiskSeverity::Critical) > 0
        {
            OverallStatus::Critical
        } else if !trading_allowed
            || open_events > 0
            || pending_approvals > 0
        {
            OverallStatus::Warning
        } else {
            OverallStatus::Ok
        };

        metrics::gauge!("risk_open_events").set(open_events as f64);
        metrics::gauge!("risk_pending_approvals").set(pending_approvals as f64);

        RiskStatus {
            overall,
            trading_allowed,
            shutdown_phase: phase,
            daily: self.daily_loss.daily_summary_at(now),
            open_events,
            pending_approvals,
            thresholds: self.thresholds.get_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Environment, PreservedState};
    use crate::notify::MemoryNotifier;
    use crate::risk::types::TradeSide;
    use chrono::TimeZone;

    struct NullProvider;

    impl TradingStateProvider for NullProvider {
        fn capture(&self) -> PreservedState {
            PreservedState {
                open_positions: Vec::new(),
                pending_orders: Vec::new(),
                portfolio_value: dec!(10000),
                taken_at: Utc::now(),
            }
        }

        fn restore(&self, _state: &PreservedState) {}
    }

    fn make_manager() -> RiskManager {
        let settings = RiskSettings {
            thresholds: ThresholdSettings {
                environment: Environment::Production,
                ..Default::default()
            },
            ..Default::default()
        };
        RiskManager::new(settings, Arc::new(MemoryNotifier::new()), Arc::new(NullProvider))
    }

    fn proposal(size: Decimal, balance: Decimal) -> TradeProposal {
        TradeProposal {
            pair: "ETH/USDT".to_string(),
            side: TradeSide::Buy,
            entry_price: dec!(2000),
            stop_loss_price: dec!(1900),
            position_size: size,
            leverage: dec!(1),
            account_balance: balance,
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, 0, 0).unwrap()
    }

    #[test]
    fn test_clean_state_allows_trading() {
        let manager = make_manager();
        assert!(manager.is_trading_allowed());
        let result = manager.check_risk_limits(&proposal(dec!(100), dec!(10000)));
        assert!(result.allowed);
        assert!(result.violations.is_empty());
        assert_eq!(result.adjusted_position_size, Some(dec!(100)));
    }

    #[test]
    fn test_daily_halt_blocks_the_gate() {
        let manager = make_manager();
        manager.daily_loss().record_valuation_at(dec!(10000), at(9));
        manager.daily_loss().record_valuation_at(dec!(9400), at(10));

        assert!(!manager.is_trading_allowed_at(at(11)));
        let result = manager.check_risk_limits_at(&proposal(dec!(100), dec!(9400)), at(11));
        assert!(!result.allowed);
        assert!(result
            .violations
            .iter()
            .any(|v| v.contains("daily loss")));
    }

    #[test]
    fn test_shutdown_blocks_the_gate() {
        let manager = make_manager();
        manager
            .emergency_shutdown(ShutdownReason::Manual, ShutdownPriority::Immediate, "op")
            .unwrap();
        assert!(!manager.is_trading_allowed());
    }

    #[test]
    fn test_recovery_phase_reopens_the_gate() {
        let manager = make_manager();
        manager
            .shutdown()
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "op",
                at(9),
            )
            .unwrap();
        assert!(!manager.is_trading_allowed_at(at(9)));

        // Cooldown is 300s; an hour later recovery may start
        manager.shutdown().attempt_recovery_at("op", at(10)).unwrap();
        assert_eq!(manager.shutdown().phase(), ShutdownPhase::Recovery);
        assert!(manager.is_trading_allowed_at(at(10)));
    }

    #[test]
    fn test_open_compliance_violation_closes_the_gate() {
        let manager = make_manager();
        assert!(manager.is_trading_allowed());
        manager.events().log(LogEventParams {
            event_type: RiskEventType::Custom,
            severity: RiskSeverity::High,
            category: RiskEventCategory::ComplianceRisk,
            pair: None,
            coin: None,
            trigger_value: dec!(9),
            threshold_value: dec!(5),
            current_value: dec!(9),
            description: "daily loss limit operating out of policy".to_string(),
            metadata: None,
            created_by: "compliance".to_string(),
        });
        assert!(!manager.is_trading_allowed());
    }

    #[test]
    fn test_oversized_position_is_a_violation() {
        let manager = make_manager();
        // 5% of balance against the 2% production limit
        let result = manager.check_risk_limits(&proposal(dec!(500), dec!(10000)));
        assert!(!result.allowed);
        assert!(result.violations.iter().any(|v| v.contains("position")));
    }

    #[test]
    fn test_excess_leverage_is_a_violation() {
        let manager = make_manager();
        let mut p = proposal(dec!(100), dec!(10000));
        p.leverage = dec!(5);
        let result = manager.check_risk_limits(&p);
        assert!(!result.allowed);
        assert!(result.violations.iter().any(|v| v.contains("leverage")));
    }

    #[test]
    fn test_open_critical_event_scales_size_down() {
        let manager = make_manager();
        manager.events().log(LogEventParams {
            event_type: RiskEventType::VolatilityAlert,
            severity: RiskSeverity::Critical,
            category: RiskEventCategory::MarketRisk,
            pair: None,
            coin: None,
            trigger_value: dec!(15),
            threshold_value: dec!(5),
            current_value: dec!(15),
            description: "extreme volatility".to_string(),
            metadata: None,
            created_by: "test".to_string(),
        });
        let result = manager.check_risk_limits(&proposal(dec!(100), dec!(10000)));
        assert!(result.allowed);
        assert_eq!(result.adjusted_position_size, Some(dec!(10.0)));
    }

    #[test]
    fn test_large_trade_requires_confirmation() {
        let manager = make_manager();
        // 1.8% of balance: inside the 2% limit but past the 80% factor
        let result = manager.check_risk_limits(&proposal(dec!(180), dec!(10000)));
        assert!(result.allowed);
        let request_id = result.confirmation_request_id.unwrap();
        assert!(manager.confirmation().get_request(request_id).is_some());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_position_sizing_fixed_fractional() {
        let manager = make_manager();
        // 2% of 10000 = 200 risk; stop distance 100 => 2 units
        let size = manager
            .calculate_position_size(dec!(2000), dec!(1900), dec!(10000))
            .unwrap();
        assert_eq!(size, dec!(2));

        assert!(matches!(
            manager.calculate_position_size(dec!(2000), dec!(2000), dec!(10000)),
            Err(RiskError::Validation(_))
        ));
        assert!(matches!(
            manager.calculate_position_size(dec!(2000), dec!(1900), Decimal::ZERO),
            Err(RiskError::Validation(_))
        ));
    }

    #[test]
    fn test_sizing_halves_under_daily_caution() {
        let manager = make_manager();
        manager.daily_loss().record_valuation_at(dec!(10000), at(9));
        // 3% loss: past half the 5% limit but not halted
        manager.daily_loss().record_valuation_at(dec!(9700), at(10));
        let size = manager
            .calculate_position_size_at(dec!(2000), dec!(1900), dec!(9700), at(11))
            .unwrap();
        assert_eq!(size, dec!(0.97));
    }

    #[test]
    fn test_resume_flow_with_manual_approval() {
        let manager = make_manager();
        let outcome = manager
            .emergency_shutdown(ShutdownReason::DailyLossLimit, ShutdownPriority::Graceful, "op")
            .unwrap();
        let shutdown_event_id = match outcome {
            ShutdownOutcome::Triggered { event_id } => event_id,
            other => panic!("expected trigger, got {other:?}"),
        };

        let outcome = manager
            .request_trading_resume("op", Urgency::High, RiskSeverity::High)
            .unwrap();
        let SubmitOutcome::Pending { request_id } = outcome else {
            panic!("expected pending approval");
        };

        manager
            .confirmation()
            .approve(request_id, "alice", crate::models::ApprovalLevel::Level2, None)
            .unwrap();
        let event = manager.store().get_event(shutdown_event_id).unwrap();
        assert_eq!(event.status, crate::models::RiskEventStatus::Resolved);
    }

    #[test]
    fn test_resume_auto_approves_low_severity() {
        let manager = make_manager();
        manager
            .emergency_shutdown(ShutdownReason::Manual, ShutdownPriority::Graceful, "op")
            .unwrap();
        let outcome = manager
            .request_trading_resume("op", Urgency::Low, RiskSeverity::Low)
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::AutoApproved { .. }));
        assert!(manager.confirmation().pending_requests().is_empty());
    }

    #[test]
    fn test_resume_without_shutdown_is_a_conflict() {
        let manager = make_manager();
        assert!(matches!(
            manager.request_trading_resume("op", Urgency::High, RiskSeverity::High),
            Err(RiskError::StateConflict(_))
        ));
    }

    #[test]
    fn test_drawdown_hook_triggers_shutdown() {
        let manager = make_manager();
        let curve = vec![dec!(10000), dec!(11000), dec!(9500), dec!(9800)];
        // Peak 11000, trough 9500: ~13.6% against the 10% limit
        let drawdown = manager.calculate_max_drawdown(&curve).unwrap();
        assert!(drawdown > dec!(13) && drawdown < dec!(14));
        assert_eq!(manager.shutdown().phase(), ShutdownPhase::Shutdown);
        assert_eq!(
            manager.shutdown().current_record().unwrap().reason,
            ShutdownReason::DrawdownLimit
        );
    }

    #[test]
    fn test_risk_metrics_over_trade_history() {
        let manager = make_manager();
        let metrics = manager.get_risk_metrics(&[
            dec!(100),
            dec!(-50),
            dec!(-30),
            dec!(-20),
            dec!(200),
            dec!(80),
        ]);
        assert_eq!(metrics.total_trades, 6);
        assert_eq!(metrics.win_rate_pct, dec!(50));
        assert_eq!(metrics.profit_factor, Some(dec!(3.8)));
        assert_eq!(metrics.max_consecutive_losses, 3);
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn test_risk_metrics_empty_history() {
        let manager = make_manager();
        let metrics = manager.get_risk_metrics(&[]);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate_pct, Decimal::ZERO);
        assert!(metrics.profit_factor.is_none());
    }

    #[test]
    fn test_assess_trade_risk_scoring() {
        let manager = make_manager();
        let p = proposal(dec!(100), dec!(10000));
        assert_eq!(manager.assess_trade_risk(&p, dec!(2)), RiskSeverity::Low);
        assert_eq!(manager.assess_trade_risk(&p, dec!(6)), RiskSeverity::Medium);

        let mut wide_stop = proposal(dec!(190), dec!(10000));
        wide_stop.stop_loss_price = dec!(1500);
        assert_eq!(
            manager.assess_trade_risk(&wide_stop, dec!(9)),
            RiskSeverity::Critical
        );
    }

    #[test]
    fn test_status_rolls_up_component_state() {
        let manager = make_manager();
        let status = manager.get_risk_status();
        assert_eq!(status.overall, OverallStatus::Ok);
        assert!(status.trading_allowed);

        manager
            .emergency_shutdown(ShutdownReason::Manual, ShutdownPriority::Immediate, "op")
            .unwrap();
        let status = manager.get_risk_status();
        assert_eq!(status.overall, OverallStatus::Critical);
        assert!(!status.trading_allowed);
        assert_eq!(status.shutdown_phase, ShutdownPhase::Shutdown);
    }
}
