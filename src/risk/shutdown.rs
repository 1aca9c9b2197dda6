//! Emergency shutdown state machine
//!
//! Active → Shutdown → Recovery → Active, with Recovery able to fall back
//! to Shutdown. Trading state is captured at shutdown time and restored
//! only when recovery completes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    EventMetadata, PreservedState, RiskEventCategory, RiskEventType, RiskSeverity, ShutdownPhase,
    ShutdownPriority, ShutdownReason, ShutdownRecord, ThresholdType,
};
use crate::risk::events::{LogEventParams, RiskEventLogger};
use crate::risk::thresholds::ThresholdStore;
use crate::risk::RiskError;

const SHUTDOWN_HISTORY_CAP: usize = 1000;

/// Source of the trading state preserved across a shutdown
pub trait TradingStateProvider: Send + Sync {
    /// Snapshot open positions and pending orders.
    fn capture(&self) -> PreservedState;
    /// Put the captured state back when recovery completes.
    fn restore(&self, state: &PreservedState);
}

/// Settings for the shutdown controller
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// Minimum gap between consecutive shutdowns, and between a shutdown
    /// and the first recovery attempt
    pub cooldown_secs: i64,
    /// Volatility this many times over its threshold trips an automatic
    /// shutdown rather than a warning event
    pub auto_shutdown_volatility_factor: Decimal,
    /// Liquidity below threshold divided by this factor trips an automatic
    /// shutdown
    pub auto_shutdown_liquidity_factor: Decimal,
    /// When off, `check_auto_recovery` never suggests recovering
    pub enable_auto_recovery: bool,
    /// Portfolio gain over the preserved value, in percent, before an
    /// automatic recovery is suggested
    pub recovery_portfolio_gain_pct: Decimal,
    /// Minimum time in shutdown before an automatic recovery is suggested
    pub recovery_wait_secs: i64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            auto_shutdown_volatility_factor: dec!(2.0),
            auto_shutdown_liquidity_factor: dec!(2.0),
            enable_auto_recovery: false,
            recovery_portfolio_gain_pct: dec!(5.0),
            recovery_wait_secs: 3600,
        }
    }
}

/// Result of a trigger request
///
/// All three variants are successful calls; only genuine failures (a
/// poisoned invariant, a missing event) surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Triggered { event_id: Uuid },
    AlreadyShutdown,
    CooldownActive { remaining_secs: i64 },
}

struct ControllerState {
    phase: ShutdownPhase,
    current: Option<ShutdownRecord>,
    preserved: Option<PreservedState>,
    /// Event logged by the in-flight recovery attempt, if any
    recovery_event_id: Option<Uuid>,
    last_shutdown_at: Option<DateTime<Utc>>,
    history: VecDeque<ShutdownRecord>,
}

/// Drives the emergency shutdown lifecycle
pub struct ShutdownController {
    state: Mutex<ControllerState>,
    provider: Arc<dyn TradingStateProvider>,
    events: Arc<RiskEventLogger>,
    thresholds: Arc<ThresholdStore>,
    settings: RwLock<ShutdownSettings>,
}

impl ShutdownController {
    pub fn new(
        provider: Arc<dyn TradingStateProvider>,
        events: Arc<RiskEventLogger>,
        thresholds: Arc<ThresholdStore>,
        settings: ShutdownSettings,
    ) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                phase: ShutdownPhase::Active,
                current: None,
                preserved: None,
                recovery_event_id: None,
                last_shutdown_at: None,
                history: VecDeque::new(),
            }),
            provider,
            events,
            thresholds,
            settings: RwLock::new(settings),
        }
    }

    /// Replace the controller settings at runtime.
    pub fn update_configuration(&self, settings: ShutdownSettings) {
        let mut current = self.settings.write().unwrap_or_else(|e| e.into_inner());
        info!(cooldown_secs = settings.cooldown_secs, "shutdown settings updated");
        *current = settings;
    }

    fn settings(&self) -> ShutdownSettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).phase
    }

    /// True only while the shutdown itself is in force. A recovery in
    /// progress trades again; only cancellation re-blocks.
    pub fn is_trading_blocked(&self) -> bool {
        self.phase() == ShutdownPhase::Shutdown
    }

    /// Trigger an emergency shutdown.
    pub fn trigger_shutdown(
        &self,
        reason: ShutdownReason,
        priority: ShutdownPriority,
        triggered_by: &str,
    ) -> Result<ShutdownOutcome, RiskError> {
        self.trigger_shutdown_at(reason, priority, triggered_by, Utc::now())
    }

    pub fn trigger_shutdown_at(
        &self,
        reason: ShutdownReason,
        priority: ShutdownPriority,
        triggered_by: &str,
        now: DateTime<Utc>,
    ) -> Result<ShutdownOutcome, RiskError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.phase != ShutdownPhase::Active {
            return Ok(ShutdownOutcome::AlreadyShutdown);
        }
        if let Some(last) = state.last_shutdown_at {
            let elapsed = now - last;
            let cooldown = Duration::seconds(self.settings().cooldown_secs);
            if elapsed < cooldown {
                let remaining_secs = (cooldown - elapsed).num_seconds().max(1);
                return Ok(ShutdownOutcome::CooldownActive { remaining_secs });
            }
        }

        let preserved = self.provider.capture();
        let event_id = self
            .events
            .log_at(
                LogEventParams {
                    event_type: RiskEventType::Custom,
                    severity: event_severity(reason),
                    category: RiskEventCategory::SystemRisk,
                    pair: None,
                    coin: None,
                    trigger_value: preserved.portfolio_value,
                    threshold_value: Decimal::ZERO,
                    current_value: preserved.portfolio_value,
                    description: format!("emergency shutdown: {reason:?} ({priority:?})"),
                    metadata: Some(EventMetadata::ShutdownSnapshot {
                        reason,
                        state: preserved.clone(),
                    }),
                    created_by: triggered_by.to_string(),
                },
                now,
            )
            .ok_or_else(|| {
                RiskError::Internal("event logging disabled, refusing unaudited shutdown".to_string())
            })?;

        state.phase = ShutdownPhase::Shutdown;
        state.last_shutdown_at = Some(now);
        state.preserved = Some(preserved);
        state.current = Some(ShutdownRecord {
            event_id,
            reason,
            priority,
            triggered_by: triggered_by.to_string(),
            triggered_at: now,
            recovery_attempts: 0,
            recovered_at: None,
        });
        drop(state);

        error!(?reason, ?priority, triggered_by, event_id = %event_id, "EMERGENCY SHUTDOWN");
        metrics::counter!("risk_shutdowns_total").increment(1);
        Ok(ShutdownOutcome::Triggered { event_id })
    }

    /// Begin recovery from an active shutdown.
    ///
    /// Blocked until the cooldown measured from the shutdown has passed.
    pub fn attempt_recovery(&self, initiated_by: &str) -> Result<u32, RiskError> {
        self.attempt_recovery_at(initiated_by, Utc::now())
    }

    pub fn attempt_recovery_at(
        &self,
        initiated_by: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, RiskError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.phase != ShutdownPhase::Shutdown {
            return Err(RiskError::StateConflict(format!(
                "recovery requires shutdown phase, currently {:?}",
                state.phase
            )));
        }
        let record = state
            .current
            .as_mut()
            .ok_or_else(|| RiskError::Internal("shutdown phase without a record".to_string()))?;

        let elapsed = now - record.triggered_at;
        let cooldown = Duration::seconds(self.settings().cooldown_secs);
        if elapsed < cooldown {
            return Err(RiskError::StateConflict(format!(
                "recovery cooldown active, {}s remaining",
                (cooldown - elapsed).num_seconds().max(1)
            )));
        }

        record.recovery_attempts += 1;
        let attempt = record.recovery_attempts;
        let shutdown_event_id = record.event_id;
        state.phase = ShutdownPhase::Recovery;
        drop(state);

        let recovery_event_id = self.events.log_at(
            LogEventParams {
                event_type: RiskEventType::Custom,
                severity: RiskSeverity::High,
                category: RiskEventCategory::SystemRisk,
                pair: None,
                coin: None,
                trigger_value: Decimal::from(attempt),
                threshold_value: Decimal::ZERO,
                current_value: Decimal::from(attempt),
                description: format!("recovery attempt {attempt} started"),
                metadata: Some(EventMetadata::RecoveryAttempt {
                    shutdown_event_id,
                    attempt,
                    initiated_by: initiated_by.to_string(),
                }),
                created_by: initiated_by.to_string(),
            },
            now,
        );
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recovery_event_id = recovery_event_id;
        info!(initiated_by, attempt, "recovery attempt started");
        Ok(attempt)
    }

    /// Finish recovery: restore the preserved state and return to Active.
    pub fn complete_recovery(&self, actor: &str) -> Result<(), RiskError> {
        self.complete_recovery_at(actor, Utc::now())
    }

    pub fn complete_recovery_at(&self, actor: &str, now: DateTime<Utc>) -> Result<(), RiskError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.phase != ShutdownPhase::Recovery {
            return Err(RiskError::StateConflict(format!(
                "completion requires recovery phase, currently {:?}",
                state.phase
            )));
        }
        let preserved = state
            .preserved
            .take()
            .ok_or_else(|| RiskError::Internal("recovery phase without preserved state".to_string()))?;
        let mut record = state
            .current
            .take()
            .ok_or_else(|| RiskError::Internal("recovery phase without a record".to_string()))?;

        self.provider.restore(&preserved);
        record.recovered_at = Some(now);
        let event_id = record.event_id;
        let recovery_event_id = state.recovery_event_id.take();
        if state.history.len() >= SHUTDOWN_HISTORY_CAP {
            state.history.pop_front();
        }
        state.history.push_back(record);
        state.phase = ShutdownPhase::Active;
        drop(state);

        if let Some(recovery_event_id) = recovery_event_id {
            match self.events.resolve_event_at(recovery_event_id, actor, now) {
                Ok(()) | Err(RiskError::StateConflict(_)) => {}
                Err(other) => return Err(other),
            }
        }
        match self.events.resolve_event_at(event_id, actor, now) {
            // The approval workflow may have resolved the event already
            Ok(()) | Err(RiskError::StateConflict(_)) => {}
            Err(other) => return Err(other),
        }
        info!(actor, event_id = %event_id, "recovery complete, trading active");
        Ok(())
    }

    /// Abandon an in-flight recovery and fall back to shutdown.
    ///
    /// The preserved state stays intact for the next attempt.
    pub fn cancel_recovery(&self, actor: &str) -> Result<(), RiskError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.phase != ShutdownPhase::Recovery {
            return Err(RiskError::StateConflict(format!(
                "cancellation requires recovery phase, currently {:?}",
                state.phase
            )));
        }
        state.phase = ShutdownPhase::Shutdown;
        let recovery_event_id = state.recovery_event_id.take();
        drop(state);

        if let Some(recovery_event_id) = recovery_event_id {
            self.events.ignore_event(recovery_event_id, actor)?;
        }
        warn!(actor, "recovery cancelled, back to shutdown");
        Ok(())
    }

    /// Judge market conditions and shut down automatically when they are far
    /// past the thresholds. A plain breach only records a stress event.
    pub fn check_auto_shutdown(
        &self,
        volatility_pct: Decimal,
        liquidity_usd: Decimal,
    ) -> Result<Option<ShutdownOutcome>, RiskError> {
        self.check_auto_shutdown_at(volatility_pct, liquidity_usd, Utc::now())
    }

    pub fn check_auto_shutdown_at(
        &self,
        volatility_pct: Decimal,
        liquidity_usd: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<ShutdownOutcome>, RiskError> {
        let volatility_limit = self.thresholds.get(ThresholdType::Volatility).value;
        let liquidity_floor = self.thresholds.get(ThresholdType::Liquidity).value;

        let settings = self.settings();
        let volatility_critical =
            volatility_pct > volatility_limit * settings.auto_shutdown_volatility_factor;
        let liquidity_critical =
            liquidity_usd * settings.auto_shutdown_liquidity_factor < liquidity_floor;

        if volatility_critical || liquidity_critical {
            let outcome = self.trigger_shutdown_at(
                ShutdownReason::MarketStress,
                ShutdownPriority::Immediate,
                "auto_shutdown_monitor",
                now,
            )?;
            return Ok(Some(outcome));
        }

        if volatility_pct > volatility_limit || liquidity_usd < liquidity_floor {
            self.events.log_at(
                LogEventParams {
                    event_type: if volatility_pct > volatility_limit {
                        RiskEventType::VolatilityAlert
                    } else {
                        RiskEventType::LiquidityAlert
                    },
                    severity: RiskSeverity::Medium,
                    category: RiskEventCategory::MarketRisk,
                    pair: None,
                    coin: None,
                    trigger_value: volatility_pct,
                    threshold_value: volatility_limit,
                    current_value: volatility_pct,
                    description: "market stress near shutdown conditions".to_string(),
                    metadata: Some(EventMetadata::MarketStress {
                        volatility_pct,
                        liquidity_usd,
                        severity: RiskSeverity::Medium,
                    }),
                    created_by: "auto_shutdown_monitor".to_string(),
                },
                now,
            );
        }
        Ok(None)
    }

    /// Pure comparison: should an automatic recovery be attempted now?
    ///
    /// True only in the shutdown phase with auto recovery enabled, once the
    /// wait period has passed and the portfolio has regained the configured
    /// margin over its preserved value. Makes no state change.
    pub fn check_auto_recovery(&self, portfolio_value: Decimal) -> bool {
        self.check_auto_recovery_at(portfolio_value, Utc::now())
    }

    pub fn check_auto_recovery_at(&self, portfolio_value: Decimal, now: DateTime<Utc>) -> bool {
        let settings = self.settings();
        if !settings.enable_auto_recovery {
            return false;
        }
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.phase != ShutdownPhase::Shutdown {
            return false;
        }
        let (Some(record), Some(preserved)) = (&state.current, &state.preserved) else {
            return false;
        };
        if now - record.triggered_at < Duration::seconds(settings.recovery_wait_secs) {
            return false;
        }
        let required = preserved.portfolio_value
            * (Decimal::ONE + settings.recovery_portfolio_gain_pct / dec!(100));
        portfolio_value >= required
    }

    /// Record of the shutdown currently in force, if any.
    pub fn current_record(&self) -> Option<ShutdownRecord> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current
            .clone()
    }

    /// Completed shutdown episodes, oldest first.
    pub fn history(&self) -> Vec<ShutdownRecord> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .history
            .iter()
            .cloned()
            .collect()
    }

    /// Completed episodes triggered within the trailing window, oldest first.
    pub fn history_in_window(&self, days: i64) -> Vec<ShutdownRecord> {
        self.history_in_window_at(days, Utc::now())
    }

    pub fn history_in_window_at(&self, days: i64, now: DateTime<Utc>) -> Vec<ShutdownRecord> {
        let cutoff = now - Duration::days(days.max(0));
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .history
            .iter()
            .filter(|r| r.triggered_at >= cutoff)
            .cloned()
            .collect()
    }
}

/// Severity of the shutdown's audit event, graded by what forced it.
///
/// External failures are critical, limit breaches high, an operator's own
/// call only medium; a routine manual stop must not sit in the log as an
/// open critical event.
fn event_severity(reason: ShutdownReason) -> RiskSeverity {
    match reason {
        ShutdownReason::MarketStress
        | ShutdownReason::SystemFailure
        | ShutdownReason::ExchangeOutage => RiskSeverity::Critical,
        ShutdownReason::DailyLossLimit | ShutdownReason::DrawdownLimit => RiskSeverity::High,
        ShutdownReason::Manual => RiskSeverity::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Environment, OrderSnapshot, PositionSnapshot};
    use crate::notify::MemoryNotifier;
    use crate::risk::events::EventLoggerSettings;
    use crate::risk::thresholds::ThresholdSettings;
    use crate::store::RiskStore;
    use chrono::TimeZone;

    struct FakeProvider {
        restored: Mutex<Vec<PreservedState>>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                restored: Mutex::new(Vec::new()),
            }
        }
    }

    impl TradingStateProvider for FakeProvider {
        fn capture(&self) -> PreservedState {
            PreservedState {
                open_positions: vec![PositionSnapshot {
                    pair: "DOT/USDT".to_string(),
                    quantity: dec!(100),
                    entry_price: dec!(6.5),
                    current_price: dec!(6.2),
                }],
                pending_orders: vec![OrderSnapshot {
                    order_id: "o-1".to_string(),
                    pair: "DOT/USDT".to_string(),
                    side: "SELL".to_string(),
                    quantity: dec!(50),
                    price: dec!(7.0),
                }],
                portfolio_value: dec!(10000),
                taken_at: Utc::now(),
            }
        }

        fn restore(&self, state: &PreservedState) {
            self.restored
                .lock()
                .unwrap()
                .push(state.clone());
        }
    }

    fn make_controller() -> (ShutdownController, Arc<FakeProvider>, Arc<RiskStore>) {
        let store = Arc::new(RiskStore::new());
        let events = Arc::new(RiskEventLogger::new(
            store.clone(),
            Arc::new(MemoryNotifier::new()),
            EventLoggerSettings::default(),
        ));
        let thresholds = Arc::new(ThresholdStore::new(
            ThresholdSettings {
                environment: Environment::Production,
                ..Default::default()
            },
            events.clone(),
        ));
        let provider = Arc::new(FakeProvider::new());
        (
            ShutdownController::new(
                provider.clone(),
                events,
                thresholds,
                ShutdownSettings::default(),
            ),
            provider,
            store,
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_full_shutdown_recovery_cycle() {
        let (controller, provider, store) = make_controller();
        assert_eq!(controller.phase(), ShutdownPhase::Active);

        let outcome = controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(0),
            )
            .unwrap();
        let event_id = match outcome {
            ShutdownOutcome::Triggered { event_id } => event_id,
            other => panic!("expected trigger, got {other:?}"),
        };
        assert_eq!(controller.phase(), ShutdownPhase::Shutdown);
        assert!(controller.is_trading_blocked());

        // Recovery blocked inside the cooldown
        assert!(controller.attempt_recovery_at("operator", at(100)).is_err());

        let attempt = controller.attempt_recovery_at("operator", at(301)).unwrap();
        assert_eq!(attempt, 1);
        assert_eq!(controller.phase(), ShutdownPhase::Recovery);

        controller.complete_recovery_at("operator", at(400)).unwrap();
        assert_eq!(controller.phase(), ShutdownPhase::Active);

        // State was restored and the shutdown event resolved
        assert_eq!(provider.restored.lock().unwrap().len(), 1);
        let event = store.get_event(event_id).unwrap();
        assert_eq!(event.status, crate::models::RiskEventStatus::Resolved);
        assert_eq!(controller.history().len(), 1);
        assert!(controller.history()[0].recovered_at.is_some());
    }

    #[test]
    fn test_duplicate_trigger_reports_already_shutdown() {
        let (controller, _, _) = make_controller();
        controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Immediate,
                "operator",
                at(0),
            )
            .unwrap();
        let outcome = controller
            .trigger_shutdown_at(
                ShutdownReason::SystemFailure,
                ShutdownPriority::Immediate,
                "watchdog",
                at(10),
            )
            .unwrap();
        assert_eq!(outcome, ShutdownOutcome::AlreadyShutdown);
    }

    #[test]
    fn test_retrigger_within_cooldown_after_recovery() {
        let (controller, _, _) = make_controller();
        controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(0),
            )
            .unwrap();
        controller.attempt_recovery_at("operator", at(301)).unwrap();
        controller.complete_recovery_at("operator", at(310)).unwrap();

        // With the default 300s window a post-recovery retrigger is always
        // past the cooldown; lengthen it so the second trigger lands inside
        controller.update_configuration(ShutdownSettings {
            cooldown_secs: 600,
            ..Default::default()
        });
        let outcome = controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(320),
            )
            .unwrap();
        assert!(matches!(
            outcome,
            ShutdownOutcome::CooldownActive { remaining_secs } if remaining_secs > 0
        ));
        assert_eq!(controller.phase(), ShutdownPhase::Active);

        // Once the window passes the trigger goes through
        let outcome = controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(601),
            )
            .unwrap();
        assert!(matches!(outcome, ShutdownOutcome::Triggered { .. }));
    }

    #[test]
    fn test_recovery_phase_does_not_block_trading() {
        let (controller, _, _) = make_controller();
        controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(0),
            )
            .unwrap();
        assert!(controller.is_trading_blocked());

        controller.attempt_recovery_at("operator", at(301)).unwrap();
        assert_eq!(controller.phase(), ShutdownPhase::Recovery);
        assert!(!controller.is_trading_blocked());

        // Cancellation re-blocks, completion keeps trading open
        controller.cancel_recovery("operator").unwrap();
        assert!(controller.is_trading_blocked());
        controller.attempt_recovery_at("operator", at(700)).unwrap();
        controller.complete_recovery_at("operator", at(710)).unwrap();
        assert!(!controller.is_trading_blocked());
    }

    #[test]
    fn test_shutdown_event_severity_scales_with_reason() {
        let (controller, _, store) = make_controller();
        let outcome = controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(0),
            )
            .unwrap();
        let ShutdownOutcome::Triggered { event_id } = outcome else {
            panic!("expected trigger");
        };
        assert_eq!(store.get_event(event_id).unwrap().severity, RiskSeverity::Medium);

        let (controller, _, store) = make_controller();
        let outcome = controller
            .trigger_shutdown_at(
                ShutdownReason::DailyLossLimit,
                ShutdownPriority::Graceful,
                "daily_loss_manager",
                at(0),
            )
            .unwrap();
        let ShutdownOutcome::Triggered { event_id } = outcome else {
            panic!("expected trigger");
        };
        assert_eq!(store.get_event(event_id).unwrap().severity, RiskSeverity::High);

        let (controller, _, store) = make_controller();
        let outcome = controller
            .trigger_shutdown_at(
                ShutdownReason::ExchangeOutage,
                ShutdownPriority::Immediate,
                "watchdog",
                at(0),
            )
            .unwrap();
        let ShutdownOutcome::Triggered { event_id } = outcome else {
            panic!("expected trigger");
        };
        assert_eq!(
            store.get_event(event_id).unwrap().severity,
            RiskSeverity::Critical
        );
    }

    #[test]
    fn test_cancel_recovery_keeps_preserved_state() {
        let (controller, provider, store) = make_controller();
        controller
            .trigger_shutdown_at(
                ShutdownReason::DailyLossLimit,
                ShutdownPriority::Graceful,
                "daily_loss_manager",
                at(0),
            )
            .unwrap();
        controller.attempt_recovery_at("operator", at(301)).unwrap();
        controller.cancel_recovery("operator").unwrap();
        assert_eq!(controller.phase(), ShutdownPhase::Shutdown);

        // The abandoned attempt's event is dismissed, not resolved
        let ignored = store.query_events(&crate::store::EventFilter {
            status: Some(crate::models::RiskEventStatus::Ignored),
            ..Default::default()
        });
        assert_eq!(ignored.len(), 1);

        // A later attempt can still complete with the original snapshot
        controller.attempt_recovery_at("operator", at(700)).unwrap();
        controller.complete_recovery_at("operator", at(710)).unwrap();
        let restored = provider.restored.lock().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].open_positions[0].pair, "DOT/USDT");
    }

    #[test]
    fn test_recovery_attempts_accumulate_on_one_record() {
        let (controller, _, _) = make_controller();
        controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(0),
            )
            .unwrap();
        controller.attempt_recovery_at("operator", at(301)).unwrap();
        controller.cancel_recovery("operator").unwrap();
        controller.attempt_recovery_at("operator", at(650)).unwrap();
        assert_eq!(controller.current_record().unwrap().recovery_attempts, 2);
    }

    #[test]
    fn test_lifecycle_guards() {
        let (controller, _, _) = make_controller();
        assert!(controller.attempt_recovery_at("operator", at(0)).is_err());
        assert!(controller.complete_recovery_at("operator", at(0)).is_err());
        assert!(controller.cancel_recovery("operator").is_err());
    }

    #[test]
    fn test_auto_shutdown_on_extreme_volatility() {
        let (controller, _, _) = make_controller();
        // Volatility threshold 5.0, factor 2.0: 12% trips the shutdown
        let outcome = controller
            .check_auto_shutdown_at(dec!(12.0), dec!(50000.0), at(0))
            .unwrap();
        assert!(matches!(
            outcome,
            Some(ShutdownOutcome::Triggered { .. })
        ));
        assert_eq!(controller.phase(), ShutdownPhase::Shutdown);
        assert_eq!(
            controller.current_record().unwrap().reason,
            ShutdownReason::MarketStress
        );
    }

    #[test]
    fn test_auto_recovery_requires_gain_and_wait() {
        let (controller, _, _) = make_controller();
        controller.update_configuration(ShutdownSettings {
            enable_auto_recovery: true,
            ..Default::default()
        });
        // Not suggested while active
        assert!(!controller.check_auto_recovery_at(dec!(11000), at(0)));

        // FakeProvider preserves a 10000 portfolio; gain threshold is 5%
        controller
            .trigger_shutdown_at(
                ShutdownReason::DailyLossLimit,
                ShutdownPriority::Graceful,
                "daily_loss_manager",
                at(0),
            )
            .unwrap();
        // Wait period (3600s) not yet elapsed
        assert!(!controller.check_auto_recovery_at(dec!(11000), at(1800)));
        // Elapsed, but portfolio below 10500
        assert!(!controller.check_auto_recovery_at(dec!(10200), at(3700)));
        assert!(controller.check_auto_recovery_at(dec!(10500), at(3700)));
        // Pure check, no transition
        assert_eq!(controller.phase(), ShutdownPhase::Shutdown);
    }

    #[test]
    fn test_shutdown_history_window_filters_old_episodes() {
        let (controller, _, _) = make_controller();
        controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(0),
            )
            .unwrap();
        controller.attempt_recovery_at("operator", at(301)).unwrap();
        controller.complete_recovery_at("operator", at(310)).unwrap();

        let ten_days = 10 * 86_400;
        controller
            .trigger_shutdown_at(
                ShutdownReason::Manual,
                ShutdownPriority::Graceful,
                "operator",
                at(ten_days),
            )
            .unwrap();
        controller
            .attempt_recovery_at("operator", at(ten_days + 301))
            .unwrap();
        controller
            .complete_recovery_at("operator", at(ten_days + 310))
            .unwrap();

        assert_eq!(controller.history().len(), 2);
        assert_eq!(
            controller
                .history_in_window_at(7, at(ten_days + 400))
                .len(),
            1
        );
    }

    #[test]
    fn test_plain_breach_warns_without_shutdown() {
        let (controller, _, store) = make_controller();
        let outcome = controller
            .check_auto_shutdown_at(dec!(7.0), dec!(50000.0), at(0))
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(controller.phase(), ShutdownPhase::Active);
        assert_eq!(store.event_statistics().total, 1);
    }
}
