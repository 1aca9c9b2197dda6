//! Daily loss tracking and the trading halt it drives
//!
//! This component fails OPEN: any internal inconsistency is logged and
//! trading continues. The facade's fail-closed gate is the layer that turns
//! uncertainty into a block.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::models::{DailyLossTracking, RiskEventCategory, RiskEventType, RiskSeverity};
use crate::risk::events::{LogEventParams, RiskEventLogger};
use crate::risk::thresholds::ThresholdStore;
use crate::risk::RiskError;
use crate::store::RiskStore;

/// Settings for the daily loss tracker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DailyLossSettings {
    /// Baseline used when the first valuation of a day arrives with no
    /// portfolio value attached
    pub default_starting_value: Decimal,
}

impl Default for DailyLossSettings {
    fn default() -> Self {
        Self {
            default_starting_value: dec!(10000),
        }
    }
}

/// Point-in-time summary of today's tracking
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub starting_value: Decimal,
    pub current_value: Decimal,
    pub loss_pct: Decimal,
    pub max_loss_pct: Decimal,
    pub is_trading_halted: bool,
    pub halt_reason: Option<String>,
    pub total_trades: u32,
    pub win_rate_pct: Decimal,
}

/// Tracks portfolio loss per UTC day and halts trading at the limit
pub struct DailyLossManager {
    store: Arc<RiskStore>,
    thresholds: Arc<ThresholdStore>,
    events: Arc<RiskEventLogger>,
    settings: DailyLossSettings,
}

impl DailyLossManager {
    pub fn new(
        store: Arc<RiskStore>,
        thresholds: Arc<ThresholdStore>,
        events: Arc<RiskEventLogger>,
        settings: DailyLossSettings,
    ) -> Self {
        Self {
            store,
            thresholds,
            events,
            settings,
        }
    }

    /// Record a portfolio valuation against today's row.
    ///
    /// The first valuation of a day creates the row and becomes its baseline.
    /// Crossing the loss limit halts trading for the rest of the day and
    /// raises a portfolio-limit event.
    pub fn record_valuation(&self, value: Decimal) {
        self.record_valuation_at(value, Utc::now());
    }

    pub fn record_valuation_at(&self, value: Decimal, now: DateTime<Utc>) {
        if value < Decimal::ZERO {
            // Fail open: a bad feed value must not corrupt the baseline
            error!(%value, "negative portfolio valuation dropped");
            return;
        }
        let date = now.date_naive();
        let max_loss_pct = self
            .thresholds
            .get(crate::models::ThresholdType::DailyLoss)
            .value;

        let (halted_now, loss_pct) = self.store.with_daily_mut(
            date,
            || DailyLossTracking::new(date, value, max_loss_pct, now),
            |row| {
                let halted = row.update_portfolio_value(value, now);
                (halted, row.current_loss_pct)
            },
        );

        metrics::gauge!("risk_daily_loss_pct").set(loss_pct.to_f64().unwrap_or(0.0));

        if halted_now {
            self.raise_halt_event(loss_pct, max_loss_pct, now);
        }
    }

    /// Record one closed trade's realized pnl against today's row.
    ///
    /// The first trade of a day seeds the row from the latest tracked
    /// valuations; the portfolio is re-valued right after the counters, so
    /// a losing trade can trip the halt without waiting for the next
    /// valuation tick.
    pub fn record_trade_result(&self, pnl: Decimal) {
        self.record_trade_result_at(pnl, Utc::now());
    }

    pub fn record_trade_result_at(&self, pnl: Decimal, now: DateTime<Utc>) {
        let date = now.date_naive();
        let max_loss_pct = self
            .thresholds
            .get(crate::models::ThresholdType::DailyLoss)
            .value;
        let tracked = self.tracked_portfolio_value();
        let starting = tracked.unwrap_or(self.settings.default_starting_value);
        let revalued = self.store.with_daily_mut(
            date,
            || DailyLossTracking::new(date, starting, max_loss_pct, now),
            |row| {
                row.add_trade_result(pnl, now);
                tracked.map(|value| (row.update_portfolio_value(value, now), row.current_loss_pct))
            },
        );
        if let Some((halted_now, loss_pct)) = revalued {
            metrics::gauge!("risk_daily_loss_pct").set(loss_pct.to_f64().unwrap_or(0.0));
            if halted_now {
                self.raise_halt_event(loss_pct, max_loss_pct, now);
            }
        }
    }

    /// Sum of the latest per-coin valuations, when any are on file.
    fn tracked_portfolio_value(&self) -> Option<Decimal> {
        let valuations = self.store.valuations();
        if valuations.is_empty() {
            return None;
        }
        Some(valuations.values().copied().sum())
    }

    fn raise_halt_event(&self, loss_pct: Decimal, max_loss_pct: Decimal, now: DateTime<Utc>) {
        warn!(%loss_pct, %max_loss_pct, "daily loss limit hit, trading halted");
        self.events.log_at(
            LogEventParams {
                event_type: RiskEventType::PortfolioLimit,
                severity: RiskSeverity::High,
                category: RiskEventCategory::PortfolioRisk,
                pair: None,
                coin: None,
                trigger_value: loss_pct,
                threshold_value: max_loss_pct,
                current_value: loss_pct,
                description: format!(
                    "daily loss {loss_pct:.2}% reached limit {max_loss_pct}%, trading halted"
                ),
                metadata: None,
                created_by: "daily_loss_manager".to_string(),
            },
            now,
        );
    }

    /// True when today's row has tripped the halt. Missing row means no halt.
    pub fn is_trading_halted(&self) -> bool {
        self.is_trading_halted_at(Utc::now())
    }

    pub fn is_trading_halted_at(&self, now: DateTime<Utc>) -> bool {
        self.store
            .daily_row(now.date_naive())
            .map(|row| row.is_trading_halted)
            .unwrap_or(false)
    }

    /// Summary of today's tracking, if any valuation arrived yet.
    pub fn daily_summary(&self) -> Option<DailySummary> {
        self.daily_summary_at(Utc::now())
    }

    pub fn daily_summary_at(&self, now: DateTime<Utc>) -> Option<DailySummary> {
        self.store.daily_row(now.date_naive()).map(|row| DailySummary {
            date: row.date,
            starting_value: row.starting_portfolio_value,
            current_value: row.current_portfolio_value,
            loss_pct: row.current_loss_pct,
            max_loss_pct: row.max_daily_loss_pct,
            is_trading_halted: row.is_trading_halted,
            halt_reason: row.halt_reason.clone(),
            total_trades: row.total_trades,
            win_rate_pct: row.win_rate(),
        })
    }

    /// All tracked days in date order.
    pub fn history(&self) -> Vec<DailyLossTracking> {
        self.store.daily_history()
    }

    /// Close out yesterday's row if it is still open.
    ///
    /// Today starts unhalted regardless of yesterday's state; the fresh row
    /// is created lazily by the first valuation.
    pub fn check_daily_reset(&self) {
        self.check_daily_reset_at(Utc::now());
    }

    pub fn check_daily_reset_at(&self, now: DateTime<Utc>) {
        let yesterday = now.date_naive() - Duration::days(1);
        let closed = self.store.with_existing_daily_mut(yesterday, |row| {
            if row.status != crate::models::DailyLossStatus::Closed {
                row.close(now);
                true
            } else {
                false
            }
        });
        if closed == Some(true) {
            info!(date = %yesterday, "closed previous day's loss tracking");
        }
    }

    /// Manually lift today's halt.
    pub fn reactivate_trading(&self, actor: &str) -> Result<(), RiskError> {
        self.reactivate_trading_at(actor, Utc::now())
    }

    pub fn reactivate_trading_at(&self, actor: &str, now: DateTime<Utc>) -> Result<(), RiskError> {
        let date = now.date_naive();
        let lifted = self
            .store
            .with_existing_daily_mut(date, |row| {
                if row.is_trading_halted {
                    row.reactivate_trading(now);
                    true
                } else {
                    false
                }
            })
            .ok_or_else(|| RiskError::NotFound(format!("no tracking row for {date}")))?;
        if !lifted {
            return Err(RiskError::StateConflict(format!(
                "trading is not halted on {date}"
            )));
        }
        info!(actor, %date, "daily halt lifted manually");
        Ok(())
    }

    /// Re-baseline today at its current portfolio value.
    pub fn force_daily_reset(&self, actor: &str) -> Result<(), RiskError> {
        self.force_daily_reset_at(actor, Utc::now())
    }

    pub fn force_daily_reset_at(&self, actor: &str, now: DateTime<Utc>) -> Result<(), RiskError> {
        let date = now.date_naive();
        self.store
            .with_existing_daily_mut(date, |row| {
                let value = row.current_portfolio_value;
                row.reset(value, now);
            })
            .ok_or_else(|| RiskError::NotFound(format!("no tracking row for {date}")))?;
        warn!(actor, %date, "daily loss tracking force-reset");
        Ok(())
    }
}
