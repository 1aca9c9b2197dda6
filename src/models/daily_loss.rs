//! Per-day portfolio loss tracking record

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Status of one day's tracking row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DailyLossStatus {
    Active,
    Halted,
    Reset,
    Closed,
}

/// One UTC day's loss tracking
///
/// Loss percentage is measured against the day's starting portfolio value.
/// The halt flag is one-way for the day; only an explicit reactivation or
/// the next day's row clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLossTracking {
    pub date: NaiveDate,
    pub starting_portfolio_value: Decimal,
    pub current_portfolio_value: Decimal,
    /// Loss limit in force for this day, percent
    pub max_daily_loss_pct: Decimal,
    pub current_loss_pct: Decimal,
    pub is_trading_halted: bool,
    pub halt_reason: Option<String>,
    pub status: DailyLossStatus,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl DailyLossTracking {
    pub fn new(
        date: NaiveDate,
        starting_value: Decimal,
        max_daily_loss_pct: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            date,
            starting_portfolio_value: starting_value,
            current_portfolio_value: starting_value,
            max_daily_loss_pct,
            current_loss_pct: Decimal::ZERO,
            is_trading_halted: false,
            halt_reason: None,
            status: DailyLossStatus::Active,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            updated_at: now,
        }
    }

    /// Record a new portfolio valuation and recompute the day's loss.
    ///
    /// Returns true when this update crossed the loss limit and halted
    /// trading. Once halted the flag stays set for the day.
    pub fn update_portfolio_value(&mut self, value: Decimal, now: DateTime<Utc>) -> bool {
        self.current_portfolio_value = value;
        self.current_loss_pct = if self.starting_portfolio_value > Decimal::ZERO {
            (self.starting_portfolio_value - value) / self.starting_portfolio_value * dec!(100)
        } else {
            Decimal::ZERO
        };
        self.updated_at = now;

        if !self.is_trading_halted && self.current_loss_pct >= self.max_daily_loss_pct {
            self.is_trading_halted = true;
            self.halt_reason = Some(format!(
                "daily loss {}% reached limit {}%",
                self.current_loss_pct, self.max_daily_loss_pct
            ));
            self.status = DailyLossStatus::Halted;
            return true;
        }
        false
    }

    /// Record one closed trade's realized pnl.
    pub fn add_trade_result(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
            if pnl > self.largest_win {
                self.largest_win = pnl;
            }
        } else if pnl < Decimal::ZERO {
            self.losing_trades += 1;
            if pnl < self.largest_loss {
                self.largest_loss = pnl;
            }
        }
        self.updated_at = now;
    }

    /// Manually lift the halt for the rest of the day.
    pub fn reactivate_trading(&mut self, now: DateTime<Utc>) {
        self.is_trading_halted = false;
        self.halt_reason = None;
        self.status = DailyLossStatus::Active;
        self.updated_at = now;
    }

    /// Re-baseline the day at the given portfolio value.
    pub fn reset(&mut self, starting_value: Decimal, now: DateTime<Utc>) {
        self.starting_portfolio_value = starting_value;
        self.current_portfolio_value = starting_value;
        self.current_loss_pct = Decimal::ZERO;
        self.is_trading_halted = false;
        self.halt_reason = None;
        self.status = DailyLossStatus::Reset;
        self.total_trades = 0;
        self.winning_trades = 0;
        self.losing_trades = 0;
        self.largest_win = Decimal::ZERO;
        self.largest_loss = Decimal::ZERO;
        self.updated_at = now;
    }

    /// Close out the row at the end of its day.
    ///
    /// The halt dies with the day; trade counters stay as the day's audit
    /// record.
    pub fn close(&mut self, now: DateTime<Utc>) {
        self.is_trading_halted = false;
        self.halt_reason = None;
        self.status = DailyLossStatus::Closed;
        self.updated_at = now;
    }

    /// Winning trades as a fraction of total, zero when no trades yet.
    pub fn win_rate(&self) -> Decimal {
        if self.total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.winning_trades) / Decimal::from(self.total_trades) * dec!(100)
        }
    }
}
