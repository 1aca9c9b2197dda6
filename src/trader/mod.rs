//! Trading loop glue
//!
//! Owns the position book and drives the periodic valuation tick that feeds
//! the risk subsystem. Rotation signal math lives with its own collaborator;
//! this module only wires fills and valuations into the risk gates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::exchange::ExchangeClient;
use crate::models::{OrderSnapshot, PositionSnapshot, PreservedState};
use crate::risk::{RiskManager, TradingStateProvider};

/// Trader loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraderSettings {
    /// Bridge currency every rotation routes through
    pub bridge: String,
    /// Altcoins in the rotation set
    pub coins: Vec<String>,
    pub tick_interval_secs: u64,
}

impl Default for TraderSettings {
    fn default() -> Self {
        Self {
            bridge: "USDT".to_string(),
            coins: vec!["ETH".to_string(), "SOL".to_string(), "AVAX".to_string()],
            tick_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
struct BookPosition {
    quantity: Decimal,
    entry_price: Decimal,
    current_price: Decimal,
}

#[derive(Default)]
struct BookState {
    positions: HashMap<String, BookPosition>,
    pending_orders: Vec<OrderSnapshot>,
}

/// Live position book, and the state the shutdown controller preserves
#[derive(Default)]
pub struct TradeBook {
    state: Mutex<BookState>,
}

impl TradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_position(&self, pair: &str, quantity: Decimal, entry_price: Decimal) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.positions.insert(
            pair.to_string(),
            BookPosition {
                quantity,
                entry_price,
                current_price: entry_price,
            },
        );
    }

    pub fn update_price(&self, pair: &str, price: Decimal) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(position) = state.positions.get_mut(pair) {
            position.current_price = price;
        }
    }

    /// Close a position and return its realized pnl, if it existed.
    pub fn close_position(&self, pair: &str, exit_price: Decimal) -> Option<Decimal> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .positions
            .remove(pair)
            .map(|p| (exit_price - p.entry_price) * p.quantity)
    }

    /// Mark-to-market value of all open positions.
    pub fn open_value(&self) -> Decimal {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .positions
            .values()
            .map(|p| p.quantity * p.current_price)
            .sum()
    }

    pub fn open_position_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .positions
            .len()
    }
}

impl TradingStateProvider for TradeBook {
    fn capture(&self) -> PreservedState {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        PreservedState {
            open_positions: state
                .positions
                .iter()
                .map(|(pair, p)| PositionSnapshot {
                    pair: pair.clone(),
                    quantity: p.quantity,
                    entry_price: p.entry_price,
                    current_price: p.current_price,
                })
                .collect(),
            pending_orders: state.pending_orders.clone(),
            portfolio_value: state
                .positions
                .values()
                .map(|p| p.quantity * p.current_price)
                .sum(),
            taken_at: Utc::now(),
        }
    }

    fn restore(&self, preserved: &PreservedState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.positions = preserved
            .open_positions
            .iter()
            .map(|p| {
                (
                    p.pair.clone(),
                    BookPosition {
                        quantity: p.quantity,
                        entry_price: p.entry_price,
                        current_price: p.current_price,
                    },
                )
            })
            .collect();
        state.pending_orders = preserved.pending_orders.clone();
        info!(
            positions = state.positions.len(),
            orders = state.pending_orders.len(),
            "trading state restored"
        );
    }
}

/// Periodic loop binding exchange, book, and risk gates together
pub struct Trader {
    settings: TraderSettings,
    exchange: Arc<dyn ExchangeClient>,
    risk: Arc<RiskManager>,
    book: Arc<TradeBook>,
}

impl Trader {
    pub fn new(
        settings: TraderSettings,
        exchange: Arc<dyn ExchangeClient>,
        risk: Arc<RiskManager>,
        book: Arc<TradeBook>,
    ) -> Self {
        Self {
            settings,
            exchange,
            risk,
            book,
        }
    }

    /// One valuation-and-housekeeping pass.
    pub async fn tick(&self) -> anyhow::Result<()> {
        self.risk.daily_loss().check_daily_reset();
        let swept = self.risk.confirmation().cleanup_expired();
        if swept > 0 {
            debug!(swept, "expired approval requests swept");
        }

        let bridge_balance = self
            .exchange
            .get_currency_balance(&self.settings.bridge)
            .await?;
        self.risk
            .store()
            .set_valuation(&self.settings.bridge, bridge_balance);
        let mut portfolio_value = bridge_balance;
        for coin in &self.settings.coins {
            let symbol = format!("{coin}/{}", self.settings.bridge);
            let balance = self.exchange.get_currency_balance(coin).await?;
            if let Some(price) = self.exchange.get_ticker_price(&symbol).await? {
                self.book.update_price(&symbol, price);
                self.risk.store().set_valuation(coin, balance * price);
                portfolio_value += balance * price;
            }
        }

        self.risk.daily_loss().record_valuation(portfolio_value);
        if !self.risk.is_trading_allowed() {
            warn!(%portfolio_value, "trading gated off this tick");
        }
        Ok(())
    }

    /// Record one fill's realized pnl against the risk subsystem.
    pub fn report_trade_result(&self, pnl: Decimal) {
        self.risk.daily_loss().record_trade_result(pnl);
    }

    /// Run ticks forever at the configured cadence.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.settings.tick_interval_secs.max(1)));
        info!(
            bridge = %self.settings.bridge,
            coins = ?self.settings.coins,
            "trader loop started"
        );
        loop {
            interval.tick().await;
            if let Err(err) = self.tick().await {
                warn!(%err, "tick failed");
            }
        }
    }
}
