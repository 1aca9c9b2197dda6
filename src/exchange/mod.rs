//! Exchange client seam
//!
//! The risk core never routes orders itself; the trading loop talks to an
//! exchange through this trait. Order-routing semantics stay with the
//! implementation behind it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Exchange interaction errors
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("insufficient balance for {symbol}: have {available}, need {required}")]
    InsufficientBalance {
        symbol: String,
        available: Decimal,
        required: Decimal,
    },
    #[error("exchange unavailable: {0}")]
    Unavailable(String),
}

/// One OHLCV candle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Result of a filled market order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillResult {
    pub pair: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// Async client over the exchange API
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Latest traded price, `None` when the symbol has no ticker.
    async fn get_ticker_price(&self, symbol: &str) -> Result<Option<Decimal>, ExchangeError>;
    /// Free balance for one currency.
    async fn get_currency_balance(&self, symbol: &str) -> Result<Decimal, ExchangeError>;
    /// Minimum order notional for a pair.
    async fn get_min_notional(&self, base: &str, quote: &str) -> Result<Decimal, ExchangeError>;
    /// Taker fee rate for a coin traded against the bridge.
    async fn get_fee(&self, coin: &str, bridge: &str, is_buy: bool)
        -> Result<Decimal, ExchangeError>;
    /// Market-buy an altcoin with the bridge currency.
    async fn buy_alt(&self, coin: &str, bridge: &str) -> Result<Option<FillResult>, ExchangeError>;
    /// Market-sell an altcoin back into the bridge currency.
    async fn sell_alt(&self, coin: &str, bridge: &str)
        -> Result<Option<FillResult>, ExchangeError>;
    /// Recent candles for a symbol, newest last.
    async fn get_klines(&self, symbol: &str, limit: usize) -> Result<Vec<Kline>, ExchangeError>;
}

/// In-process paper exchange backing the demo loop and tests
///
/// Prices are set by the caller; fills are instantaneous at the posted
/// price with a flat fee.
pub struct PaperExchange {
    prices: Mutex<HashMap<String, Decimal>>,
    balances: Mutex<HashMap<String, Decimal>>,
    fee_rate: Decimal,
}

impl PaperExchange {
    pub fn new(initial_balances: HashMap<String, Decimal>) -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            balances: Mutex::new(initial_balances),
            fee_rate: dec!(0.001),
        }
    }

    /// Post a price for `COIN/BRIDGE`.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), price);
    }

    fn price_of(&self, symbol: &str) -> Option<Decimal> {
        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .copied()
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn get_ticker_price(&self, symbol: &str) -> Result<Option<Decimal>, ExchangeError> {
        Ok(self.price_of(symbol))
    }

    async fn get_currency_balance(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        Ok(self
            .balances
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_min_notional(&self, _base: &str, _quote: &str) -> Result<Decimal, ExchangeError> {
        Ok(dec!(10))
    }

    async fn get_fee(
        &self,
        _coin: &str,
        _bridge: &str,
        _is_buy: bool,
    ) -> Result<Decimal, ExchangeError> {
        Ok(self.fee_rate)
    }

    async fn buy_alt(&self, coin: &str, bridge: &str) -> Result<Option<FillResult>, ExchangeError> {
        let symbol = format!("{coin}/{bridge}");
        let Some(price) = self.price_of(&symbol) else {
            return Err(ExchangeError::UnknownSymbol(symbol));
        };
        let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        let bridge_balance = balances.get(bridge).copied().unwrap_or(Decimal::ZERO);
        if bridge_balance <= Decimal::ZERO {
            return Err(ExchangeError::InsufficientBalance {
                symbol: bridge.to_string(),
                available: bridge_balance,
                required: Decimal::ONE,
            });
        }

        let spend = bridge_balance;
        let fee = spend * self.fee_rate;
        let quantity = (spend - fee) / price;
        balances.insert(bridge.to_string(), Decimal::ZERO);
        *balances.entry(coin.to_string()).or_insert(Decimal::ZERO) += quantity;
        drop(balances);

        info!(%symbol, %quantity, %price, "paper buy filled");
        Ok(Some(FillResult {
            pair: symbol,
            quantity,
            price,
            fee,
            filled_at: Utc::now(),
        }))
    }

    async fn sell_alt(
        &self,
        coin: &str,
        bridge: &str,
    ) -> Result<Option<FillResult>, ExchangeError> {
        let symbol = format!("{coin}/{bridge}");
        let Some(price) = self.price_of(&symbol) else {
            return Err(ExchangeError::UnknownSymbol(symbol));
        };
        let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        let coin_balance = balances.get(coin).copied().unwrap_or(Decimal::ZERO);
        if coin_balance <= Decimal::ZERO {
            return Err(ExchangeError::InsufficientBalance {
                symbol: coin.to_string(),
                available: coin_balance,
                required: Decimal::ONE,
            });
        }

        let proceeds = coin_balance * price;
        let fee = proceeds * self.fee_rate;
        balances.insert(coin.to_string(), Decimal::ZERO);
        *balances.entry(bridge.to_string()).or_insert(Decimal::ZERO) += proceeds - fee;
        drop(balances);

        info!(%symbol, quantity = %coin_balance, %price, "paper sell filled");
        Ok(Some(FillResult {
            pair: symbol,
            quantity: coin_balance,
            price,
            fee,
            filled_at: Utc::now(),
        }))
    }

    async fn get_klines(&self, symbol: &str, limit: usize) -> Result<Vec<Kline>, ExchangeError> {
        // Paper venue has no history; synthesize a flat tape at the posted
        // price so indicator consumers stay functional.
        let Some(price) = self.price_of(symbol) else {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        };
        let now = Utc::now();
        Ok((0..limit)
            .map(|i| Kline {
                open_time: now - chrono::Duration::minutes((limit - i) as i64),
                open: price,
                high: price,
                low: price,
                close: price,
                volume: Decimal::ZERO,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_exchange() -> PaperExchange {
        let mut balances = HashMap::new();
        balances.insert("USDT".to_string(), dec!(1000));
        let exchange = PaperExchange::new(balances);
        exchange.set_price("SOL/USDT", dec!(100));
        exchange
    }

    #[tokio::test]
    async fn test_buy_then_sell_round_trip() {
        let exchange = make_exchange();
        let fill = exchange.buy_alt("SOL", "USDT").await.unwrap().unwrap();
        assert_eq!(fill.price, dec!(100));
        assert!(fill.quantity > dec!(9.9));

        assert_eq!(
            exchange.get_currency_balance("USDT").await.unwrap(),
            Decimal::ZERO
        );

        exchange.sell_alt("SOL", "USDT").await.unwrap().unwrap();
        let usdt = exchange.get_currency_balance("USDT").await.unwrap();
        // Two fees paid
        assert!(usdt > dec!(997) && usdt < dec!(1000));
    }

    #[tokio::test]
    async fn test_unknown_symbol_errors() {
        let exchange = make_exchange();
        assert!(exchange.get_ticker_price("XYZ/USDT").await.unwrap().is_none());
        assert!(matches!(
            exchange.buy_alt("XYZ", "USDT").await,
            Err(ExchangeError::UnknownSymbol(_))
        ));
    }

    #[tokio::test]
    async fn test_sell_without_holdings_errors() {
        let exchange = make_exchange();
        assert!(matches!(
            exchange.sell_alt("SOL", "USDT").await,
            Err(ExchangeError::InsufficientBalance { .. })
        ));
    }
}
