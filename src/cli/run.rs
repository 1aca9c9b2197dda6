//! Run command implementation

use std::collections::HashMap;
use std::sync::Arc;

use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::Config;
use crate::exchange::PaperExchange;
use crate::notify::LogNotifier;
use crate::risk::RiskManager;
use crate::trader::{TradeBook, Trader};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Starting bridge-currency balance for the paper exchange
    #[arg(long, default_value = "10000")]
    pub paper_balance: Decimal,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let mut balances = HashMap::new();
        balances.insert(config.trader.bridge.clone(), self.paper_balance);
        let exchange = Arc::new(PaperExchange::new(balances));

        // Seed flat prices so the first valuation tick has a tape
        for coin in &config.trader.coins {
            exchange.set_price(&format!("{coin}/{}", config.trader.bridge), dec!(1));
        }

        let book = Arc::new(TradeBook::new());
        let risk = Arc::new(RiskManager::new(
            config.risk.clone(),
            Arc::new(LogNotifier),
            book.clone(),
        ));

        tracing::info!(balance = %self.paper_balance, "starting paper trading");
        let trader = Trader::new(config.trader, exchange, risk, book);
        trader.run().await
    }
}
