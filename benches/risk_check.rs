//! Benchmarks for the risk gate read path

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal_macros::dec;

use altcycle::notify::MemoryNotifier;
use altcycle::risk::{RiskManager, RiskSettings, TradeProposal, TradeSide};
use altcycle::trader::TradeBook;

fn make_manager() -> RiskManager {
    RiskManager::new(
        RiskSettings::default(),
        Arc::new(MemoryNotifier::new()),
        Arc::new(TradeBook::new()),
    )
}

fn benchmark_is_trading_allowed(c: &mut Criterion) {
    let manager = make_manager();
    manager.daily_loss().record_valuation(dec!(10000));

    c.bench_function("is_trading_allowed", |b| {
        b.iter(|| black_box(manager.is_trading_allowed()))
    });
}

fn benchmark_check_risk_limits(c: &mut Criterion) {
    let manager = make_manager();
    manager.daily_loss().record_valuation(dec!(10000));

    let proposal = TradeProposal {
        pair: "ETH/USDT".to_string(),
        side: TradeSide::Buy,
        entry_price: dec!(2000),
        stop_loss_price: dec!(1900),
        position_size: dec!(100),
        leverage: dec!(1),
        account_balance: dec!(10000),
    };

    c.bench_function("check_risk_limits", |b| {
        b.iter(|| manager.check_risk_limits(black_box(&proposal)))
    });
}

fn benchmark_position_sizing(c: &mut Criterion) {
    let manager = make_manager();
    manager.daily_loss().record_valuation(dec!(10000));

    c.bench_function("calculate_position_size", |b| {
        b.iter(|| {
            manager.calculate_position_size(
                black_box(dec!(2000)),
                black_box(dec!(1900)),
                black_box(dec!(10000)),
            )
        })
    });
}

criterion_group!(
    benches,
    benchmark_is_trading_allowed,
    benchmark_check_risk_limits,
    benchmark_position_sizing
);
criterion_main!(benches);
