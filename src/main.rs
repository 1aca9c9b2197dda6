use altcycle::cli::{Cli, Commands};
use altcycle::config::Config;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    let _telemetry = altcycle::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting paper trading mode");
            args.execute(config).await?;
        }
        Commands::Status => {
            use altcycle::notify::LogNotifier;
            use altcycle::risk::RiskManager;
            use altcycle::trader::TradeBook;
            use std::sync::Arc;

            let risk = RiskManager::new(
                config.risk,
                Arc::new(LogNotifier),
                Arc::new(TradeBook::new()),
            );
            let status = risk.get_risk_status();
            println!("altcycle risk status");
            println!("  Overall: {:?}", status.overall);
            println!("  Trading allowed: {}", status.trading_allowed);
            println!("  Shutdown phase: {:?}", status.shutdown_phase);
            println!("  Open events: {}", status.open_events);
            println!("  Pending approvals: {}", status.pending_approvals);
            for (threshold_type, threshold) in &status.thresholds {
                println!(
                    "  Threshold {:?}: {} {}",
                    threshold_type, threshold.value, threshold.unit
                );
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Trader: bridge={} coins={:?}",
                config.trader.bridge, config.trader.coins
            );
            println!("  Environment: {:?}", config.risk.thresholds.environment);
            println!(
                "  Shutdown cooldown: {}s, approval timeout: {}m",
                config.risk.shutdown.cooldown_secs, config.risk.confirmation.timeout_minutes
            );
            println!("  Metrics port: {}", config.telemetry.metrics_port);
        }
    }

    Ok(())
}
