//! Configuration types for altcycle

use serde::Deserialize;

use crate::risk::RiskSettings;
use crate::trader::TraderSettings;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub trader: TraderSettings,
    pub risk: RiskSettings,
    pub telemetry: TelemetryConfig,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub metrics_port: u16,
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: 9090,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Environment;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [trader]
            bridge = "USDT"
            coins = ["ETH", "SOL"]
            tick_interval_secs = 30

            [risk.thresholds]
            environment = "STAGING"

            [risk.events]
            notification_cooldown_secs = 120
            notify_low = true

            [risk.confirmation]
            timeout_minutes = 30

            [risk.shutdown]
            cooldown_secs = 600

            [risk.daily_loss]
            default_starting_value = 25000

            [risk.manager]
            confirm_size_factor = 0.9

            [telemetry]
            metrics_port = 9191
            log_level = "debug"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.trader.coins, vec!["ETH", "SOL"]);
        assert_eq!(config.risk.thresholds.environment, Environment::Staging);
        assert_eq!(config.risk.events.notification_cooldown_secs, 120);
        assert!(config.risk.events.notify_low);
        assert_eq!(config.risk.confirmation.timeout_minutes, 30);
        assert_eq!(config.risk.shutdown.cooldown_secs, 600);
        assert_eq!(config.risk.daily_loss.default_starting_value, dec!(25000));
        assert_eq!(config.risk.manager.confirm_size_factor, dec!(0.9));
        assert_eq!(config.telemetry.metrics_port, 9191);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.trader.bridge, "USDT");
        assert_eq!(config.risk.shutdown.cooldown_secs, 300);
        assert_eq!(config.risk.confirmation.timeout_minutes, 60);
        assert!(config.risk.events.enabled);
        assert_eq!(config.telemetry.metrics_port, 9090);
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[trader]\nbridge = \"BUSD\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.trader.bridge, "BUSD");
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }
}
