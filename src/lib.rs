//! altcycle: altcoin rotation trading bot
//!
//! This library provides the core components for:
//! - Risk event logging with severity-gated notifications
//! - Configurable risk thresholds with environment overrides and approvals
//! - Daily portfolio loss tracking with a one-way intraday halt
//! - Emergency shutdown with trading-state preservation and recovery
//! - Manual multi-level confirmation for high-impact actions
//! - An integrated risk facade gating the rotation trade loop
//! - Paper exchange and trade loop glue
//! - Observability via structured logs and Prometheus metrics

pub mod cli;
pub mod config;
pub mod exchange;
pub mod models;
pub mod notify;
pub mod risk;
pub mod store;
pub mod telemetry;
pub mod trader;
