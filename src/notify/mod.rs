//! Outbound notification seam
//!
//! The risk components format messages and hand them to a `Notifier`;
//! delivery transport lives behind the trait.

use std::sync::Mutex;

use tracing::warn;

/// Sink for operator-facing risk notifications
pub trait Notifier: Send + Sync {
    fn send(&self, message: &str);
}

/// Notifier that writes to the structured log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: &str) {
        warn!(target: "risk_notification", "{message}");
    }
}

/// Notifier that collects messages in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}
