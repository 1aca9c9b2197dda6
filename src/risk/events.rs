//! Risk event logging and notification fan-out

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    EventMetadata, RiskEvent, RiskEventCategory, RiskEventStatus, RiskEventType, RiskSeverity,
};
use crate::notify::Notifier;
use crate::store::{EventStatistics, RiskStore};

const NOTIFICATION_HISTORY_CAP: usize = 1000;

/// Tuning knobs for the event logger
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventLoggerSettings {
    /// Master switch; when off, `log` records nothing and returns `None`
    pub enabled: bool,
    /// Minimum gap between notifications for the same (type, severity) pair
    pub notification_cooldown_secs: i64,
    /// Low-severity events resolve themselves at creation time
    pub auto_resolve_low: bool,
    pub notify_low: bool,
    pub notify_medium: bool,
    pub notify_high: bool,
    pub notify_critical: bool,
    /// Per-type overrides that win over the severity flags
    pub notify_overrides: HashMap<RiskEventType, bool>,
}

impl Default for EventLoggerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            notification_cooldown_secs: 300,
            auto_resolve_low: true,
            notify_low: false,
            notify_medium: true,
            notify_high: true,
            notify_critical: true,
            notify_overrides: HashMap::new(),
        }
    }
}

impl EventLoggerSettings {
    fn severity_enabled(&self, severity: RiskSeverity) -> bool {
        match severity {
            RiskSeverity::Low => self.notify_low,
            RiskSeverity::Medium => self.notify_medium,
            RiskSeverity::High => self.notify_high,
            RiskSeverity::Critical => self.notify_critical,
        }
    }
}

/// One notification that was actually sent
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRecord {
    pub event_id: Uuid,
    pub event_type: RiskEventType,
    pub severity: RiskSeverity,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Everything needed to record one risk event
#[derive(Debug, Clone)]
pub struct LogEventParams {
    pub event_type: RiskEventType,
    pub severity: RiskSeverity,
    pub category: RiskEventCategory,
    pub pair: Option<String>,
    pub coin: Option<String>,
    pub trigger_value: Decimal,
    pub threshold_value: Decimal,
    pub current_value: Decimal,
    pub description: String,
    pub metadata: Option<EventMetadata>,
    pub created_by: String,
}

/// Records risk events and decides which deserve a notification
///
/// Recording never fails: a disabled logger drops the event silently and
/// notification suppression only affects delivery, never the log itself.
pub struct RiskEventLogger {
    store: Arc<RiskStore>,
    notifier: Arc<dyn Notifier>,
    settings: RwLock<EventLoggerSettings>,
    sent: Mutex<VecDeque<NotificationRecord>>,
}

impl RiskEventLogger {
    pub fn new(
        store: Arc<RiskStore>,
        notifier: Arc<dyn Notifier>,
        settings: EventLoggerSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings: RwLock::new(settings),
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// Shared store backing this logger.
    pub fn store(&self) -> &Arc<RiskStore> {
        &self.store
    }

    /// Record one event, returning its id, or `None` when logging is off.
    pub fn log(&self, params: LogEventParams) -> Option<Uuid> {
        self.log_at(params, Utc::now())
    }

    pub fn log_at(&self, params: LogEventParams, now: DateTime<Utc>) -> Option<Uuid> {
        let settings = self
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if !settings.enabled {
            debug!(event_type = ?params.event_type, "event logging disabled, dropping event");
            return None;
        }

        let auto_resolve = settings.auto_resolve_low && params.severity == RiskSeverity::Low;
        let event = RiskEvent {
            id: Uuid::new_v4(),
            pair: params.pair,
            coin: params.coin,
            event_type: params.event_type,
            severity: params.severity,
            status: if auto_resolve {
                RiskEventStatus::Resolved
            } else {
                RiskEventStatus::Open
            },
            trigger_value: params.trigger_value,
            threshold_value: params.threshold_value,
            current_value: params.current_value,
            description: params.description.clone(),
            category: params.category,
            metadata: params.metadata,
            created_by: params.created_by,
            acknowledged_by: auto_resolve.then(|| "auto".to_string()),
            created_at: now,
            resolved_at: auto_resolve.then_some(now),
            acknowledged_at: None,
        };
        let event_id = event.id;

        info!(
            event_id = %event_id,
            event_type = ?event.event_type,
            severity = ?event.severity,
            "risk event recorded"
        );
        metrics::counter!("risk_events_total").increment(1);
        self.store.insert_event(event);

        if self.should_notify(&settings, params.event_type, params.severity, now) {
            let message = format!(
                "[{:?}] {:?}: {} (current {}, threshold {})",
                params.severity,
                params.event_type,
                params.description,
                params.current_value,
                params.threshold_value,
            );
            self.record_sent(NotificationRecord {
                event_id,
                event_type: params.event_type,
                severity: params.severity,
                message: message.clone(),
                sent_at: now,
            });
            self.notifier.send(&message);
            metrics::counter!("risk_notifications_total").increment(1);
        }

        Some(event_id)
    }

    fn should_notify(
        &self,
        settings: &EventLoggerSettings,
        event_type: RiskEventType,
        severity: RiskSeverity,
        now: DateTime<Utc>,
    ) -> bool {
        let wanted = settings
            .notify_overrides
            .get(&event_type)
            .copied()
            .unwrap_or_else(|| settings.severity_enabled(severity));
        if !wanted {
            return false;
        }

        let cooldown = Duration::seconds(settings.notification_cooldown_secs);
        let sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        !sent.iter().any(|r| {
            r.event_type == event_type && r.severity == severity && now - r.sent_at < cooldown
        })
    }

    fn record_sent(&self, record: NotificationRecord) {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        if sent.len() >= NOTIFICATION_HISTORY_CAP {
            sent.pop_front();
        }
        sent.push_back(record);
    }

    /// Notifications actually delivered, oldest first.
    pub fn notification_history(&self) -> Vec<NotificationRecord> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Mark an event resolved.
    pub fn resolve_event(&self, id: Uuid, actor: &str) -> Result<(), super::RiskError> {
        self.resolve_event_at(id, actor, Utc::now())
    }

    pub fn resolve_event_at(
        &self,
        id: Uuid,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), super::RiskError> {
        self.store.with_event_mut(id, |event| event.resolve(actor, now))
    }

    /// Acknowledge an open or escalated event.
    pub fn acknowledge_event(&self, id: Uuid, actor: &str) -> Result<(), super::RiskError> {
        self.store
            .with_event_mut(id, |event| event.acknowledge(actor, Utc::now()))
    }

    /// Escalate an open event.
    pub fn escalate_event(&self, id: Uuid, actor: &str) -> Result<(), super::RiskError> {
        self.store
            .with_event_mut(id, |event| event.escalate(actor, Utc::now()))
    }

    /// Dismiss an event without action. Terminal.
    pub fn ignore_event(&self, id: Uuid, actor: &str) -> Result<(), super::RiskError> {
        self.store
            .with_event_mut(id, |event| event.ignore(actor, Utc::now()))
    }

    /// Aggregate event counts over the full log.
    pub fn statistics(&self) -> EventStatistics {
        self.store.event_statistics()
    }

    /// Aggregate counts and rates over the trailing window.
    pub fn statistics_in_window(&self, window_days: i64) -> EventStatistics {
        self.statistics_in_window_at(window_days, Utc::now())
    }

    pub fn statistics_in_window_at(
        &self,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> EventStatistics {
        let since = now - Duration::days(window_days.max(0));
        self.store.event_statistics_since(Some(since))
    }

    /// Replace the logger settings at runtime.
    pub fn update_configuration(&self, settings: EventLoggerSettings) {
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
    }
}
