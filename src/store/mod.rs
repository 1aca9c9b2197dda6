//! In-memory risk state store
//!
//! Owns the event log and daily tracking tables behind coarse locks. All
//! cross-field invariants are enforced inside a single lock acquisition by
//! the callers in the `risk` module.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    DailyLossTracking, RiskEvent, RiskEventStatus, RiskEventType, RiskSeverity,
};
use crate::risk::RiskError;

/// Query over the event log
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<RiskEventType>,
    pub severity: Option<RiskSeverity>,
    pub status: Option<RiskEventStatus>,
    pub pair: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Newest-first cap on the result set
    pub limit: Option<usize>,
}

/// Aggregate counts over the event log
#[derive(Debug, Clone, Serialize)]
pub struct EventStatistics {
    pub total: usize,
    pub open: usize,
    pub resolved: usize,
    pub escalated: usize,
    pub acknowledged: usize,
    pub by_severity: HashMap<RiskSeverity, usize>,
    pub by_type: HashMap<RiskEventType, usize>,
    pub by_status: HashMap<RiskEventStatus, usize>,
    /// Share of counted events that reached Resolved, as a percentage
    pub resolution_rate_pct: f64,
    pub escalation_rate_pct: f64,
    pub acknowledgment_rate_pct: f64,
}

/// Shared state behind the risk components
///
/// Events are append-only; status changes mutate records in place but
/// nothing is ever removed.
#[derive(Default)]
pub struct RiskStore {
    events: RwLock<Vec<RiskEvent>>,
    daily: RwLock<BTreeMap<NaiveDate, DailyLossTracking>>,
    valuations: RwLock<HashMap<String, Decimal>>,
}

impl RiskStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds valid data; the panicking thread cannot
    // have left a half-applied write because every mutation is a single
    // struct update.
    fn read_events(&self) -> RwLockReadGuard<'_, Vec<RiskEvent>> {
        self.events.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_events(&self) -> RwLockWriteGuard<'_, Vec<RiskEvent>> {
        self.events.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_daily(&self) -> RwLockReadGuard<'_, BTreeMap<NaiveDate, DailyLossTracking>> {
        self.daily.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_daily(&self) -> RwLockWriteGuard<'_, BTreeMap<NaiveDate, DailyLossTracking>> {
        self.daily.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an event to the log.
    pub fn insert_event(&self, event: RiskEvent) {
        self.write_events().push(event);
    }

    /// Fetch a copy of one event.
    pub fn get_event(&self, id: Uuid) -> Option<RiskEvent> {
        self.read_events().iter().find(|e| e.id == id).cloned()
    }

    /// Mutate one event under the write lock.
    pub fn with_event_mut<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut RiskEvent) -> Result<T, RiskError>,
    ) -> Result<T, RiskError> {
        let mut events = self.write_events();
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RiskError::NotFound(format!("event {id}")))?;
        f(event)
    }

    /// Events matching the filter, newest first.
    pub fn query_events(&self, filter: &EventFilter) -> Vec<RiskEvent> {
        let events = self.read_events();
        let mut matched: Vec<RiskEvent> = events
            .iter()
            .filter(|e| filter.event_type.is_none_or(|t| e.event_type == t))
            .filter(|e| filter.severity.is_none_or(|s| e.severity == s))
            .filter(|e| filter.status.is_none_or(|s| e.status == s))
            .filter(|e| {
                filter
                    .pair
                    .as_ref()
                    .is_none_or(|p| e.pair.as_deref() == Some(p.as_str()))
            })
            .filter(|e| filter.since.is_none_or(|t| e.created_at >= t))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// All events still awaiting resolution (open or escalated).
    pub fn open_events(&self) -> Vec<RiskEvent> {
        self.read_events()
            .iter()
            .filter(|e| !e.is_closed())
            .cloned()
            .collect()
    }

    /// Count of open and escalated events at or above a severity.
    pub fn open_events_at_or_above(&self, severity: RiskSeverity) -> usize {
        self.read_events()
            .iter()
            .filter(|e| !e.is_closed() && e.severity >= severity)
            .count()
    }

    /// Aggregate counts over the full log.
    pub fn event_statistics(&self) -> EventStatistics {
        self.event_statistics_since(None)
    }

    /// Aggregate counts over events created at or after `since`.
    pub fn event_statistics_since(&self, since: Option<DateTime<Utc>>) -> EventStatistics {
        let events = self.read_events();
        let mut stats = EventStatistics {
            total: 0,
            open: 0,
            resolved: 0,
            escalated: 0,
            acknowledged: 0,
            by_severity: HashMap::new(),
            by_type: HashMap::new(),
            by_status: HashMap::new(),
            resolution_rate_pct: 0.0,
            escalation_rate_pct: 0.0,
            acknowledgment_rate_pct: 0.0,
        };
        for event in events.iter() {
            if since.is_some_and(|t| event.created_at < t) {
                continue;
            }
            stats.total += 1;
            if !event.is_closed() {
                stats.open += 1;
            }
            match event.status {
                RiskEventStatus::Resolved => stats.resolved += 1,
                RiskEventStatus::Escalated => stats.escalated += 1,
                _ => {}
            }
            if event.acknowledged_at.is_some() {
                stats.acknowledged += 1;
            }
            *stats.by_severity.entry(event.severity).or_insert(0) += 1;
            *stats.by_type.entry(event.event_type).or_insert(0) += 1;
            *stats.by_status.entry(event.status).or_insert(0) += 1;
        }
        if stats.total > 0 {
            let total = stats.total as f64;
            stats.resolution_rate_pct = stats.resolved as f64 / total * 100.0;
            stats.escalation_rate_pct = stats.escalated as f64 / total * 100.0;
            stats.acknowledgment_rate_pct = stats.acknowledged as f64 / total * 100.0;
        }
        stats
    }

    /// Copy of one day's tracking row.
    pub fn daily_row(&self, date: NaiveDate) -> Option<DailyLossTracking> {
        self.read_daily().get(&date).cloned()
    }

    /// Daily rows in date order.
    pub fn daily_history(&self) -> Vec<DailyLossTracking> {
        self.read_daily().values().cloned().collect()
    }

    /// Run `f` against the row for `date`, creating it first if absent.
    ///
    /// Creation and mutation happen under one write-lock acquisition, so
    /// concurrent callers for the same date see exactly one row.
    pub fn with_daily_mut<T>(
        &self,
        date: NaiveDate,
        create: impl FnOnce() -> DailyLossTracking,
        f: impl FnOnce(&mut DailyLossTracking) -> T,
    ) -> T {
        let mut daily = self.write_daily();
        let row = daily.entry(date).or_insert_with(create);
        f(row)
    }

    /// Run `f` against the row for `date` only if it exists.
    pub fn with_existing_daily_mut<T>(
        &self,
        date: NaiveDate,
        f: impl FnOnce(&mut DailyLossTracking) -> T,
    ) -> Option<T> {
        self.write_daily().get_mut(&date).map(f)
    }

    /// Record the latest per-coin valuation in quote currency.
    pub fn set_valuation(&self, coin: &str, value: Decimal) {
        self.valuations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(coin.to_string(), value);
    }

    pub fn valuation(&self, coin: &str) -> Option<Decimal> {
        self.valuations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(coin)
            .copied()
    }

    /// Snapshot of the latest valuations table.
    pub fn valuations(&self) -> HashMap<String, Decimal> {
        self.valuations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskEventCategory;
    use rust_decimal_macros::dec;

    fn make_event(event_type: RiskEventType, severity: RiskSeverity) -> RiskEvent {
        RiskEvent {
            id: Uuid::new_v4(),
            pair: Some("SOL/USDT".to_string()),
            coin: None,
            event_type,
            severity,
            status: RiskEventStatus::Open,
            trigger_value: dec!(1),
            threshold_value: dec!(1),
            current_value: dec!(1),
            description: "test".to_string(),
            category: RiskEventCategory::TradingRisk,
            metadata: None,
            created_by: "test".to_string(),
            acknowledged_by: None,
            created_at: Utc::now(),
            resolved_at: None,
            acknowledged_at: None,
        }
    }

    #[test]
    fn test_query_filters_and_limit() {
        let store = RiskStore::new();
        store.insert_event(make_event(RiskEventType::StopLoss, RiskSeverity::Low));
        store.insert_event(make_event(RiskEventType::StopLoss, RiskSeverity::High));
        store.insert_event(make_event(RiskEventType::Custom, RiskSeverity::High));

        let high = store.query_events(&EventFilter {
            severity: Some(RiskSeverity::High),
            ..Default::default()
        });
        assert_eq!(high.len(), 2);

        let capped = store.query_events(&EventFilter {
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn test_with_event_mut_missing_id() {
        let store = RiskStore::new();
        let err = store
            .with_event_mut(Uuid::new_v4(), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, RiskError::NotFound(_)));
    }

    #[test]
    fn test_statistics_count_open_events() {
        let store = RiskStore::new();
        let mut resolved = make_event(RiskEventType::TakeProfit, RiskSeverity::Low);
        resolved.resolve("test", Utc::now()).unwrap();
        store.insert_event(resolved);
        store.insert_event(make_event(RiskEventType::StopLoss, RiskSeverity::Critical));

        let stats = store.event_statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.by_severity[&RiskSeverity::Critical], 1);
        assert_eq!(store.open_events_at_or_above(RiskSeverity::High), 1);
    }

    #[test]
    fn test_daily_get_or_create_is_single_row() {
        let store = RiskStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let create = || DailyLossTracking::new(date, dec!(10000), dec!(5.0), Utc::now());

        store.with_daily_mut(date, create, |row| {
            row.update_portfolio_value(dec!(9900), Utc::now());
        });
        store.with_daily_mut(
            date,
            || DailyLossTracking::new(date, dec!(1), dec!(5.0), Utc::now()),
            |row| {
                // Second call sees the existing row, not a fresh one
                assert_eq!(row.starting_portfolio_value, dec!(10000));
            },
        );
        assert_eq!(store.daily_history().len(), 1);
    }
}
