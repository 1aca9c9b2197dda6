//! Risk threshold store with environment overrides and change auditing

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    Environment, EventMetadata, RiskEventCategory, RiskSeverity, Threshold, ThresholdChange,
    ThresholdType,
};
use crate::risk::events::{LogEventParams, RiskEventLogger};
use crate::risk::RiskError;

const CHANGE_HISTORY_CAP: usize = 1000;

/// Settings applied when the store is constructed
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub environment: Environment,
    /// Changes in these environments apply immediately; elsewhere they wait
    /// for manual approval
    pub auto_apply_environments: Vec<Environment>,
    /// Multiplier over the threshold that upgrades a compliance breach from
    /// medium to high severity
    pub breach_escalation_factor: Decimal,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            auto_apply_environments: vec![
                Environment::Development,
                Environment::Staging,
                Environment::Testing,
            ],
            breach_escalation_factor: dec!(1.5),
        }
    }
}

/// Outcome of a threshold change request
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdChangeOutcome {
    /// Applied immediately
    Applied {
        old_value: Decimal,
        new_value: Decimal,
    },
    /// Recorded as a pending-approval event; the live value is untouched
    PendingApproval { event_id: Uuid },
}

/// Compliance verdict for a single observed value
#[derive(Debug, Clone, PartialEq)]
pub enum ComplianceStatus {
    Compliant,
    /// Observed value breaches the threshold at the given severity
    Breach {
        severity: RiskSeverity,
        threshold: Decimal,
        observed: Decimal,
    },
}

struct ThresholdState {
    /// Base table after environment overrides were layered on
    live: HashMap<ThresholdType, Threshold>,
    history: VecDeque<ThresholdChange>,
}

/// Owns the live threshold table
///
/// Values resolve as environment override over base default. Unapproved
/// changes are recorded in the audit trail and as a pending event, but
/// never touch the live table.
pub struct ThresholdStore {
    state: Mutex<ThresholdState>,
    settings: RwLock<ThresholdSettings>,
    events: Arc<RiskEventLogger>,
}

impl ThresholdStore {
    pub fn new(settings: ThresholdSettings, events: Arc<RiskEventLogger>) -> Self {
        let mut live = HashMap::new();
        for threshold_type in ThresholdType::ALL {
            let mut threshold = Threshold::default_for(threshold_type);
            if let Some(value) = environment_override(settings.environment, threshold_type) {
                threshold.value = value;
            }
            live.insert(threshold_type, threshold);
        }
        Self {
            state: Mutex::new(ThresholdState {
                live,
                history: VecDeque::new(),
            }),
            settings: RwLock::new(settings),
            events,
        }
    }

    /// Replace the store settings at runtime. Live threshold values are not
    /// re-seeded; a new environment only affects future resets and audits.
    pub fn update_configuration(&self, settings: ThresholdSettings) {
        let mut current = self.settings.write().unwrap_or_else(|e| e.into_inner());
        info!(environment = ?settings.environment, "threshold settings updated");
        *current = settings;
    }

    fn settings(&self) -> ThresholdSettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Current value of one threshold.
    pub fn get(&self, threshold_type: ThresholdType) -> Threshold {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.live[&threshold_type].clone()
    }

    /// Snapshot of the full live table.
    pub fn get_all(&self) -> HashMap<ThresholdType, Threshold> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.live.clone()
    }

    /// Request a threshold change.
    ///
    /// Bounds are validated against the threshold's own range first. In
    /// auto-apply environments the change lands immediately; otherwise it is
    /// parked as a pending event for later approval.
    pub fn set(
        &self,
        threshold_type: ThresholdType,
        new_value: Decimal,
        changed_by: &str,
    ) -> Result<ThresholdChangeOutcome, RiskError> {
        self.set_at(threshold_type, new_value, changed_by, Utc::now())
    }

    pub fn set_at(
        &self,
        threshold_type: ThresholdType,
        new_value: Decimal,
        changed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<ThresholdChangeOutcome, RiskError> {
        let bounds = Threshold::default_for(threshold_type);
        if !bounds.in_bounds(new_value) {
            return Err(RiskError::OutOfBounds {
                value: new_value,
                min: bounds.min_value,
                max: bounds.max_value,
                clamped: new_value.clamp(bounds.min_value, bounds.max_value),
            });
        }

        let settings = self.settings();
        let auto_apply = settings
            .auto_apply_environments
            .contains(&settings.environment);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let old_value = state.live[&threshold_type].value;

        if auto_apply {
            if let Some(threshold) = state.live.get_mut(&threshold_type) {
                threshold.value = new_value;
            }
            push_change(
                &mut state.history,
                ThresholdChange {
                    threshold_type,
                    environment: settings.environment,
                    old_value,
                    new_value,
                    changed_by: changed_by.to_string(),
                    approved: true,
                    changed_at: now,
                },
            );
            drop(state);
            info!(?threshold_type, %old_value, %new_value, changed_by, "threshold updated");
            Ok(ThresholdChangeOutcome::Applied {
                old_value,
                new_value,
            })
        } else {
            drop(state);
            let event_id = self
                .events
                .log_at(
                    LogEventParams {
                        event_type: crate::models::RiskEventType::Custom,
                        severity: RiskSeverity::Medium,
                        category: RiskEventCategory::ComplianceRisk,
                        pair: None,
                        coin: None,
                        trigger_value: new_value,
                        threshold_value: old_value,
                        current_value: old_value,
                        description: format!(
                            "threshold change for {threshold_type:?} awaiting approval"
                        ),
                        metadata: Some(EventMetadata::ThresholdChangeRequest {
                            threshold_type,
                            old_value,
                            new_value,
                            requested_by: changed_by.to_string(),
                            approved: None,
                        }),
                        created_by: changed_by.to_string(),
                    },
                    now,
                )
                .ok_or_else(|| {
                    RiskError::Internal("event logging disabled, cannot park change".to_string())
                })?;
            info!(?threshold_type, %new_value, event_id = %event_id, "threshold change parked for approval");
            Ok(ThresholdChangeOutcome::PendingApproval { event_id })
        }
    }

    /// Settle a parked change. Approval applies the stored new value;
    /// rejection only records the decision.
    pub fn settle_pending_change(
        &self,
        event_id: Uuid,
        approve: bool,
        decided_by: &str,
    ) -> Result<(), RiskError> {
        self.settle_pending_change_at(event_id, approve, decided_by, Utc::now())
    }

    pub fn settle_pending_change_at(
        &self,
        event_id: Uuid,
        approve: bool,
        decided_by: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RiskError> {
        // The parked event is the source of truth for the requested change.
        let (threshold_type, new_value, requested_by) =
            self.events.store().with_event_mut(event_id, |event| {
                match &mut event.metadata {
                    Some(EventMetadata::ThresholdChangeRequest {
                        threshold_type,
                        new_value,
                        requested_by,
                        approved,
                        ..
                    }) => {
                        if approved.is_some() {
                            return Err(RiskError::StateConflict(format!(
                                "change in event {event_id} already settled"
                            )));
                        }
                        *approved = Some(approve);
                        let out = (*threshold_type, *new_value, requested_by.clone());
                        event.resolve(decided_by, now)?;
                        Ok(out)
                    }
                    _ => Err(RiskError::Validation(format!(
                        "event {event_id} is not a threshold change request"
                    ))),
                }
            })?;

        let environment = self.settings().environment;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let old_value = state.live[&threshold_type].value;
        if approve {
            if let Some(threshold) = state.live.get_mut(&threshold_type) {
                threshold.value = new_value;
            }
        }
        push_change(
            &mut state.history,
            ThresholdChange {
                threshold_type,
                environment,
                old_value,
                new_value,
                changed_by: requested_by,
                approved: approve,
                changed_at: now,
            },
        );
        drop(state);

        if approve {
            info!(?threshold_type, %new_value, decided_by, "parked threshold change approved");
        } else {
            warn!(?threshold_type, %new_value, decided_by, "parked threshold change rejected");
        }
        Ok(())
    }

    /// Put one threshold back to its environment-resolved default.
    pub fn reset_to_default(
        &self,
        threshold_type: ThresholdType,
        changed_by: &str,
    ) -> Result<Decimal, RiskError> {
        let environment = self.settings().environment;
        let mut default = Threshold::default_for(threshold_type);
        if let Some(value) = environment_override(environment, threshold_type) {
            default.value = value;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let old_value = state.live[&threshold_type].value;
        let new_value = default.value;
        state.live.insert(threshold_type, default);
        push_change(
            &mut state.history,
            ThresholdChange {
                threshold_type,
                environment,
                old_value,
                new_value,
                changed_by: changed_by.to_string(),
                approved: true,
                changed_at: Utc::now(),
            },
        );
        Ok(new_value)
    }

    /// Judge one observed value against its threshold.
    ///
    /// Liquidity is a floor (breach when observed falls below); all other
    /// thresholds are ceilings.
    pub fn check_compliance(
        &self,
        threshold_type: ThresholdType,
        observed: Decimal,
    ) -> ComplianceStatus {
        let threshold = self.get(threshold_type);
        let breached = match threshold_type {
            ThresholdType::Liquidity => observed < threshold.value,
            _ => observed > threshold.value,
        };
        if !breached {
            return ComplianceStatus::Compliant;
        }
        let factor = self.settings().breach_escalation_factor;
        let severity = match threshold_type {
            ThresholdType::Liquidity => {
                if observed * factor < threshold.value {
                    RiskSeverity::High
                } else {
                    RiskSeverity::Medium
                }
            }
            _ => {
                if observed > threshold.value * factor {
                    RiskSeverity::High
                } else {
                    RiskSeverity::Medium
                }
            }
        };
        ComplianceStatus::Breach {
            severity,
            threshold: threshold.value,
            observed,
        }
    }

    /// True while an open compliance-risk event at high severity or above
    /// is on file. Parked change requests and lesser breaches never block.
    pub fn has_blocking_violation(&self) -> bool {
        self.events
            .store()
            .open_events()
            .iter()
            .any(|e| {
                e.category == RiskEventCategory::ComplianceRisk
                    && e.severity >= RiskSeverity::High
            })
    }

    /// Change audit trail, newest first.
    pub fn change_history(&self) -> Vec<ThresholdChange> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.history.iter().rev().cloned().collect()
    }
}

fn push_change(history: &mut VecDeque<ThresholdChange>, change: ThresholdChange) {
    if history.len() >= CHANGE_HISTORY_CAP {
        history.pop_front();
    }
    history.push_back(change);
}

/// Override values layered over the base defaults per environment.
///
/// Production runs the base table untouched; the laxer environments widen
/// the loss limits so tests and dry runs do not trip halts constantly.
fn environment_override(
    environment: Environment,
    threshold_type: ThresholdType,
) -> Option<Decimal> {
    match (environment, threshold_type) {
        (Environment::Production, _) => None,
        (Environment::Staging, ThresholdType::DailyLoss) => Some(dec!(8.0)),
        (Environment::Staging, ThresholdType::MaxDrawdown) => Some(dec!(15.0)),
        (Environment::Development, ThresholdType::DailyLoss) => Some(dec!(10.0)),
        (Environment::Development, ThresholdType::MaxDrawdown) => Some(dec!(20.0)),
        (Environment::Development, ThresholdType::PositionSize) => Some(dec!(5.0)),
        (Environment::Testing, ThresholdType::DailyLoss) => Some(dec!(15.0)),
        (Environment::Testing, ThresholdType::MaxDrawdown) => Some(dec!(30.0)),
        (Environment::Testing, ThresholdType::PositionSize) => Some(dec!(8.0)),
        (Environment::Testing, ThresholdType::Leverage) => Some(dec!(5.0)),
        _ => None,
    }
}
