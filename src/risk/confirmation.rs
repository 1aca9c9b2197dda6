//! Manual confirmation workflow for high-impact actions

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    Approval, ApprovalLevel, ApprovalRequest, ApprovalStatus, EventMetadata, RiskSeverity, Urgency,
};
use crate::notify::Notifier;
use crate::risk::events::RiskEventLogger;
use crate::risk::RiskError;

const APPROVAL_HISTORY_CAP: usize = 1000;

/// Settings for the confirmation manager
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfirmationSettings {
    /// When off, every submission auto-approves
    pub enabled: bool,
    /// Deadline for pending requests
    pub timeout_minutes: i64,
    /// Low-severity submissions skip the queue
    pub auto_approve_low_severity: bool,
    /// Operators allowed to approve, with their authority level. An empty
    /// map trusts the level the caller presents.
    pub approvers: HashMap<String, ApprovalLevel>,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_minutes: 60,
            auto_approve_low_severity: true,
            approvers: HashMap::new(),
        }
    }
}

/// Outcome of submitting an action for confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Approved without entering the queue
    AutoApproved { request_id: Uuid },
    /// Waiting for operator signatures
    Pending { request_id: Uuid },
}

/// Outcome of one approval signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The request is fully approved
    Approved,
    /// More distinct-level signatures are still needed
    PartiallyApproved { granted: u32, required: u32 },
}

/// Queues and settles approval requests
///
/// A finalized approval resolves the linked risk event; when that event is
/// a resume request the originating shutdown event resolves with it.
pub struct ConfirmationManager {
    pending: Mutex<HashMap<Uuid, ApprovalRequest>>,
    history: Mutex<VecDeque<ApprovalRequest>>,
    settings: RwLock<ConfirmationSettings>,
    events: Arc<RiskEventLogger>,
    notifier: Arc<dyn Notifier>,
}

impl ConfirmationManager {
    pub fn new(
        settings: ConfirmationSettings,
        events: Arc<RiskEventLogger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            settings: RwLock::new(settings),
            events,
            notifier,
        }
    }

    /// Replace the manager settings at runtime. Requests already in the
    /// queue keep the deadline they were created with.
    pub fn update_configuration(&self, settings: ConfirmationSettings) {
        let mut current = self.settings.write().unwrap_or_else(|e| e.into_inner());
        info!(enabled = settings.enabled, "confirmation settings updated");
        *current = settings;
    }

    fn settings(&self) -> ConfirmationSettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Signature requirements per urgency.
    fn requirements(urgency: Urgency) -> (u32, ApprovalLevel) {
        match urgency {
            Urgency::Low | Urgency::Normal => (1, ApprovalLevel::Level1),
            Urgency::High => (1, ApprovalLevel::Level2),
            Urgency::Critical => (2, ApprovalLevel::Level2),
        }
    }

    /// Submit an action for confirmation.
    pub fn submit(
        &self,
        event_id: Uuid,
        action: &str,
        requested_by: &str,
        urgency: Urgency,
        severity: RiskSeverity,
    ) -> Result<SubmitOutcome, RiskError> {
        self.submit_at(event_id, action, requested_by, urgency, severity, Utc::now())
    }

    pub fn submit_at(
        &self,
        event_id: Uuid,
        action: &str,
        requested_by: &str,
        urgency: Urgency,
        severity: RiskSeverity,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, RiskError> {
        let settings = self.settings();
        let (required_approvals, required_level) = Self::requirements(urgency);
        let mut request = ApprovalRequest::new(
            event_id,
            action.to_string(),
            requested_by.to_string(),
            urgency,
            required_approvals,
            required_level,
            settings.timeout_minutes,
            now,
        );

        let auto = !settings.enabled
            || (settings.auto_approve_low_severity && severity == RiskSeverity::Low);
        if auto {
            request.status = ApprovalStatus::Approved;
            request.resolved_at = Some(now);
            request.approvals.push(Approval {
                approver: "auto".to_string(),
                level: ApprovalLevel::Auto,
                comment: Some("auto-approved".to_string()),
                approved_at: now,
            });
            let request_id = request.id;
            self.push_history(request);
            info!(%request_id, action, "confirmation auto-approved");
            return Ok(SubmitOutcome::AutoApproved { request_id });
        }

        let request_id = request.id;
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id, request);
        self.notifier.send(&format!(
            "approval required: {action} (urgency {urgency:?}, request {request_id})"
        ));
        info!(%request_id, action, ?urgency, "confirmation queued");
        Ok(SubmitOutcome::Pending { request_id })
    }

    /// Record one approval signature.
    ///
    /// `presented_level` is trusted only when no approver allow-list is
    /// configured; otherwise the approver's listed level applies.
    pub fn approve(
        &self,
        request_id: Uuid,
        approver: &str,
        presented_level: ApprovalLevel,
        comment: Option<String>,
    ) -> Result<ApprovalOutcome, RiskError> {
        self.approve_at(request_id, approver, presented_level, comment, Utc::now())
    }

    pub fn approve_at(
        &self,
        request_id: Uuid,
        approver: &str,
        presented_level: ApprovalLevel,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, RiskError> {
        let approvers = self.settings().approvers;
        let level = if approvers.is_empty() {
            // AUTO outranks every operator level; only the manager itself
            // may sign with it
            if presented_level == ApprovalLevel::Auto {
                return Err(RiskError::Validation(
                    "AUTO is reserved for system approvals".to_string(),
                ));
            }
            presented_level
        } else {
            *approvers.get(approver).ok_or_else(|| {
                RiskError::Validation(format!("{approver} is not an authorized approver"))
            })?
        };

        // Signature, finalization check, and queue removal all happen under
        // the pending-map lock so two racing approvers cannot both finalize.
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let request = pending
            .get_mut(&request_id)
            .ok_or_else(|| RiskError::NotFound(format!("request {request_id}")))?;

        let satisfied = match request.sign(approver, level, comment, now) {
            Ok(satisfied) => satisfied,
            Err(err) => {
                if matches!(err, RiskError::Expired(_)) {
                    // sign already flipped the status; archive the request
                    let request = pending.remove(&request_id);
                    drop(pending);
                    if let Some(request) = request {
                        self.push_history(request);
                    }
                }
                return Err(err);
            }
        };

        if !satisfied {
            let granted = request.distinct_levels();
            let required = request.required_approvals;
            let action = request.action.clone();
            drop(pending);
            self.notifier.send(&format!(
                "approval progress: {action} at {granted}/{required} (request {request_id})"
            ));
            info!(%request_id, approver, granted, required, "partial approval recorded");
            return Ok(ApprovalOutcome::PartiallyApproved { granted, required });
        }

        let request = pending
            .remove(&request_id)
            .ok_or_else(|| RiskError::Internal("request vanished mid-approval".to_string()))?;
        drop(pending);

        let event_id = request.event_id;
        let action = request.action.clone();
        self.push_history(request);
        self.resolve_linked_events(event_id, approver, now)?;
        self.notifier.send(&format!(
            "approval granted: {action} (request {request_id}, final signer {approver})"
        ));
        info!(%request_id, approver, "request fully approved");
        Ok(ApprovalOutcome::Approved)
    }

    /// Reject a pending request outright.
    pub fn reject(&self, request_id: Uuid, approver: &str, reason: &str) -> Result<(), RiskError> {
        self.reject_at(request_id, approver, reason, Utc::now())
    }

    pub fn reject_at(
        &self,
        request_id: Uuid,
        approver: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RiskError> {
        let approvers = self.settings().approvers;
        if !approvers.is_empty() && !approvers.contains_key(approver) {
            return Err(RiskError::Validation(format!(
                "{approver} is not an authorized approver"
            )));
        }
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let request = pending
            .get_mut(&request_id)
            .ok_or_else(|| RiskError::NotFound(format!("request {request_id}")))?;
        request.reject(format!("{approver}: {reason}"), now)?;
        let action = request.action.clone();
        let request = pending.remove(&request_id);
        drop(pending);
        if let Some(request) = request {
            self.push_history(request);
        }
        self.notifier.send(&format!(
            "approval rejected: {action} (request {request_id}, by {approver}: {reason})"
        ));
        warn!(%request_id, approver, reason, "request rejected");
        Ok(())
    }

    /// Forward a pending request to a higher approval level.
    ///
    /// The request stays in the queue and can still be signed; the linked
    /// risk event is escalated alongside it.
    pub fn escalate(
        &self,
        request_id: Uuid,
        escalated_by: &str,
        reason: &str,
        target_level: Option<ApprovalLevel>,
    ) -> Result<(), RiskError> {
        let approvers = self.settings().approvers;
        if !approvers.is_empty() && !approvers.contains_key(escalated_by) {
            return Err(RiskError::Validation(format!(
                "{escalated_by} is not an authorized approver"
            )));
        }
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let request = pending
            .get_mut(&request_id)
            .ok_or_else(|| RiskError::NotFound(format!("request {request_id}")))?;
        request.escalate(escalated_by.to_string(), reason.to_string(), target_level)?;
        let event_id = request.event_id;
        let action = request.action.clone();
        drop(pending);

        match self.events.escalate_event(event_id, escalated_by) {
            // A second escalation finds the event already escalated
            Ok(()) | Err(RiskError::StateConflict(_)) => {}
            Err(other) => return Err(other),
        }
        self.notifier.send(&format!(
            "approval escalated: {action} (request {request_id}, by {escalated_by}: {reason})"
        ));
        info!(%request_id, escalated_by, reason, "request escalated");
        Ok(())
    }

    /// Expire overdue requests; returns how many were swept.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let expired_ids: Vec<Uuid> = pending
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id)
            .collect();
        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(mut request) = pending.remove(&id) {
                request.status = ApprovalStatus::Expired;
                request.resolved_at = Some(now);
                expired.push(request);
            }
        }
        drop(pending);

        let count = expired.len();
        for request in expired {
            warn!(request_id = %request.id, action = %request.action, "approval request expired");
            // Dismiss the underlying event; it may already be closed
            match self
                .events
                .store()
                .with_event_mut(request.event_id, |event| event.ignore("approval_timeout", now))
            {
                Ok(()) | Err(RiskError::StateConflict(_)) | Err(RiskError::NotFound(_)) => {}
                Err(err) => {
                    warn!(request_id = %request.id, %err, "could not dismiss expired request's event");
                }
            }
            self.push_history(request);
        }
        count
    }

    /// A copy of one request, pending or settled.
    pub fn get_request(&self, request_id: Uuid) -> Option<ApprovalRequest> {
        if let Some(request) = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&request_id)
        {
            return Some(request.clone());
        }
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
    }

    /// Requests still awaiting signatures.
    pub fn pending_requests(&self) -> Vec<ApprovalRequest> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Settled requests, oldest first.
    pub fn history(&self) -> Vec<ApprovalRequest> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn push_history(&self, request: ApprovalRequest) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() >= APPROVAL_HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(request);
    }

    /// Resolve the linked event, and the shutdown behind it for resume
    /// requests.
    fn resolve_linked_events(
        &self,
        event_id: Uuid,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RiskError> {
        let linked_shutdown = match self.events.store().get_event(event_id) {
            Some(event) => match event.metadata {
                Some(EventMetadata::ResumeRequest {
                    shutdown_event_id, ..
                }) => Some(shutdown_event_id),
                _ => None,
            },
            None => None,
        };
        self.events.resolve_event_at(event_id, actor, now)?;
        if let Some(shutdown_event_id) = linked_shutdown {
            match self.events.resolve_event_at(shutdown_event_id, actor, now) {
                Ok(()) | Err(RiskError::StateConflict(_)) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }
}
