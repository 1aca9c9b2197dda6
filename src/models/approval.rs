//! Manual confirmation records

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::risk::RiskError;

/// Lifecycle of an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
    Expired,
}

/// Authority level of an approver
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalLevel {
    Level1,
    Level2,
    Level3,
    Auto,
}

/// How urgently a request needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Critical,
}

/// One approval signature on a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub approver: String,
    pub level: ApprovalLevel,
    pub comment: Option<String>,
    pub approved_at: DateTime<Utc>,
}

/// A pending (or settled) request for manual confirmation
///
/// A request is satisfied when approvals at `required_approvals` distinct
/// levels have been recorded. Multiple signatures at the same level count
/// once; a repeat signature at an already-granted level is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    /// Risk event this request is attached to
    pub event_id: Uuid,
    pub action: String,
    pub requested_by: String,
    pub urgency: Urgency,
    pub status: ApprovalStatus,
    pub required_approvals: u32,
    /// Minimum authority level any signature must carry
    pub required_level: ApprovalLevel,
    pub approvals: Vec<Approval>,
    pub rejection_reason: Option<String>,
    pub escalated_by: Option<String>,
    pub escalation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(
        event_id: Uuid,
        action: String,
        requested_by: String,
        urgency: Urgency,
        required_approvals: u32,
        required_level: ApprovalLevel,
        timeout_minutes: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            action,
            requested_by,
            urgency,
            status: ApprovalStatus::Pending,
            required_approvals,
            required_level,
            approvals: Vec::new(),
            rejection_reason: None,
            escalated_by: None,
            escalation_reason: None,
            created_at: now,
            expires_at: now + Duration::minutes(timeout_minutes),
            resolved_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True while the request can still collect signatures. Escalation is
    /// not terminal; the request keeps waiting at the higher level.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            ApprovalStatus::Pending | ApprovalStatus::Escalated
        )
    }

    /// Number of distinct approval levels that have signed so far.
    pub fn distinct_levels(&self) -> u32 {
        let mut levels: Vec<ApprovalLevel> = self.approvals.iter().map(|a| a.level).collect();
        levels.sort();
        levels.dedup();
        levels.len() as u32
    }

    /// Record one signature; returns true when the request is now satisfied.
    pub fn sign(
        &mut self,
        approver: &str,
        level: ApprovalLevel,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, RiskError> {
        if !self.is_open() {
            return Err(RiskError::StateConflict(format!(
                "request {} is {:?}, not pending",
                self.id, self.status
            )));
        }
        if self.is_expired(now) {
            self.status = ApprovalStatus::Expired;
            self.resolved_at = Some(now);
            return Err(RiskError::Expired(format!(
                "request {} expired at {}",
                self.id, self.expires_at
            )));
        }
        if level < self.required_level {
            return Err(RiskError::Validation(format!(
                "approver {approver} holds {level:?}, request requires {:?}",
                self.required_level
            )));
        }
        if self.approvals.iter().any(|a| a.level == level) {
            return Err(RiskError::StateConflict(format!(
                "level {level:?} has already signed request {}",
                self.id
            )));
        }

        self.approvals.push(Approval {
            approver: approver.to_string(),
            level,
            comment,
            approved_at: now,
        });

        if self.distinct_levels() >= self.required_approvals {
            self.status = ApprovalStatus::Approved;
            self.resolved_at = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn reject(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), RiskError> {
        if !self.is_open() {
            return Err(RiskError::StateConflict(format!(
                "request {} is {:?}, not pending",
                self.id, self.status
            )));
        }
        self.status = ApprovalStatus::Rejected;
        self.rejection_reason = Some(reason);
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Forward the request to a higher authority. The request stays open;
    /// `target_level` can only raise the requirement, never lower it.
    pub fn escalate(
        &mut self,
        escalated_by: String,
        reason: String,
        target_level: Option<ApprovalLevel>,
    ) -> Result<(), RiskError> {
        if !self.is_open() {
            return Err(RiskError::StateConflict(format!(
                "request {} is {:?}, not pending",
                self.id, self.status
            )));
        }
        self.status = ApprovalStatus::Escalated;
        self.escalated_by = Some(escalated_by);
        self.escalation_reason = Some(reason);
        if let Some(level) = target_level {
            self.required_level = self.required_level.max(level);
        }
        Ok(())
    }
}
