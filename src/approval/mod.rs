//! Human-in-the-loop approval queue.
//!
//! Shared by every conversation: the orchestration loop submits, the review
//! interface resolves. All status transitions are compare-and-set from
//! `Pending` under one short-lived lock, so two reviewers can never
//! double-resolve a request.

use crate::error::ApprovalError;
use crate::stage::ScamStage;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use strum::Display;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

/// Priority tiers, ordered for review: critical drains first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestKind {
    Response,
    Action,
}

/// The proposed response plus enough context for a reviewer to judge it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub conversation_id: Uuid,
    pub proposed_response: String,
    pub counterpart_message: String,
    pub stage: Option<ScamStage>,
    pub confidence: f64,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub kind: RequestKind,
    pub payload: ApprovalPayload,
    pub priority: Priority,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
}

/// Filters for listing pending requests.
#[derive(Debug, Clone, Default)]
pub struct PendingFilter {
    pub kind: Option<RequestKind>,
    pub priority: Option<Priority>,
    pub limit: Option<usize>,
}

/// Aggregate counters for the review interface.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatistics {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub expired: usize,
    pub approval_rate: f64,
}

/// Rules deciding when a response needs a human before it is sent.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalPolicy {
    /// Confidence below this requires review.
    pub auto_approve_threshold: f64,
    /// Risk above this requires review regardless of confidence.
    pub max_auto_risk: f64,
    /// Random sampling rate for quality audit.
    pub audit_sample_rate: f64,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 0.7,
            max_auto_risk: 0.7,
            audit_sample_rate: 0.1,
        }
    }
}

impl ApprovalPolicy {
    /// Whether this turn's response must pass human review. Critical stages
    /// always route to the queue, however confident the pipeline is.
    pub fn requires_approval(
        &self,
        confidence: f64,
        risk_score: f64,
        stage: Option<ScamStage>,
    ) -> bool {
        if risk_score > self.max_auto_risk {
            return true;
        }
        if confidence < self.auto_approve_threshold {
            return true;
        }
        if stage.is_some_and(ScamStage::is_critical) {
            return true;
        }
        rand::rng().random::<f64>() < self.audit_sample_rate
    }
}

/// In-memory queue keyed by request id. Terminal requests stay for audit and
/// statistics until `cleanup` prunes them by age.
#[derive(Debug, Default)]
pub struct ApprovalQueue {
    requests: Mutex<HashMap<Uuid, ApprovalRequest>>,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(
        &self,
        kind: RequestKind,
        payload: ApprovalPayload,
        priority: Priority,
        ttl: Duration,
    ) -> ApprovalRequest {
        let now = Utc::now();
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            kind,
            payload,
            priority,
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            reviewed_at: None,
            reviewer: None,
            notes: None,
        };

        tracing::info!(
            request = %request.id,
            conversation = %request.payload.conversation_id,
            priority = %priority,
            "Approval request submitted"
        );

        let mut requests = self.requests.lock().expect("approval queue poisoned");
        requests.insert(request.id, request.clone());
        request
    }

    pub fn get(&self, id: Uuid) -> Option<ApprovalRequest> {
        self.requests
            .lock()
            .expect("approval queue poisoned")
            .get(&id)
            .cloned()
    }

    pub fn approve(
        &self,
        id: Uuid,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.resolve(id, ApprovalStatus::Approved, reviewer, notes)
    }

    pub fn reject(
        &self,
        id: Uuid,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.resolve(id, ApprovalStatus::Rejected, reviewer, notes)
    }

    /// Single-use terminal transition. Succeeds only from `Pending`; a second
    /// resolution attempt fails without touching reviewer or notes.
    fn resolve(
        &self,
        id: Uuid,
        status: ApprovalStatus,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let mut requests = self.requests.lock().expect("approval queue poisoned");
        let request = requests
            .get_mut(&id)
            .ok_or_else(|| ApprovalError::NotFound { id: id.to_string() })?;

        if request.status != ApprovalStatus::Pending {
            return Err(ApprovalError::Conflict {
                id: id.to_string(),
                status: request.status.to_string(),
            });
        }
        if Utc::now() > request.expires_at {
            request.status = ApprovalStatus::Expired;
            return Err(ApprovalError::Expired { id: id.to_string() });
        }

        request.status = status;
        request.reviewed_at = Some(Utc::now());
        request.reviewer = Some(reviewer.to_string());
        request.notes = notes.map(str::to_string);

        tracing::info!(request = %id, %status, reviewer, "Approval request resolved");
        Ok(request.clone())
    }

    /// Pending requests, lazily expiring overdue ones, ordered by priority
    /// tier then age (oldest first within a tier).
    pub fn pending(&self, filter: &PendingFilter) -> Vec<ApprovalRequest> {
        let mut requests = self.requests.lock().expect("approval queue poisoned");
        let now = Utc::now();

        for request in requests.values_mut() {
            if request.status == ApprovalStatus::Pending && now > request.expires_at {
                request.status = ApprovalStatus::Expired;
            }
        }

        let mut pending: Vec<ApprovalRequest> = requests
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .filter(|r| filter.kind.is_none_or(|k| r.kind == k))
            .filter(|r| filter.priority.is_none_or(|p| r.priority == p))
            .cloned()
            .collect();

        pending.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        if let Some(limit) = filter.limit {
            pending.truncate(limit);
        }
        pending
    }

    /// Remove terminal requests older than `age`. Pending requests are never
    /// removed. Returns the number pruned.
    pub fn cleanup(&self, age: Duration) -> usize {
        let cutoff = Utc::now() - age;
        let mut requests = self.requests.lock().expect("approval queue poisoned");
        let before = requests.len();
        requests.retain(|_, r| !(r.status.is_terminal() && r.created_at < cutoff));
        before - requests.len()
    }

    pub fn statistics(&self) -> QueueStatistics {
        let requests = self.requests.lock().expect("approval queue poisoned");
        let count =
            |status: ApprovalStatus| requests.values().filter(|r| r.status == status).count();

        let approved = count(ApprovalStatus::Approved);
        let rejected = count(ApprovalStatus::Rejected);
        let resolved = approved + rejected;

        QueueStatistics {
            total: requests.len(),
            pending: count(ApprovalStatus::Pending),
            approved,
            rejected,
            expired: count(ApprovalStatus::Expired),
            approval_rate: if resolved > 0 {
                approved as f64 / resolved as f64
            } else {
                0.0
            },
        }
    }
}
