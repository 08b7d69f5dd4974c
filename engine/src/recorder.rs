//! Escalation Recorder
//!
//! Persists one escalation as a single version-checked commit: the
//! append-only `Escalation` record, the audit entry, and the complaint
//! mutation (status, assignee, priority, counter, timestamp) land together or
//! not at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EscalationResult;
use crate::model::{
    Complaint, ComplaintLogEntry, ComplaintPatch, ComplaintStatus, Escalation, Officer,
};
use crate::registry::SlaPolicy;
use crate::resolver::ResponsibleParty;
use crate::store::{ComplaintStore, UpdateOutcome};

/// What a call to [`Recorder::record`] did
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recorded(Escalation),
    /// Already escalated inside the current window; nothing written
    AlreadyEscalated { at: DateTime<Utc> },
    /// Version moved underneath us; nothing written
    Conflict { current_version: u64 },
}

/// Whether `complaint` was escalated less than one escalation window ago.
pub fn escalated_within_window(
    complaint: &Complaint,
    policy: &SlaPolicy,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    complaint
        .last_escalated_at
        .filter(|at| now - *at < policy.escalation_window())
}

/// Audit reason naming whoever held the complaint at the breach.
pub fn escalation_reason(policy: &SlaPolicy, party: &ResponsibleParty) -> String {
    let mut reason = format!(
        "Auto-escalation: SLA breach. Complaint not resolved within {} hours. ",
        policy.escalation_hours
    );
    if party.is_unassigned() {
        reason.push_str("Previously responsible: Unassigned.");
        return reason;
    }
    if let Some(worker) = &party.worker {
        reason.push_str(&format!(
            "Previously assigned to worker: {} (worker #{}). ",
            worker.name, worker.id
        ));
    }
    match &party.officer {
        Some(officer) => reason.push_str(&format!(
            "Supervised by: {} (officer #{}).",
            officer.name, officer.id
        )),
        None => reason.push_str("No officer was previously assigned."),
    }
    reason
}

pub struct Recorder {
    store: Arc<dyn ComplaintStore>,
}

impl Recorder {
    pub fn new(store: Arc<dyn ComplaintStore>) -> Self {
        Self { store }
    }

    /// Escalate `complaint` to `target`, conditioned on `complaint.version`.
    pub async fn record(
        &self,
        complaint: &Complaint,
        policy: &SlaPolicy,
        party: &ResponsibleParty,
        target: &Officer,
        now: DateTime<Utc>,
    ) -> EscalationResult<RecordOutcome> {
        if let Some(at) = escalated_within_window(complaint, policy, now) {
            debug!(
                complaint_id = complaint.id,
                last_escalated_at = %at,
                "Escalation already recorded for this window"
            );
            return Ok(RecordOutcome::AlreadyEscalated { at });
        }

        let reason = escalation_reason(policy, party);
        let escalation = Escalation {
            id: Uuid::new_v4(),
            complaint_id: complaint.id,
            previous_officer: complaint.assigned_officer,
            previous_worker: complaint.assigned_worker,
            new_officer: target.id,
            reason: reason.clone(),
            created_at: now,
        };

        let new_status = ComplaintStatus::PendingReassignment;
        let patch = ComplaintPatch {
            status: Some(new_status),
            priority: Some(complaint.priority.raised()),
            assigned_officer: Some(Some(target.id)),
            assigned_worker: Some(None),
            escalation_count: Some(complaint.escalation_count.saturating_add(1)),
            last_escalated_at: Some(now),
            last_warned_at: None,
        };

        let log = ComplaintLogEntry {
            id: Uuid::new_v4(),
            complaint_id: complaint.id,
            note: reason,
            old_status: Some(complaint.status),
            new_status: Some(new_status),
            old_assignee: party.display_text.clone(),
            new_assignee: format!("officer {} (officer #{})", target.name, target.id),
            timestamp: now,
        };

        match self
            .store
            .commit_escalation(complaint.id, patch, complaint.version, escalation.clone(), log)
            .await?
        {
            UpdateOutcome::Applied { new_version } => {
                info!(
                    complaint_id = complaint.id,
                    escalation_id = %escalation.id,
                    target_officer = target.id,
                    new_version,
                    "Escalation recorded"
                );
                Ok(RecordOutcome::Recorded(escalation))
            }
            UpdateOutcome::Conflict { current_version } => {
                debug!(
                    complaint_id = complaint.id,
                    expected_version = complaint.version,
                    current_version,
                    "Escalation commit lost version race"
                );
                Ok(RecordOutcome::Conflict { current_version })
            }
        }
    }
}
