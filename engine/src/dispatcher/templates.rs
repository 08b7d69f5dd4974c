//! Notification templates and their render contexts
//!
//! The engine does not render message bodies. It picks a template id and
//! builds a JSON context (subject line included); the gateway's owner renders.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{EscalationNotice, WarningNotice};
use crate::evaluator::TimerState;
use crate::model::Complaint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    EscalationTargetOfficer,
    EscalationComplainant,
    EscalationWorkerNotice,
    EscalationPreviousOfficer,
    SlaWarningWorker,
    SlaWarningOfficer,
}

impl TemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EscalationTargetOfficer => "escalation_target_officer",
            Self::EscalationComplainant => "escalation_complainant",
            Self::EscalationWorkerNotice => "escalation_worker_notice",
            Self::EscalationPreviousOfficer => "escalation_previous_officer",
            Self::SlaWarningWorker => "sla_warning_worker",
            Self::SlaWarningOfficer => "sla_warning_officer",
        }
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn complaint_fields(complaint: &Complaint) -> Value {
    json!({
        "complaint_id": complaint.id,
        "tracking_id": complaint.tracking_id(),
        "title": complaint.title,
        "location": complaint.location,
        "priority": complaint.priority.to_string(),
        "status": complaint.status.as_str(),
        "filed_at": complaint.created_at.format("%Y-%m-%d %H:%M").to_string(),
    })
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

pub(crate) fn escalation_context(template: TemplateId, notice: &EscalationNotice) -> Value {
    let c = &notice.complaint;
    let subject = match template {
        TemplateId::EscalationTargetOfficer => format!("URGENT: Complaint Escalated - #{}", c.id),
        TemplateId::EscalationComplainant => {
            format!("Your Complaint Has Been Escalated - #{}", c.id)
        }
        TemplateId::EscalationWorkerNotice => "Complaint Escalated - Performance Notice".to_string(),
        _ => format!("Complaint Escalated From Your Supervision - #{}", c.id),
    };
    let responsible = &notice.responsible;
    merge(
        complaint_fields(c),
        json!({
            "subject": subject,
            "reason": notice.escalation.reason,
            "escalation_id": notice.escalation.id.to_string(),
            "escalated_at": notice.escalation.created_at.format("%Y-%m-%d %H:%M").to_string(),
            "escalation_hours": notice.escalation_hours,
            "new_officer": notice.target.name,
            "responsible_party": responsible.display_text,
            "previous_worker": responsible.worker.as_ref().map(|w| w.name.clone()),
            "previous_officer": responsible.officer.as_ref().map(|o| o.name.clone()),
        }),
    )
}

pub(crate) fn warning_context(template: TemplateId, notice: &WarningNotice) -> Value {
    let c = &notice.complaint;
    let hours_remaining = notice.evaluation.hours_left();
    let subject = match template {
        TemplateId::SlaWarningWorker => format!(
            "SLA Warning - Complaint #{} - {:.1}h remaining",
            c.id, hours_remaining
        ),
        _ => format!("SLA Warning - Complaint #{}", c.id),
    };
    merge(
        complaint_fields(c),
        json!({
            "subject": subject,
            "urgency": if notice.evaluation.state == TimerState::Critical { "critical" } else { "warning" },
            "hours_remaining": hours_remaining,
            "deadline": notice.evaluation.deadline.format("%Y-%m-%d %H:%M").to_string(),
            "assigned_to": notice
                .responsible
                .worker
                .as_ref()
                .map_or_else(|| "Not assigned".to_string(), |w| w.name.clone()),
        }),
    )
}
