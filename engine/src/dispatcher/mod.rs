//! Notification Dispatcher
//!
//! Fans one event out to every affected recipient. Each delivery is
//! independent: it has its own retry budget, backoff and per-attempt timeout,
//! and one recipient failing never blocks or undoes the others. Nothing here
//! touches the complaint store, so a delivery failure cannot roll back an
//! escalation that was already committed.
//!
//! ```text
//! Escalation → target officer · complainant · previous worker · previous officer
//! Warning    → assigned worker · supervising officer
//! ```

pub mod gateway;
pub mod templates;

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::error::EscalationError;
use crate::evaluator::Evaluation;
use crate::model::{Complaint, ComplaintId, Contact, Escalation, Officer};
use crate::resolver::ResponsibleParty;

pub use gateway::{
    DeliveryError, LogGateway, NotificationGateway, Receipt, Recipient, RecipientRole,
    WebhookGateway,
};
pub use templates::TemplateId;

/// Everything needed to tell all parties about one escalation
#[derive(Debug, Clone)]
pub struct EscalationNotice {
    /// Complaint as it was when the deadline passed
    pub complaint: Complaint,
    pub escalation: Escalation,
    pub responsible: ResponsibleParty,
    pub target: Officer,
    pub citizen: Option<Contact>,
    pub escalation_hours: u32,
}

/// Deadline approaching for a complaint still held by its assignees
#[derive(Debug, Clone)]
pub struct WarningNotice {
    pub complaint: Complaint,
    pub responsible: ResponsibleParty,
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Escalation(Box<EscalationNotice>),
    Warning(Box<WarningNotice>),
}

impl NotificationEvent {
    pub fn complaint_id(&self) -> ComplaintId {
        match self {
            Self::Escalation(n) => n.complaint.id,
            Self::Warning(n) => n.complaint.id,
        }
    }

    /// (role, template, contact) for every recipient, present or not.
    fn plan(&self) -> Vec<(RecipientRole, TemplateId, Option<Contact>)> {
        match self {
            Self::Escalation(n) => vec![
                (
                    RecipientRole::TargetOfficer,
                    TemplateId::EscalationTargetOfficer,
                    Some(n.target.contact()),
                ),
                (
                    RecipientRole::Complainant,
                    TemplateId::EscalationComplainant,
                    n.citizen.clone(),
                ),
                (
                    RecipientRole::PreviousWorker,
                    TemplateId::EscalationWorkerNotice,
                    n.responsible.worker.clone(),
                ),
                (
                    RecipientRole::PreviousOfficer,
                    TemplateId::EscalationPreviousOfficer,
                    n.responsible.officer.clone(),
                ),
            ],
            Self::Warning(n) => vec![
                (
                    RecipientRole::AssignedWorker,
                    TemplateId::SlaWarningWorker,
                    n.responsible.worker.clone(),
                ),
                (
                    RecipientRole::SupervisingOfficer,
                    TemplateId::SlaWarningOfficer,
                    n.responsible.officer.clone(),
                ),
            ],
        }
    }

    fn context(&self, template: TemplateId) -> Value {
        match self {
            Self::Escalation(n) => templates::escalation_context(template, n),
            Self::Warning(n) => templates::warning_context(template, n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { receipt: Receipt, attempts: u32 },
    Failed { attempts: u32, error: String },
    /// No such party (e.g. no worker was assigned); nothing attempted
    Skipped { reason: String },
}

/// Result of notifying one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub complaint_id: ComplaintId,
    pub role: RecipientRole,
    pub template: TemplateId,
    pub recipient_id: Option<u64>,
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn attempted(&self) -> bool {
        !matches!(self.outcome, DeliveryOutcome::Skipped { .. })
    }

    pub fn delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn NotificationGateway>,
    config: NotificationConfig,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn NotificationGateway>, config: NotificationConfig) -> Self {
        Self { gateway, config }
    }

    /// Deliver `event` to all its recipients concurrently.
    pub async fn dispatch(&self, event: &NotificationEvent) -> Vec<DeliveryReport> {
        let complaint_id = event.complaint_id();
        let deliveries = event.plan().into_iter().map(|(role, template, contact)| {
            let context = event.context(template);
            async move {
                let Some(contact) = contact else {
                    debug!(complaint_id, role = %role, "No recipient for role; skipping");
                    return DeliveryReport {
                        complaint_id,
                        role,
                        template,
                        recipient_id: None,
                        outcome: DeliveryOutcome::Skipped {
                            reason: format!("no {role} on record"),
                        },
                    };
                };
                let recipient = Recipient { role, contact };
                let outcome = self.deliver(complaint_id, &recipient, template, &context).await;
                DeliveryReport {
                    complaint_id,
                    role,
                    template,
                    recipient_id: Some(recipient.contact.id),
                    outcome,
                }
            }
        });
        join_all(deliveries).await
    }

    /// Bounded retry with exponential backoff. Never returns an error:
    /// exhausting the budget is logged and reported.
    async fn deliver(
        &self,
        complaint_id: ComplaintId,
        recipient: &Recipient,
        template: TemplateId,
        context: &Value,
    ) -> DeliveryOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.timeout();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let backoff = self.config.backoff_before(attempt);
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }

            let result = match tokio::time::timeout(
                timeout,
                self.gateway.send(recipient, template, context),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(timeout)),
            };

            match result {
                Ok(receipt) => {
                    debug!(
                        complaint_id,
                        recipient = %recipient,
                        template = %template,
                        attempt,
                        "Notification delivered"
                    );
                    return DeliveryOutcome::Delivered {
                        receipt,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    last_error = e.to_string();
                    if !e.is_retryable() {
                        return self.give_up(complaint_id, recipient, attempt, last_error);
                    }
                    if attempt < max_attempts {
                        warn!(
                            complaint_id,
                            recipient = %recipient,
                            attempt,
                            max_attempts,
                            backoff_ms = self.config.backoff_before(attempt + 1).as_millis() as u64,
                            error = %e,
                            "Transient delivery error; retrying"
                        );
                    }
                }
            }
        }

        self.give_up(complaint_id, recipient, max_attempts, last_error)
    }

    fn give_up(
        &self,
        complaint_id: ComplaintId,
        recipient: &Recipient,
        attempts: u32,
        error: String,
    ) -> DeliveryOutcome {
        let err = EscalationError::NotificationDelivery {
            recipient: recipient.to_string(),
            attempts,
            reason: error.clone(),
        };
        warn!(complaint_id, error = %err, "Notification not delivered");
        DeliveryOutcome::Failed { attempts, error }
    }
}
