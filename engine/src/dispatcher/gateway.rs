//! Notification gateways
//!
//! The gateway only moves one message to one recipient. Retries, timeouts and
//! fan-out live in [`super::Dispatcher`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::templates::TemplateId;
use crate::model::Contact;

/// Why a recipient is being notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    /// Officer receiving an escalated complaint
    TargetOfficer,
    Complainant,
    /// Worker who held the complaint when the deadline passed
    PreviousWorker,
    /// Officer who supervised the complaint when the deadline passed
    PreviousOfficer,
    AssignedWorker,
    SupervisingOfficer,
}

impl std::fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetOfficer => write!(f, "target_officer"),
            Self::Complainant => write!(f, "complainant"),
            Self::PreviousWorker => write!(f, "previous_worker"),
            Self::PreviousOfficer => write!(f, "previous_officer"),
            Self::AssignedWorker => write!(f, "assigned_worker"),
            Self::SupervisingOfficer => write!(f, "supervising_officer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub role: RecipientRole,
    pub contact: Contact,
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} (#{})", self.role, self.contact.name, self.contact.id)
    }
}

/// Proof of acceptance returned by a gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub accepted_at: DateTime<Utc>,
}

impl Receipt {
    pub fn generated() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            accepted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Worth retrying: connection failures, 5xx, rate limits
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Retrying cannot help: bad address, rejected payload, auth
    #[error("permanent delivery failure: {0}")]
    Permanent(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(
        &self,
        recipient: &Recipient,
        template: TemplateId,
        context: &serde_json::Value,
    ) -> Result<Receipt, DeliveryError>;
}

/// Writes each notification to the log and accepts it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogGateway;

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn send(
        &self,
        recipient: &Recipient,
        template: TemplateId,
        context: &serde_json::Value,
    ) -> Result<Receipt, DeliveryError> {
        let receipt = Receipt::generated();
        info!(
            recipient = %recipient,
            email = recipient.contact.email.as_deref().unwrap_or("-"),
            template = template.as_str(),
            subject = context.get("subject").and_then(|s| s.as_str()).unwrap_or(""),
            receipt = %receipt.id,
            "Notification"
        );
        Ok(receipt)
    }
}

/// POSTs `{recipient, template, context}` as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookGateway {
    client: reqwest::Client,
    url: String,
}

impl WebhookGateway {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a Recipient,
    template: TemplateId,
    context: &'a serde_json::Value,
}

#[async_trait]
impl NotificationGateway for WebhookGateway {
    async fn send(
        &self,
        recipient: &Recipient,
        template: TemplateId,
        context: &serde_json::Value,
    ) -> Result<Receipt, DeliveryError> {
        let payload = WebhookPayload {
            recipient,
            template,
            context,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{status}: {}", body.trim());
            return Err(if is_transient_status(status.as_u16()) {
                DeliveryError::Transient(message)
            } else {
                DeliveryError::Permanent(message)
            });
        }

        let id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(Receipt {
            id,
            accepted_at: Utc::now(),
        })
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || status == 408 || (500..600).contains(&status)
}

fn classify_reqwest_error(err: reqwest::Error) -> DeliveryError {
    if err.is_builder() {
        DeliveryError::Permanent(err.to_string())
    } else {
        DeliveryError::Transient(err.to_string())
    }
}
