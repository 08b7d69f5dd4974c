//! Error taxonomy for the escalation engine
//!
//! Every per-complaint failure is isolated by the driver; only
//! [`EscalationError::StoreUnavailable`] aborts a whole pass.

use thiserror::Error;

use crate::model::{CategoryId, ComplaintId, DepartmentId};
use crate::store::StoreError;

/// Result type alias for engine operations
pub type EscalationResult<T> = Result<T, EscalationError>;

#[derive(Error, Debug)]
pub enum EscalationError {
    /// Category has no SLA policy (or the complaint has no category).
    /// The complaint is skipped for this pass.
    #[error("no SLA policy configured for category {}", display_category(.category))]
    NotConfigured { category: Option<CategoryId> },

    /// No officer other than the current one exists in the department
    #[error("no eligible escalation target for complaint {complaint} in department {}", display_department(.department))]
    NoEligibleTarget {
        complaint: ComplaintId,
        department: Option<DepartmentId>,
    },

    /// Optimistic version check failed
    #[error("version conflict on complaint {complaint}: expected {expected}, found {found}")]
    ConcurrencyConflict {
        complaint: ComplaintId,
        expected: u64,
        found: u64,
    },

    /// A single recipient could not be notified after all retries
    #[error("notification to {recipient} failed after {attempts} attempt(s): {reason}")]
    NotificationDelivery {
        recipient: String,
        attempts: u32,
        reason: String,
    },

    /// Complaint store or officer directory unreachable; fatal for the pass
    #[error("complaint store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EscalationError {
    /// Whether this error must abort the whole pass.
    pub fn is_pass_fatal(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<StoreError> for EscalationError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

fn display_category(category: &Option<CategoryId>) -> String {
    category.map_or_else(|| "<none>".to_string(), |c| c.to_string())
}

fn display_department(department: &Option<DepartmentId>) -> String {
    department.map_or_else(|| "<none>".to_string(), |d| d.to_string())
}
