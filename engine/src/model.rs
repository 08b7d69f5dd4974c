//! Complaint data model
//!
//! Types shared by every stage of the escalation pipeline. `Escalation`
//! references its complaint one-way; the complaint only carries a
//! denormalized counter and timestamp, never a link back to a record.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Complaint primary key
pub type ComplaintId = u64;

/// Officer primary key
pub type OfficerId = u64;

/// Field worker primary key
pub type WorkerId = u64;

/// Citizen (complainant) primary key
pub type CitizenId = u64;

/// Complaint category primary key
pub type CategoryId = u64;

/// Department primary key
pub type DepartmentId = u64;

/// Lifecycle status of a complaint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    Submitted,
    Filtering,
    Sorting,
    /// Waiting for a first assignment
    Pending,
    Assigned,
    InProgress,
    /// Escalated; waiting for the new officer to reassign
    PendingReassignment,
    Resolved,
    Completed,
    Rejected,
    Declined,
}

impl ComplaintStatus {
    /// Terminal statuses freeze the SLA timer and are never escalated.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Resolved | Self::Completed | Self::Rejected | Self::Declined
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Filtering => "FILTERING",
            Self::Sorting => "SORTING",
            Self::Pending => "PENDING",
            Self::Assigned => "ASSIGNED",
            Self::InProgress => "IN_PROGRESS",
            Self::PendingReassignment => "PENDING_REASSIGNMENT",
            Self::Resolved => "RESOLVED",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::Declined => "DECLINED",
        }
    }
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handling priority. Three-valued so increments can never leave the range.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// One level up, saturating at `Critical`.
    pub fn raised(self) -> Self {
        match self {
            Self::Normal => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Current state of a complaint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub title: String,
    #[serde(default)]
    pub location: String,
    /// Citizen who filed the complaint
    pub citizen_id: CitizenId,
    /// Missing category means no SLA policy can apply
    pub category_id: Option<CategoryId>,
    pub department_id: Option<DepartmentId>,
    pub status: ComplaintStatus,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// When the complaint reached a terminal status
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_worker: Option<WorkerId>,
    #[serde(default)]
    pub assigned_officer: Option<OfficerId>,
    #[serde(default)]
    pub escalation_count: u32,
    #[serde(default)]
    pub last_escalated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_warned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    /// Optimistic concurrency sequence, bumped on every write
    #[serde(default)]
    pub version: u64,
}

impl Complaint {
    /// Citizen-facing tracking id, e.g. `CMP-2026-00042`.
    pub fn tracking_id(&self) -> String {
        format!("CMP-{}-{:05}", self.created_at.year(), self.id)
    }

    /// Whether the engine should look at this complaint at all.
    pub fn is_open(&self) -> bool {
        !self.is_deleted && !self.status.is_terminal()
    }

    /// Text used for the assignee columns of the audit log.
    pub fn assignee_label(&self) -> String {
        match (self.assigned_worker, self.assigned_officer) {
            (Some(w), Some(o)) => format!("worker #{w} / officer #{o}"),
            (Some(w), None) => format!("worker #{w}"),
            (None, Some(o)) => format!("officer #{o}"),
            (None, None) => String::new(),
        }
    }
}

/// Partial update applied to a complaint under a version check.
///
/// `None` leaves a field untouched. The assignee fields are doubly optional so
/// an update can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplaintPatch {
    pub status: Option<ComplaintStatus>,
    pub priority: Option<Priority>,
    pub assigned_officer: Option<Option<OfficerId>>,
    pub assigned_worker: Option<Option<WorkerId>>,
    pub escalation_count: Option<u32>,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub last_warned_at: Option<DateTime<Utc>>,
}

impl ComplaintPatch {
    /// Apply the patch in place. Version handling belongs to the store.
    pub fn apply_to(&self, complaint: &mut Complaint) {
        if let Some(status) = self.status {
            complaint.status = status;
        }
        if let Some(priority) = self.priority {
            complaint.priority = priority;
        }
        if let Some(officer) = self.assigned_officer {
            complaint.assigned_officer = officer;
        }
        if let Some(worker) = self.assigned_worker {
            complaint.assigned_worker = worker;
        }
        if let Some(count) = self.escalation_count {
            complaint.escalation_count = count;
        }
        if let Some(at) = self.last_escalated_at {
            complaint.last_escalated_at = Some(at);
        }
        if let Some(at) = self.last_warned_at {
            complaint.last_warned_at = Some(at);
        }
    }
}

/// Per-category deadline policy, authored outside this engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaConfig {
    pub category_id: CategoryId,
    /// Target time for full resolution
    pub resolution_hours: u32,
    /// Deadline before authority must change
    pub escalation_hours: u32,
}

/// Append-only record of one escalation. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: Uuid,
    pub complaint_id: ComplaintId,
    pub previous_officer: Option<OfficerId>,
    pub previous_worker: Option<WorkerId>,
    pub new_officer: OfficerId,
    /// Names whoever held the complaint when the deadline passed
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit entry written on behalf of the system actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintLogEntry {
    pub id: Uuid,
    pub complaint_id: ComplaintId,
    pub note: String,
    #[serde(default)]
    pub old_status: Option<ComplaintStatus>,
    #[serde(default)]
    pub new_status: Option<ComplaintStatus>,
    #[serde(default)]
    pub old_assignee: String,
    #[serde(default)]
    pub new_assignee: String,
    pub timestamp: DateTime<Utc>,
}

impl ComplaintLogEntry {
    /// A note-only entry with no status or assignee change.
    pub fn note(complaint_id: ComplaintId, note: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            complaint_id,
            note: note.into(),
            old_status: None,
            new_status: None,
            old_assignee: String::new(),
            new_assignee: String::new(),
            timestamp: at,
        }
    }
}

/// Anyone the engine can address: worker, officer or citizen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Supervising officer, attached to one department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Officer {
    pub id: OfficerId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub department_id: DepartmentId,
}

impl Officer {
    pub fn contact(&self) -> Contact {
        Contact {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// An officer together with the number of open complaints they hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficerLoad {
    pub officer: Officer,
    pub active_load: usize,
}
