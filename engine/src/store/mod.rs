//! Store contracts consumed by the engine
//!
//! The complaint store and the officer directory are owned elsewhere and are
//! shared with other writers (officers reassigning, citizens cancelling,
//! other driver runs). Nothing here assumes exclusive ownership: every
//! complaint write is conditioned on the caller's expected version.
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryStore`]: `RwLock`-guarded maps, used by tests and embedded
//!   callers
//! - [`JsonFileStore`]: an `InMemoryStore` loaded from and persisted to a
//!   JSON snapshot on disk

pub mod file;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::model::{
    CitizenId, Complaint, ComplaintId, ComplaintLogEntry, ComplaintPatch, Contact, DepartmentId,
    Escalation, Officer, OfficerId, OfficerLoad, WorkerId,
};

pub use file::JsonFileStore;
pub use memory::{InMemoryStore, Snapshot};

/// Error type for store and directory operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a version-checked write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Write applied; the complaint now carries `new_version`
    Applied { new_version: u64 },
    /// Someone else wrote first (or the complaint is gone, `current_version` 0)
    Conflict { current_version: u64 },
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Complaint persistence shared with the rest of the portal
#[async_trait]
pub trait ComplaintStore: Send + Sync {
    /// Every non-deleted complaint outside the terminal statuses.
    fn list_open_complaints(&self) -> BoxStream<'_, StoreResult<Complaint>>;

    async fn get_complaint(&self, id: ComplaintId) -> StoreResult<Option<Complaint>>;

    /// Apply `patch` iff the stored version equals `expected_version`.
    async fn update_complaint(
        &self,
        id: ComplaintId,
        patch: ComplaintPatch,
        expected_version: u64,
    ) -> StoreResult<UpdateOutcome>;

    /// Apply `patch`, append `escalation` and `log` as one atomic unit,
    /// conditioned on `expected_version`. On conflict nothing is written.
    async fn commit_escalation(
        &self,
        id: ComplaintId,
        patch: ComplaintPatch,
        expected_version: u64,
        escalation: Escalation,
        log: ComplaintLogEntry,
    ) -> StoreResult<UpdateOutcome>;

    async fn append_log(&self, entry: ComplaintLogEntry) -> StoreResult<()>;

    /// Escalation history of one complaint, oldest first.
    async fn escalations_for(&self, id: ComplaintId) -> StoreResult<Vec<Escalation>>;
}

/// Read-only view of the people the engine addresses
#[async_trait]
pub trait Directory: Send + Sync {
    /// Officers of a department with their count of open complaints.
    async fn list_officers(&self, department: DepartmentId) -> StoreResult<Vec<OfficerLoad>>;

    async fn officer(&self, id: OfficerId) -> StoreResult<Option<Officer>>;

    async fn worker(&self, id: WorkerId) -> StoreResult<Option<Contact>>;

    async fn citizen(&self, id: CitizenId) -> StoreResult<Option<Contact>>;
}
