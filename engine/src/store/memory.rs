//! In-memory complaint store and directory

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use super::{ComplaintStore, Directory, StoreError, StoreResult, UpdateOutcome};
use crate::model::{
    CitizenId, Complaint, ComplaintId, ComplaintLogEntry, ComplaintPatch, Contact, DepartmentId,
    Escalation, Officer, OfficerId, OfficerLoad, SlaConfig, WorkerId,
};

/// Full store contents, also the on-disk format of [`super::JsonFileStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub complaints: BTreeMap<ComplaintId, Complaint>,
    #[serde(default)]
    pub escalations: Vec<Escalation>,
    #[serde(default)]
    pub complaint_logs: Vec<ComplaintLogEntry>,
    #[serde(default)]
    pub officers: BTreeMap<OfficerId, Officer>,
    #[serde(default)]
    pub workers: BTreeMap<WorkerId, Contact>,
    #[serde(default)]
    pub citizens: BTreeMap<CitizenId, Contact>,
    #[serde(default)]
    pub sla_configs: Vec<SlaConfig>,
}

impl Snapshot {
    fn active_load(&self, officer: OfficerId) -> usize {
        self.complaints
            .values()
            .filter(|c| c.is_open() && c.assigned_officer == Some(officer))
            .count()
    }

    pub(crate) fn open_complaints(&self) -> Vec<Complaint> {
        self.complaints
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect()
    }

    pub(crate) fn officer_loads(&self, department: DepartmentId) -> Vec<OfficerLoad> {
        self.officers
            .values()
            .filter(|o| o.department_id == department)
            .map(|o| OfficerLoad {
                officer: o.clone(),
                active_load: self.active_load(o.id),
            })
            .collect()
    }

    pub(crate) fn escalations_for(&self, id: ComplaintId) -> Vec<Escalation> {
        self.escalations
            .iter()
            .filter(|e| e.complaint_id == id)
            .cloned()
            .collect()
    }

    /// Version-checked patch; a missing complaint reports version 0.
    pub(crate) fn write_complaint(
        &mut self,
        id: ComplaintId,
        patch: &ComplaintPatch,
        expected_version: u64,
    ) -> UpdateOutcome {
        let Some(complaint) = self.complaints.get_mut(&id) else {
            return UpdateOutcome::Conflict { current_version: 0 };
        };
        if complaint.version != expected_version {
            return UpdateOutcome::Conflict {
                current_version: complaint.version,
            };
        }
        patch.apply_to(complaint);
        complaint.version += 1;
        UpdateOutcome::Applied {
            new_version: complaint.version,
        }
    }

    /// Patch, escalation record and audit entry land together or not at all.
    pub(crate) fn commit_escalation(
        &mut self,
        id: ComplaintId,
        patch: &ComplaintPatch,
        expected_version: u64,
        escalation: Escalation,
        log: ComplaintLogEntry,
    ) -> UpdateOutcome {
        let outcome = self.write_complaint(id, patch, expected_version);
        if outcome.is_applied() {
            self.escalations.push(escalation);
            self.complaint_logs.push(log);
        }
        outcome
    }
}

/// `RwLock`-guarded store implementing both [`ComplaintStore`] and [`Directory`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Snapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Snapshot>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Snapshot>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Clone of the full contents.
    pub fn snapshot(&self) -> StoreResult<Snapshot> {
        Ok(self.read()?.clone())
    }

    /// Insert or replace a complaint as-is (seeding and external actors).
    pub fn put_complaint(&self, complaint: Complaint) -> StoreResult<()> {
        self.write()?.complaints.insert(complaint.id, complaint);
        Ok(())
    }

    pub fn put_officer(&self, officer: Officer) -> StoreResult<()> {
        self.write()?.officers.insert(officer.id, officer);
        Ok(())
    }

    pub fn put_worker(&self, worker: Contact) -> StoreResult<()> {
        self.write()?.workers.insert(worker.id, worker);
        Ok(())
    }

    pub fn put_citizen(&self, citizen: Contact) -> StoreResult<()> {
        self.write()?.citizens.insert(citizen.id, citizen);
        Ok(())
    }

    pub fn put_sla_config(&self, config: SlaConfig) -> StoreResult<()> {
        let mut inner = self.write()?;
        inner.sla_configs.retain(|c| c.category_id != config.category_id);
        inner.sla_configs.push(config);
        Ok(())
    }

    pub fn sla_configs(&self) -> StoreResult<Vec<SlaConfig>> {
        Ok(self.read()?.sla_configs.clone())
    }

    /// All escalation records, in insertion order.
    pub fn escalations(&self) -> StoreResult<Vec<Escalation>> {
        Ok(self.read()?.escalations.clone())
    }

    pub fn complaint_logs(&self) -> StoreResult<Vec<ComplaintLogEntry>> {
        Ok(self.read()?.complaint_logs.clone())
    }

    /// Synchronous lookup, convenient outside async contexts.
    pub fn complaint(&self, id: ComplaintId) -> StoreResult<Option<Complaint>> {
        Ok(self.read()?.complaints.get(&id).cloned())
    }
}

#[async_trait]
impl ComplaintStore for InMemoryStore {
    fn list_open_complaints(&self) -> BoxStream<'_, StoreResult<Complaint>> {
        match self.read() {
            Ok(inner) => stream::iter(inner.open_complaints().into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn get_complaint(&self, id: ComplaintId) -> StoreResult<Option<Complaint>> {
        self.complaint(id)
    }

    async fn update_complaint(
        &self,
        id: ComplaintId,
        patch: ComplaintPatch,
        expected_version: u64,
    ) -> StoreResult<UpdateOutcome> {
        Ok(self.write()?.write_complaint(id, &patch, expected_version))
    }

    async fn commit_escalation(
        &self,
        id: ComplaintId,
        patch: ComplaintPatch,
        expected_version: u64,
        escalation: Escalation,
        log: ComplaintLogEntry,
    ) -> StoreResult<UpdateOutcome> {
        Ok(self
            .write()?
            .commit_escalation(id, &patch, expected_version, escalation, log))
    }

    async fn append_log(&self, entry: ComplaintLogEntry) -> StoreResult<()> {
        self.write()?.complaint_logs.push(entry);
        Ok(())
    }

    async fn escalations_for(&self, id: ComplaintId) -> StoreResult<Vec<Escalation>> {
        Ok(self.read()?.escalations_for(id))
    }
}

#[async_trait]
impl Directory for InMemoryStore {
    async fn list_officers(&self, department: DepartmentId) -> StoreResult<Vec<OfficerLoad>> {
        Ok(self.read()?.officer_loads(department))
    }

    async fn officer(&self, id: OfficerId) -> StoreResult<Option<Officer>> {
        Ok(self.read()?.officers.get(&id).cloned())
    }

    async fn worker(&self, id: WorkerId) -> StoreResult<Option<Contact>> {
        Ok(self.read()?.workers.get(&id).cloned())
    }

    async fn citizen(&self, id: CitizenId) -> StoreResult<Option<Contact>> {
        Ok(self.read()?.citizens.get(&id).cloned())
    }
}
