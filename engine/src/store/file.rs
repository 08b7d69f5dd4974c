//! JSON snapshot store
//!
//! Every operation re-reads the snapshot from disk while holding an advisory
//! lock on a sidecar `<file>.lock`: shared for reads, exclusive for writes.
//! Version checks therefore run against what is on disk right now, so two
//! processes (or two handles in one process) pointed at the same file never
//! both apply a write at the same expected version, and complaints added by
//! the portal between passes are picked up on the next listing.
//!
//! Writes go to a sibling temp file which is then renamed over the original,
//! so a crash mid-write leaves the previous snapshot intact.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use super::memory::Snapshot;
use super::{ComplaintStore, Directory, StoreError, StoreResult, UpdateOutcome};
use crate::model::{
    CitizenId, Complaint, ComplaintId, ComplaintLogEntry, ComplaintPatch, Contact, DepartmentId,
    Escalation, Officer, OfficerId, OfficerLoad, SlaConfig, WorkerId,
};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    fn at(path: PathBuf) -> Self {
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
        }
    }

    /// Open an existing snapshot. A missing or unreadable file means the
    /// store is unreachable.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::at(path.into());
        let (complaints, officers) = store
            .read(|s| (s.complaints.len(), s.officers.len()))
            .await?;
        debug!(
            path = %store.path.display(),
            complaints,
            officers,
            "Opened complaint snapshot"
        );
        Ok(store)
    }

    /// Write `snapshot` to `path`, creating or replacing it.
    pub async fn create(path: impl Into<PathBuf>, snapshot: Snapshot) -> StoreResult<Self> {
        let store = Self::at(path.into());
        let (path, lock_path) = (store.path.clone(), store.lock_path.clone());
        blocking(move || {
            let lock = lock_exclusive(&lock_path)?;
            save(&path, &snapshot)?;
            drop(lock);
            Ok(())
        })
        .await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents of the file.
    pub async fn snapshot(&self) -> StoreResult<Snapshot> {
        self.read(Snapshot::clone).await
    }

    pub async fn sla_configs(&self) -> StoreResult<Vec<SlaConfig>> {
        self.read(|s| s.sla_configs.clone()).await
    }

    async fn read<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&Snapshot) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (path, lock_path) = (self.path.clone(), self.lock_path.clone());
        blocking(move || {
            let lock = lock_shared(&lock_path)?;
            let snapshot = load(&path)?;
            drop(lock);
            Ok(operation(&snapshot))
        })
        .await
    }

    /// Load, apply `operation` and save if it reports a change, all under the
    /// exclusive lock.
    async fn mutate<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Snapshot) -> (T, bool) + Send + 'static,
        T: Send + 'static,
    {
        let (path, lock_path) = (self.path.clone(), self.lock_path.clone());
        blocking(move || {
            let lock = lock_exclusive(&lock_path)?;
            let mut snapshot = load(&path)?;
            let (result, changed) = operation(&mut snapshot);
            if changed {
                save(&path, &snapshot)?;
            }
            drop(lock);
            Ok(result)
        })
        .await
    }
}

async fn blocking<T, F>(task: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

fn open_lock_file(lock_path: &Path) -> StoreResult<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| {
            StoreError::Unavailable(format!("failed to open lock {}: {e}", lock_path.display()))
        })
}

fn lock_shared(lock_path: &Path) -> StoreResult<File> {
    let file = open_lock_file(lock_path)?;
    FileExt::lock_shared(&file).map_err(|e| {
        StoreError::Unavailable(format!("failed to lock {}: {e}", lock_path.display()))
    })?;
    Ok(file)
}

fn lock_exclusive(lock_path: &Path) -> StoreResult<File> {
    let file = open_lock_file(lock_path)?;
    FileExt::lock_exclusive(&file).map_err(|e| {
        StoreError::Unavailable(format!("failed to lock {}: {e}", lock_path.display()))
    })?;
    Ok(file)
}

fn load(path: &Path) -> StoreResult<Snapshot> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StoreError::Unavailable(format!("{}: not found", path.display())),
        _ => StoreError::Unavailable(format!("{}: {e}", path.display())),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))
}

fn save(path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl ComplaintStore for JsonFileStore {
    fn list_open_complaints(&self) -> BoxStream<'_, StoreResult<Complaint>> {
        stream::once(self.read(|s| s.open_complaints()))
            .flat_map(|loaded| match loaded {
                Ok(open) => stream::iter(open.into_iter().map(Ok)).left_stream(),
                Err(e) => stream::once(future::ready(Err(e))).right_stream(),
            })
            .boxed()
    }

    async fn get_complaint(&self, id: ComplaintId) -> StoreResult<Option<Complaint>> {
        self.read(move |s| s.complaints.get(&id).cloned()).await
    }

    async fn update_complaint(
        &self,
        id: ComplaintId,
        patch: ComplaintPatch,
        expected_version: u64,
    ) -> StoreResult<UpdateOutcome> {
        self.mutate(move |s| {
            let outcome = s.write_complaint(id, &patch, expected_version);
            (outcome, outcome.is_applied())
        })
        .await
    }

    async fn commit_escalation(
        &self,
        id: ComplaintId,
        patch: ComplaintPatch,
        expected_version: u64,
        escalation: Escalation,
        log: ComplaintLogEntry,
    ) -> StoreResult<UpdateOutcome> {
        self.mutate(move |s| {
            let outcome = s.commit_escalation(id, &patch, expected_version, escalation, log);
            (outcome, outcome.is_applied())
        })
        .await
    }

    async fn append_log(&self, entry: ComplaintLogEntry) -> StoreResult<()> {
        self.mutate(move |s| {
            s.complaint_logs.push(entry);
            ((), true)
        })
        .await
    }

    async fn escalations_for(&self, id: ComplaintId) -> StoreResult<Vec<Escalation>> {
        self.read(move |s| s.escalations_for(id)).await
    }
}

#[async_trait]
impl Directory for JsonFileStore {
    async fn list_officers(&self, department: DepartmentId) -> StoreResult<Vec<OfficerLoad>> {
        self.read(move |s| s.officer_loads(department)).await
    }

    async fn officer(&self, id: OfficerId) -> StoreResult<Option<Officer>> {
        self.read(move |s| s.officers.get(&id).cloned()).await
    }

    async fn worker(&self, id: WorkerId) -> StoreResult<Option<Contact>> {
        self.read(move |s| s.workers.get(&id).cloned()).await
    }

    async fn citizen(&self, id: CitizenId) -> StoreResult<Option<Contact>> {
        self.read(move |s| s.citizens.get(&id).cloned()).await
    }
}
