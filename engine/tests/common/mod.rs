//! Shared fixtures for the engine integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use escalation_engine::dispatcher::{
    DeliveryError, NotificationGateway, Receipt, Recipient, RecipientRole, TemplateId,
};
use escalation_engine::model::{
    Complaint, ComplaintId, ComplaintLogEntry, ComplaintPatch, ComplaintStatus, Contact,
    Escalation, Officer, Priority, SlaConfig,
};
use escalation_engine::store::{
    ComplaintStore, Directory, InMemoryStore, StoreError, StoreResult, UpdateOutcome,
};
use escalation_engine::{Driver, EngineConfig, ManualClock, SlaRegistry};

pub const DEPARTMENT: u64 = 1;
pub const CATEGORY: u64 = 1;
pub const CITIZEN: u64 = 100;
pub const WORKER_A: u64 = 10;
pub const OFFICER_B: u64 = 2;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

pub fn complaint(id: ComplaintId, hours_ago: i64) -> Complaint {
    Complaint {
        id,
        title: format!("Pothole on road {id}"),
        location: "MG Road".to_string(),
        citizen_id: CITIZEN,
        category_id: Some(CATEGORY),
        department_id: Some(DEPARTMENT),
        status: ComplaintStatus::InProgress,
        priority: Priority::Normal,
        created_at: t0() - Duration::hours(hours_ago),
        closed_at: None,
        assigned_worker: None,
        assigned_officer: None,
        escalation_count: 0,
        last_escalated_at: None,
        last_warned_at: None,
        is_deleted: false,
        version: 1,
    }
}

/// Complaint held by worker A under officer B
pub fn assigned_complaint(id: ComplaintId, hours_ago: i64) -> Complaint {
    Complaint {
        assigned_worker: Some(WORKER_A),
        assigned_officer: Some(OFFICER_B),
        ..complaint(id, hours_ago)
    }
}

pub fn officer(id: u64, name: &str) -> Officer {
    Officer {
        id,
        name: name.to_string(),
        email: Some(format!("{}@city.gov", name.to_lowercase().replace(' ', "."))),
        department_id: DEPARTMENT,
    }
}

pub fn contact(id: u64, name: &str) -> Contact {
    Contact {
        id,
        name: name.to_string(),
        email: Some(format!("{}@example.org", name.to_lowercase().replace(' ', "."))),
    }
}

/// Records every send; fails permanently for the roles in `fail_roles`
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(Recipient, TemplateId, Value)>>,
    fail_roles: Vec<RecipientRole>,
}

impl RecordingGateway {
    pub fn failing_for(roles: &[RecipientRole]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_roles: roles.to_vec(),
        }
    }

    pub fn sent(&self) -> Vec<(Recipient, TemplateId, Value)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn roles(&self) -> Vec<RecipientRole> {
        let mut roles: Vec<_> = self.sent().into_iter().map(|(r, _, _)| r.role).collect();
        roles.sort_by_key(|r| r.to_string());
        roles
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send(
        &self,
        recipient: &Recipient,
        template: TemplateId,
        context: &Value,
    ) -> Result<Receipt, DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.clone(), template, context.clone()));
        if self.fail_roles.contains(&recipient.role) {
            return Err(DeliveryError::Permanent("mailbox does not exist".into()));
        }
        Ok(Receipt::generated())
    }
}

/// A store seeded with department 1 (officers B, C, D), worker A, the
/// citizen, and a 24h/12h policy for category 1.
pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<RecordingGateway>,
    pub config: EngineConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_gateway(RecordingGateway::default())
    }

    pub fn with_gateway(gateway: RecordingGateway) -> Self {
        let store = Arc::new(InMemoryStore::new());
        store.put_officer(officer(OFFICER_B, "Vikram Shah")).unwrap();
        store.put_officer(officer(3, "Meera Iyer")).unwrap();
        store.put_officer(officer(4, "Arjun Nair")).unwrap();
        store.put_worker(contact(WORKER_A, "Asha Rao")).unwrap();
        store.put_citizen(contact(CITIZEN, "Ravi Kumar")).unwrap();
        store
            .put_sla_config(SlaConfig {
                category_id: CATEGORY,
                resolution_hours: 24,
                escalation_hours: 12,
            })
            .unwrap();
        Self {
            store,
            clock: Arc::new(ManualClock::new(t0())),
            gateway: Arc::new(gateway),
            config: EngineConfig::default(),
        }
    }

    pub fn driver(&self) -> Driver {
        self.driver_over(self.store.clone())
    }

    /// Driver reading complaints through `store`, directory still the fixture's.
    pub fn driver_over(&self, store: Arc<dyn ComplaintStore>) -> Driver {
        let registry = SlaRegistry::from_configs(self.store.sla_configs().unwrap());
        Driver::new(
            store,
            self.store.clone() as Arc<dyn Directory>,
            registry,
            self.gateway.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    pub fn stored(&self, id: ComplaintId) -> Complaint {
        self.store.complaint(id).unwrap().unwrap()
    }
}

/// Wraps the fixture store and misbehaves on demand: bumps a complaint's
/// version right before the next `conflicts` writes (the way a concurrent
/// officer edit would), fails one complaint's escalation commit as an outage,
/// or trips a cancellation token mid-commit.
pub struct InterferingStore {
    inner: Arc<InMemoryStore>,
    conflicts: AtomicUsize,
    fail_commit_for: Option<ComplaintId>,
    cancel_on_commit: Option<CancellationToken>,
    listings: AtomicUsize,
}

impl InterferingStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(0),
            fail_commit_for: None,
            cancel_on_commit: None,
            listings: AtomicUsize::new(0),
        }
    }

    pub fn with_conflicts(mut self, conflicts: usize) -> Self {
        self.conflicts = AtomicUsize::new(conflicts);
        self
    }

    /// `commit_escalation` for `id` reports the store as unreachable.
    pub fn with_commit_outage_for(mut self, id: ComplaintId) -> Self {
        self.fail_commit_for = Some(id);
        self
    }

    /// The first `commit_escalation` cancels `token`, then commits normally.
    pub fn with_cancel_on_commit(mut self, token: CancellationToken) -> Self {
        self.cancel_on_commit = Some(token);
        self
    }

    /// Number of passes that have listed open complaints.
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn interfere(&self, id: ComplaintId) {
        let take = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if take.is_ok() {
            if let Some(mut c) = self.inner.complaint(id).unwrap() {
                c.version += 1;
                c.title.push_str(" (edited)");
                self.inner.put_complaint(c).unwrap();
            }
        }
    }
}

#[async_trait]
impl ComplaintStore for InterferingStore {
    fn list_open_complaints(&self) -> BoxStream<'_, StoreResult<Complaint>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.inner.list_open_complaints()
    }

    async fn get_complaint(&self, id: ComplaintId) -> StoreResult<Option<Complaint>> {
        self.inner.get_complaint(id).await
    }

    async fn update_complaint(
        &self,
        id: ComplaintId,
        patch: ComplaintPatch,
        expected_version: u64,
    ) -> StoreResult<UpdateOutcome> {
        self.interfere(id);
        self.inner.update_complaint(id, patch, expected_version).await
    }

    async fn commit_escalation(
        &self,
        id: ComplaintId,
        patch: ComplaintPatch,
        expected_version: u64,
        escalation: Escalation,
        log: ComplaintLogEntry,
    ) -> StoreResult<UpdateOutcome> {
        if self.fail_commit_for == Some(id) {
            return Err(down());
        }
        if let Some(token) = &self.cancel_on_commit {
            token.cancel();
        }
        self.interfere(id);
        self.inner
            .commit_escalation(id, patch, expected_version, escalation, log)
            .await
    }

    async fn append_log(&self, entry: ComplaintLogEntry) -> StoreResult<()> {
        self.inner.append_log(entry).await
    }

    async fn escalations_for(&self, id: ComplaintId) -> StoreResult<Vec<Escalation>> {
        self.inner.escalations_for(id).await
    }
}

/// Every call fails as if the database were down
pub struct UnreachableStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

#[async_trait]
impl ComplaintStore for UnreachableStore {
    fn list_open_complaints(&self) -> BoxStream<'_, StoreResult<Complaint>> {
        stream::once(async { Err(down()) }).boxed()
    }

    async fn get_complaint(&self, _id: ComplaintId) -> StoreResult<Option<Complaint>> {
        Err(down())
    }

    async fn update_complaint(
        &self,
        _id: ComplaintId,
        _patch: ComplaintPatch,
        _expected_version: u64,
    ) -> StoreResult<UpdateOutcome> {
        Err(down())
    }

    async fn commit_escalation(
        &self,
        _id: ComplaintId,
        _patch: ComplaintPatch,
        _expected_version: u64,
        _escalation: Escalation,
        _log: ComplaintLogEntry,
    ) -> StoreResult<UpdateOutcome> {
        Err(down())
    }

    async fn append_log(&self, _entry: ComplaintLogEntry) -> StoreResult<()> {
        Err(down())
    }

    async fn escalations_for(&self, _id: ComplaintId) -> StoreResult<Vec<Escalation>> {
        Err(down())
    }
}
