//! Scheduler/Driver: one pass over every open complaint
//!
//! ```text
//! list_open_complaints ─▶ evaluate ─┬─ ON_TRACK / TERMINAL ─▶ report
//!                                   ├─ WARNING / CRITICAL ─▶ stamp last_warned_at ─▶ dispatch
//!                                   └─ OVERDUE ─▶ resolve ─▶ select ─▶ record ─▶ dispatch
//! ```
//!
//! Pipelines run `max_parallel` at a time. Every mutation is version-checked;
//! a conflict re-fetches and re-evaluates once, then gives up until the next
//! pass. Notifications are spawned after their mutation commits and joined at
//! the end so the report can carry delivery results.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::dispatcher::{
    DeliveryReport, Dispatcher, EscalationNotice, NotificationEvent, NotificationGateway,
    WarningNotice,
};
use crate::error::{EscalationError, EscalationResult};
use crate::evaluator::{evaluate, Evaluation, Thresholds, TimerState};
use crate::model::{
    Complaint, ComplaintLogEntry, ComplaintPatch, Contact, OfficerLoad, Priority,
};
use crate::recorder::{escalated_within_window, RecordOutcome, Recorder};
use crate::registry::{SlaPolicy, SlaRegistry};
use crate::report::{ComplaintOutcome, ComplaintReport, PassReport};
use crate::resolver::Resolver;
use crate::selector::TargetSelector;
use crate::store::{ComplaintStore, Directory, UpdateOutcome};

/// Per-invocation switches
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Evaluate and select targets but write nothing and send nothing
    pub dry_run: bool,
    /// Overrides `EngineConfig::warning_threshold_hours` for this pass
    pub warning_threshold_hours: Option<f64>,
}

/// Values fixed for the duration of one pass
struct PassContext {
    now: DateTime<Utc>,
    thresholds: Thresholds,
    dry_run: bool,
}

type DispatchHandle = JoinHandle<Vec<DeliveryReport>>;

/// How one attempt at a complaint ended
enum Step {
    Done {
        outcome: ComplaintOutcome,
        evaluation: Option<Evaluation>,
        dispatch: Option<DispatchHandle>,
    },
    Conflict {
        expected: u64,
        found: u64,
    },
}

impl Step {
    fn done(outcome: ComplaintOutcome, evaluation: Option<&Evaluation>) -> Self {
        Self::Done {
            outcome,
            evaluation: evaluation.copied(),
            dispatch: None,
        }
    }
}

struct Processed {
    report: ComplaintReport,
    dispatch: Option<DispatchHandle>,
}

impl Processed {
    fn new(
        complaint: &Complaint,
        outcome: ComplaintOutcome,
        evaluation: Option<Evaluation>,
        dispatch: Option<DispatchHandle>,
    ) -> Self {
        Self {
            report: ComplaintReport {
                complaint_id: complaint.id,
                state: evaluation.map(|e| e.state),
                elapsed_hours: evaluation.map(|e| (e.elapsed_hours * 100.0).round() / 100.0),
                outcome,
            },
            dispatch,
        }
    }
}

pub struct Driver {
    store: Arc<dyn ComplaintStore>,
    directory: Arc<dyn Directory>,
    registry: SlaRegistry,
    clock: SharedClock,
    resolver: Resolver,
    selector: TargetSelector,
    recorder: Recorder,
    dispatcher: Dispatcher,
    config: EngineConfig,
}

impl Driver {
    pub fn new(
        store: Arc<dyn ComplaintStore>,
        directory: Arc<dyn Directory>,
        registry: SlaRegistry,
        gateway: Arc<dyn NotificationGateway>,
        clock: SharedClock,
        config: EngineConfig,
    ) -> Self {
        Self {
            resolver: Resolver::new(directory.clone()),
            selector: TargetSelector::new(directory.clone()),
            recorder: Recorder::new(store.clone()),
            dispatcher: Dispatcher::new(gateway, config.notifications.clone()),
            store,
            directory,
            registry,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one pass. Only a store outage returns `Err`; everything else is
    /// isolated per complaint and shows up in the report.
    #[instrument(skip(self, options, cancel), fields(dry_run = options.dry_run))]
    pub async fn run_pass(
        &self,
        options: &PassOptions,
        cancel: &CancellationToken,
    ) -> EscalationResult<PassReport> {
        let now = self.clock.now();
        let warning_hours = options
            .warning_threshold_hours
            .unwrap_or(self.config.warning_threshold_hours);
        let ctx = PassContext {
            now,
            thresholds: Thresholds::from_hours(warning_hours, self.config.critical_threshold_hours),
            dry_run: options.dry_run,
        };
        info!(
            now = %now,
            warning_threshold_hours = warning_hours,
            max_parallel = self.config.max_parallel,
            policies = self.registry.len(),
            "Starting escalation pass"
        );

        // Tripped by the caller, or by the first store outage so that only
        // pipelines already in flight run to completion.
        let halt = cancel.child_token();
        let (ctx, halt) = (&ctx, &halt);
        let results: Vec<EscalationResult<Processed>> = self
            .store
            .list_open_complaints()
            .take_while(|_| future::ready(!halt.is_cancelled()))
            .map(|item| async move {
                let result = match item {
                    Ok(complaint) => self.process(complaint, ctx).await,
                    Err(e) => Err(EscalationError::from(e)),
                };
                if result.as_ref().is_err_and(EscalationError::is_pass_fatal) {
                    halt.cancel();
                }
                result
            })
            .buffer_unordered(self.config.max_parallel.max(1))
            .collect()
            .await;

        let mut report = PassReport::new(now, options.dry_run);
        let mut handles = Vec::new();
        let mut fatal = None;
        for result in results {
            match result {
                Ok(processed) => {
                    report.push(processed.report);
                    handles.extend(processed.dispatch);
                }
                Err(e) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        // Committed changes still get their notifications, even on abort.
        for handle in handles {
            match handle.await {
                Ok(deliveries) => report.deliveries.extend(deliveries),
                Err(e) => warn!(error = %e, "Notification task did not complete"),
            }
        }

        if let Some(e) = fatal {
            error!(error = %e, evaluated = report.counters.evaluated, "Escalation pass aborted");
            return Err(e);
        }

        report.cancelled = cancel.is_cancelled();
        report.finish();
        let c = &report.counters;
        info!(
            evaluated = c.evaluated,
            escalated = c.escalated,
            warnings_sent = c.warnings_sent,
            would_escalate = c.would_escalate,
            would_warn = c.would_warn,
            unconfigured = c.unconfigured,
            no_target = c.no_target,
            conflicts_skipped = c.conflicts_skipped,
            cancelled = report.cancelled,
            "Escalation pass complete"
        );
        Ok(report)
    }

    /// Run a pass every `interval` until `cancel` fires. A failed pass is
    /// logged and retried on the next tick.
    pub async fn run_periodic(
        &self,
        interval: Duration,
        options: &PassOptions,
        cancel: &CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.run_pass(options, cancel).await {
                warn!(error = %e, "Pass failed; retrying on next tick");
            }
        }
        info!("Periodic escalation stopped");
    }

    async fn process(
        &self,
        complaint: Complaint,
        ctx: &PassContext,
    ) -> EscalationResult<Processed> {
        let mut current = complaint;
        let mut last_conflict = (current.version, current.version);

        for attempt in 0..2 {
            match self.evaluate_and_act(&current, ctx).await? {
                Step::Done {
                    outcome,
                    evaluation,
                    dispatch,
                } => return Ok(Processed::new(&current, outcome, evaluation, dispatch)),
                Step::Conflict { expected, found } => {
                    last_conflict = (expected, found);
                    if attempt > 0 {
                        break;
                    }
                    debug!(
                        complaint_id = current.id,
                        expected_version = expected,
                        current_version = found,
                        "Version conflict; re-fetching"
                    );
                    match self.store.get_complaint(current.id).await? {
                        Some(fresh) => current = fresh,
                        None => {
                            info!(complaint_id = current.id, "Complaint vanished during pass");
                            return Ok(Processed::new(
                                &current,
                                ComplaintOutcome::Vanished,
                                None,
                                None,
                            ));
                        }
                    }
                }
            }
        }

        let err = EscalationError::ConcurrencyConflict {
            complaint: current.id,
            expected: last_conflict.0,
            found: last_conflict.1,
        };
        warn!(complaint_id = current.id, error = %err, "Skipping complaint until next pass");
        Ok(Processed::new(
            &current,
            ComplaintOutcome::ConflictSkipped,
            None,
            None,
        ))
    }

    async fn evaluate_and_act(
        &self,
        complaint: &Complaint,
        ctx: &PassContext,
    ) -> EscalationResult<Step> {
        if !complaint.is_open() {
            return Ok(Step::done(ComplaintOutcome::Terminal, None));
        }
        let policy = match self.registry.lookup(complaint.category_id) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(complaint_id = complaint.id, reason = %e, "Skipping complaint");
                return Ok(Step::done(ComplaintOutcome::Unconfigured, None));
            }
        };

        let evaluation = evaluate(complaint, ctx.now, &policy, &ctx.thresholds);
        match evaluation.state {
            TimerState::Terminal => Ok(Step::done(ComplaintOutcome::Terminal, Some(&evaluation))),
            TimerState::OnTrack => Ok(Step::done(ComplaintOutcome::OnTrack, Some(&evaluation))),
            TimerState::Warning | TimerState::Critical => {
                self.warn(complaint, evaluation, ctx).await
            }
            TimerState::Overdue => self.escalate(complaint, &policy, evaluation, ctx).await,
        }
    }

    async fn warn(
        &self,
        complaint: &Complaint,
        evaluation: Evaluation,
        ctx: &PassContext,
    ) -> EscalationResult<Step> {
        if complaint
            .last_warned_at
            .is_some_and(|at| at >= evaluation.warning_opens_at)
        {
            return Ok(Step::done(ComplaintOutcome::AlreadyWarned, Some(&evaluation)));
        }
        if ctx.dry_run {
            info!(
                complaint_id = complaint.id,
                state = %evaluation.state,
                remaining_hours = evaluation.remaining_hours,
                "[dry run] Would send SLA warning"
            );
            return Ok(Step::done(ComplaintOutcome::WouldWarn, Some(&evaluation)));
        }

        let patch = ComplaintPatch {
            last_warned_at: Some(ctx.now),
            ..Default::default()
        };
        if let UpdateOutcome::Conflict { current_version } = self
            .store
            .update_complaint(complaint.id, patch, complaint.version)
            .await?
        {
            return Ok(Step::Conflict {
                expected: complaint.version,
                found: current_version,
            });
        }
        self.store
            .append_log(ComplaintLogEntry::note(
                complaint.id,
                format!(
                    "SLA warning sent: {:.1} hours remaining until escalation",
                    evaluation.hours_left()
                ),
                ctx.now,
            ))
            .await?;

        let responsible = self.resolver.resolve(complaint).await;
        info!(
            complaint_id = complaint.id,
            state = %evaluation.state,
            remaining_hours = evaluation.remaining_hours,
            responsible = %responsible.display_text,
            "SLA warning recorded"
        );
        let dispatch = self.spawn_dispatch(NotificationEvent::Warning(Box::new(WarningNotice {
            complaint: complaint.clone(),
            responsible,
            evaluation,
        })));
        Ok(Step::Done {
            outcome: ComplaintOutcome::Warned,
            evaluation: Some(evaluation),
            dispatch: Some(dispatch),
        })
    }

    async fn escalate(
        &self,
        complaint: &Complaint,
        policy: &SlaPolicy,
        evaluation: Evaluation,
        ctx: &PassContext,
    ) -> EscalationResult<Step> {
        if let Some(at) = escalated_within_window(complaint, policy, ctx.now) {
            debug!(
                complaint_id = complaint.id,
                last_escalated_at = %at,
                "Already escalated in this window"
            );
            return Ok(Step::done(ComplaintOutcome::AlreadyEscalated, Some(&evaluation)));
        }

        let target = match self.selector.select_target(complaint).await {
            Ok(target) => target,
            Err(e @ EscalationError::NoEligibleTarget { .. }) => {
                return self.raise_without_target(complaint, &e, evaluation, ctx).await;
            }
            Err(e) => return Err(e),
        };

        if ctx.dry_run {
            info!(
                complaint_id = complaint.id,
                elapsed_hours = evaluation.elapsed_hours,
                target_officer = target.officer.id,
                target_load = target.active_load,
                "[dry run] Would escalate"
            );
            return Ok(Step::done(
                ComplaintOutcome::WouldEscalate {
                    target_officer: target.officer.id,
                },
                Some(&evaluation),
            ));
        }

        let responsible = self.resolver.resolve(complaint).await;
        let OfficerLoad { officer, .. } = target;
        match self
            .recorder
            .record(complaint, policy, &responsible, &officer, ctx.now)
            .await?
        {
            RecordOutcome::Recorded(escalation) => {
                let outcome = ComplaintOutcome::Escalated {
                    escalation_id: escalation.id,
                    target_officer: officer.id,
                };
                let citizen = self.citizen(complaint).await;
                let dispatch =
                    self.spawn_dispatch(NotificationEvent::Escalation(Box::new(EscalationNotice {
                        complaint: complaint.clone(),
                        escalation,
                        responsible,
                        target: officer,
                        citizen,
                        escalation_hours: policy.escalation_hours,
                    })));
                Ok(Step::Done {
                    outcome,
                    evaluation: Some(evaluation),
                    dispatch: Some(dispatch),
                })
            }
            RecordOutcome::AlreadyEscalated { .. } => Ok(Step::done(
                ComplaintOutcome::AlreadyEscalated,
                Some(&evaluation),
            )),
            RecordOutcome::Conflict { current_version } => Ok(Step::Conflict {
                expected: complaint.version,
                found: current_version,
            }),
        }
    }

    /// Overdue with nobody to hand it to: flag CRITICAL and log, no Escalation.
    async fn raise_without_target(
        &self,
        complaint: &Complaint,
        cause: &EscalationError,
        evaluation: Evaluation,
        ctx: &PassContext,
    ) -> EscalationResult<Step> {
        warn!(
            complaint_id = complaint.id,
            reason = %cause,
            dry_run = ctx.dry_run,
            "No escalation target available"
        );
        if ctx.dry_run || complaint.priority == Priority::Critical {
            return Ok(Step::done(ComplaintOutcome::NoTarget, Some(&evaluation)));
        }

        let patch = ComplaintPatch {
            priority: Some(Priority::Critical),
            ..Default::default()
        };
        if let UpdateOutcome::Conflict { current_version } = self
            .store
            .update_complaint(complaint.id, patch, complaint.version)
            .await?
        {
            return Ok(Step::Conflict {
                expected: complaint.version,
                found: current_version,
            });
        }
        self.store
            .append_log(ComplaintLogEntry::note(
                complaint.id,
                format!(
                    "No escalation target available; priority raised from {} to {}",
                    complaint.priority,
                    Priority::Critical
                ),
                ctx.now,
            ))
            .await?;
        Ok(Step::done(ComplaintOutcome::NoTarget, Some(&evaluation)))
    }

    /// Complainant contact; a lookup failure only costs that one notification.
    async fn citizen(&self, complaint: &Complaint) -> Option<Contact> {
        match self.directory.citizen(complaint.citizen_id).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(
                    complaint_id = complaint.id,
                    citizen_id = complaint.citizen_id,
                    error = %e,
                    "Citizen lookup failed; complainant will not be notified"
                );
                None
            }
        }
    }

    fn spawn_dispatch(&self, event: NotificationEvent) -> DispatchHandle {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(&event).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatcher::LogGateway;
    use crate::model::{ComplaintStatus, Officer, SlaConfig};
    use crate::store::InMemoryStore;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn complaint(id: u64, hours_ago: i64, officer: Option<u64>) -> Complaint {
        Complaint {
            id,
            title: format!("Complaint {id}"),
            location: "Ward 4".to_string(),
            citizen_id: 100,
            category_id: Some(1),
            department_id: Some(1),
            status: ComplaintStatus::Assigned,
            priority: Priority::Normal,
            created_at: t0() - ChronoDuration::hours(hours_ago),
            closed_at: None,
            assigned_worker: None,
            assigned_officer: officer,
            escalation_count: 0,
            last_escalated_at: None,
            last_warned_at: None,
            is_deleted: false,
            version: 1,
        }
    }

    fn officer(id: u64) -> Officer {
        Officer {
            id,
            name: format!("Officer {id}"),
            email: None,
            department_id: 1,
        }
    }

    fn driver(store: Arc<InMemoryStore>) -> Driver {
        store
            .put_sla_config(SlaConfig {
                category_id: 1,
                resolution_hours: 24,
                escalation_hours: 12,
            })
            .unwrap();
        let registry = SlaRegistry::from_configs(store.sla_configs().unwrap());
        Driver::new(
            store.clone(),
            store,
            registry,
            Arc::new(LogGateway),
            Arc::new(ManualClock::new(t0())),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unconfigured_category_is_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let mut c = complaint(1, 20, None);
        c.category_id = Some(99);
        store.put_complaint(c).unwrap();

        let report = driver(store.clone())
            .run_pass(&PassOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcome_of(1), Some(&ComplaintOutcome::Unconfigured));
        assert_eq!(store.complaint(1).unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_no_target_raises_priority_once() {
        let store = Arc::new(InMemoryStore::new());
        store.put_officer(officer(1)).unwrap();
        store.put_complaint(complaint(1, 13, Some(1))).unwrap();
        let driver = driver(store.clone());

        let report = driver
            .run_pass(&PassOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcome_of(1), Some(&ComplaintOutcome::NoTarget));
        let stored = store.complaint(1).unwrap().unwrap();
        assert_eq!(stored.priority, Priority::Critical);
        assert_eq!(stored.escalation_count, 0);
        assert!(store.escalations().unwrap().is_empty());
        assert_eq!(store.complaint_logs().unwrap().len(), 1);

        // Already CRITICAL: nothing more to write
        driver
            .run_pass(&PassOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.complaint(1).unwrap().unwrap().version, stored.version);
        assert_eq!(store.complaint_logs().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_warning_threshold_override_applies_per_pass() {
        let store = Arc::new(InMemoryStore::new());
        // 9h elapsed of 12h: outside the default 2h window, inside a 4h one
        store.put_complaint(complaint(1, 9, None)).unwrap();
        let driver = driver(store);

        let report = driver
            .run_pass(
                &PassOptions {
                    dry_run: true,
                    warning_threshold_hours: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.outcome_of(1), Some(&ComplaintOutcome::OnTrack));

        let report = driver
            .run_pass(
                &PassOptions {
                    dry_run: true,
                    warning_threshold_hours: Some(4.0),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.outcome_of(1), Some(&ComplaintOutcome::WouldWarn));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_evaluates_nothing() {
        let store = Arc::new(InMemoryStore::new());
        store.put_complaint(complaint(1, 13, None)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = driver(store.clone())
            .run_pass(&PassOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.counters.evaluated, 0);
        assert_eq!(store.complaint(1).unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_warning_stamp_is_written_once_per_window() {
        let store = Arc::new(InMemoryStore::new());
        store.put_complaint(complaint(1, 11, None)).unwrap();
        let driver = driver(store.clone());

        let first = driver
            .run_pass(&PassOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.outcome_of(1), Some(&ComplaintOutcome::Warned));
        assert_eq!(store.complaint(1).unwrap().unwrap().last_warned_at, Some(t0()));

        let second = driver
            .run_pass(&PassOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.outcome_of(1), Some(&ComplaintOutcome::AlreadyWarned));
        let logs = store.complaint_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].note.starts_with("SLA warning sent: 1.0 hours remaining"));
    }
}
