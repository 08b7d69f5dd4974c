//! Pass report: what one driver invocation did, per complaint and in total

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatcher::DeliveryReport;
use crate::evaluator::TimerState;
use crate::model::{ComplaintId, OfficerId};

/// Final disposition of one complaint in one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComplaintOutcome {
    OnTrack,
    /// Terminal or deleted by the time it was looked at
    Terminal,
    /// No SLA policy for its category
    Unconfigured,
    Warned,
    AlreadyWarned,
    WouldWarn,
    Escalated {
        escalation_id: Uuid,
        target_officer: OfficerId,
    },
    AlreadyEscalated,
    WouldEscalate {
        target_officer: OfficerId,
    },
    /// Overdue but nobody to escalate to; priority raised instead
    NoTarget,
    /// Lost the version race twice; retried next pass
    ConflictSkipped,
    /// Disappeared between listing and re-fetch
    Vanished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintReport {
    pub complaint_id: ComplaintId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TimerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_hours: Option<f64>,
    #[serde(flatten)]
    pub outcome: ComplaintOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCounters {
    pub evaluated: usize,
    pub on_track: usize,
    pub terminal: usize,
    pub unconfigured: usize,
    pub warnings_sent: usize,
    pub already_warned: usize,
    pub would_warn: usize,
    pub escalated: usize,
    pub already_escalated: usize,
    pub would_escalate: usize,
    pub no_target: usize,
    pub conflicts_skipped: usize,
    pub vanished: usize,
}

impl PassCounters {
    pub fn record(&mut self, outcome: &ComplaintOutcome) {
        self.evaluated += 1;
        let slot = match outcome {
            ComplaintOutcome::OnTrack => &mut self.on_track,
            ComplaintOutcome::Terminal => &mut self.terminal,
            ComplaintOutcome::Unconfigured => &mut self.unconfigured,
            ComplaintOutcome::Warned => &mut self.warnings_sent,
            ComplaintOutcome::AlreadyWarned => &mut self.already_warned,
            ComplaintOutcome::WouldWarn => &mut self.would_warn,
            ComplaintOutcome::Escalated { .. } => &mut self.escalated,
            ComplaintOutcome::AlreadyEscalated => &mut self.already_escalated,
            ComplaintOutcome::WouldEscalate { .. } => &mut self.would_escalate,
            ComplaintOutcome::NoTarget => &mut self.no_target,
            ComplaintOutcome::ConflictSkipped => &mut self.conflicts_skipped,
            ComplaintOutcome::Vanished => &mut self.vanished,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Cancellation arrived before every complaint was started
    pub cancelled: bool,
    pub counters: PassCounters,
    pub complaints: Vec<ComplaintReport>,
    pub deliveries: Vec<DeliveryReport>,
}

impl PassReport {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            started_at,
            dry_run,
            cancelled: false,
            counters: PassCounters::default(),
            complaints: Vec::new(),
            deliveries: Vec::new(),
        }
    }

    pub fn push(&mut self, report: ComplaintReport) {
        self.counters.record(&report.outcome);
        self.complaints.push(report);
    }

    /// Sort for stable output; completion order is nondeterministic.
    pub fn finish(&mut self) {
        self.complaints.sort_by_key(|c| c.complaint_id);
        self.deliveries
            .sort_by_key(|d| (d.complaint_id, d.role.to_string()));
    }

    /// Escalations that would happen (dry run) or did happen (live run).
    pub fn pending_escalations(&self) -> Vec<&ComplaintReport> {
        self.complaints
            .iter()
            .filter(|c| {
                matches!(
                    c.outcome,
                    ComplaintOutcome::WouldEscalate { .. } | ComplaintOutcome::Escalated { .. }
                )
            })
            .collect()
    }

    pub fn outcome_of(&self, complaint: ComplaintId) -> Option<&ComplaintOutcome> {
        self.complaints
            .iter()
            .find(|c| c.complaint_id == complaint)
            .map(|c| &c.outcome)
    }

    pub fn deliveries_attempted(&self) -> usize {
        self.deliveries.iter().filter(|d| d.attempted()).count()
    }

    pub fn deliveries_failed(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.attempted() && !d.delivered())
            .count()
    }

    /// Multi-line human summary for the command line.
    pub fn summary(&self) -> String {
        let c = &self.counters;
        let rule = "=".repeat(60);
        let mut out = format!("{rule}\n");
        if self.dry_run {
            out.push_str("DRY RUN COMPLETE:\n");
            out.push_str(&format!("  - Would escalate: {} complaints\n", c.would_escalate));
            out.push_str(&format!("  - Would warn: {} complaints\n", c.would_warn));
        } else {
            out.push_str("AUTO-ESCALATION COMPLETE:\n");
            out.push_str(&format!("  - Escalated: {} complaints\n", c.escalated));
            out.push_str(&format!("  - Warnings sent: {} complaints\n", c.warnings_sent));
            out.push_str(&format!(
                "  - Notifications: {} attempted, {} failed\n",
                self.deliveries_attempted(),
                self.deliveries_failed()
            ));
        }
        out.push_str(&format!("  - Evaluated: {}\n", c.evaluated));
        out.push_str(&format!(
            "  - Skipped: {} without SLA policy, {} without escalation target, {} on version conflict\n",
            c.unconfigured, c.no_target, c.conflicts_skipped
        ));
        if self.cancelled {
            out.push_str("  - Pass cancelled before all complaints were started\n");
        }
        out.push_str(&rule);
        out
    }
}
