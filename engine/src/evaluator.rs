//! Escalation Evaluator: classifies a complaint's SLA timer
//!
//! ```text
//! created_at                    deadline - warning   deadline - critical   deadline
//!     │──────── ON_TRACK ──────────────│──── WARNING ─────│──── CRITICAL ────│── OVERDUE ──▶
//! ```
//!
//! Terminal complaints short-circuit to `TERMINAL`; their timer is frozen at
//! `closed_at`. `CRITICAL` only raises notification urgency; the driver treats
//! it exactly like `WARNING`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Complaint;
use crate::registry::SlaPolicy;

/// Timer classification of one complaint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerState {
    OnTrack,
    Warning,
    Critical,
    Overdue,
    Terminal,
}

impl TimerState {
    /// WARNING or CRITICAL
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning | Self::Critical)
    }
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnTrack => write!(f, "on_track"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
            Self::Overdue => write!(f, "overdue"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// Longest accepted warning or critical lead time (one year)
pub const MAX_THRESHOLD_HOURS: f64 = 8760.0;

/// Warning and critical lead times before the escalation deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warning: Duration,
    pub critical: Duration,
}

impl Thresholds {
    /// Build from fractional hours, each capped at [`MAX_THRESHOLD_HOURS`];
    /// `critical` is clamped to at most `warning`.
    pub fn from_hours(warning_hours: f64, critical_hours: f64) -> Self {
        let warning = hours_to_duration(warning_hours);
        let critical = hours_to_duration(critical_hours).min(warning);
        Self { warning, critical }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_hours(2.0, 1.0)
    }
}

/// Result of evaluating one complaint at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub state: TimerState,
    /// Hours since creation (frozen at closure for terminal complaints)
    pub elapsed_hours: f64,
    /// Hours until the escalation deadline; negative once overdue
    pub remaining_hours: f64,
    pub deadline: DateTime<Utc>,
    /// Start of the warning window for the current deadline
    pub warning_opens_at: DateTime<Utc>,
}

impl Evaluation {
    /// Hours left before the deadline, floored to one decimal and never
    /// negative. Every human-facing mention of the remaining time uses this.
    pub fn hours_left(&self) -> f64 {
        (self.remaining_hours.max(0.0) * 10.0).floor() / 10.0
    }
}

/// Classify `complaint` at `now` under `policy`.
pub fn evaluate(
    complaint: &Complaint,
    now: DateTime<Utc>,
    policy: &SlaPolicy,
    thresholds: &Thresholds,
) -> Evaluation {
    let deadline = complaint
        .created_at
        .checked_add_signed(policy.escalation_window())
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let warning_opens_at = deadline
        .checked_sub_signed(thresholds.warning)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    if complaint.status.is_terminal() {
        let frozen_at = complaint.closed_at.unwrap_or(now).min(now);
        let elapsed = (frozen_at - complaint.created_at).max(Duration::zero());
        return Evaluation {
            state: TimerState::Terminal,
            elapsed_hours: duration_hours(elapsed),
            remaining_hours: duration_hours(deadline - frozen_at),
            deadline,
            warning_opens_at,
        };
    }

    let elapsed = (now - complaint.created_at).max(Duration::zero());
    let remaining = deadline - now;

    let state = if now >= deadline {
        TimerState::Overdue
    } else if remaining <= thresholds.critical {
        TimerState::Critical
    } else if remaining <= thresholds.warning {
        TimerState::Warning
    } else {
        TimerState::OnTrack
    };

    Evaluation {
        state,
        elapsed_hours: duration_hours(elapsed),
        remaining_hours: duration_hours(remaining),
        deadline,
        warning_opens_at,
    }
}

pub(crate) fn duration_hours(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

fn hours_to_duration(hours: f64) -> Duration {
    if !hours.is_finite() || hours <= 0.0 {
        return Duration::zero();
    }
    Duration::milliseconds((hours.min(MAX_THRESHOLD_HOURS) * 3_600_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComplaintStatus, Priority};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 6, 0, 0).unwrap()
    }

    fn policy() -> SlaPolicy {
        SlaPolicy {
            resolution_hours: 24,
            escalation_hours: 12,
        }
    }

    fn complaint(status: ComplaintStatus) -> Complaint {
        Complaint {
            id: 1,
            title: "Overflowing drain".to_string(),
            location: String::new(),
            citizen_id: 1,
            category_id: Some(1),
            department_id: Some(1),
            status,
            priority: Priority::Normal,
            created_at: t0(),
            closed_at: None,
            assigned_worker: Some(1),
            assigned_officer: Some(1),
            escalation_count: 0,
            last_escalated_at: None,
            last_warned_at: None,
            is_deleted: false,
            version: 1,
        }
    }

    fn state_at(hours_after: Duration) -> TimerState {
        evaluate(
            &complaint(ComplaintStatus::InProgress),
            t0() + hours_after,
            &policy(),
            &Thresholds::from_hours(2.0, 1.0),
        )
        .state
    }

    #[test]
    fn test_on_track_early() {
        assert_eq!(state_at(Duration::hours(1)), TimerState::OnTrack);
        assert_eq!(state_at(Duration::zero()), TimerState::OnTrack);
    }

    #[test]
    fn test_deadline_boundary_is_overdue() {
        assert_eq!(state_at(Duration::hours(12)), TimerState::Overdue);
        assert_eq!(
            state_at(Duration::hours(12) - Duration::milliseconds(1)),
            TimerState::Critical
        );
        assert_eq!(state_at(Duration::hours(13)), TimerState::Overdue);
    }

    #[test]
    fn test_warning_window_boundaries() {
        // Exactly 2h remaining enters the warning window
        assert_eq!(state_at(Duration::hours(10)), TimerState::Warning);
        assert_eq!(
            state_at(Duration::hours(10) - Duration::seconds(1)),
            TimerState::OnTrack
        );
        // 1h remaining is the critical sub-threshold
        assert_eq!(state_at(Duration::hours(11)), TimerState::Critical);
        assert_eq!(
            state_at(Duration::hours(11) - Duration::seconds(1)),
            TimerState::Warning
        );
    }

    #[test]
    fn test_zero_threshold_never_warns() {
        let eval = evaluate(
            &complaint(ComplaintStatus::Assigned),
            t0() + Duration::hours(12) - Duration::seconds(1),
            &policy(),
            &Thresholds::from_hours(0.0, 0.0),
        );
        assert_eq!(eval.state, TimerState::OnTrack);
    }

    #[test]
    fn test_terminal_statuses_never_warn_or_escalate() {
        for status in [
            ComplaintStatus::Resolved,
            ComplaintStatus::Completed,
            ComplaintStatus::Rejected,
            ComplaintStatus::Declined,
        ] {
            for hours in [0, 10, 11, 12, 500] {
                let eval = evaluate(
                    &complaint(status),
                    t0() + Duration::hours(hours),
                    &policy(),
                    &Thresholds::default(),
                );
                assert_eq!(eval.state, TimerState::Terminal, "{status} at +{hours}h");
            }
        }
    }

    #[test]
    fn test_terminal_timer_freezes_at_closure() {
        let mut c = complaint(ComplaintStatus::Resolved);
        c.closed_at = Some(t0() + Duration::hours(5));
        let eval = evaluate(&c, t0() + Duration::hours(20), &policy(), &Thresholds::default());
        assert_eq!(eval.state, TimerState::Terminal);
        assert!((eval.elapsed_hours - 5.0).abs() < 1e-9);
        assert!((eval.remaining_hours - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_reports_hours() {
        let eval = evaluate(
            &complaint(ComplaintStatus::Assigned),
            t0() + Duration::hours(13),
            &policy(),
            &Thresholds::default(),
        );
        assert!((eval.elapsed_hours - 13.0).abs() < 1e-9);
        assert!((eval.remaining_hours + 1.0).abs() < 1e-9);
        assert_eq!(eval.deadline, t0() + Duration::hours(12));
        assert_eq!(eval.warning_opens_at, t0() + Duration::hours(10));
    }

    #[test]
    fn test_huge_thresholds_are_capped() {
        let thresholds = Thresholds::from_hours(1e10, 1e12);
        assert_eq!(thresholds.warning, Duration::hours(8760));
        assert_eq!(thresholds.critical, Duration::hours(8760));

        let eval = evaluate(
            &complaint(ComplaintStatus::Assigned),
            t0() + Duration::hours(1),
            &policy(),
            &thresholds,
        );
        assert_eq!(eval.state, TimerState::Critical);
        assert_eq!(eval.warning_opens_at, t0() + Duration::hours(12) - Duration::hours(8760));
    }

    #[test]
    fn test_deadline_near_calendar_limits_saturates() {
        let mut c = complaint(ComplaintStatus::Assigned);
        c.created_at = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let eval = evaluate(
            &c,
            c.created_at - Duration::hours(10),
            &policy(),
            &Thresholds::default(),
        );
        assert_eq!(eval.deadline, DateTime::<Utc>::MAX_UTC);
        assert_eq!(eval.state, TimerState::OnTrack);

        let mut c = complaint(ComplaintStatus::Assigned);
        c.created_at = DateTime::<Utc>::MIN_UTC;
        let eval = evaluate(
            &c,
            c.created_at,
            &SlaPolicy {
                resolution_hours: 1,
                escalation_hours: 1,
            },
            &Thresholds::from_hours(MAX_THRESHOLD_HOURS, 0.5),
        );
        assert_eq!(eval.warning_opens_at, DateTime::<Utc>::MIN_UTC);
        assert_eq!(eval.state, TimerState::Warning);
    }

    #[test]
    fn test_largest_escalation_window_does_not_overflow() {
        let eval = evaluate(
            &complaint(ComplaintStatus::Assigned),
            t0(),
            &SlaPolicy {
                resolution_hours: u32::MAX,
                escalation_hours: u32::MAX,
            },
            &Thresholds::from_hours(MAX_THRESHOLD_HOURS, 1.0),
        );
        assert_eq!(eval.state, TimerState::OnTrack);
        assert!(eval.deadline > t0());
    }

    #[test]
    fn test_hours_left_floors_to_one_decimal() {
        let eval = evaluate(
            &complaint(ComplaintStatus::Assigned),
            t0() + Duration::minutes(10 * 60 + 3),
            &policy(),
            &Thresholds::default(),
        );
        assert_eq!(eval.hours_left(), 1.9);

        let overdue = evaluate(
            &complaint(ComplaintStatus::Assigned),
            t0() + Duration::hours(14),
            &policy(),
            &Thresholds::default(),
        );
        assert_eq!(overdue.hours_left(), 0.0);
    }

    #[test]
    fn test_future_creation_clamps_elapsed() {
        let eval = evaluate(
            &complaint(ComplaintStatus::Submitted),
            t0() - Duration::hours(1),
            &policy(),
            &Thresholds::default(),
        );
        assert_eq!(eval.elapsed_hours, 0.0);
        assert_eq!(eval.state, TimerState::OnTrack);
    }
}
