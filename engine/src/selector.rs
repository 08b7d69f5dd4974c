//! Escalation Target Selector
//!
//! Candidates are every officer in the complaint's department except the
//! current one, ranked by open-complaint load ascending, then officer id
//! ascending. Identical input always yields the same order.

use std::sync::Arc;

use crate::error::{EscalationError, EscalationResult};
use crate::model::{Complaint, DepartmentId, OfficerId, OfficerLoad};
use crate::store::Directory;

/// Order `candidates` by load then id, dropping `exclude`.
pub fn rank(mut candidates: Vec<OfficerLoad>, exclude: Option<OfficerId>) -> Vec<OfficerLoad> {
    candidates.retain(|c| Some(c.officer.id) != exclude);
    candidates.sort_by(|a, b| {
        a.active_load
            .cmp(&b.active_load)
            .then(a.officer.id.cmp(&b.officer.id))
    });
    candidates
}

pub struct TargetSelector {
    directory: Arc<dyn Directory>,
}

impl TargetSelector {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Ranked escalation candidates for `department`, best first.
    pub async fn rank_candidates(
        &self,
        department: DepartmentId,
        exclude: Option<OfficerId>,
    ) -> EscalationResult<Vec<OfficerLoad>> {
        let officers = self.directory.list_officers(department).await?;
        Ok(rank(officers, exclude))
    }

    /// Least-loaded officer other than the current one.
    pub async fn select_target(&self, complaint: &Complaint) -> EscalationResult<OfficerLoad> {
        let no_target = || EscalationError::NoEligibleTarget {
            complaint: complaint.id,
            department: complaint.department_id,
        };
        let department = complaint.department_id.ok_or_else(no_target)?;
        self.rank_candidates(department, complaint.assigned_officer)
            .await?
            .into_iter()
            .next()
            .ok_or_else(no_target)
    }
}
