//! Responsible-Party Resolver
//!
//! Describes who holds a complaint right now. Never fails: an unassigned
//! complaint resolves to `Unassigned`, and a directory miss or outage falls
//! back to the bare id so the escalation can still name who was responsible.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{Complaint, Contact};
use crate::store::Directory;

pub const UNASSIGNED: &str = "Unassigned";

/// Worker and/or officer holding a complaint, with a ready-to-print summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibleParty {
    pub worker: Option<Contact>,
    pub officer: Option<Contact>,
    pub display_text: String,
}

impl ResponsibleParty {
    pub fn new(worker: Option<Contact>, officer: Option<Contact>) -> Self {
        let display_text = match (&worker, &officer) {
            (Some(w), Some(o)) => format!(
                "worker {} (worker #{}), supervised by officer {} (officer #{})",
                w.name, w.id, o.name, o.id
            ),
            (Some(w), None) => format!("worker {} (worker #{})", w.name, w.id),
            (None, Some(o)) => format!("officer {} (officer #{})", o.name, o.id),
            (None, None) => UNASSIGNED.to_string(),
        };
        Self {
            worker,
            officer,
            display_text,
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.worker.is_none() && self.officer.is_none()
    }
}

pub struct Resolver {
    directory: Arc<dyn Directory>,
}

impl Resolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, complaint: &Complaint) -> ResponsibleParty {
        let worker = match complaint.assigned_worker {
            Some(id) => Some(match self.directory.worker(id).await {
                Ok(Some(contact)) => contact,
                Ok(None) => placeholder("worker", id),
                Err(e) => {
                    warn!(complaint_id = complaint.id, worker_id = id, error = %e, "Worker lookup failed; naming by id");
                    placeholder("worker", id)
                }
            }),
            None => None,
        };

        let officer = match complaint.assigned_officer {
            Some(id) => Some(match self.directory.officer(id).await {
                Ok(Some(officer)) => officer.contact(),
                Ok(None) => placeholder("officer", id),
                Err(e) => {
                    warn!(complaint_id = complaint.id, officer_id = id, error = %e, "Officer lookup failed; naming by id");
                    placeholder("officer", id)
                }
            }),
            None => None,
        };

        ResponsibleParty::new(worker, officer)
    }
}

fn placeholder(role: &str, id: u64) -> Contact {
    Contact {
        id,
        name: format!("{role} #{id}"),
        email: None,
    }
}
