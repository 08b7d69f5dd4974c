//! SLA Registry: read-only lookup of per-category deadline policy

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{EscalationError, EscalationResult};
use crate::model::{CategoryId, SlaConfig};

/// Deadline policy for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub resolution_hours: u32,
    pub escalation_hours: u32,
}

impl SlaPolicy {
    pub fn escalation_window(&self) -> Duration {
        Duration::hours(i64::from(self.escalation_hours))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlaRegistry {
    policies: HashMap<CategoryId, SlaPolicy>,
}

impl SlaRegistry {
    /// Build from authored configs. A later entry for the same category wins.
    pub fn from_configs(configs: impl IntoIterator<Item = SlaConfig>) -> Self {
        let policies = configs
            .into_iter()
            .map(|c| {
                (
                    c.category_id,
                    SlaPolicy {
                        resolution_hours: c.resolution_hours,
                        escalation_hours: c.escalation_hours,
                    },
                )
            })
            .collect();
        Self { policies }
    }

    /// Policy for `category`, or `NotConfigured` (also for uncategorised complaints).
    pub fn lookup(&self, category: Option<CategoryId>) -> EscalationResult<SlaPolicy> {
        category
            .and_then(|c| self.policies.get(&c).copied())
            .ok_or(EscalationError::NotConfigured { category })
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
