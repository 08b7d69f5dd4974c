//! SLA escalation engine for municipal complaints
//!
//! Each pass walks every open complaint, classifies its SLA timer and acts:
//! a one-time warning to the current assignees as the deadline approaches,
//! and once it passes, a version-checked reassignment to the least-loaded
//! officer in the department with an append-only [`model::Escalation`] record
//! naming who was responsible.
//!
//! # Components
//!
//! - [`registry`] per-category deadline policy
//! - [`evaluator`] timer classification against an injected [`clock`]
//! - [`resolver`] who holds a complaint right now
//! - [`selector`] escalation target ranking
//! - [`recorder`] the atomic escalation commit
//! - [`dispatcher`] per-recipient notification with retry
//! - [`driver`] one bounded-parallel, cancellable pass
//!
//! Storage is abstract ([`store::ComplaintStore`], [`store::Directory`]);
//! [`store::InMemoryStore`] and [`store::JsonFileStore`] are provided.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod recorder;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod selector;
pub mod store;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, EngineConfig, NotificationConfig};
pub use dispatcher::{Dispatcher, LogGateway, NotificationGateway, WebhookGateway};
pub use driver::{Driver, PassOptions};
pub use error::{EscalationError, EscalationResult};
pub use evaluator::{evaluate, Evaluation, Thresholds, TimerState};
pub use registry::{SlaPolicy, SlaRegistry};
pub use report::{ComplaintOutcome, PassReport};
pub use store::{ComplaintStore, Directory, InMemoryStore, JsonFileStore, StoreError};
