//! Work distribution and per-job orchestration.
//!
//! The [`Coordinator`] consumes build events from a [`WorkQueue`] and, for
//! every (test suite × topology) pair, drives one [`OrchestrationPass`]:
//! materialize artifacts, reserve CPUs, start the database sandbox, run the
//! benchmark client, reconcile results, tear everything down.

pub mod artifact;
pub mod config;
pub mod coordinator;
pub mod cpu;
pub mod error;
pub mod metrics;
pub mod pass;
pub mod probe;
pub mod queue;
pub mod reconcile;
pub mod run;

pub use config::{CoordinatorConfig, SandboxLayout};
pub use coordinator::{Coordinator, EntryReport, Iteration};
pub use cpu::{CpuLedger, allocate};
pub use error::{CoreError, RunError};
pub use metrics::{MetricsError, MetricsSink, RunSummary};
pub use pass::{OrchestrationPass, PassResult};
pub use probe::{ProbeError, ReadinessProbe};
pub use queue::{Delivery, DeliveryBody, QueueError, WorkQueue};
pub use run::{RunOutcome, RunReport, RunStatus};
