//! Validation and cross-reference engine for meshlens
//!
//! Given a snapshot of routing, security, and gateway resources across one
//! or more clusters, this crate:
//!
//! - fetches the required input resources concurrently from each cluster,
//! - runs a battery of independent and group-wise checkers that flag
//!   semantic defects (dangling hosts, missing gateways, duplicate
//!   single-host virtual services, subset/label mismatches, mTLS conflicts,
//!   export-visibility errors, ...),
//! - computes a reference graph: for each configuration object, the set of
//!   services, workloads, and other objects it semantically depends on,
//! - caches the resulting validations per (cluster, namespace, kind, name)
//!   and serves point queries and bulk listings.
//!
//! Entry point is [`orchestrator::ValidationsService`].

pub mod cache;
pub mod checkers;
pub mod config;
pub mod fetcher;
pub mod messages;
pub mod models;
pub mod orchestrator;
pub mod references;
pub mod snapshot;
pub mod visibility;

pub use cache::ValidationCache;
pub use config::{CoreConfig, CoreContext};
pub use models::{
    IstioCheck, IstioReference, ObjectValidation, References, ServiceReference, Severity,
    ValidationKey, Validations, WorkloadReference,
};
pub use orchestrator::ValidationsService;
pub use snapshot::{ClusterSnapshot, ClusterSource, FetchCriteria, Snapshot, StaticSource};

// Re-export from dependencies
pub use meshlens_common::{Error, Result};
