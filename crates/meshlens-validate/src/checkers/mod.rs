//! Checker registry
//!
//! One checker per object kind. Each checker is a pure function from
//! snapshot to validation map: no I/O, no mutation, no panics by contract
//! (missing or malformed fields read as "does not match" and produce no
//! check). The orchestrator runs every checker in parallel and merges the
//! results; merging is commutative, so execution order never shows in the
//! output.

mod authorization_policies;
mod destination_rules;
mod gateways;
mod k8s_gateways;
mod k8s_http_routes;
mod peer_authentications;
mod request_authentications;
mod service_entries;
mod sidecars;
mod virtual_services;

pub use authorization_policies::AuthorizationPolicyChecker;
pub use destination_rules::DestinationRuleChecker;
pub use gateways::GatewayChecker;
pub use k8s_gateways::K8sGatewayChecker;
pub use k8s_http_routes::K8sHttpRouteChecker;
pub use peer_authentications::PeerAuthenticationChecker;
pub use request_authentications::RequestAuthenticationChecker;
pub use service_entries::ServiceEntryChecker;
pub use sidecars::SidecarChecker;
pub use virtual_services::VirtualServiceChecker;

use std::sync::Arc;

use meshlens_common::mesh::ObjectKind;
use meshlens_common::HostResolver;

use crate::config::CoreConfig;
use crate::models::{IstioCheck, Validations};
use crate::snapshot::ClusterSnapshot;

/// Shared read-only context handed to every checker invocation
pub struct CheckContext<'a> {
    /// Engine configuration
    pub config: &'a CoreConfig,
    /// Host resolver built from the configuration
    pub resolver: &'a HostResolver,
}

/// A pure validation function over one object kind
pub trait ObjectChecker: Send + Sync {
    /// The kind this checker validates; used for panic attribution and
    /// single-object dispatch
    fn kind(&self) -> ObjectKind;

    /// Run the checker over a frozen snapshot
    fn check(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> Validations;
}

/// The full checker battery, in registration order
pub fn all_checkers() -> Vec<Arc<dyn ObjectChecker>> {
    vec![
        Arc::new(VirtualServiceChecker),
        Arc::new(DestinationRuleChecker),
        Arc::new(GatewayChecker),
        Arc::new(ServiceEntryChecker),
        Arc::new(SidecarChecker),
        Arc::new(AuthorizationPolicyChecker),
        Arc::new(PeerAuthenticationChecker),
        Arc::new(RequestAuthenticationChecker),
        Arc::new(K8sGatewayChecker),
        Arc::new(K8sHttpRouteChecker),
    ]
}

/// The checkers relevant when validating a single object of one kind.
///
/// Kinds with no registered checker (WorkloadEntry, ReferenceGrant, plain
/// services and workloads) validate trivially: an empty vector.
pub fn checkers_for(kind: ObjectKind) -> Vec<Arc<dyn ObjectChecker>> {
    all_checkers()
        .into_iter()
        .filter(|c| c.kind() == kind)
        .collect()
}

/// Shared exportTo validation: every entry must be `.`, `*`, or an existing
/// namespace. Used by the VirtualService, DestinationRule, and ServiceEntry
/// checkers.
pub(crate) fn export_to_checks(
    export_to: &[String],
    namespace_names: &std::collections::BTreeSet<String>,
) -> Vec<IstioCheck> {
    export_to
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            entry.as_str() != "." && entry.as_str() != "*" && !namespace_names.contains(*entry)
        })
        .map(|(i, _)| {
            IstioCheck::build(
                "generic.exportto.namespacenotfound",
                format!("spec/exportTo[{}]", i),
            )
        })
        .collect()
}
