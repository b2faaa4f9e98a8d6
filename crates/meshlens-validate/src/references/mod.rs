//! Reference builders
//!
//! One builder per primary kind, each enumerating the outbound edges of its
//! objects: object → services, object → workloads, object → other objects.
//! A reference is emitted only when the target exists in the snapshot; a
//! dangling reference is a validation error's job to report, not a graph
//! edge. References are deduplicated per source object.

mod authorization_policies;
mod destination_rules;
mod k8s_gateways;
mod k8s_http_routes;
mod peer_authentications;
mod service_entries;
mod sidecars;
mod virtual_services;

pub use authorization_policies::AuthorizationPolicyReferences;
pub use destination_rules::DestinationRuleReferences;
pub use k8s_gateways::K8sGatewayReferences;
pub use k8s_http_routes::K8sHttpRouteReferences;
pub use peer_authentications::PeerAuthenticationReferences;
pub use service_entries::ServiceEntryReferences;
pub use sidecars::SidecarReferences;
pub use virtual_services::VirtualServiceReferences;

use std::collections::BTreeMap;
use std::sync::Arc;

use meshlens_common::mesh::{ObjectKind, ObjectRef};

use crate::checkers::CheckContext;
use crate::models::References;
use crate::snapshot::ClusterSnapshot;

/// Outbound reference sets keyed by source object
pub type ReferencesMap = BTreeMap<ObjectRef, References>;

/// A pure function enumerating the outbound edges of one object kind
pub trait ReferenceChecker: Send + Sync {
    /// The kind this builder walks
    fn kind(&self) -> ObjectKind;

    /// Build the reference map over a frozen snapshot
    fn references(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> ReferencesMap;
}

/// Every registered reference builder
pub fn all_reference_checkers() -> Vec<Arc<dyn ReferenceChecker>> {
    vec![
        Arc::new(VirtualServiceReferences),
        Arc::new(DestinationRuleReferences),
        Arc::new(ServiceEntryReferences),
        Arc::new(AuthorizationPolicyReferences),
        Arc::new(PeerAuthenticationReferences),
        Arc::new(SidecarReferences),
        Arc::new(K8sGatewayReferences),
        Arc::new(K8sHttpRouteReferences),
    ]
}

/// The builder for one kind, if any is registered
pub fn reference_checker_for(kind: ObjectKind) -> Option<Arc<dyn ReferenceChecker>> {
    all_reference_checkers()
        .into_iter()
        .find(|rc| rc.kind() == kind)
}

/// Whether a Kubernetes Service with this (name, namespace) is in the
/// snapshot
pub(crate) fn service_exists(snap: &ClusterSnapshot, name: &str, namespace: &str) -> bool {
    snap.services
        .iter()
        .any(|s| s.name == name && s.namespace == namespace)
}
