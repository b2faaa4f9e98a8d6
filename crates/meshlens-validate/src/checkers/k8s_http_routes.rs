//! Gateway API HTTPRoute checks
//!
//! Parent refs must point at existing Gateway API Gateways; backend refs
//! must point at existing services, and cross-namespace backends need a
//! covering ReferenceGrant in the target namespace.

use meshlens_common::mesh::{K8sHttpRoute, K8sReferenceGrant, ObjectKind, ObjectRef};

use super::{CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Validations};
use crate::snapshot::ClusterSnapshot;

/// Checker for every Gateway API HTTPRoute in the snapshot
pub struct K8sHttpRouteChecker;

impl ObjectChecker for K8sHttpRouteChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::K8sHTTPRoute
    }

    fn check(&self, snap: &ClusterSnapshot, _ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        for route in &snap.k8s_http_routes {
            let key = ObjectRef::from_meta(&route.metadata, ObjectKind::K8sHTTPRoute);
            let entry = validations.ensure(key);

            entry.add_checks(parent_checks(route, snap));
            entry.add_checks(backend_checks(route, snap));
        }
        validations
    }
}

fn parent_checks(route: &K8sHttpRoute, snap: &ClusterSnapshot) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for (pi, parent) in route.spec.parent_refs.iter().enumerate() {
        let parent_ns = parent
            .namespace
            .as_deref()
            .unwrap_or(&route.metadata.namespace);
        let exists = snap
            .k8s_gateways
            .iter()
            .any(|gw| gw.metadata.name == parent.name && gw.metadata.namespace == parent_ns);
        if !exists {
            checks.push(IstioCheck::build(
                "k8shttproute.nogateway",
                format!("spec/parentRefs[{}]", pi),
            ));
        }
    }
    checks
}

fn backend_checks(route: &K8sHttpRoute, snap: &ClusterSnapshot) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for (ri, rule) in route.spec.rules.iter().enumerate() {
        for (bi, backend) in rule.backend_refs.iter().enumerate() {
            if !backend.is_service() {
                continue;
            }
            let path = format!("spec/rules[{}]/backendRefs[{}]", ri, bi);
            let backend_ns = backend
                .namespace
                .as_deref()
                .unwrap_or(&route.metadata.namespace);
            let exists = snap
                .services
                .iter()
                .any(|s| s.name == backend.name && s.namespace == backend_ns);
            if !exists {
                checks.push(IstioCheck::build("k8shttproute.nohost.namenotfound", path));
                continue;
            }
            if backend_ns != route.metadata.namespace
                && !has_covering_grant(snap, &route.metadata.namespace, backend_ns)
            {
                checks.push(IstioCheck::build("k8shttproute.nogrant", path));
            }
        }
    }
    checks
}

/// A grant in the backend namespace must allow HTTPRoutes from the route's
/// namespace to reference Services
fn has_covering_grant(snap: &ClusterSnapshot, route_ns: &str, backend_ns: &str) -> bool {
    snap.k8s_reference_grants
        .iter()
        .filter(|grant| grant.metadata.namespace == backend_ns)
        .any(|grant| grant_covers(grant, route_ns))
}

fn grant_covers(grant: &K8sReferenceGrant, route_ns: &str) -> bool {
    let from_ok = grant.spec.from.iter().any(|peer| {
        peer.kind == "HTTPRoute" && peer.namespace.as_deref() == Some(route_ns)
    });
    let to_ok = grant.spec.to.iter().any(|peer| peer.kind == "Service");
    from_ok && to_ok
}
