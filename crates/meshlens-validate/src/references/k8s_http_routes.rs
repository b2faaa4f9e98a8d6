//! Gateway API HTTPRoute outbound references
//!
//! Parent Gateways and backend Services, both only when present in the
//! snapshot.

use meshlens_common::mesh::{ObjectKind, ObjectRef};

use super::{service_exists, ReferenceChecker, ReferencesMap};
use crate::checkers::CheckContext;
use crate::models::{IstioReference, References, ServiceReference};
use crate::snapshot::ClusterSnapshot;

/// Reference builder for Gateway API HTTPRoutes
pub struct K8sHttpRouteReferences;

impl ReferenceChecker for K8sHttpRouteReferences {
    fn kind(&self) -> ObjectKind {
        ObjectKind::K8sHTTPRoute
    }

    fn references(&self, snap: &ClusterSnapshot, _ctx: &CheckContext<'_>) -> ReferencesMap {
        let mut result = ReferencesMap::new();
        for route in &snap.k8s_http_routes {
            let key = ObjectRef::from_meta(&route.metadata, ObjectKind::K8sHTTPRoute);
            let mut refs = References::default();

            for parent in &route.spec.parent_refs {
                let parent_ns = parent
                    .namespace
                    .as_deref()
                    .unwrap_or(&route.metadata.namespace);
                let target = snap
                    .k8s_gateways
                    .iter()
                    .find(|gw| gw.metadata.name == parent.name && gw.metadata.namespace == parent_ns);
                if let Some(gw) = target {
                    refs.objects.push(IstioReference {
                        kind: ObjectKind::K8sGateway,
                        namespace: gw.metadata.namespace.clone(),
                        name: gw.metadata.name.clone(),
                        cluster: gw.metadata.cluster.clone(),
                    });
                }
            }

            for rule in &route.spec.rules {
                for backend in &rule.backend_refs {
                    if !backend.is_service() {
                        continue;
                    }
                    let backend_ns = backend
                        .namespace
                        .as_deref()
                        .unwrap_or(&route.metadata.namespace);
                    if service_exists(snap, &backend.name, backend_ns) {
                        refs.services.push(ServiceReference {
                            name: backend.name.clone(),
                            namespace: backend_ns.to_string(),
                        });
                    }
                }
            }

            refs.dedup();
            result.insert(key, refs);
        }
        result
    }
}
