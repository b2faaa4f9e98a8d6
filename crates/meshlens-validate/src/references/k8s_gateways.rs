//! Gateway API Gateway outbound references
//!
//! HTTPRoutes that attach to the gateway through a parentRef.

use meshlens_common::mesh::{ObjectKind, ObjectRef};

use super::{ReferenceChecker, ReferencesMap};
use crate::checkers::CheckContext;
use crate::models::{IstioReference, References};
use crate::snapshot::ClusterSnapshot;

/// Reference builder for Gateway API Gateways
pub struct K8sGatewayReferences;

impl ReferenceChecker for K8sGatewayReferences {
    fn kind(&self) -> ObjectKind {
        ObjectKind::K8sGateway
    }

    fn references(&self, snap: &ClusterSnapshot, _ctx: &CheckContext<'_>) -> ReferencesMap {
        let mut result = ReferencesMap::new();
        for gw in &snap.k8s_gateways {
            let key = ObjectRef::from_meta(&gw.metadata, ObjectKind::K8sGateway);
            let mut refs = References::default();

            for route in &snap.k8s_http_routes {
                let attached = route.spec.parent_refs.iter().any(|parent| {
                    let parent_ns = parent
                        .namespace
                        .as_deref()
                        .unwrap_or(&route.metadata.namespace);
                    parent.name == gw.metadata.name && parent_ns == gw.metadata.namespace
                });
                if attached {
                    refs.objects.push(IstioReference {
                        kind: ObjectKind::K8sHTTPRoute,
                        namespace: route.metadata.namespace.clone(),
                        name: route.metadata.name.clone(),
                        cluster: route.metadata.cluster.clone(),
                    });
                }
            }

            refs.dedup();
            result.insert(key, refs);
        }
        result
    }
}
