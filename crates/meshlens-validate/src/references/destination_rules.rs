//! DestinationRule outbound references
//!
//! The target service, VirtualServices routing to the same host, and
//! ServiceEntries claiming the host.

use meshlens_common::mesh::{DestinationRule, ObjectKind, ObjectRef};

use super::{service_exists, ReferenceChecker, ReferencesMap};
use crate::checkers::CheckContext;
use crate::models::{IstioReference, References, ServiceReference};
use crate::snapshot::ClusterSnapshot;

/// Reference builder for DestinationRules
pub struct DestinationRuleReferences;

impl ReferenceChecker for DestinationRuleReferences {
    fn kind(&self) -> ObjectKind {
        ObjectKind::DestinationRule
    }

    fn references(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> ReferencesMap {
        let mut result = ReferencesMap::new();
        for dr in &snap.destination_rules {
            let key = ObjectRef::from_meta(&dr.metadata, ObjectKind::DestinationRule);
            let mut refs = References::default();
            let host = ctx.resolver.host(
                &dr.spec.host,
                &dr.metadata.namespace,
                &snap.namespace_names,
            );

            if !host.is_wildcard() && service_exists(snap, &host.service, &host.namespace) {
                refs.services.push(ServiceReference {
                    name: host.service.clone(),
                    namespace: host.namespace.clone(),
                });
            }

            for vs in &snap.virtual_services {
                let routed = vs.destinations().any(|dest| {
                    let dest_host = ctx.resolver.host(
                        &dest.destination.host,
                        &vs.metadata.namespace,
                        &snap.namespace_names,
                    );
                    dest_host.service == host.service && dest_host.namespace == host.namespace
                });
                if routed {
                    refs.objects.push(IstioReference {
                        kind: ObjectKind::VirtualService,
                        namespace: vs.metadata.namespace.clone(),
                        name: vs.metadata.name.clone(),
                        cluster: vs.metadata.cluster.clone(),
                    });
                }
            }

            for se in &snap.service_entries {
                if se.spec.hosts.iter().any(|h| h == &dr.spec.host) {
                    refs.objects.push(IstioReference {
                        kind: ObjectKind::ServiceEntry,
                        namespace: se.metadata.namespace.clone(),
                        name: se.metadata.name.clone(),
                        cluster: se.metadata.cluster.clone(),
                    });
                }
            }

            refs.dedup();
            result.insert(key, refs);
        }
        result
    }
}
