//! ServiceEntry outbound references
//!
//! AuthorizationPolicies whose operation hosts name an entry host,
//! DestinationRules targeting an entry host, and Sidecars whose egress
//! lists an entry host.

use meshlens_common::mesh::{ObjectKind, ObjectRef, ServiceEntry};

use super::{ReferenceChecker, ReferencesMap};
use crate::checkers::CheckContext;
use crate::models::{IstioReference, References};
use crate::snapshot::ClusterSnapshot;

/// Reference builder for ServiceEntries
pub struct ServiceEntryReferences;

impl ReferenceChecker for ServiceEntryReferences {
    fn kind(&self) -> ObjectKind {
        ObjectKind::ServiceEntry
    }

    fn references(&self, snap: &ClusterSnapshot, _ctx: &CheckContext<'_>) -> ReferencesMap {
        let mut result = ReferencesMap::new();
        for se in &snap.service_entries {
            let key = ObjectRef::from_meta(&se.metadata, ObjectKind::ServiceEntry);
            let mut refs = References::default();

            for ap in &snap.rbac.authorization_policies {
                let named = ap.spec.rules.iter().any(|rule| {
                    rule.to.iter().any(|to| {
                        to.operation
                            .hosts
                            .iter()
                            .any(|h| se.spec.hosts.contains(h))
                    })
                });
                if named {
                    refs.objects.push(IstioReference {
                        kind: ObjectKind::AuthorizationPolicy,
                        namespace: ap.metadata.namespace.clone(),
                        name: ap.metadata.name.clone(),
                        cluster: ap.metadata.cluster.clone(),
                    });
                }
            }

            for dr in &snap.destination_rules {
                if se.spec.hosts.contains(&dr.spec.host) {
                    refs.objects.push(IstioReference {
                        kind: ObjectKind::DestinationRule,
                        namespace: dr.metadata.namespace.clone(),
                        name: dr.metadata.name.clone(),
                        cluster: dr.metadata.cluster.clone(),
                    });
                }
            }

            for sidecar in &snap.sidecars {
                let named = sidecar.spec.egress.iter().any(|egress| {
                    egress.hosts.iter().any(|h| {
                        h.split_once('/')
                            .map(|(_, dns)| se.spec.hosts.iter().any(|seh| seh == dns))
                            .unwrap_or(false)
                    })
                });
                if named {
                    refs.objects.push(IstioReference {
                        kind: ObjectKind::Sidecar,
                        namespace: sidecar.metadata.namespace.clone(),
                        name: sidecar.metadata.name.clone(),
                        cluster: sidecar.metadata.cluster.clone(),
                    });
                }
            }

            refs.dedup();
            result.insert(key, refs);
        }
        result
    }
}
