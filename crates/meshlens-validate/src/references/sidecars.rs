//! Sidecar outbound references
//!
//! Services and ServiceEntries reachable through egress hosts, plus
//! workloads matched by the workloadSelector.

use meshlens_common::host::labels_match;
use meshlens_common::mesh::{ObjectKind, ObjectRef, Sidecar};

use super::{service_exists, ReferenceChecker, ReferencesMap};
use crate::checkers::CheckContext;
use crate::models::{IstioReference, References, ServiceReference, WorkloadReference};
use crate::snapshot::ClusterSnapshot;

/// Reference builder for Sidecars
pub struct SidecarReferences;

impl ReferenceChecker for SidecarReferences {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Sidecar
    }

    fn references(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> ReferencesMap {
        let mut result = ReferencesMap::new();
        for sidecar in &snap.sidecars {
            let key = ObjectRef::from_meta(&sidecar.metadata, ObjectKind::Sidecar);
            let mut refs = References::default();

            for egress in &sidecar.spec.egress {
                for host in &egress.hosts {
                    let Some((_, dns_name)) = host.split_once('/') else {
                        continue;
                    };
                    if dns_name == "*" {
                        continue;
                    }
                    let parsed = ctx.resolver.parse(dns_name, &sidecar.metadata.namespace);
                    if !parsed.is_wildcard()
                        && service_exists(snap, &parsed.service, &parsed.namespace)
                    {
                        refs.services.push(ServiceReference {
                            name: parsed.service.clone(),
                            namespace: parsed.namespace.clone(),
                        });
                    }
                    for se in &snap.service_entries {
                        if se.spec.hosts.iter().any(|h| h == dns_name) {
                            refs.objects.push(IstioReference {
                                kind: ObjectKind::ServiceEntry,
                                namespace: se.metadata.namespace.clone(),
                                name: se.metadata.name.clone(),
                                cluster: se.metadata.cluster.clone(),
                            });
                        }
                    }
                }
            }

            if let Some(selector) = sidecar.spec.workload_selector.as_ref() {
                if !selector.labels.is_empty() {
                    refs.workloads = snap
                        .workloads_in(&sidecar.metadata.namespace)
                        .iter()
                        .filter(|wl| labels_match(&selector.labels, &wl.labels))
                        .map(|wl| WorkloadReference {
                            name: wl.name.clone(),
                            namespace: sidecar.metadata.namespace.clone(),
                        })
                        .collect();
                }
            }

            refs.dedup();
            result.insert(key, refs);
        }
        result
    }
}
