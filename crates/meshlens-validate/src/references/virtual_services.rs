//! VirtualService outbound references
//!
//! Services for every route destination (wildcards excluded), gateways from
//! the spec and per-match restrictions, and DestinationRules whose host
//! canonically equals a route host.

use meshlens_common::mesh::{ObjectKind, ObjectRef, VirtualService};
use meshlens_common::MESH_GATEWAY;

use super::{service_exists, ReferenceChecker, ReferencesMap};
use crate::checkers::CheckContext;
use crate::models::{IstioReference, References, ServiceReference};
use crate::snapshot::ClusterSnapshot;

/// Reference builder for VirtualServices
pub struct VirtualServiceReferences;

impl ReferenceChecker for VirtualServiceReferences {
    fn kind(&self) -> ObjectKind {
        ObjectKind::VirtualService
    }

    fn references(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> ReferencesMap {
        let mut result = ReferencesMap::new();
        for vs in &snap.virtual_services {
            let key = ObjectRef::from_meta(&vs.metadata, ObjectKind::VirtualService);
            let mut refs = References {
                services: service_references(vs, snap, ctx),
                workloads: vec![],
                objects: object_references(vs, snap, ctx),
            };
            refs.dedup();
            result.insert(key, refs);
        }
        result
    }
}

fn service_references(
    vs: &VirtualService,
    snap: &ClusterSnapshot,
    ctx: &CheckContext<'_>,
) -> Vec<ServiceReference> {
    let mut services = Vec::new();
    for dest in vs.destinations() {
        let host = &dest.destination.host;
        if host.is_empty() {
            continue;
        }
        let parsed = ctx
            .resolver
            .host(host, &vs.metadata.namespace, &snap.namespace_names);
        if parsed.is_wildcard() {
            continue;
        }
        if service_exists(snap, &parsed.service, &parsed.namespace) {
            services.push(ServiceReference {
                name: parsed.service,
                namespace: parsed.namespace,
            });
        }
    }
    services
}

fn object_references(
    vs: &VirtualService,
    snap: &ClusterSnapshot,
    ctx: &CheckContext<'_>,
) -> Vec<IstioReference> {
    let mut objects = Vec::new();

    for gateway in vs.all_gateways() {
        if gateway == MESH_GATEWAY {
            objects.push(IstioReference {
                kind: ObjectKind::Gateway,
                namespace: String::new(),
                name: MESH_GATEWAY.to_string(),
                cluster: vs.metadata.cluster.clone(),
            });
            continue;
        }
        let parsed = ctx.resolver.gateway_as_host(gateway, &vs.metadata.namespace);
        if parsed.is_wildcard() {
            continue;
        }
        let target = snap.gateways.iter().find(|gw| {
            gw.metadata.name == parsed.service
                && (!parsed.complete_input || gw.metadata.namespace == parsed.namespace)
        });
        if let Some(gw) = target {
            objects.push(IstioReference {
                kind: ObjectKind::Gateway,
                namespace: gw.metadata.namespace.clone(),
                name: gw.metadata.name.clone(),
                cluster: gw.metadata.cluster.clone(),
            });
        }
    }

    for dr in &snap.destination_rules {
        let dr_host = ctx.resolver.host(
            &dr.spec.host,
            &dr.metadata.namespace,
            &snap.namespace_names,
        );
        let routed = vs.destinations().any(|dest| {
            let dest_host = ctx.resolver.host(
                &dest.destination.host,
                &vs.metadata.namespace,
                &snap.namespace_names,
            );
            dest_host.service == dr_host.service && dest_host.namespace == dr_host.namespace
        });
        if routed {
            objects.push(IstioReference {
                kind: ObjectKind::DestinationRule,
                namespace: dr.metadata.namespace.clone(),
                name: dr.metadata.name.clone(),
                cluster: dr.metadata.cluster.clone(),
            });
        }
    }

    objects
}
