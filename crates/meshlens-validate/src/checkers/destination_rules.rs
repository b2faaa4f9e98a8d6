//! DestinationRule checks
//!
//! Host resolution, subset/workload coverage, port coverage against the
//! target service, mTLS consistency against PeerAuthentication, and
//! exportTo validity.

use meshlens_common::host::{has_matching_service_entries, has_matching_workload, has_matching_workloads};
use meshlens_common::mesh::{
    DestinationRule, MtlsMode, ObjectKind, ObjectRef, PeerAuthentication, VirtualService,
};
use meshlens_common::{host, HostResolver};

use super::{export_to_checks, CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Severity, Validations};
use crate::snapshot::ClusterSnapshot;

/// TLS mode string disabling mTLS in a DestinationRule traffic policy
const TLS_MODE_DISABLE: &str = "DISABLE";

/// Checker for every DestinationRule in the snapshot
pub struct DestinationRuleChecker;

impl ObjectChecker for DestinationRuleChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::DestinationRule
    }

    fn check(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        for dr in &snap.destination_rules {
            let key = ObjectRef::from_meta(&dr.metadata, ObjectKind::DestinationRule);
            let entry = validations.ensure(key);

            entry.add_checks(no_destination_checks(dr, snap, ctx.resolver));
            entry.add_checks(service_port_checks(dr, snap, ctx.resolver));
            entry.add_checks(mtls_checks(dr, snap));
            entry.add_checks(export_to_checks(&dr.spec.export_to, &snap.namespace_names));
        }
        validations
    }
}

/// The host must resolve; each subset must have labels matching a workload.
///
/// A subset whose labels match nothing is an Error only when some
/// VirtualService routes to it; unreferenced subsets degrade to Unknown
/// because nothing breaks until they are referenced.
fn no_destination_checks(
    dr: &DestinationRule,
    snap: &ClusterSnapshot,
    resolver: &HostResolver,
) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    let fqdn = resolver.host(&dr.spec.host, &dr.metadata.namespace, &snap.namespace_names);

    if !has_matching_destination(dr, snap, resolver) {
        checks.push(IstioCheck::build("dr.nodest.matchingregistry", "spec/host"));
        return checks;
    }

    let host_services = snap.services_in(&fqdn.namespace);
    let host_services: Vec<_> = host_services.into_iter().cloned().collect();
    let host_workloads = snap.workloads_in(&fqdn.namespace);

    for (i, subset) in dr.spec.subsets.iter().enumerate() {
        if subset.labels.is_empty() {
            checks.push(IstioCheck::build(
                "dr.nodest.subsetnolabels",
                format!("spec/subsets[{}]", i),
            ));
            continue;
        }
        if !has_matching_workload(&fqdn.service, &subset.labels, &host_services, host_workloads) {
            let severity = if is_subset_referenced(dr, &subset.name, snap, resolver) {
                Severity::Error
            } else {
                Severity::Unknown
            };
            checks.push(IstioCheck::build_with_severity(
                "dr.nodest.subsetlabels",
                format!("spec/subsets[{}]", i),
                severity,
            ));
        }
    }
    checks
}

/// Kubernetes services + workload app labels + ServiceEntries + registry
fn has_matching_destination(
    dr: &DestinationRule,
    snap: &ClusterSnapshot,
    resolver: &HostResolver,
) -> bool {
    let fqdn = resolver.host(&dr.spec.host, &dr.metadata.namespace, &snap.namespace_names);
    if fqdn.is_wildcard() {
        return true;
    }

    let (local_svc, local_ns) = host::parse_two_part_host(&fqdn);
    if has_matching_workloads(&local_svc, snap.workloads_in(&local_ns)) {
        return true;
    }
    if snap
        .services
        .iter()
        .any(|s| s.name == local_svc && s.namespace == local_ns)
    {
        return true;
    }
    if has_matching_service_entries(&fqdn.to_string(), &snap.service_entry_hosts()) {
        return true;
    }
    host::has_matching_registry_service(&fqdn.to_string(), &snap.registry_services)
}

/// Whether any VirtualService routes to this DR's host with the subset
fn is_subset_referenced(
    dr: &DestinationRule,
    subset: &str,
    snap: &ClusterSnapshot,
    resolver: &HostResolver,
) -> bool {
    let dr_host = resolver.host(&dr.spec.host, &dr.metadata.namespace, &snap.namespace_names);
    snap.virtual_services
        .iter()
        .any(|vs| vs_routes_to_subset(vs, &dr_host, subset, snap, resolver))
}

fn vs_routes_to_subset(
    vs: &VirtualService,
    dr_host: &meshlens_common::Host,
    subset: &str,
    snap: &ClusterSnapshot,
    resolver: &HostResolver,
) -> bool {
    vs.destinations().any(|dest| {
        if dest.destination.subset.as_deref() != Some(subset) {
            return false;
        }
        let dest_host = resolver.host(
            &dest.destination.host,
            &vs.metadata.namespace,
            &snap.namespace_names,
        );
        dest_host.service == dr_host.service && dest_host.namespace == dr_host.namespace
    })
}

/// Port-level traffic policy ports must exist on the target service
fn service_port_checks(
    dr: &DestinationRule,
    snap: &ClusterSnapshot,
    resolver: &HostResolver,
) -> Vec<IstioCheck> {
    let Some(policy) = dr.spec.traffic_policy.as_ref() else {
        return Vec::new();
    };
    if policy.port_level_settings.is_empty() {
        return Vec::new();
    }

    let fqdn = resolver.host(&dr.spec.host, &dr.metadata.namespace, &snap.namespace_names);
    let Some(service) = snap
        .services
        .iter()
        .find(|s| s.name == fqdn.service && s.namespace == fqdn.namespace)
    else {
        // Host resolution problems are flagged separately
        return Vec::new();
    };

    let mut checks = Vec::new();
    for (i, setting) in policy.port_level_settings.iter().enumerate() {
        let Some(port) = setting.port.as_ref() else {
            continue;
        };
        if !service.ports.iter().any(|p| p.port == port.number) {
            checks.push(IstioCheck::build(
                "dr.noserviceport",
                format!("spec/trafficPolicy/portLevelSettings[{}]/port", i),
            ));
        }
    }
    checks
}

/// mTLS consistency between this DR and the PeerAuthentication state
fn mtls_checks(dr: &DestinationRule, snap: &ClusterSnapshot) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    let disables_mtls = dr
        .spec
        .traffic_policy
        .as_ref()
        .and_then(|tp| tp.tls.as_ref())
        .is_some_and(|tls| tls.mode == TLS_MODE_DISABLE);

    let mesh_strict = snap
        .mtls
        .mesh_peer_authentications
        .iter()
        .any(|pa| pa.mtls_mode() == Some(MtlsMode::Strict));
    let namespace_strict = snap
        .mtls
        .peer_authentications
        .iter()
        .filter(|pa| is_namespace_wide(pa, &dr.metadata.namespace))
        .any(|pa| pa.mtls_mode() == Some(MtlsMode::Strict));

    if disables_mtls {
        if mesh_strict {
            checks.push(IstioCheck::build(
                "dr.mtls.meshpolicymtlsenabled",
                "spec/trafficPolicy/tls/mode",
            ));
        }
        if namespace_strict {
            checks.push(IstioCheck::build(
                "dr.mtls.policymtlsenabled",
                "spec/trafficPolicy/tls/mode",
            ));
        }
    }

    // Auto-mTLS (or mesh-wide STRICT) with a traffic policy that never
    // states TLS settings silently overrides the mesh defaults
    let has_policy_without_tls = dr.spec.traffic_policy.as_ref().is_some_and(|tp| {
        tp.tls.is_none() && tp.port_level_settings.iter().all(|p| p.tls.is_none())
    });
    if has_policy_without_tls && (snap.mtls.enabled_auto_mtls || mesh_strict) {
        checks.push(IstioCheck::build(
            "dr.trafficpolicy.notlssettings",
            "spec/trafficPolicy",
        ));
    }

    checks
}

fn is_namespace_wide(pa: &PeerAuthentication, namespace: &str) -> bool {
    pa.metadata.namespace == namespace
        && pa
            .spec
            .selector
            .as_ref()
            .map_or(true, |s| s.match_labels.is_empty())
}
