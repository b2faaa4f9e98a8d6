//! VirtualService checks
//!
//! Individual checks per VirtualService (unresolvable route hosts, missing
//! gateways, undefined subsets, broken exportTo) plus the single-host group
//! check across the whole visibility scope.

use std::collections::{BTreeMap, BTreeSet};

use meshlens_common::mesh::{DestinationRule, ObjectKind, ObjectRef, VirtualService};
use meshlens_common::{Host, HostResolver, MESH_GATEWAY};

use super::{export_to_checks, CheckContext, ObjectChecker};
use crate::models::{IstioCheck, IstioReference, Severity, Validations};
use crate::snapshot::ClusterSnapshot;

/// Checker for every VirtualService in the snapshot
pub struct VirtualServiceChecker;

impl ObjectChecker for VirtualServiceChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::VirtualService
    }

    fn check(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        let subset_index = subset_index(&snap.destination_rules, ctx.resolver, snap);
        let se_hosts = snap.service_entry_hosts();

        for vs in &snap.virtual_services {
            let key = ObjectRef::from_meta(&vs.metadata, ObjectKind::VirtualService);
            let entry = validations.ensure(key);

            entry.add_checks(no_host_checks(vs, snap, ctx, &se_hosts));
            entry.add_checks(no_gateway_checks(vs, snap, ctx.resolver));
            entry.add_checks(subset_presence_checks(vs, snap, ctx.resolver, &subset_index));
            entry.add_checks(export_to_checks(&vs.spec.export_to, &snap.namespace_names));
        }

        single_host_checks(snap, ctx.resolver, &mut validations);
        validations
    }
}

/// Every route destination must resolve to a service, a ServiceEntry host,
/// a VirtualService host, or a registry entry
fn no_host_checks(
    vs: &VirtualService,
    snap: &ClusterSnapshot,
    ctx: &CheckContext<'_>,
    se_hosts: &BTreeSet<String>,
) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for dest in vs.destinations() {
        let host = &dest.destination.host;
        if host.is_empty() {
            continue;
        }
        let parsed = ctx
            .resolver
            .host(host, &vs.metadata.namespace, &snap.namespace_names);
        let matched = ctx.resolver.has_matching_service(
            &parsed,
            &vs.metadata.namespace,
            &snap.services,
            se_hosts,
            &snap.virtual_services,
            &snap.registry_services,
        );
        if !matched {
            let severity = if ctx.config.policy_allow_any {
                Severity::Warning
            } else {
                Severity::Error
            };
            checks.push(IstioCheck::build_with_severity(
                "vs.nohost.hostnotfound",
                format!("{}/host", dest.path()),
                severity,
            ));
        }
    }
    checks
}

/// Every gateway in `spec.gateways` must be the literal `mesh` or exist in
/// the cluster. Bare names match the cluster-wide gateway name set;
/// qualified forms (`ns/name`, FQDN) must match name and namespace.
/// Per-match gateway restrictions are the reference builder's concern, not
/// a validity condition.
fn no_gateway_checks(
    vs: &VirtualService,
    snap: &ClusterSnapshot,
    resolver: &HostResolver,
) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for (i, gateway) in vs.spec.gateways.iter().enumerate() {
        if gateway == MESH_GATEWAY {
            continue;
        }
        let parsed = resolver.gateway_as_host(gateway, &vs.metadata.namespace);
        let qualified = gateway.contains('/') || gateway.contains('.');
        let found = snap.gateways.iter().any(|gw| {
            gw.metadata.name == parsed.service
                && (!qualified || gw.metadata.namespace == parsed.namespace)
        });
        if !found {
            checks.push(IstioCheck::build(
                "vs.nogateway",
                format!("spec/gateways[{}]", i),
            ));
        }
    }
    checks
}

type SubsetIndex = BTreeMap<(String, String), BTreeSet<String>>;

/// Index `(service, namespace) → defined subset names` over every
/// DestinationRule, built once per pass
fn subset_index(
    destination_rules: &[DestinationRule],
    resolver: &HostResolver,
    snap: &ClusterSnapshot,
) -> SubsetIndex {
    let mut index = SubsetIndex::new();
    for dr in destination_rules {
        let host = resolver.host(&dr.spec.host, &dr.metadata.namespace, &snap.namespace_names);
        let slot = index
            .entry(host_pair(&host))
            .or_default();
        for subset in &dr.spec.subsets {
            slot.insert(subset.name.clone());
        }
    }
    index
}

fn host_pair(host: &Host) -> (String, String) {
    (host.service.clone(), host.namespace.clone())
}

/// Every `destination.subset` must be defined by some DestinationRule for
/// the referenced host
fn subset_presence_checks(
    vs: &VirtualService,
    snap: &ClusterSnapshot,
    resolver: &HostResolver,
    index: &SubsetIndex,
) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for dest in vs.destinations() {
        let Some(subset) = dest.destination.subset.as_deref() else {
            continue;
        };
        if subset.is_empty() {
            continue;
        }
        let host = resolver.host(
            &dest.destination.host,
            &vs.metadata.namespace,
            &snap.namespace_names,
        );
        let defined = index
            .get(&host_pair(&host))
            .is_some_and(|subsets| subsets.contains(subset));
        if !defined {
            checks.push(IstioCheck::build("vs.subsetpresent", dest.path()));
        }
    }
    checks
}

/// Group check: two VirtualServices listing the same host must have
/// disjoint gateway sets. Colliding pairs each get a warning and a
/// reference to the other.
fn single_host_checks(
    snap: &ClusterSnapshot,
    resolver: &HostResolver,
    validations: &mut Validations,
) {
    let mut buckets: BTreeMap<(String, String), Vec<&VirtualService>> = BTreeMap::new();
    for vs in &snap.virtual_services {
        for host in &vs.spec.hosts {
            let parsed = resolver.host(host, &vs.metadata.namespace, &snap.namespace_names);
            buckets.entry(host_pair(&parsed)).or_default().push(vs);
        }
    }

    for members in buckets.values().filter(|members| members.len() > 1) {
        for (i, vs) in members.iter().enumerate() {
            let vs: &VirtualService = vs;
            let colliding: Vec<&VirtualService> = members
                .iter()
                .enumerate()
                .filter(|&(j, other)| {
                    j != i && !same_object(vs, other) && gateways_overlap(vs, other)
                })
                .map(|(_, other)| *other)
                .collect();
            if colliding.is_empty() {
                continue;
            }
            let key = ObjectRef::from_meta(&vs.metadata, ObjectKind::VirtualService);
            let entry = validations.ensure(key);
            entry.add_check(IstioCheck::build("vs.singlehost", "spec/hosts"));
            for other in colliding {
                entry.references.objects.push(IstioReference {
                    kind: ObjectKind::VirtualService,
                    namespace: other.metadata.namespace.clone(),
                    name: other.metadata.name.clone(),
                    cluster: other.metadata.cluster.clone(),
                });
            }
            entry.references.dedup();
        }
    }
}

fn same_object(a: &VirtualService, b: &VirtualService) -> bool {
    a.metadata.name == b.metadata.name && a.metadata.namespace == b.metadata.namespace
}

/// A VirtualService with no gateways binds to `mesh` implicitly
fn gateway_set(vs: &VirtualService) -> BTreeSet<&str> {
    if vs.spec.gateways.is_empty() {
        BTreeSet::from([MESH_GATEWAY])
    } else {
        vs.spec.gateways.iter().map(String::as_str).collect()
    }
}

fn gateways_overlap(a: &VirtualService, b: &VirtualService) -> bool {
    !gateway_set(a).is_disjoint(&gateway_set(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use meshlens_common::mesh::{
        Destination, DestinationRuleSpec, Gateway, HttpMatchRequest, HttpRoute,
        HttpRouteDestination, NamespaceInfo, ObjectMeta, ServiceSummary, Subset,
        VirtualServiceSpec,
    };

    fn make_vs(ns: &str, name: &str, host: &str, gateways: &[&str]) -> VirtualService {
        VirtualService {
            metadata: ObjectMeta::new(name, ns),
            spec: VirtualServiceSpec {
                hosts: vec![host.to_string()],
                gateways: gateways.iter().map(|s| s.to_string()).collect(),
                http: vec![HttpRoute {
                    match_: vec![],
                    route: vec![HttpRouteDestination {
                        destination: Destination {
                            host: host.to_string(),
                            subset: None,
                            port: None,
                        },
                        weight: None,
                    }],
                }],
                ..Default::default()
            },
        }
    }

    fn make_service(ns: &str, name: &str) -> ServiceSummary {
        ServiceSummary {
            name: name.into(),
            namespace: ns.into(),
            ..Default::default()
        }
    }

    fn snap_with(vss: Vec<VirtualService>, services: Vec<ServiceSummary>) -> ClusterSnapshot {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test"), NamespaceInfo::new("istio-system")];
        snap.virtual_services = vss;
        snap.services = services;
        snap.normalize();
        snap
    }

    fn run(snap: &ClusterSnapshot) -> Validations {
        run_with_config(snap, &CoreConfig::default())
    }

    fn run_with_config(snap: &ClusterSnapshot, config: &CoreConfig) -> Validations {
        let resolver = config.resolver();
        let ctx = CheckContext {
            config,
            resolver: &resolver,
        };
        VirtualServiceChecker.check(snap, &ctx)
    }

    fn key(ns: &str, name: &str) -> ObjectRef {
        ObjectRef {
            cluster: "east".into(),
            namespace: ns.into(),
            kind: ObjectKind::VirtualService,
            name: name.into(),
        }
    }

    /// S1: a VS listing a gateway that does not exist gets exactly one
    /// vs.nogateway error at spec/gateways[0]; `mesh` never flags
    #[test]
    fn missing_gateway_is_flagged() {
        let vs = make_vs("test", "product-vs", "product", &["my-gateway", "mesh"]);
        let snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        let validations = run(&snap);

        let v = &validations.0[&key("test", "product-vs")];
        assert!(!v.valid);
        assert_eq!(v.checks.len(), 1);
        assert_eq!(v.checks[0].code, "vs.nogateway");
        assert_eq!(v.checks[0].severity, Severity::Error);
        assert_eq!(v.checks[0].path, "spec/gateways[0]");
    }

    /// S2: an FQDN gateway reference resolves across namespaces
    #[test]
    fn fqdn_gateway_reference_resolves_cross_namespace() {
        let vs = make_vs(
            "test",
            "product-vs",
            "product",
            &["my-gateway.istio-system.svc.cluster.local"],
        );
        let mut snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        snap.gateways = vec![Gateway {
            metadata: ObjectMeta::new("my-gateway", "istio-system"),
            ..Default::default()
        }];
        snap.normalize();

        let validations = run(&snap);
        let v = &validations.0[&key("test", "product-vs")];
        assert!(v.valid, "unexpected checks: {:?}", v.checks);
        assert!(v.checks.is_empty());
    }

    /// Gateways named only in per-match restrictions are graph edges, not
    /// validity conditions
    #[test]
    fn per_match_gateways_are_not_checked() {
        let mut vs = make_vs("test", "product-vs", "product", &[]);
        vs.spec.http[0].match_ = vec![HttpMatchRequest {
            gateways: vec!["ghost-gateway".into()],
        }];
        let snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        let validations = run(&snap);
        let v = &validations.0[&key("test", "product-vs")];
        assert!(v.valid, "unexpected checks: {:?}", v.checks);
        assert!(v.checks.iter().all(|c| c.code != "vs.nogateway"));
    }

    #[test]
    fn bare_gateway_name_matches_any_namespace() {
        let vs = make_vs("test", "product-vs", "product", &["shared-gateway"]);
        let mut snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        snap.gateways = vec![Gateway {
            metadata: ObjectMeta::new("shared-gateway", "istio-system"),
            ..Default::default()
        }];
        snap.normalize();
        let validations = run(&snap);
        assert!(validations.0[&key("test", "product-vs")].valid);
    }

    #[test]
    fn route_host_resolution_uses_services() {
        let mut vs = make_vs("test", "product-vs", "product", &[]);
        // Route to a host nothing declares
        vs.spec.http[0].route[0].destination.host = "customer".to_string();
        let snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        let validations = run(&snap);
        let v = &validations.0[&key("test", "product-vs")];
        assert!(!v.valid);
        assert!(v
            .checks
            .iter()
            .any(|c| c.code == "vs.nohost.hostnotfound"
                && c.path == "spec/http[0]/route[0]/destination/host"));
    }

    #[test]
    fn allow_any_downgrades_missing_host_to_warning() {
        let mut vs = make_vs("test", "product-vs", "product", &[]);
        vs.spec.http[0].route[0].destination.host = "customer".to_string();
        let snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        let config = CoreConfig {
            policy_allow_any: true,
            ..Default::default()
        };
        let validations = run_with_config(&snap, &config);
        let v = &validations.0[&key("test", "product-vs")];
        assert!(v.valid);
        assert_eq!(v.checks[0].severity, Severity::Warning);
    }

    /// S4 precondition coverage: a subset reference without a defining
    /// DestinationRule warns
    #[test]
    fn undefined_subset_is_flagged() {
        let mut vs = make_vs("test", "product-vs", "product", &[]);
        vs.spec.http[0].route[0].destination.subset = Some("v2".to_string());
        let snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        let validations = run(&snap);
        let v = &validations.0[&key("test", "product-vs")];
        assert!(v
            .checks
            .iter()
            .any(|c| c.code == "vs.subsetpresent"
                && c.path == "spec/http[0]/route[0]/destination"));
    }

    #[test]
    fn defined_subset_passes() {
        let mut vs = make_vs("test", "product-vs", "product", &[]);
        vs.spec.http[0].route[0].destination.subset = Some("v2".to_string());
        let mut snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        snap.destination_rules = vec![DestinationRule {
            metadata: ObjectMeta::new("product-dr", "test"),
            spec: DestinationRuleSpec {
                host: "product".to_string(),
                subsets: vec![Subset {
                    name: "v2".to_string(),
                    labels: BTreeMap::from([("version".to_string(), "v2".to_string())]),
                }],
                ..Default::default()
            },
        }];
        snap.normalize();
        let validations = run(&snap);
        let v = &validations.0[&key("test", "product-vs")];
        assert!(v.checks.iter().all(|c| c.code != "vs.subsetpresent"));
    }

    /// S6: two VSes on the same host with overlapping gateways both warn
    /// and reference each other
    #[test]
    fn single_host_collision_flags_both_sides() {
        let a = make_vs("bookinfo", "reviews-a", "reviews", &["bookinfo-gateway"]);
        let b = make_vs("bookinfo", "reviews-b", "reviews", &["bookinfo-gateway"]);
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.virtual_services = vec![a, b];
        snap.services = vec![make_service("bookinfo", "reviews")];
        snap.normalize();

        let validations = run(&snap);
        for name in ["reviews-a", "reviews-b"] {
            let v = &validations.0[&key("bookinfo", name)];
            assert!(
                v.checks.iter().any(|c| c.code == "vs.singlehost"
                    && c.severity == Severity::Warning),
                "missing singlehost warning on {name}"
            );
            let other = if name == "reviews-a" { "reviews-b" } else { "reviews-a" };
            assert!(
                v.references.objects.iter().any(|r| r.name == other),
                "missing cross-reference on {name}"
            );
        }
    }

    #[test]
    fn disjoint_gateway_sets_do_not_collide() {
        let a = make_vs("bookinfo", "reviews-a", "reviews", &["gateway-a"]);
        let b = make_vs("bookinfo", "reviews-b", "reviews", &["gateway-b"]);
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.virtual_services = vec![a, b];
        snap.services = vec![make_service("bookinfo", "reviews")];
        snap.normalize();

        let validations = run(&snap);
        for name in ["reviews-a", "reviews-b"] {
            let v = &validations.0[&key("bookinfo", name)];
            assert!(v.checks.iter().all(|c| c.code != "vs.singlehost"));
        }
    }

    #[test]
    fn export_to_unknown_namespace_is_flagged() {
        let mut vs = make_vs("test", "product-vs", "product", &[]);
        vs.spec.export_to = vec!["missing-ns".to_string()];
        let snap = snap_with(vec![vs], vec![make_service("test", "product")]);
        let validations = run(&snap);
        let v = &validations.0[&key("test", "product-vs")];
        assert!(v
            .checks
            .iter()
            .any(|c| c.code == "generic.exportto.namespacenotfound"));
    }
}
