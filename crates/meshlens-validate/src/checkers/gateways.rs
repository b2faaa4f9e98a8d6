//! Istio Gateway checks
//!
//! Duplicate (host, port) bindings across gateways, selector/workload
//! coverage, and server protocol sanity.

use std::collections::BTreeMap;

use meshlens_common::host::labels_match;
use meshlens_common::mesh::{Gateway, ObjectKind, ObjectRef};

use super::{CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Validations};
use crate::snapshot::ClusterSnapshot;

/// Protocols an Istio Gateway server may declare
const SERVER_PROTOCOLS: &[&str] = &[
    "HTTP", "HTTPS", "GRPC", "GRPC-WEB", "HTTP2", "MONGO", "TCP", "TLS",
];

/// Checker for every Istio Gateway in the snapshot
pub struct GatewayChecker;

impl ObjectChecker for GatewayChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Gateway
    }

    fn check(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        let bindings = host_port_bindings(&snap.gateways);

        for gw in &snap.gateways {
            let key = ObjectRef::from_meta(&gw.metadata, ObjectKind::Gateway);
            let entry = validations.ensure(key);

            entry.add_checks(multimatch_checks(gw, &bindings));
            entry.add_checks(selector_checks(gw, snap, ctx));
            entry.add_checks(protocol_checks(gw));
        }
        validations
    }
}

/// Count how many gateways bind each (host, port) pair
fn host_port_bindings(gateways: &[Gateway]) -> BTreeMap<(String, u16), usize> {
    let mut bindings = BTreeMap::new();
    for gw in gateways {
        for server in &gw.spec.servers {
            for host in &server.hosts {
                *bindings
                    .entry((host.clone(), server.port.number))
                    .or_insert(0) += 1;
            }
        }
    }
    bindings
}

fn multimatch_checks(gw: &Gateway, bindings: &BTreeMap<(String, u16), usize>) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for (si, server) in gw.spec.servers.iter().enumerate() {
        for (hi, host) in server.hosts.iter().enumerate() {
            let count = bindings
                .get(&(host.clone(), server.port.number))
                .copied()
                .unwrap_or(0);
            if count > 1 {
                checks.push(IstioCheck::build(
                    "gateway.multimatch",
                    format!("spec/servers[{}]/hosts[{}]", si, hi),
                ));
            }
        }
    }
    checks
}

/// The selector must match at least one workload; scoping follows the
/// control plane's gateway-to-namespace setting
fn selector_checks(
    gw: &Gateway,
    snap: &ClusterSnapshot,
    ctx: &CheckContext<'_>,
) -> Vec<IstioCheck> {
    if gw.spec.selector.is_empty() {
        return Vec::new();
    }
    let matched = if ctx.config.gateway_to_namespace {
        snap.workloads_in(&gw.metadata.namespace)
            .iter()
            .any(|wl| labels_match(&gw.spec.selector, &wl.labels))
    } else {
        snap.all_workloads()
            .any(|wl| labels_match(&gw.spec.selector, &wl.labels))
    };
    if matched {
        Vec::new()
    } else {
        vec![IstioCheck::build(
            "gateway.selector.workloadnotfound",
            "spec/selector",
        )]
    }
}

fn protocol_checks(gw: &Gateway) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for (si, server) in gw.spec.servers.iter().enumerate() {
        let protocol = server.port.protocol.to_uppercase();
        if !protocol.is_empty() && !SERVER_PROTOCOLS.contains(&protocol.as_str()) {
            checks.push(IstioCheck::build(
                "gateway.port.invalidprotocol",
                format!("spec/servers[{}]/port/protocol", si),
            ));
        }
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use meshlens_common::mesh::{
        GatewaySpec, NamespaceInfo, ObjectMeta, Server, ServerPort, WorkloadSummary,
    };
    use std::collections::BTreeMap as Map;

    fn make_gateway(ns: &str, name: &str, host: &str, port: u16) -> Gateway {
        Gateway {
            metadata: ObjectMeta::new(name, ns),
            spec: GatewaySpec {
                selector: Map::from([("istio".to_string(), "ingressgateway".to_string())]),
                servers: vec![Server {
                    port: ServerPort {
                        number: port,
                        name: "http".into(),
                        protocol: "HTTP".into(),
                    },
                    hosts: vec![host.to_string()],
                }],
            },
        }
    }

    fn ingress_workload() -> WorkloadSummary {
        WorkloadSummary {
            name: "istio-ingressgateway".into(),
            labels: Map::from([("istio".to_string(), "ingressgateway".to_string())]),
        }
    }

    fn run(snap: &ClusterSnapshot) -> Validations {
        run_with(snap, &CoreConfig::default())
    }

    fn run_with(snap: &ClusterSnapshot, config: &CoreConfig) -> Validations {
        let resolver = config.resolver();
        let ctx = CheckContext {
            config,
            resolver: &resolver,
        };
        GatewayChecker.check(snap, &ctx)
    }

    fn key(ns: &str, name: &str) -> ObjectRef {
        ObjectRef {
            cluster: "east".into(),
            namespace: ns.into(),
            kind: ObjectKind::Gateway,
            name: name.into(),
        }
    }

    #[test]
    fn duplicate_host_port_binding_flags_both_gateways() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test")];
        snap.gateways = vec![
            make_gateway("test", "gw-a", "bookinfo.example.com", 443),
            make_gateway("test", "gw-b", "bookinfo.example.com", 443),
        ];
        snap.workloads.insert("test".into(), vec![ingress_workload()]);
        snap.normalize();

        let validations = run(&snap);
        for name in ["gw-a", "gw-b"] {
            let v = &validations.0[&key("test", name)];
            assert!(
                v.checks
                    .iter()
                    .any(|c| c.code == "gateway.multimatch"
                        && c.path == "spec/servers[0]/hosts[0]"),
                "missing multimatch on {name}"
            );
        }
    }

    #[test]
    fn distinct_ports_do_not_collide() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test")];
        snap.gateways = vec![
            make_gateway("test", "gw-a", "bookinfo.example.com", 443),
            make_gateway("test", "gw-b", "bookinfo.example.com", 80),
        ];
        snap.workloads.insert("test".into(), vec![ingress_workload()]);
        snap.normalize();

        let validations = run(&snap);
        for name in ["gw-a", "gw-b"] {
            assert!(validations.0[&key("test", name)].valid);
            assert!(validations.0[&key("test", name)].checks.is_empty());
        }
    }

    #[test]
    fn selector_without_matching_workload_warns() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test")];
        snap.gateways = vec![make_gateway("test", "gw", "x.example.com", 443)];
        snap.normalize();

        let validations = run(&snap);
        let v = &validations.0[&key("test", "gw")];
        assert!(v
            .checks
            .iter()
            .any(|c| c.code == "gateway.selector.workloadnotfound"));
        // Warning severity keeps the gateway valid
        assert!(v.valid);
    }

    #[test]
    fn gateway_to_namespace_restricts_selector_scope() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test"), NamespaceInfo::new("istio-system")];
        snap.gateways = vec![make_gateway("test", "gw", "x.example.com", 443)];
        // The only matching workload lives in another namespace
        snap.workloads
            .insert("istio-system".into(), vec![ingress_workload()]);
        snap.normalize();

        let cluster_wide = run(&snap);
        assert!(cluster_wide.0[&key("test", "gw")].valid);
        assert!(cluster_wide.0[&key("test", "gw")].checks.is_empty());

        let config = CoreConfig {
            gateway_to_namespace: true,
            ..Default::default()
        };
        let scoped = run_with(&snap, &config);
        assert!(scoped.0[&key("test", "gw")]
            .checks
            .iter()
            .any(|c| c.code == "gateway.selector.workloadnotfound"));
    }

    #[test]
    fn unrecognized_protocol_is_an_error() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test")];
        let mut gw = make_gateway("test", "gw", "x.example.com", 443);
        gw.spec.servers[0].port.protocol = "QUIC".into();
        snap.gateways = vec![gw];
        snap.workloads.insert("test".into(), vec![ingress_workload()]);
        snap.normalize();

        let validations = run(&snap);
        let v = &validations.0[&key("test", "gw")];
        assert!(!v.valid);
        assert!(v
            .checks
            .iter()
            .any(|c| c.code == "gateway.port.invalidprotocol"
                && c.path == "spec/servers[0]/port/protocol"));
    }
}
