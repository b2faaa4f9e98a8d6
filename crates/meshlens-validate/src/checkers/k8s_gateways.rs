//! Gateway API Gateway checks
//!
//! The gatewayClass must be one the control plane implements; listener
//! (hostname, port) pairs and (type, value) addresses must be unique across
//! the cluster's gateways.

use std::collections::BTreeMap;

use meshlens_common::mesh::{K8sGateway, ObjectKind, ObjectRef};

use super::{CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Validations};
use crate::snapshot::ClusterSnapshot;

/// Checker for every Gateway API Gateway in the snapshot
pub struct K8sGatewayChecker;

impl ObjectChecker for K8sGatewayChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::K8sGateway
    }

    fn check(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        let listener_counts = listener_bindings(&snap.k8s_gateways);
        let address_counts = address_bindings(&snap.k8s_gateways);

        for gw in &snap.k8s_gateways {
            let key = ObjectRef::from_meta(&gw.metadata, ObjectKind::K8sGateway);
            let entry = validations.ensure(key);

            if !ctx
                .config
                .gateway_classes
                .contains(&gw.spec.gateway_class_name)
            {
                entry.add_check(IstioCheck::build(
                    "k8sgateway.gatewayclassnotfound",
                    "spec/gatewayClassName",
                ));
            }

            for (li, listener) in gw.spec.listeners.iter().enumerate() {
                let binding = (listener.hostname.clone().unwrap_or_default(), listener.port);
                if listener_counts.get(&binding).copied().unwrap_or(0) > 1 {
                    entry.add_check(IstioCheck::build(
                        "k8sgateway.multimatch.listener",
                        format!("spec/listeners[{}]", li),
                    ));
                }
            }

            for (ai, address) in gw.spec.addresses.iter().enumerate() {
                let binding = (address.type_.clone(), address.value.clone());
                if address_counts.get(&binding).copied().unwrap_or(0) > 1 {
                    entry.add_check(IstioCheck::build(
                        "k8sgateway.multimatch.address",
                        format!("spec/addresses[{}]", ai),
                    ));
                }
            }
        }
        validations
    }
}

fn listener_bindings(gateways: &[K8sGateway]) -> BTreeMap<(String, u16), usize> {
    let mut counts = BTreeMap::new();
    for gw in gateways {
        for listener in &gw.spec.listeners {
            *counts
                .entry((listener.hostname.clone().unwrap_or_default(), listener.port))
                .or_insert(0) += 1;
        }
    }
    counts
}

fn address_bindings(gateways: &[K8sGateway]) -> BTreeMap<(String, String), usize> {
    let mut counts = BTreeMap::new();
    for gw in gateways {
        for address in &gw.spec.addresses {
            *counts
                .entry((address.type_.clone(), address.value.clone()))
                .or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    use meshlens_common::mesh::{
        GatewayAddress, GatewayListener, K8sGatewaySpec, NamespaceInfo, ObjectMeta,
    };

    fn make_gw(ns: &str, name: &str, class: &str, hostname: &str, port: u16) -> K8sGateway {
        K8sGateway {
            metadata: ObjectMeta::new(name, ns),
            spec: K8sGatewaySpec {
                gateway_class_name: class.into(),
                listeners: vec![GatewayListener {
                    name: "http".into(),
                    hostname: Some(hostname.to_string()),
                    port,
                    protocol: "HTTP".into(),
                }],
                addresses: vec![],
            },
        }
    }

    fn run(snap: &ClusterSnapshot) -> Validations {
        let config = CoreConfig::default();
        let resolver = config.resolver();
        let ctx = CheckContext {
            config: &config,
            resolver: &resolver,
        };
        K8sGatewayChecker.check(snap, &ctx)
    }

    fn key(ns: &str, name: &str) -> ObjectRef {
        ObjectRef {
            cluster: "east".into(),
            namespace: ns.into(),
            kind: ObjectKind::K8sGateway,
            name: name.into(),
        }
    }

    #[test]
    fn unknown_gateway_class_is_an_error() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test")];
        snap.k8s_gateways = vec![make_gw("test", "gw", "nginx", "x.example.com", 80)];
        snap.normalize();

        let validations = run(&snap);
        let v = &validations.0[&key("test", "gw")];
        assert!(!v.valid);
        assert_eq!(v.checks[0].code, "k8sgateway.gatewayclassnotfound");
        assert_eq!(v.checks[0].path, "spec/gatewayClassName");
    }

    #[test]
    fn istio_class_passes() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test")];
        snap.k8s_gateways = vec![make_gw("test", "gw", "istio", "x.example.com", 80)];
        snap.normalize();
        let validations = run(&snap);
        assert!(validations.0[&key("test", "gw")].checks.is_empty());
    }

    #[test]
    fn duplicate_listener_binding_warns_both_gateways() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test")];
        snap.k8s_gateways = vec![
            make_gw("test", "gw-a", "istio", "x.example.com", 80),
            make_gw("test", "gw-b", "istio", "x.example.com", 80),
        ];
        snap.normalize();

        let validations = run(&snap);
        for name in ["gw-a", "gw-b"] {
            let v = &validations.0[&key("test", name)];
            assert!(
                v.checks
                    .iter()
                    .any(|c| c.code == "k8sgateway.multimatch.listener"),
                "missing listener multimatch on {name}"
            );
            assert!(v.valid);
        }
    }

    #[test]
    fn duplicate_address_binding_warns() {
        let mut gw_a = make_gw("test", "gw-a", "istio", "a.example.com", 80);
        let mut gw_b = make_gw("test", "gw-b", "istio", "b.example.com", 443);
        let addr = GatewayAddress {
            type_: "IPAddress".into(),
            value: "10.0.0.1".into(),
        };
        gw_a.spec.addresses = vec![addr.clone()];
        gw_b.spec.addresses = vec![addr];

        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("test")];
        snap.k8s_gateways = vec![gw_a, gw_b];
        snap.normalize();

        let validations = run(&snap);
        for name in ["gw-a", "gw-b"] {
            assert!(validations.0[&key("test", name)]
                .checks
                .iter()
                .any(|c| c.code == "k8sgateway.multimatch.address"
                    && c.path == "spec/addresses[0]"));
        }
    }
}
