//! AuthorizationPolicy outbound references
//!
//! Workloads matched by the selector, ServiceEntries named by operation
//! hosts, and VirtualServices declaring the same hosts.

use meshlens_common::host::labels_match;
use meshlens_common::mesh::{AuthorizationPolicy, ObjectKind, ObjectRef};

use super::{ReferenceChecker, ReferencesMap};
use crate::checkers::CheckContext;
use crate::models::{IstioReference, References, WorkloadReference};
use crate::snapshot::ClusterSnapshot;

/// Reference builder for AuthorizationPolicies
pub struct AuthorizationPolicyReferences;

impl ReferenceChecker for AuthorizationPolicyReferences {
    fn kind(&self) -> ObjectKind {
        ObjectKind::AuthorizationPolicy
    }

    fn references(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> ReferencesMap {
        let mut result = ReferencesMap::new();
        for ap in &snap.rbac.authorization_policies {
            let key = ObjectRef::from_meta(&ap.metadata, ObjectKind::AuthorizationPolicy);
            let mut refs = References::default();

            refs.workloads = selected_workloads(ap, snap);

            for host in operation_hosts(ap) {
                for se in &snap.service_entries {
                    if se.spec.hosts.iter().any(|h| h == host) {
                        refs.objects.push(IstioReference {
                            kind: ObjectKind::ServiceEntry,
                            namespace: se.metadata.namespace.clone(),
                            name: se.metadata.name.clone(),
                            cluster: se.metadata.cluster.clone(),
                        });
                    }
                }
                let parsed =
                    ctx.resolver
                        .host(host, &ap.metadata.namespace, &snap.namespace_names);
                for vs in &snap.virtual_services {
                    if ctx
                        .resolver
                        .has_matching_virtual_services(&parsed, std::slice::from_ref(vs))
                    {
                        refs.objects.push(IstioReference {
                            kind: ObjectKind::VirtualService,
                            namespace: vs.metadata.namespace.clone(),
                            name: vs.metadata.name.clone(),
                            cluster: vs.metadata.cluster.clone(),
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

fn operation_hosts(ap: &AuthorizationPolicy) -> impl Iterator<Item = &String> {
    ap.spec
        .rules
        .iter()
        .flat_map(|rule| rule.to.iter())
        .flat_map(|to| to.operation.hosts.iter())
}

fn selected_workloads(ap: &AuthorizationPolicy, snap: &ClusterSnapshot) -> Vec<WorkloadReference> {
    let Some(selector) = ap.spec.selector.as_ref() else {
        return Vec::new();
    };
    if selector.match_labels.is_empty() {
        return Vec::new();
    }
    snap.workloads_in(&ap.metadata.namespace)
        .iter()
        .filter(|wl| labels_match(&selector.match_labels, &wl.labels))
        .map(|wl| WorkloadReference {
            name: wl.name.clone(),
            namespace: ap.metadata.namespace.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use std::collections::BTreeMap;

    use meshlens_common::mesh::{
        AuthorizationPolicySpec, MatchLabelsSelector, NamespaceInfo, ObjectMeta, Rule, RuleTo,
        RuleToOperation, ServiceEntry, ServiceEntrySpec, VirtualService, VirtualServiceSpec,
        WorkloadSummary,
    };

    fn make_ap(ns: &str, name: &str, hosts: &[&str], selector: &[(&str, &str)]) -> AuthorizationPolicy {
        AuthorizationPolicy {
            metadata: ObjectMeta::new(name, ns),
            spec: AuthorizationPolicySpec {
                selector: if selector.is_empty() {
                    None
                } else {
                    Some(MatchLabelsSelector {
                        match_labels: selector
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    })
                },
                action: "ALLOW".into(),
                rules: vec![Rule {
                    from: vec![],
                    to: vec![RuleTo {
                        operation: RuleToOperation {
                            hosts: hosts.iter().map(|s| s.to_string()).collect(),
                            ports: vec![],
                            methods: vec![],
                        },
                    }],
                }],
            },
        }
    }

    fn run(snap: &ClusterSnapshot) -> ReferencesMap {
        let config = CoreConfig::default();
        let resolver = config.resolver();
        let ctx = CheckContext {
            config: &config,
            resolver: &resolver,
        };
        AuthorizationPolicyReferences.references(snap, &ctx)
    }

    fn key(ns: &str, name: &str) -> ObjectRef {
        ObjectRef {
            cluster: "east".into(),
            namespace: ns.into(),
            kind: ObjectKind::AuthorizationPolicy,
            name: name.into(),
        }
    }

    #[test]
    fn workload_se_and_vs_edges() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.rbac.authorization_policies = vec![make_ap(
            "bookinfo",
            "allow-api",
            &["api.example.com", "ratings"],
            &[("app", "ratings")],
        )];
        snap.workloads.insert(
            "bookinfo".into(),
            vec![WorkloadSummary {
                name: "ratings-v1".into(),
                labels: BTreeMap::from([("app".to_string(), "ratings".to_string())]),
            }],
        );
        snap.service_entries = vec![ServiceEntry {
            metadata: ObjectMeta::new("external-api", "bookinfo"),
            spec: ServiceEntrySpec {
                hosts: vec!["api.example.com".into()],
                ..Default::default()
            },
        }];
        snap.virtual_services = vec![VirtualService {
            metadata: ObjectMeta::new("ratings-vs", "bookinfo"),
            spec: VirtualServiceSpec {
                hosts: vec!["ratings".into()],
                ..Default::default()
            },
        }];
        snap.normalize();

        let refs = run(&snap);
        let r = &refs[&key("bookinfo", "allow-api")];
        assert_eq!(
            r.workloads,
            vec![WorkloadReference {
                name: "ratings-v1".into(),
                namespace: "bookinfo".into()
            }]
        );
        assert!(r
            .objects
            .iter()
            .any(|o| o.kind == ObjectKind::ServiceEntry && o.name == "external-api"));
        assert!(r
            .objects
            .iter()
            .any(|o| o.kind == ObjectKind::VirtualService && o.name == "ratings-vs"));
    }

    #[test]
    fn selectorless_policy_has_no_workload_edges() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.rbac.authorization_policies = vec![make_ap("bookinfo", "deny-all", &[], &[])];
        snap.normalize();

        let refs = run(&snap);
        assert!(refs[&key("bookinfo", "deny-all")].is_empty());
    }
}
