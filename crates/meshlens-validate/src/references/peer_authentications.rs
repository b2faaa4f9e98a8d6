//! PeerAuthentication outbound references
//!
//! Workloads matched by the selector, plus DestinationRules coupled through
//! mTLS: a STRICT policy is only effective when client-side TLS settings
//! (ISTIO_MUTUAL) line up, so those DRs are edges of the policy.

use meshlens_common::host::labels_match;
use meshlens_common::mesh::{MtlsMode, ObjectKind, ObjectRef, PeerAuthentication};

use super::{ReferenceChecker, ReferencesMap};
use crate::checkers::CheckContext;
use crate::models::{IstioReference, References, WorkloadReference};
use crate::snapshot::ClusterSnapshot;

/// Reference builder for PeerAuthentications
pub struct PeerAuthenticationReferences;

impl ReferenceChecker for PeerAuthenticationReferences {
    fn kind(&self) -> ObjectKind {
        ObjectKind::PeerAuthentication
    }

    fn references(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> ReferencesMap {
        let mut result = ReferencesMap::new();
        for pa in &snap.peer_authentications {
            let key = ObjectRef::from_meta(&pa.metadata, ObjectKind::PeerAuthentication);
            let mut refs = References::default();

            refs.workloads = selected_workloads(pa, snap);

            if pa.mtls_mode() == Some(MtlsMode::Strict) {
                let mesh_wide = pa.metadata.namespace == ctx.config.root_namespace;
                for dr in &snap.destination_rules {
                    let coupled = dr
                        .spec
                        .traffic_policy
                        .as_ref()
                        .and_then(|tp| tp.tls.as_ref())
                        .is_some_and(|tls| tls.mode == "ISTIO_MUTUAL");
                    if coupled && (mesh_wide || dr.metadata.namespace == pa.metadata.namespace) {
                        refs.objects.push(IstioReference {
                            kind: ObjectKind::DestinationRule,
                            namespace: dr.metadata.namespace.clone(),
                            name: dr.metadata.name.clone(),
                            cluster: dr.metadata.cluster.clone(),
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

fn selected_workloads(pa: &PeerAuthentication, snap: &ClusterSnapshot) -> Vec<WorkloadReference> {
    let Some(selector) = pa.spec.selector.as_ref() else {
        return Vec::new();
    };
    if selector.match_labels.is_empty() {
        return Vec::new();
    }
    snap.workloads_in(&pa.metadata.namespace)
        .iter()
        .filter(|wl| labels_match(&selector.match_labels, &wl.labels))
        .map(|wl| WorkloadReference {
            name: wl.name.clone(),
            namespace: pa.metadata.namespace.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use std::collections::BTreeMap;

    use meshlens_common::mesh::{
        DestinationRule, DestinationRuleSpec, MatchLabelsSelector, NamespaceInfo, ObjectMeta,
        PeerAuthenticationSpec, PeerMtls, TlsSettings, TrafficPolicy, WorkloadSummary,
    };

    fn strict_pa(ns: &str, name: &str) -> PeerAuthentication {
        PeerAuthentication {
            metadata: ObjectMeta::new(name, ns),
            spec: PeerAuthenticationSpec {
                selector: None,
                mtls: Some(PeerMtls {
                    mode: "STRICT".into(),
                }),
                port_level_mtls: BTreeMap::new(),
            },
        }
    }

    fn mutual_dr(ns: &str, name: &str) -> DestinationRule {
        DestinationRule {
            metadata: ObjectMeta::new(name, ns),
            spec: DestinationRuleSpec {
                host: "*.local".into(),
                traffic_policy: Some(TrafficPolicy {
                    tls: Some(TlsSettings {
                        mode: "ISTIO_MUTUAL".into(),
                    }),
                    port_level_settings: vec![],
                }),
                ..Default::default()
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
        PeerAuthenticationReferences.references(snap, &ctx)
    }

    fn key(ns: &str, name: &str) -> ObjectRef {
        ObjectRef {
            cluster: "east".into(),
            namespace: ns.into(),
            kind: ObjectKind::PeerAuthentication,
            name: name.into(),
        }
    }

    #[test]
    fn strict_policy_references_mutual_drs_in_scope() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo"), NamespaceInfo::new("other")];
        snap.peer_authentications = vec![strict_pa("bookinfo", "strict")];
        snap.destination_rules = vec![
            mutual_dr("bookinfo", "local-mtls"),
            mutual_dr("other", "remote-mtls"),
        ];
        snap.normalize();

        let refs = run(&snap);
        let r = &refs[&key("bookinfo", "strict")];
        assert!(r.objects.iter().any(|o| o.name == "local-mtls"));
        // Namespace-scoped policy must not couple with other namespaces
        assert!(r.objects.iter().all(|o| o.name != "remote-mtls"));
    }

    #[test]
    fn mesh_wide_policy_references_all_mutual_drs() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces =
            vec![NamespaceInfo::new("istio-system"), NamespaceInfo::new("bookinfo")];
        snap.peer_authentications = vec![strict_pa("istio-system", "default")];
        snap.destination_rules = vec![mutual_dr("bookinfo", "app-mtls")];
        snap.normalize();

        let refs = run(&snap);
        assert!(refs[&key("istio-system", "default")]
            .objects
            .iter()
            .any(|o| o.name == "app-mtls"));
    }

    #[test]
    fn selector_workload_edges() {
        let mut pa = strict_pa("bookinfo", "scoped");
        pa.spec.selector = Some(MatchLabelsSelector {
            match_labels: BTreeMap::from([("app".to_string(), "ratings".to_string())]),
        });
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.peer_authentications = vec![pa];
        snap.workloads.insert(
            "bookinfo".into(),
            vec![WorkloadSummary {
                name: "ratings-v1".into(),
                labels: BTreeMap::from([("app".to_string(), "ratings".to_string())]),
            }],
        );
        snap.normalize();

        let refs = run(&snap);
        assert_eq!(refs[&key("bookinfo", "scoped")].workloads.len(), 1);
    }
}
