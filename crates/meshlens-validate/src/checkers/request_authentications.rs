//! RequestAuthentication checks
//!
//! The selector must match at least one workload, and every JWKS URI must
//! be well-formed.

use meshlens_common::host::labels_match;
use meshlens_common::mesh::{ObjectKind, ObjectRef, RequestAuthentication};

use super::{CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Validations};
use crate::snapshot::ClusterSnapshot;

/// Checker for every RequestAuthentication in the snapshot
pub struct RequestAuthenticationChecker;

impl ObjectChecker for RequestAuthenticationChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::RequestAuthentication
    }

    fn check(&self, snap: &ClusterSnapshot, _ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        for ra in &snap.request_authentications {
            let key = ObjectRef::from_meta(&ra.metadata, ObjectKind::RequestAuthentication);
            let entry = validations.ensure(key);

            entry.add_checks(selector_checks(ra, snap));
            entry.add_checks(jwks_checks(ra));
        }
        validations
    }
}

fn selector_checks(ra: &RequestAuthentication, snap: &ClusterSnapshot) -> Vec<IstioCheck> {
    let Some(selector) = ra.spec.selector.as_ref() else {
        return Vec::new();
    };
    if selector.match_labels.is_empty() {
        return Vec::new();
    }
    let matched = snap
        .workloads_in(&ra.metadata.namespace)
        .iter()
        .any(|wl| labels_match(&selector.match_labels, &wl.labels));
    if matched {
        Vec::new()
    } else {
        vec![IstioCheck::build(
            "requestauth.selector.workloadnotfound",
            "spec/selector",
        )]
    }
}

fn jwks_checks(ra: &RequestAuthentication) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for (i, rule) in ra.spec.jwt_rules.iter().enumerate() {
        let Some(uri) = rule.jwks_uri.as_deref() else {
            continue;
        };
        if !is_well_formed_uri(uri) {
            checks.push(IstioCheck::build(
                "requestauth.jwks.invaliduri",
                format!("spec/jwtRules[{}]/jwksUri", i),
            ));
        }
    }
    checks
}

/// Scheme, non-empty authority, no whitespace
fn is_well_formed_uri(uri: &str) -> bool {
    let rest = uri
        .strip_prefix("https://")
        .or_else(|| uri.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let authority = rest.split('/').next().unwrap_or("");
            !authority.is_empty() && !uri.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use std::collections::BTreeMap;

    use meshlens_common::mesh::{
        JwtRule, MatchLabelsSelector, NamespaceInfo, ObjectMeta, RequestAuthenticationSpec,
        WorkloadSummary,
    };

    fn make_ra(ns: &str, name: &str, jwks: Option<&str>) -> RequestAuthentication {
        RequestAuthentication {
            metadata: ObjectMeta::new(name, ns),
            spec: RequestAuthenticationSpec {
                selector: Some(MatchLabelsSelector {
                    match_labels: BTreeMap::from([("app".to_string(), "ratings".to_string())]),
                }),
                jwt_rules: vec![JwtRule {
                    issuer: "https://issuer.example.com".into(),
                    jwks_uri: jwks.map(String::from),
                }],
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
        RequestAuthenticationChecker.check(snap, &ctx)
    }

    fn key(ns: &str, name: &str) -> ObjectRef {
        ObjectRef {
            cluster: "east".into(),
            namespace: ns.into(),
            kind: ObjectKind::RequestAuthentication,
            name: name.into(),
        }
    }

    fn ratings_workload() -> WorkloadSummary {
        WorkloadSummary {
            name: "ratings-v1".into(),
            labels: BTreeMap::from([("app".to_string(), "ratings".to_string())]),
        }
    }

    #[test]
    fn selector_matching_a_workload_passes() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.workloads.insert("bookinfo".into(), vec![ratings_workload()]);
        snap.request_authentications =
            vec![make_ra("bookinfo", "ra", Some("https://issuer.example.com/jwks.json"))];
        snap.normalize();

        let validations = run(&snap);
        assert!(validations.0[&key("bookinfo", "ra")].checks.is_empty());
    }

    #[test]
    fn selector_matching_nothing_warns() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.request_authentications =
            vec![make_ra("bookinfo", "ra", Some("https://issuer.example.com/jwks.json"))];
        snap.normalize();

        let validations = run(&snap);
        let v = &validations.0[&key("bookinfo", "ra")];
        assert!(v.valid);
        assert_eq!(v.checks[0].code, "requestauth.selector.workloadnotfound");
    }

    #[test]
    fn malformed_jwks_uri_is_an_error() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.workloads.insert("bookinfo".into(), vec![ratings_workload()]);
        snap.request_authentications = vec![make_ra("bookinfo", "ra", Some("not a uri"))];
        snap.normalize();

        let validations = run(&snap);
        let v = &validations.0[&key("bookinfo", "ra")];
        assert!(!v.valid);
        assert_eq!(v.checks[0].code, "requestauth.jwks.invaliduri");
        assert_eq!(v.checks[0].path, "spec/jwtRules[0]/jwksUri");
    }

    #[test]
    fn missing_jwks_uri_is_not_checked() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces = vec![NamespaceInfo::new("bookinfo")];
        snap.workloads.insert("bookinfo".into(), vec![ratings_workload()]);
        snap.request_authentications = vec![make_ra("bookinfo", "ra", None)];
        snap.normalize();

        let validations = run(&snap);
        assert!(validations.0[&key("bookinfo", "ra")].checks.is_empty());
    }

    #[test]
    fn uri_well_formedness() {
        assert!(is_well_formed_uri("https://issuer.example.com/jwks.json"));
        assert!(is_well_formed_uri("http://10.0.0.1:8080/keys"));
        assert!(!is_well_formed_uri("ftp://issuer.example.com"));
        assert!(!is_well_formed_uri("https:///jwks.json"));
        assert!(!is_well_formed_uri("https://issuer example.com/jwks"));
    }
}
