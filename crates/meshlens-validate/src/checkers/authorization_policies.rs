//! AuthorizationPolicy checks
//!
//! Every `to[].operation.hosts[]` entry must resolve somewhere in the mesh,
//! and every `from[].source.principals[]` entry must name a service account
//! that actually exists.

use meshlens_common::mesh::{AuthorizationPolicy, ObjectKind, ObjectRef};

use super::{CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Severity, Validations};
use crate::snapshot::ClusterSnapshot;

/// Checker for every AuthorizationPolicy in the snapshot
pub struct AuthorizationPolicyChecker;

impl ObjectChecker for AuthorizationPolicyChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::AuthorizationPolicy
    }

    fn check(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        let se_hosts = snap.service_entry_hosts();

        for ap in &snap.rbac.authorization_policies {
            let key = ObjectRef::from_meta(&ap.metadata, ObjectKind::AuthorizationPolicy);
            let entry = validations.ensure(key);

            entry.add_checks(no_host_checks(ap, snap, ctx, &se_hosts));
            entry.add_checks(principal_checks(ap, snap));
        }
        validations
    }
}

fn no_host_checks(
    ap: &AuthorizationPolicy,
    snap: &ClusterSnapshot,
    ctx: &CheckContext<'_>,
    se_hosts: &std::collections::BTreeSet<String>,
) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for (ri, rule) in ap.spec.rules.iter().enumerate() {
        for (ti, to) in rule.to.iter().enumerate() {
            for (hi, host) in to.operation.hosts.iter().enumerate() {
                let parsed =
                    ctx.resolver
                        .host(host, &ap.metadata.namespace, &snap.namespace_names);
                let matched = ctx.resolver.has_matching_service(
                    &parsed,
                    &ap.metadata.namespace,
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
                        "authorizationpolicy.nodest.matchingregistry",
                        format!("spec/rules[{}]/to[{}]/operation/hosts[{}]", ri, ti, hi),
                        severity,
                    ));
                }
            }
        }
    }
    checks
}

/// A principal matches when its trust-domain-agnostic suffix
/// (`ns/<namespace>/sa/<account>`) names a known service account
fn principal_checks(ap: &AuthorizationPolicy, snap: &ClusterSnapshot) -> Vec<IstioCheck> {
    let mut checks = Vec::new();
    for (ri, rule) in ap.spec.rules.iter().enumerate() {
        for (fi, from) in rule.from.iter().enumerate() {
            for (pi, principal) in from.source.principals.iter().enumerate() {
                // Wildcard principals delegate to the mTLS layer
                if principal.contains('*') {
                    continue;
                }
                let known = snap
                    .principal_suffixes
                    .iter()
                    .any(|suffix| principal == suffix || principal.ends_with(&format!("/{}", suffix)));
                if !known {
                    checks.push(IstioCheck::build(
                        "authorizationpolicy.source.principalnotfound",
                        format!("spec/rules[{}]/from[{}]/source/principals[{}]", ri, fi, pi),
                    ));
                }
            }
        }
    }
    checks
}
