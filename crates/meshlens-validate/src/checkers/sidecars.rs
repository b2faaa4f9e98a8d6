//! Sidecar egress checks
//!
//! Egress hosts use the `namespace/dnsName` form. A malformed host is an
//! error; a well-formed host whose dnsName resolves to nothing is only a
//! warning, because the mesh tolerates dangling egress entries.

use meshlens_common::host::{has_matching_service_entries, has_matching_services};
use meshlens_common::mesh::{ObjectKind, ObjectRef, Sidecar};

use super::{CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Validations};
use crate::snapshot::ClusterSnapshot;

/// Checker for every Sidecar in the snapshot
pub struct SidecarChecker;

impl ObjectChecker for SidecarChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Sidecar
    }

    fn check(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        let se_hosts = snap.service_entry_hosts();

        for sidecar in &snap.sidecars {
            let key = ObjectRef::from_meta(&sidecar.metadata, ObjectKind::Sidecar);
            let entry = validations.ensure(key);

            for (ei, egress) in sidecar.spec.egress.iter().enumerate() {
                for (hi, host) in egress.hosts.iter().enumerate() {
                    entry.add_checks(egress_host_checks(
                        sidecar, host, ei, hi, snap, ctx, &se_hosts,
                    ));
                }
            }
        }
        validations
    }
}

fn egress_host_checks(
    sidecar: &Sidecar,
    host: &str,
    egress_idx: usize,
    host_idx: usize,
    snap: &ClusterSnapshot,
    ctx: &CheckContext<'_>,
    se_hosts: &std::collections::BTreeSet<String>,
) -> Vec<IstioCheck> {
    let path = format!("spec/egress[{}]/hosts[{}]", egress_idx, host_idx);

    let Some((_, dns_name)) = split_egress_host(host) else {
        return vec![IstioCheck::build("sidecar.egress.invalidhostformat", path)];
    };

    // `namespace/*` and the scoping forms */*, ~/* and ./* carry no
    // concrete service to resolve
    if dns_name == "*" {
        return Vec::new();
    }

    let item_ns = &sidecar.metadata.namespace;
    let fqdn = ctx.resolver.parse(dns_name, item_ns);

    if fqdn.is_wildcard() && fqdn.namespace == *item_ns {
        return Vec::new();
    }
    if has_matching_services(&fqdn.service, &snap.services) {
        return Vec::new();
    }
    if has_matching_service_entries(&fqdn.to_string(), se_hosts) {
        return Vec::new();
    }

    vec![IstioCheck::build("sidecar.egress.servicenotfound", path)]
}

/// Split `namespace/dnsName`; exactly one separator is required
fn split_egress_host(host: &str) -> Option<(&str, &str)> {
    let mut parts = host.split('/');
    let ns = parts.next()?;
    let dns = parts.next()?;
    if parts.next().is_some() || ns.is_empty() || dns.is_empty() {
        return None;
    }
    Some((ns, dns))
}
