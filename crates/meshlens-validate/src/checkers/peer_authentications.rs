//! PeerAuthentication checks
//!
//! Mode conflicts between mesh-wide and namespace-level policies, plus
//! port-level mTLS validity (port-level overrides require a selector and a
//! recognized mode).

use meshlens_common::mesh::{MtlsMode, ObjectKind, ObjectRef, PeerAuthentication};

use super::{CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Validations};
use crate::snapshot::ClusterSnapshot;

/// Checker for every PeerAuthentication in the snapshot
pub struct PeerAuthenticationChecker;

impl ObjectChecker for PeerAuthenticationChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::PeerAuthentication
    }

    fn check(&self, snap: &ClusterSnapshot, ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        let mesh_mode = mesh_wide_mode(snap, &ctx.config.root_namespace);

        for pa in &snap.peer_authentications {
            let key = ObjectRef::from_meta(&pa.metadata, ObjectKind::PeerAuthentication);
            let entry = validations.ensure(key);

            entry.add_checks(port_level_checks(pa));
            entry.add_checks(mesh_conflict_checks(pa, mesh_mode, &ctx.config.root_namespace));
        }
        validations
    }
}

/// The effective mesh-wide mode, taken from root-namespace policies
fn mesh_wide_mode(snap: &ClusterSnapshot, root_namespace: &str) -> Option<MtlsMode> {
    snap.mtls
        .mesh_peer_authentications
        .iter()
        .filter(|pa| pa.metadata.namespace == root_namespace)
        .filter_map(PeerAuthentication::mtls_mode)
        .next()
}

fn port_level_checks(pa: &PeerAuthentication) -> Vec<IstioCheck> {
    if pa.spec.port_level_mtls.is_empty() {
        return Vec::new();
    }
    let mut checks = Vec::new();

    // Port-level overrides only apply to selected workloads
    let has_selector = pa
        .spec
        .selector
        .as_ref()
        .is_some_and(|s| !s.match_labels.is_empty());
    if !has_selector {
        checks.push(IstioCheck::build(
            "peerauth.portmode.invalid",
            "spec/portLevelMtls",
        ));
    }

    for (port, mtls) in &pa.spec.port_level_mtls {
        if MtlsMode::parse(&mtls.mode).is_none() || port.parse::<u16>().is_err() {
            checks.push(IstioCheck::build(
                "peerauth.portmode.invalid",
                format!("spec/portLevelMtls/{}", port),
            ));
        }
    }
    checks
}

/// Namespace-wide STRICT vs mesh DISABLE (and the reverse) is a conflict
fn mesh_conflict_checks(
    pa: &PeerAuthentication,
    mesh_mode: Option<MtlsMode>,
    root_namespace: &str,
) -> Vec<IstioCheck> {
    // Root-namespace policies define the mesh mode, they cannot conflict
    // with themselves
    if pa.metadata.namespace == root_namespace {
        return Vec::new();
    }
    let Some(mesh) = mesh_mode else {
        return Vec::new();
    };
    let Some(local) = pa.mtls_mode() else {
        return Vec::new();
    };

    let conflict = matches!(
        (mesh, local),
        (MtlsMode::Strict, MtlsMode::Disable) | (MtlsMode::Disable, MtlsMode::Strict)
    );
    if conflict {
        vec![IstioCheck::build("peerauth.mtls.meshconflict", "spec/mtls/mode")]
    } else {
        Vec::new()
    }
}
