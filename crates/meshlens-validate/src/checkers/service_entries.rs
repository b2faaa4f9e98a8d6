//! ServiceEntry checks
//!
//! exportTo validity, plus WorkloadEntry coverage for STATIC entries that
//! bind workloads through a workloadSelector.

use meshlens_common::host::labels_match;
use meshlens_common::mesh::{ObjectKind, ObjectRef, ServiceEntry};

use super::{export_to_checks, CheckContext, ObjectChecker};
use crate::models::{IstioCheck, Validations};
use crate::snapshot::ClusterSnapshot;

/// Checker for every ServiceEntry in the snapshot
pub struct ServiceEntryChecker;

impl ObjectChecker for ServiceEntryChecker {
    fn kind(&self) -> ObjectKind {
        ObjectKind::ServiceEntry
    }

    fn check(&self, snap: &ClusterSnapshot, _ctx: &CheckContext<'_>) -> Validations {
        let mut validations = Validations::new();
        for se in &snap.service_entries {
            let key = ObjectRef::from_meta(&se.metadata, ObjectKind::ServiceEntry);
            let entry = validations.ensure(key);

            entry.add_checks(export_to_checks(&se.spec.export_to, &snap.namespace_names));
            entry.add_checks(workload_entry_checks(se, snap));
        }
        validations
    }
}

/// A STATIC entry selecting workloads must be backed by at least one
/// WorkloadEntry in its namespace with an address
fn workload_entry_checks(se: &ServiceEntry, snap: &ClusterSnapshot) -> Vec<IstioCheck> {
    let Some(selector) = se.spec.workload_selector.as_ref() else {
        return Vec::new();
    };
    if se.spec.resolution != "STATIC" || selector.labels.is_empty() {
        return Vec::new();
    }

    let covered = snap
        .workload_entries
        .iter()
        .filter(|we| we.metadata.namespace == se.metadata.namespace)
        .any(|we| labels_match(&selector.labels, &we.spec.labels) && !we.spec.address.is_empty());

    if covered {
        Vec::new()
    } else {
        vec![IstioCheck::build(
            "serviceentry.workloadentry.addressmatch",
            "spec/workloadSelector",
        )]
    }
}
