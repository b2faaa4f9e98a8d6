//! Export-visibility filter
//!
//! Applies the `exportTo` semantics when selecting which objects take part
//! in a validation pass scoped to one namespace:
//!
//! - empty list or `*`: visible in all namespaces,
//! - `.`: visible only in the object's own namespace,
//! - otherwise: visible in exactly the listed namespaces.
//!
//! An exportTo entry naming a namespace that does not exist keeps the object
//! visible: the broken entry must reach the ExportTo checker and surface as
//! a validation error instead of silently hiding the object.
//!
//! Ambient override: ambient-enabled namespaces do not support exportTo, so
//! their objects are visible only in their own namespace regardless of the
//! list.

use std::collections::BTreeSet;

/// Whether one exportTo entry grants visibility to `target_ns`
pub fn check_export_to(
    export_to_ns: &str,
    target_ns: &str,
    own_ns: &str,
    namespaces: &BTreeSet<String>,
) -> bool {
    export_to_ns == "*"
        || export_to_ns == target_ns
        || (export_to_ns == "." && own_ns == target_ns)
        // Unknown namespace: retain the object so the checker can flag it
        || (export_to_ns != "." && export_to_ns != "*" && !namespaces.contains(export_to_ns))
}

/// Whether an object is visible from `target_ns` given its full exportTo
/// list and the ambient state of its own namespace
pub fn is_exported_to(
    export_to: &[String],
    own_ns: &str,
    target_ns: &str,
    namespaces: &BTreeSet<String>,
    ambient: bool,
) -> bool {
    if ambient {
        return own_ns == target_ns;
    }
    if export_to.is_empty() {
        // No exportTo field means exported everywhere
        return true;
    }
    export_to
        .iter()
        .any(|entry| check_export_to(entry, target_ns, own_ns, namespaces))
}

/// Trim a cluster snapshot to the objects visible from one namespace.
///
/// Only VirtualServices, DestinationRules, and ServiceEntries carry
/// exportTo; every other kind stays untouched. `ambient_cluster` enables
/// the per-namespace ambient override.
pub fn trim_to_namespace(
    snapshot: &mut crate::snapshot::ClusterSnapshot,
    namespace: &str,
    ambient_cluster: bool,
) {
    let namespaces = snapshot.namespace_names.clone();
    let ambient_namespaces: BTreeSet<String> = if ambient_cluster {
        snapshot
            .namespaces
            .iter()
            .filter(|ns| ns.is_ambient())
            .map(|ns| ns.name.clone())
            .collect()
    } else {
        BTreeSet::new()
    };

    let visible = |export_to: &[String], own_ns: &str| {
        is_exported_to(
            export_to,
            own_ns,
            namespace,
            &namespaces,
            ambient_namespaces.contains(own_ns),
        )
    };

    snapshot
        .virtual_services
        .retain(|vs| visible(&vs.spec.export_to, &vs.metadata.namespace));
    snapshot
        .destination_rules
        .retain(|dr| visible(&dr.spec.export_to, &dr.metadata.namespace));
    snapshot
        .service_entries
        .retain(|se| visible(&se.spec.export_to, &se.metadata.namespace));
}
