//! Common types for meshlens: mesh object model, host resolution, and
//! Kubernetes plumbing shared by the validation core.

#![deny(missing_docs)]

pub mod error;
pub mod host;
pub mod kube_utils;
pub mod mesh;

pub use error::Error;
pub use host::{Host, HostResolver, MulticlusterPolicy};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Control-plane namespace; PeerAuthentications here apply mesh-wide
pub const DEFAULT_ROOT_NAMESPACE: &str = "istio-system";

/// Default DNS zone for in-cluster service FQDNs
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Default suffix that marks a multi-cluster service host (`svc.ns.global`)
pub const DEFAULT_MULTICLUSTER_SUFFIX: &str = "global";

/// The reserved gateway name binding a VirtualService to sidecar traffic
pub const MESH_GATEWAY: &str = "mesh";

/// Placeholder identity used for telemetry sources that could not be resolved
pub const UNKNOWN: &str = "unknown";

/// Label key for Istio dataplane mode.
/// Value: "ambient" marks a namespace as enrolled in ambient mesh.
pub const DATAPLANE_MODE_LABEL: &str = "istio.io/dataplane-mode";

/// Value for [`DATAPLANE_MODE_LABEL`] enabling ambient mesh enrollment
pub const DATAPLANE_MODE_AMBIENT: &str = "ambient";

/// Name prefix of objects autogenerated by the control plane.
///
/// Istio generates VirtualServices and Gateways for Gateway API resources;
/// those never validate cleanly against user intent and are excluded from
/// validation passes.
pub const AUTOGENERATED_PREFIX: &str = "autogenerated-";

/// Check whether an object name marks a control-plane-generated resource
pub fn is_autogenerated(name: &str) -> bool {
    name.starts_with(AUTOGENERATED_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autogenerated_prefix_detection() {
        assert!(is_autogenerated("autogenerated-bookinfo-gateway"));
        assert!(!is_autogenerated("bookinfo-gateway"));
        assert!(!is_autogenerated(""));
    }
}
