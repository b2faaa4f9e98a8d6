//! Mesh object model
//!
//! Serde shapes for the Istio and Gateway API resources the validation core
//! consumes, plus the lightweight summaries of core Kubernetes objects
//! (services, workloads, namespaces) that checkers read.
//!
//! Only the fields the checkers and reference builders touch are modeled.
//! Every list and optional field carries `#[serde(default)]` so partially
//! populated objects decode instead of failing the whole fetch.

mod gateway_api;
mod networking;
mod security;

pub use gateway_api::{
    GatewayAddress, GatewayListener, HttpBackendRef, HttpRouteRule, K8sGateway, K8sGatewaySpec,
    K8sHttpRoute, K8sHttpRouteSpec, K8sReferenceGrant, K8sReferenceGrantSpec, ParentRef,
    ReferenceGrantPeer,
};
pub use networking::{
    Destination, DestinationAt, DestinationRule, DestinationRuleSpec, EgressListener, Gateway,
    GatewaySpec, HttpMatchRequest, HttpRoute, HttpRouteDestination, PortSelector, RouteDestination,
    Server, ServerPort, ServiceEntry, ServiceEntryPort, ServiceEntrySpec, Sidecar, SidecarSpec,
    Subset, TcpRoute, TlsMatchAttributes, TlsRoute, TlsSettings, TrafficPolicy,
    TrafficPolicyPortSettings, VirtualService, VirtualServiceSpec, WorkloadEntry,
    WorkloadEntrySpec, WorkloadSelector,
};
pub use security::{
    AuthorizationPolicy, AuthorizationPolicySpec, JwtRule, MatchLabelsSelector, MtlsMode,
    PeerAuthentication, PeerAuthenticationSpec, PeerMtls, RequestAuthentication,
    RequestAuthenticationSpec, Rule, RuleFrom, RuleTo, RuleToOperation, Source,
};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DATAPLANE_MODE_AMBIENT, DATAPLANE_MODE_LABEL};

/// Trait for types that have a fixed Kubernetes API version and kind
pub trait HasApiResource {
    /// API version (e.g. "networking.istio.io/v1beta1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g. "VirtualService")
    const KIND: &'static str;
    /// Lowercase plural used in API paths (e.g. "virtualservices")
    const PLURAL: &'static str;
}

/// Object metadata carried by every modeled mesh resource.
///
/// `cluster` is stamped by the snapshot fetcher after decoding; it is never
/// present on the wire.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    #[serde(default)]
    pub name: String,
    /// Resource namespace
    #[serde(default)]
    pub namespace: String,
    /// Resource labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Owning cluster, stamped at fetch time
    #[serde(skip)]
    pub cluster: String,
}

impl ObjectMeta {
    /// Create metadata with name and namespace
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
            cluster: String::new(),
        }
    }
}

/// The resource kinds the validation core understands.
///
/// Serialized as the lowercase singular form used as JSON map keys and in
/// reference payloads (`virtualservice`, `destinationrule`, ...).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Istio VirtualService
    VirtualService,
    /// Istio DestinationRule
    DestinationRule,
    /// Istio Gateway
    Gateway,
    /// Istio ServiceEntry
    ServiceEntry,
    /// Istio Sidecar
    Sidecar,
    /// Istio WorkloadEntry
    WorkloadEntry,
    /// Istio AuthorizationPolicy
    AuthorizationPolicy,
    /// Istio PeerAuthentication
    PeerAuthentication,
    /// Istio RequestAuthentication
    RequestAuthentication,
    /// Gateway API Gateway
    K8sGateway,
    /// Gateway API HTTPRoute
    K8sHTTPRoute,
    /// Gateway API ReferenceGrant
    K8sReferenceGrant,
    /// Kubernetes Service
    Service,
    /// Kubernetes workload (deployment-level)
    Workload,
}

impl ObjectKind {
    /// The lowercase singular form used in keys and references
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::VirtualService => "virtualservice",
            ObjectKind::DestinationRule => "destinationrule",
            ObjectKind::Gateway => "gateway",
            ObjectKind::ServiceEntry => "serviceentry",
            ObjectKind::Sidecar => "sidecar",
            ObjectKind::WorkloadEntry => "workloadentry",
            ObjectKind::AuthorizationPolicy => "authorizationpolicy",
            ObjectKind::PeerAuthentication => "peerauthentication",
            ObjectKind::RequestAuthentication => "requestauthentication",
            ObjectKind::K8sGateway => "k8sgateway",
            ObjectKind::K8sHTTPRoute => "k8shttproute",
            ObjectKind::K8sReferenceGrant => "k8sreferencegrant",
            ObjectKind::Service => "service",
            ObjectKind::Workload => "workload",
        }
    }

    /// Parse the lowercase singular form back into a kind
    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "virtualservice" => ObjectKind::VirtualService,
            "destinationrule" => ObjectKind::DestinationRule,
            "gateway" => ObjectKind::Gateway,
            "serviceentry" => ObjectKind::ServiceEntry,
            "sidecar" => ObjectKind::Sidecar,
            "workloadentry" => ObjectKind::WorkloadEntry,
            "authorizationpolicy" => ObjectKind::AuthorizationPolicy,
            "peerauthentication" => ObjectKind::PeerAuthentication,
            "requestauthentication" => ObjectKind::RequestAuthentication,
            "k8sgateway" => ObjectKind::K8sGateway,
            "k8shttproute" => ObjectKind::K8sHTTPRoute,
            "k8sreferencegrant" => ObjectKind::K8sReferenceGrant,
            "service" => ObjectKind::Service,
            "workload" => ObjectKind::Workload,
            _ => return None,
        })
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of any mesh or Kubernetes resource in a snapshot.
///
/// The 4-tuple is unique within a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Owning cluster
    pub cluster: String,
    /// Resource namespace
    pub namespace: String,
    /// Resource kind
    pub kind: ObjectKind,
    /// Resource name
    pub name: String,
}

impl ObjectRef {
    /// Build a reference from metadata and a kind
    pub fn from_meta(meta: &ObjectMeta, kind: ObjectKind) -> Self {
        Self {
            cluster: meta.cluster.clone(),
            namespace: meta.namespace.clone(),
            kind,
            name: meta.name.clone(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.cluster, self.namespace, self.kind, self.name
        )
    }
}

/// Reduced view of a Kubernetes Service, as much as the checkers need
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSummary {
    /// Service name
    pub name: String,
    /// Service namespace
    pub namespace: String,
    /// Owning cluster
    #[serde(default)]
    pub cluster: String,
    /// Pod selector (`.spec.selector`)
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    /// Exposed service ports
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

/// A single Kubernetes Service port
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServicePort {
    /// Port name
    #[serde(default)]
    pub name: String,
    /// Port number
    pub port: u16,
}

/// Reduced view of a workload (the deployment-level owner of pods)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadSummary {
    /// Workload name
    pub name: String,
    /// Pod template labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Workload lists keyed by namespace
pub type WorkloadsByNamespace = BTreeMap<String, Vec<WorkloadSummary>>;

/// A namespace with the labels the visibility filter cares about
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceInfo {
    /// Namespace name
    pub name: String,
    /// Namespace labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NamespaceInfo {
    /// Create a namespace with no labels
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Whether the namespace is enrolled in ambient mesh
    pub fn is_ambient(&self) -> bool {
        self.labels
            .get(DATAPLANE_MODE_LABEL)
            .is_some_and(|v| v == DATAPLANE_MODE_AMBIENT)
    }
}

/// Collect namespace names into a lookup set
pub fn namespace_names(namespaces: &[NamespaceInfo]) -> BTreeSet<String> {
    namespaces.iter().map(|ns| ns.name.clone()).collect()
}

/// A service known to the control plane registry.
///
/// The registry is the final fallback when resolving a host: it covers
/// multi-cluster and federated services that no local Service, ServiceEntry,
/// or VirtualService accounts for.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryService {
    /// Registered hostname (may be a wildcard like `*.example.com`)
    pub hostname: String,
}

/// mTLS-relevant slice of the snapshot
#[derive(Clone, Debug, Default)]
pub struct MtlsDetails {
    /// PeerAuthentications in the control-plane root namespace (mesh-wide)
    pub mesh_peer_authentications: Vec<PeerAuthentication>,
    /// PeerAuthentications in scope for the request
    pub peer_authentications: Vec<PeerAuthentication>,
    /// Whether the control plane enables automatic mTLS
    pub enabled_auto_mtls: bool,
}

/// RBAC-relevant slice of the snapshot
#[derive(Clone, Debug, Default)]
pub struct RbacDetails {
    /// AuthorizationPolicies in scope for the request
    pub authorization_policies: Vec<AuthorizationPolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_kind_round_trips_through_str() {
        for kind in [
            ObjectKind::VirtualService,
            ObjectKind::DestinationRule,
            ObjectKind::K8sHTTPRoute,
            ObjectKind::Workload,
        ] {
            assert_eq!(ObjectKind::from_str_opt(kind.as_str()), Some(kind));
        }
        assert_eq!(ObjectKind::from_str_opt("podmonitor"), None);
    }

    #[test]
    fn object_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ObjectKind::K8sGateway).unwrap();
        assert_eq!(json, "\"k8sgateway\"");
        let json = serde_json::to_string(&ObjectKind::VirtualService).unwrap();
        assert_eq!(json, "\"virtualservice\"");
    }

    #[test]
    fn ambient_namespace_detection() {
        let mut ns = NamespaceInfo::new("bookinfo");
        assert!(!ns.is_ambient());
        ns.labels
            .insert(DATAPLANE_MODE_LABEL.into(), DATAPLANE_MODE_AMBIENT.into());
        assert!(ns.is_ambient());
        ns.labels
            .insert(DATAPLANE_MODE_LABEL.into(), "sidecar".into());
        assert!(!ns.is_ambient());
    }

    #[test]
    fn object_ref_orders_by_tuple() {
        let a = ObjectRef {
            cluster: "east".into(),
            namespace: "a".into(),
            kind: ObjectKind::VirtualService,
            name: "x".into(),
        };
        let b = ObjectRef {
            cluster: "east".into(),
            namespace: "b".into(),
            kind: ObjectKind::VirtualService,
            name: "a".into(),
        };
        assert!(a < b);
    }
}
