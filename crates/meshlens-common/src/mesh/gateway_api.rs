//! Gateway API resource shapes (`gateway.networking.k8s.io/v1`)
//!
//! Gateway, HTTPRoute, and ReferenceGrant as consumed by the validation
//! core. The `K8s` prefix keeps them apart from the Istio Gateway type.

use serde::{Deserialize, Serialize};

use super::{HasApiResource, ObjectMeta};

/// Gateway API Gateway resource
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct K8sGateway {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: K8sGatewaySpec,
}

impl HasApiResource for K8sGateway {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "Gateway";
    const PLURAL: &'static str = "gateways";
}

/// Gateway API Gateway spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct K8sGatewaySpec {
    /// GatewayClass implementing this gateway
    #[serde(default)]
    pub gateway_class_name: String,
    /// Listener configurations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<GatewayListener>,
    /// Requested addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<GatewayAddress>,
}

/// Gateway listener configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayListener {
    /// Listener name
    #[serde(default)]
    pub name: String,
    /// Optional hostname filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port number
    #[serde(default)]
    pub port: u16,
    /// Protocol (HTTP, HTTPS, TCP, TLS)
    #[serde(default)]
    pub protocol: String,
}

/// A requested gateway address
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
    /// Address type (IPAddress, Hostname)
    #[serde(default, rename = "type")]
    pub type_: String,
    /// Address value
    #[serde(default)]
    pub value: String,
}

/// Gateway API HTTPRoute resource
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct K8sHttpRoute {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: K8sHttpRouteSpec,
}

impl HasApiResource for K8sHttpRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "HTTPRoute";
    const PLURAL: &'static str = "httproutes";
}

/// HTTPRoute spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct K8sHttpRouteSpec {
    /// Gateways this route attaches to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_refs: Vec<ParentRef>,
    /// Hostnames the route matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<HttpRouteRule>,
}

/// Reference from a route to its parent Gateway
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ParentRef {
    /// Parent name
    #[serde(default)]
    pub name: String,
    /// Parent namespace; defaults to the route's own namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One HTTPRoute rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Backends traffic is forwarded to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_refs: Vec<HttpBackendRef>,
}

/// Reference from a route rule to a backend Service
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpBackendRef {
    /// Backend name
    #[serde(default)]
    pub name: String,
    /// Backend namespace; defaults to the route's own namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Backend kind; defaults to Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Backend port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl HttpBackendRef {
    /// Whether the backend is a (possibly implicit) core Service reference
    pub fn is_service(&self) -> bool {
        self.kind.as_deref().map_or(true, |k| k == "Service")
    }
}

/// Gateway API ReferenceGrant resource
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct K8sReferenceGrant {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: K8sReferenceGrantSpec,
}

impl HasApiResource for K8sReferenceGrant {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1beta1";
    const KIND: &'static str = "ReferenceGrant";
    const PLURAL: &'static str = "referencegrants";
}

/// ReferenceGrant spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct K8sReferenceGrantSpec {
    /// Granted source kinds and namespaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<ReferenceGrantPeer>,
    /// Granted target kinds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<ReferenceGrantPeer>,
}

/// One side of a ReferenceGrant
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferenceGrantPeer {
    /// API group
    #[serde(default)]
    pub group: String,
    /// Resource kind
    #[serde(default)]
    pub kind: String,
    /// Source namespace (only meaningful under `from`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
