//! Istio networking resource shapes (`networking.istio.io/v1beta1`)
//!
//! VirtualService, DestinationRule, Gateway, ServiceEntry, Sidecar, and
//! WorkloadEntry, modeled down to the fields the validation core reads.
//!
//! The route tables of a VirtualService are walked constantly by checkers
//! and reference builders; [`VirtualService::destinations`] exposes a single
//! typed iterator over all of them so callers never reimplement the
//! http/tcp/tls triple walk.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{HasApiResource, ObjectMeta};

/// Istio VirtualService
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct VirtualService {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: VirtualServiceSpec,
}

impl HasApiResource for VirtualService {
    const API_VERSION: &'static str = "networking.istio.io/v1beta1";
    const KIND: &'static str = "VirtualService";
    const PLURAL: &'static str = "virtualservices";
}

/// VirtualService spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    /// Destination hosts this VirtualService applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    /// Gateways this VirtualService binds to (`mesh` for sidecar traffic)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    /// Namespace visibility list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_to: Vec<String>,
    /// HTTP route table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpRoute>,
    /// TCP route table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp: Vec<TcpRoute>,
    /// TLS route table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<TlsRoute>,
}

/// One HTTP route entry
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpRoute {
    /// Match conditions
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub match_: Vec<HttpMatchRequest>,
    /// Weighted destinations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<HttpRouteDestination>,
}

/// HTTP match condition; only the gateway restriction is relevant here
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpMatchRequest {
    /// Gateways this match applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
}

/// One weighted HTTP destination
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpRouteDestination {
    /// Destination service
    #[serde(default)]
    pub destination: Destination,
    /// Traffic weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

/// One TCP route entry
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TcpRoute {
    /// Weighted destinations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<RouteDestination>,
}

/// One TLS route entry
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsRoute {
    /// SNI match conditions
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub match_: Vec<TlsMatchAttributes>,
    /// Weighted destinations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<RouteDestination>,
}

/// TLS match condition
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsMatchAttributes {
    /// SNI hostnames
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sni_hosts: Vec<String>,
    /// Gateways this match applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
}

/// One weighted L4 destination
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RouteDestination {
    /// Destination service
    #[serde(default)]
    pub destination: Destination,
    /// Traffic weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

/// A route destination: host plus optional subset and port
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Destination {
    /// Destination host
    #[serde(default)]
    pub host: String,
    /// DestinationRule subset name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
    /// Destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

/// Port selection by number
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PortSelector {
    /// Port number
    #[serde(default)]
    pub number: u16,
}

/// A route destination located in its owning route table.
///
/// `path()` yields the JSON-pointer-like location validation checks anchor
/// to, e.g. `spec/http[0]/route[1]/destination`.
#[derive(Clone, Copy, Debug)]
pub struct DestinationAt<'a> {
    /// Route table the destination sits in: "http", "tcp", or "tls"
    pub protocol: &'static str,
    /// Index within the route table
    pub route: usize,
    /// Index within the route's destination list
    pub index: usize,
    /// The destination itself
    pub destination: &'a Destination,
}

impl DestinationAt<'_> {
    /// Location of this destination inside the owning VirtualService
    pub fn path(&self) -> String {
        format!(
            "spec/{}[{}]/route[{}]/destination",
            self.protocol, self.route, self.index
        )
    }
}

impl VirtualService {
    /// Walk every route destination across the http, tcp, and tls tables
    pub fn destinations(&self) -> impl Iterator<Item = DestinationAt<'_>> {
        let http = self.spec.http.iter().enumerate().flat_map(|(ri, r)| {
            r.route.iter().enumerate().map(move |(di, d)| DestinationAt {
                protocol: "http",
                route: ri,
                index: di,
                destination: &d.destination,
            })
        });
        let tcp = self.spec.tcp.iter().enumerate().flat_map(|(ri, r)| {
            r.route.iter().enumerate().map(move |(di, d)| DestinationAt {
                protocol: "tcp",
                route: ri,
                index: di,
                destination: &d.destination,
            })
        });
        let tls = self.spec.tls.iter().enumerate().flat_map(|(ri, r)| {
            r.route.iter().enumerate().map(move |(di, d)| DestinationAt {
                protocol: "tls",
                route: ri,
                index: di,
                destination: &d.destination,
            })
        });
        http.chain(tcp).chain(tls)
    }

    /// All gateways the VirtualService binds to, including per-match
    /// gateway restrictions in the http and tls tables
    pub fn all_gateways(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.spec.gateways.iter().map(String::as_str).collect();
        for route in &self.spec.http {
            for m in &route.match_ {
                out.extend(m.gateways.iter().map(String::as_str));
            }
        }
        for route in &self.spec.tls {
            for m in &route.match_ {
                out.extend(m.gateways.iter().map(String::as_str));
            }
        }
        out
    }
}

/// Istio DestinationRule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DestinationRule {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: DestinationRuleSpec,
}

impl HasApiResource for DestinationRule {
    const API_VERSION: &'static str = "networking.istio.io/v1beta1";
    const KIND: &'static str = "DestinationRule";
    const PLURAL: &'static str = "destinationrules";
}

/// DestinationRule spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    /// Target host
    #[serde(default)]
    pub host: String,
    /// Namespace visibility list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_to: Vec<String>,
    /// Named subsets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<Subset>,
    /// Traffic policy (TLS settings and per-port overrides)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,
}

/// A DestinationRule subset
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Subset {
    /// Subset name, referenced from VirtualService destinations
    #[serde(default)]
    pub name: String,
    /// Labels narrowing the host's workloads
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// DestinationRule traffic policy
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicy {
    /// Client TLS settings for the whole host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
    /// Per-port overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_level_settings: Vec<TrafficPolicyPortSettings>,
}

/// Client TLS settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsSettings {
    /// TLS mode: DISABLE, SIMPLE, MUTUAL, ISTIO_MUTUAL
    #[serde(default)]
    pub mode: String,
}

/// Per-port traffic policy override
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TrafficPolicyPortSettings {
    /// The service port the override applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
    /// TLS settings for that port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
}

/// Istio Gateway
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Gateway {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: GatewaySpec,
}

impl HasApiResource for Gateway {
    const API_VERSION: &'static str = "networking.istio.io/v1beta1";
    const KIND: &'static str = "Gateway";
    const PLURAL: &'static str = "gateways";
}

/// Gateway spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewaySpec {
    /// Workload selector for the gateway proxy pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    /// Listener definitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
}

/// One Gateway listener
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Server {
    /// Listener port
    #[serde(default)]
    pub port: ServerPort,
    /// Hosts exposed on this listener
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
}

/// Gateway listener port
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerPort {
    /// Port number
    #[serde(default)]
    pub number: u16,
    /// Port name
    #[serde(default)]
    pub name: String,
    /// Protocol: HTTP, HTTPS, GRPC, HTTP2, MONGO, TCP, TLS
    #[serde(default)]
    pub protocol: String,
}

/// Istio ServiceEntry
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceEntry {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: ServiceEntrySpec,
}

impl HasApiResource for ServiceEntry {
    const API_VERSION: &'static str = "networking.istio.io/v1beta1";
    const KIND: &'static str = "ServiceEntry";
    const PLURAL: &'static str = "serviceentries";
}

/// ServiceEntry spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntrySpec {
    /// Hosts the entry registers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    /// Namespace visibility list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_to: Vec<String>,
    /// Declared ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServiceEntryPort>,
    /// Location: MESH_EXTERNAL or MESH_INTERNAL
    #[serde(default)]
    pub location: String,
    /// Resolution: DNS, STATIC, NONE
    #[serde(default)]
    pub resolution: String,
    /// Selector binding WorkloadEntries to this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
}

/// ServiceEntry port
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceEntryPort {
    /// Port number
    #[serde(default)]
    pub number: u16,
    /// Port name
    #[serde(default)]
    pub name: String,
    /// Protocol (HTTP, HTTPS, TCP, GRPC)
    #[serde(default)]
    pub protocol: String,
}

/// Workload selector used by ServiceEntries and Sidecars
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkloadSelector {
    /// Labels the target workloads must carry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Istio Sidecar
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Sidecar {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: SidecarSpec,
}

impl HasApiResource for Sidecar {
    const API_VERSION: &'static str = "networking.istio.io/v1beta1";
    const KIND: &'static str = "Sidecar";
    const PLURAL: &'static str = "sidecars";
}

/// Sidecar spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidecarSpec {
    /// Selector scoping the Sidecar to specific workloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
    /// Egress listener configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<EgressListener>,
}

/// One Sidecar egress listener
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EgressListener {
    /// Hosts reachable through this listener, in `namespace/dnsName` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
}

/// Istio WorkloadEntry
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkloadEntry {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: WorkloadEntrySpec,
}

impl HasApiResource for WorkloadEntry {
    const API_VERSION: &'static str = "networking.istio.io/v1beta1";
    const KIND: &'static str = "WorkloadEntry";
    const PLURAL: &'static str = "workloadentries";
}

/// WorkloadEntry spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkloadEntrySpec {
    /// Workload address
    #[serde(default)]
    pub address: String,
    /// Workload labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}
