//! Request-scoped configuration snapshot
//!
//! A [`Snapshot`] is the immutable bundle of everything one validation pass
//! reads: mesh resources, Kubernetes summaries, and the registry fallback,
//! per cluster. It is created by the fetcher, frozen (slices sorted by
//! `(namespace, name)` so checkers see deterministic input), and dropped
//! when the pass completes. Checkers borrow it read-only; there is no
//! locking during the analysis phase.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use meshlens_common::host::service_entry_hosts;
use meshlens_common::mesh::{
    AuthorizationPolicy, DestinationRule, Gateway, K8sGateway, K8sHttpRoute, K8sReferenceGrant,
    MtlsDetails, NamespaceInfo, PeerAuthentication, RbacDetails, RegistryService,
    RequestAuthentication, ServiceEntry, ServiceSummary, Sidecar, VirtualService,
    WorkloadEntry, WorkloadSummary, WorkloadsByNamespace,
};
use meshlens_common::Result;

/// Which kinds a fetch must load.
///
/// A kind whose flag is set is *required*: its fetch failure aborts the
/// pass. Unset kinds are left empty without error.
#[derive(Clone, Debug, Default)]
pub struct FetchCriteria {
    /// Restrict exportTo trimming to this namespace; None = full mesh
    pub namespace: Option<String>,
    /// Load Istio Gateways
    pub gateways: bool,
    /// Load VirtualServices
    pub virtual_services: bool,
    /// Load DestinationRules
    pub destination_rules: bool,
    /// Load ServiceEntries
    pub service_entries: bool,
    /// Load Sidecars
    pub sidecars: bool,
    /// Load WorkloadEntries
    pub workload_entries: bool,
    /// Load AuthorizationPolicies
    pub authorization_policies: bool,
    /// Load PeerAuthentications
    pub peer_authentications: bool,
    /// Load RequestAuthentications
    pub request_authentications: bool,
    /// Load Gateway API Gateways
    pub k8s_gateways: bool,
    /// Load Gateway API HTTPRoutes
    pub k8s_http_routes: bool,
    /// Load Gateway API ReferenceGrants
    pub k8s_reference_grants: bool,
}

impl FetchCriteria {
    /// Everything the full checker battery needs
    pub fn all() -> Self {
        Self {
            namespace: None,
            gateways: true,
            virtual_services: true,
            destination_rules: true,
            service_entries: true,
            sidecars: true,
            workload_entries: true,
            authorization_policies: true,
            peer_authentications: true,
            request_authentications: true,
            k8s_gateways: true,
            k8s_http_routes: true,
            k8s_reference_grants: true,
        }
    }

    /// Everything, scoped to one namespace's visibility
    pub fn all_for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::all()
        }
    }
}

/// Per-cluster configuration source.
///
/// One implementation wraps a kube client per cluster
/// ([`KubeSource`](crate::fetcher::KubeSource)); [`StaticSource`] serves
/// canned data for tests and local development. Implementations must be
/// safe for concurrent use: the fetcher calls every method from its own
/// task.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// List VirtualServices across the cluster
    async fn virtual_services(&self) -> Result<Vec<VirtualService>>;
    /// List DestinationRules across the cluster
    async fn destination_rules(&self) -> Result<Vec<DestinationRule>>;
    /// List Istio Gateways across the cluster
    async fn gateways(&self) -> Result<Vec<Gateway>>;
    /// List ServiceEntries across the cluster
    async fn service_entries(&self) -> Result<Vec<ServiceEntry>>;
    /// List Sidecars across the cluster
    async fn sidecars(&self) -> Result<Vec<Sidecar>>;
    /// List WorkloadEntries across the cluster
    async fn workload_entries(&self) -> Result<Vec<WorkloadEntry>>;
    /// List AuthorizationPolicies across the cluster
    async fn authorization_policies(&self) -> Result<Vec<AuthorizationPolicy>>;
    /// List PeerAuthentications across the cluster
    async fn peer_authentications(&self) -> Result<Vec<PeerAuthentication>>;
    /// List RequestAuthentications across the cluster
    async fn request_authentications(&self) -> Result<Vec<RequestAuthentication>>;
    /// List Gateway API Gateways across the cluster
    async fn k8s_gateways(&self) -> Result<Vec<K8sGateway>>;
    /// List Gateway API HTTPRoutes across the cluster
    async fn k8s_http_routes(&self) -> Result<Vec<K8sHttpRoute>>;
    /// List Gateway API ReferenceGrants across the cluster
    async fn k8s_reference_grants(&self) -> Result<Vec<K8sReferenceGrant>>;
    /// List namespaces with labels
    async fn namespaces(&self) -> Result<Vec<NamespaceInfo>>;
    /// List Services reduced to summaries
    async fn services(&self) -> Result<Vec<ServiceSummary>>;
    /// List the workloads of one namespace
    async fn workloads(&self, namespace: &str) -> Result<Vec<WorkloadSummary>>;
    /// Control-plane registry services (multi-cluster fallback)
    async fn registry_services(&self) -> Result<Vec<RegistryService>>;
    /// Service-account principal suffixes (`ns/<ns>/sa/<name>`)
    async fn principal_suffixes(&self) -> Result<Vec<String>>;
    /// Whether the control plane enables automatic mTLS
    async fn auto_mtls_enabled(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Everything one pass knows about one cluster, frozen after fetch
#[derive(Clone, Debug, Default)]
pub struct ClusterSnapshot {
    /// Cluster name
    pub cluster: String,
    /// Namespaces with labels
    pub namespaces: Vec<NamespaceInfo>,
    /// Namespace name lookup set
    pub namespace_names: BTreeSet<String>,
    /// VirtualServices (visibility-trimmed, autogenerated excluded)
    pub virtual_services: Vec<VirtualService>,
    /// DestinationRules (visibility-trimmed, autogenerated excluded)
    pub destination_rules: Vec<DestinationRule>,
    /// Istio Gateways (autogenerated excluded)
    pub gateways: Vec<Gateway>,
    /// ServiceEntries (visibility-trimmed)
    pub service_entries: Vec<ServiceEntry>,
    /// Sidecars
    pub sidecars: Vec<Sidecar>,
    /// WorkloadEntries
    pub workload_entries: Vec<WorkloadEntry>,
    /// AuthorizationPolicies
    pub authorization_policies: Vec<AuthorizationPolicy>,
    /// PeerAuthentications
    pub peer_authentications: Vec<PeerAuthentication>,
    /// RequestAuthentications
    pub request_authentications: Vec<RequestAuthentication>,
    /// Gateway API Gateways
    pub k8s_gateways: Vec<K8sGateway>,
    /// Gateway API HTTPRoutes
    pub k8s_http_routes: Vec<K8sHttpRoute>,
    /// Gateway API ReferenceGrants
    pub k8s_reference_grants: Vec<K8sReferenceGrant>,
    /// Kubernetes Service summaries
    pub services: Vec<ServiceSummary>,
    /// Workloads grouped by namespace
    pub workloads: WorkloadsByNamespace,
    /// Registry fallback services
    pub registry_services: Vec<RegistryService>,
    /// Known service-account principal suffixes
    pub principal_suffixes: BTreeSet<String>,
    /// mTLS-relevant slice (mesh-wide and scoped PeerAuthentications)
    pub mtls: MtlsDetails,
    /// RBAC-relevant slice
    pub rbac: RbacDetails,
}

impl ClusterSnapshot {
    /// Create an empty snapshot for a cluster (test helper and fetch seed)
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            ..Default::default()
        }
    }

    /// Workloads of one namespace; empty slice when unknown
    pub fn workloads_in(&self, namespace: &str) -> &[WorkloadSummary] {
        self.workloads.get(namespace).map_or(&[], Vec::as_slice)
    }

    /// Every workload in the cluster
    pub fn all_workloads(&self) -> impl Iterator<Item = &WorkloadSummary> {
        self.workloads.values().flatten()
    }

    /// Services of one namespace
    pub fn services_in(&self, namespace: &str) -> Vec<&ServiceSummary> {
        self.services
            .iter()
            .filter(|s| s.namespace == namespace)
            .collect()
    }

    /// All hosts declared by the snapshot's ServiceEntries
    pub fn service_entry_hosts(&self) -> BTreeSet<String> {
        service_entry_hosts(&self.service_entries)
    }

    /// Whether a namespace is enrolled in ambient mesh
    pub fn is_namespace_ambient(&self, namespace: &str) -> bool {
        self.namespaces
            .iter()
            .find(|ns| ns.name == namespace)
            .is_some_and(NamespaceInfo::is_ambient)
    }

    /// Sort every slice by `(namespace, name)` to freeze iteration order.
    ///
    /// Fetch tasks complete in arbitrary order; this normalization is what
    /// makes two passes over identical input byte-identical.
    pub fn normalize(&mut self) {
        fn sort_key(ns: &str, name: &str) -> (String, String) {
            (ns.to_string(), name.to_string())
        }
        self.namespaces.sort_by_key(|ns| ns.name.clone());
        self.namespace_names = self.namespaces.iter().map(|ns| ns.name.clone()).collect();
        self.virtual_services
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.destination_rules
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.gateways
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.service_entries
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.sidecars
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.workload_entries
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.authorization_policies
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.peer_authentications
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.request_authentications
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.k8s_gateways
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.k8s_http_routes
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.k8s_reference_grants
            .sort_by_key(|o| sort_key(&o.metadata.namespace, &o.metadata.name));
        self.services
            .sort_by_key(|o| sort_key(&o.namespace, &o.name));
        self.registry_services.sort_by_key(|o| o.hostname.clone());
        for workloads in self.workloads.values_mut() {
            workloads.sort_by_key(|w| w.name.clone());
        }
    }
}

/// A full-pass snapshot: one [`ClusterSnapshot`] per requested cluster
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Per-cluster snapshots, keyed by cluster name
    pub clusters: BTreeMap<String, ClusterSnapshot>,
}

impl Snapshot {
    /// Fetch one cluster's snapshot
    pub fn cluster(&self, name: &str) -> Option<&ClusterSnapshot> {
        self.clusters.get(name)
    }
}

/// In-memory [`ClusterSource`] serving canned data.
///
/// Used by the test suite and by local development against fixture files.
/// Every field is public; fill in what the scenario needs and leave the
/// rest empty.
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    /// Canned VirtualServices
    pub virtual_services: Vec<VirtualService>,
    /// Canned DestinationRules
    pub destination_rules: Vec<DestinationRule>,
    /// Canned Gateways
    pub gateways: Vec<Gateway>,
    /// Canned ServiceEntries
    pub service_entries: Vec<ServiceEntry>,
    /// Canned Sidecars
    pub sidecars: Vec<Sidecar>,
    /// Canned WorkloadEntries
    pub workload_entries: Vec<WorkloadEntry>,
    /// Canned AuthorizationPolicies
    pub authorization_policies: Vec<AuthorizationPolicy>,
    /// Canned PeerAuthentications
    pub peer_authentications: Vec<PeerAuthentication>,
    /// Canned RequestAuthentications
    pub request_authentications: Vec<RequestAuthentication>,
    /// Canned Gateway API Gateways
    pub k8s_gateways: Vec<K8sGateway>,
    /// Canned Gateway API HTTPRoutes
    pub k8s_http_routes: Vec<K8sHttpRoute>,
    /// Canned Gateway API ReferenceGrants
    pub k8s_reference_grants: Vec<K8sReferenceGrant>,
    /// Canned namespaces
    pub namespaces: Vec<NamespaceInfo>,
    /// Canned Service summaries
    pub services: Vec<ServiceSummary>,
    /// Canned workloads by namespace
    pub workloads: WorkloadsByNamespace,
    /// Canned registry services
    pub registry_services: Vec<RegistryService>,
    /// Canned principal suffixes
    pub principal_suffixes: Vec<String>,
    /// Canned auto-mTLS flag
    pub auto_mtls: bool,
}

#[async_trait]
impl ClusterSource for StaticSource {
    async fn virtual_services(&self) -> Result<Vec<VirtualService>> {
        Ok(self.virtual_services.clone())
    }
    async fn destination_rules(&self) -> Result<Vec<DestinationRule>> {
        Ok(self.destination_rules.clone())
    }
    async fn gateways(&self) -> Result<Vec<Gateway>> {
        Ok(self.gateways.clone())
    }
    async fn service_entries(&self) -> Result<Vec<ServiceEntry>> {
        Ok(self.service_entries.clone())
    }
    async fn sidecars(&self) -> Result<Vec<Sidecar>> {
        Ok(self.sidecars.clone())
    }
    async fn workload_entries(&self) -> Result<Vec<WorkloadEntry>> {
        Ok(self.workload_entries.clone())
    }
    async fn authorization_policies(&self) -> Result<Vec<AuthorizationPolicy>> {
        Ok(self.authorization_policies.clone())
    }
    async fn peer_authentications(&self) -> Result<Vec<PeerAuthentication>> {
        Ok(self.peer_authentications.clone())
    }
    async fn request_authentications(&self) -> Result<Vec<RequestAuthentication>> {
        Ok(self.request_authentications.clone())
    }
    async fn k8s_gateways(&self) -> Result<Vec<K8sGateway>> {
        Ok(self.k8s_gateways.clone())
    }
    async fn k8s_http_routes(&self) -> Result<Vec<K8sHttpRoute>> {
        Ok(self.k8s_http_routes.clone())
    }
    async fn k8s_reference_grants(&self) -> Result<Vec<K8sReferenceGrant>> {
        Ok(self.k8s_reference_grants.clone())
    }
    async fn namespaces(&self) -> Result<Vec<NamespaceInfo>> {
        Ok(self.namespaces.clone())
    }
    async fn services(&self) -> Result<Vec<ServiceSummary>> {
        Ok(self.services.clone())
    }
    async fn workloads(&self, namespace: &str) -> Result<Vec<WorkloadSummary>> {
        Ok(self.workloads.get(namespace).cloned().unwrap_or_default())
    }
    async fn registry_services(&self) -> Result<Vec<RegistryService>> {
        Ok(self.registry_services.clone())
    }
    async fn principal_suffixes(&self) -> Result<Vec<String>> {
        Ok(self.principal_suffixes.clone())
    }
    async fn auto_mtls_enabled(&self) -> Result<bool> {
        Ok(self.auto_mtls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlens_common::mesh::ObjectMeta;

    #[test]
    fn normalize_orders_by_namespace_then_name() {
        let mut snap = ClusterSnapshot::new("east");
        for (ns, name) in [("b", "x"), ("a", "z"), ("a", "y")] {
            snap.virtual_services.push(VirtualService {
                metadata: ObjectMeta::new(name, ns),
                ..Default::default()
            });
        }
        snap.normalize();
        let order: Vec<_> = snap
            .virtual_services
            .iter()
            .map(|vs| {
                format!("{}/{}", vs.metadata.namespace, vs.metadata.name)
            })
            .collect();
        assert_eq!(order, vec!["a/y", "a/z", "b/x"]);
    }

    #[test]
    fn normalize_rebuilds_namespace_name_set() {
        let mut snap = ClusterSnapshot::new("east");
        snap.namespaces.push(NamespaceInfo::new("bookinfo"));
        snap.namespaces.push(NamespaceInfo::new("default"));
        snap.normalize();
        assert!(snap.namespace_names.contains("bookinfo"));
        assert!(snap.namespace_names.contains("default"));
    }

    #[tokio::test]
    async fn static_source_round_trips() {
        let source = StaticSource {
            namespaces: vec![NamespaceInfo::new("bookinfo")],
            ..Default::default()
        };
        let nss = source.namespaces().await.unwrap();
        assert_eq!(nss[0].name, "bookinfo");
        assert!(source.virtual_services().await.unwrap().is_empty());
        assert!(source.workloads("missing").await.unwrap().is_empty());
    }
}
