//! Concurrent snapshot fetcher
//!
//! One task per (cluster, kind): spawn all, join all, collect per-task
//! results into the snapshot's slots. A task failure is recorded against its
//! slot and never aborts peers; the aggregate result is the snapshot plus
//! the first error of a kind the caller declared required.
//!
//! Every task races its per-task deadline and the pass-wide cancellation
//! token. Slice ordering is normalized before the snapshot is frozen.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use kube::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use async_trait::async_trait;
use meshlens_common::mesh::{
    AuthorizationPolicy, DestinationRule, Gateway, K8sGateway, K8sHttpRoute, K8sReferenceGrant,
    NamespaceInfo, ObjectMeta, PeerAuthentication, RegistryService, RequestAuthentication,
    ServiceEntry, ServiceSummary, Sidecar, VirtualService, WorkloadEntry, WorkloadSummary,
    WorkloadsByNamespace,
};
use meshlens_common::{is_autogenerated, kube_utils, Error, Result};

use crate::config::CoreConfig;
use crate::snapshot::{ClusterSnapshot, ClusterSource, FetchCriteria, Snapshot};

/// The payload of one completed fetch task
enum SlotData {
    VirtualServices(Vec<VirtualService>),
    DestinationRules(Vec<DestinationRule>),
    Gateways(Vec<Gateway>),
    ServiceEntries(Vec<ServiceEntry>),
    Sidecars(Vec<Sidecar>),
    WorkloadEntries(Vec<WorkloadEntry>),
    AuthorizationPolicies(Vec<AuthorizationPolicy>),
    PeerAuthentications(Vec<PeerAuthentication>),
    RequestAuthentications(Vec<RequestAuthentication>),
    K8sGateways(Vec<K8sGateway>),
    K8sHttpRoutes(Vec<K8sHttpRoute>),
    K8sReferenceGrants(Vec<K8sReferenceGrant>),
    Services(Vec<ServiceSummary>),
    Workloads(WorkloadsByNamespace),
    RegistryServices(Vec<RegistryService>),
    Principals(Vec<String>),
    AutoMtls(bool),
}

struct SlotResult {
    kind: &'static str,
    required: bool,
    data: Result<SlotData>,
}

/// Fetches snapshots from the per-cluster sources
pub struct SnapshotFetcher {
    config: Arc<CoreConfig>,
}

impl SnapshotFetcher {
    /// Create a fetcher for the given configuration
    pub fn new(config: Arc<CoreConfig>) -> Self {
        Self { config }
    }

    /// Fetch a snapshot covering every cluster in `sources`.
    ///
    /// Returns the snapshot plus the first fatal error, where fatal means a
    /// kind required by `criteria` (or the namespace/service/workload base
    /// data every pass needs). Non-required failures are logged and leave
    /// their slot empty.
    pub async fn fetch(
        &self,
        sources: &BTreeMap<String, Arc<dyn ClusterSource>>,
        criteria: &FetchCriteria,
        cancel: &CancellationToken,
    ) -> (Snapshot, Option<Error>) {
        let mut snapshot = Snapshot::default();
        let mut first_fatal: Option<Error> = None;

        let cluster_fetches = sources.iter().map(|(cluster, source)| {
            let cluster = cluster.clone();
            let source = Arc::clone(source);
            async move {
                let result = self
                    .fetch_cluster(&cluster, source, criteria, cancel)
                    .await;
                (cluster, result)
            }
        });

        for (cluster, result) in join_all(cluster_fetches).await {
            match result {
                Ok((cluster_snapshot, fatal)) => {
                    if first_fatal.is_none() {
                        first_fatal = fatal;
                    }
                    snapshot.clusters.insert(cluster, cluster_snapshot);
                }
                Err(err) => {
                    warn!(cluster = %cluster, error = %err, "cluster fetch failed");
                    if first_fatal.is_none() {
                        first_fatal = Some(err);
                    }
                }
            }
        }

        (snapshot, first_fatal)
    }

    /// Fetch one cluster: namespaces first (workload fan-out needs them),
    /// then every remaining kind in parallel.
    async fn fetch_cluster(
        &self,
        cluster: &str,
        source: Arc<dyn ClusterSource>,
        criteria: &FetchCriteria,
        cancel: &CancellationToken,
    ) -> Result<(ClusterSnapshot, Option<Error>)> {
        let timeout = self.config.fetch_timeout;

        let namespaces = guard(cancel, timeout, cluster, "namespace", async {
            source.namespaces().await
        })
        .await?;

        let mut snap = ClusterSnapshot::new(cluster);
        snap.namespaces = namespaces;
        let namespace_names: Vec<String> =
            snap.namespaces.iter().map(|ns| ns.name.clone()).collect();

        let mut tasks: Vec<JoinHandle<SlotResult>> = Vec::new();

        macro_rules! spawn_slot {
            ($flag:expr, $kind:literal, $variant:ident, $method:ident) => {
                if $flag {
                    let source = Arc::clone(&source);
                    let cancel = cancel.clone();
                    let cluster = cluster.to_string();
                    tasks.push(tokio::spawn(async move {
                        let data = guard(&cancel, timeout, &cluster, $kind, async {
                            source.$method().await
                        })
                        .await
                        .map(SlotData::$variant);
                        SlotResult {
                            kind: $kind,
                            required: true,
                            data,
                        }
                    }));
                }
            };
        }

        spawn_slot!(criteria.virtual_services, "virtualservice", VirtualServices, virtual_services);
        spawn_slot!(criteria.destination_rules, "destinationrule", DestinationRules, destination_rules);
        spawn_slot!(criteria.gateways, "gateway", Gateways, gateways);
        spawn_slot!(criteria.service_entries, "serviceentry", ServiceEntries, service_entries);
        spawn_slot!(criteria.sidecars, "sidecar", Sidecars, sidecars);
        spawn_slot!(criteria.workload_entries, "workloadentry", WorkloadEntries, workload_entries);
        spawn_slot!(
            criteria.authorization_policies,
            "authorizationpolicy",
            AuthorizationPolicies,
            authorization_policies
        );
        spawn_slot!(
            criteria.peer_authentications,
            "peerauthentication",
            PeerAuthentications,
            peer_authentications
        );
        spawn_slot!(
            criteria.request_authentications,
            "requestauthentication",
            RequestAuthentications,
            request_authentications
        );
        spawn_slot!(criteria.k8s_gateways, "k8sgateway", K8sGateways, k8s_gateways);
        spawn_slot!(criteria.k8s_http_routes, "k8shttproute", K8sHttpRoutes, k8s_http_routes);
        spawn_slot!(
            criteria.k8s_reference_grants,
            "k8sreferencegrant",
            K8sReferenceGrants,
            k8s_reference_grants
        );
        // Base data every pass needs
        spawn_slot!(true, "service", Services, services);

        {
            let source = Arc::clone(&source);
            let cancel = cancel.clone();
            let cluster_name = cluster.to_string();
            tasks.push(tokio::spawn(async move {
                let data = guard(&cancel, timeout, &cluster_name, "workload", async {
                    let mut all = WorkloadsByNamespace::new();
                    for ns in &namespace_names {
                        all.insert(ns.clone(), source.workloads(ns).await?);
                    }
                    Ok(all)
                })
                .await
                .map(SlotData::Workloads);
                SlotResult {
                    kind: "workload",
                    required: true,
                    data,
                }
            }));
        }

        macro_rules! spawn_optional {
            ($kind:literal, $variant:ident, $method:ident) => {{
                let source = Arc::clone(&source);
                let cancel = cancel.clone();
                let cluster = cluster.to_string();
                tasks.push(tokio::spawn(async move {
                    let data = guard(&cancel, timeout, &cluster, $kind, async {
                        source.$method().await
                    })
                    .await
                    .map(SlotData::$variant);
                    SlotResult {
                        kind: $kind,
                        required: false,
                        data,
                    }
                }));
            }};
        }

        spawn_optional!("registryservice", RegistryServices, registry_services);
        spawn_optional!("principal", Principals, principal_suffixes);
        spawn_optional!("automtls", AutoMtls, auto_mtls_enabled);

        let mut first_fatal: Option<Error> = None;
        for joined in join_all(tasks).await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    // A panicking fetch task is a programming bug; degrade
                    // to a missing-slot error rather than poisoning the pass
                    warn!(cluster = %cluster, error = %e, "fetch task panicked");
                    if first_fatal.is_none() {
                        first_fatal =
                            Some(Error::internal_with_context("fetcher", e.to_string()));
                    }
                    continue;
                }
            };
            match result.data {
                Ok(data) => fill_slot(&mut snap, data),
                Err(err) => {
                    if result.required {
                        let err = Error::fetch_required(cluster, result.kind, err.to_string());
                        warn!(cluster = %cluster, kind = result.kind, error = %err, "required kind failed");
                        if first_fatal.is_none() {
                            first_fatal = Some(err);
                        }
                    } else {
                        warn!(cluster = %cluster, kind = result.kind, error = %err, "optional kind failed; slot left empty");
                    }
                }
            }
        }

        finalize(&mut snap, &self.config, criteria);
        debug!(
            cluster = %cluster,
            namespaces = snap.namespaces.len(),
            virtual_services = snap.virtual_services.len(),
            destination_rules = snap.destination_rules.len(),
            "snapshot assembled"
        );
        Ok((snap, first_fatal))
    }
}

/// Race a fetch future against the per-task deadline and the pass token
async fn guard<T>(
    cancel: &CancellationToken,
    deadline: Duration,
    cluster: &str,
    kind: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::canceled("fetch")),
        res = tokio::time::timeout(deadline, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(Error::fetch_for(cluster, kind, "deadline exceeded")),
        },
    }
}

fn fill_slot(snap: &mut ClusterSnapshot, data: SlotData) {
    let cluster = snap.cluster.clone();
    match data {
        SlotData::VirtualServices(v) => snap.virtual_services = stamp(v, &cluster),
        SlotData::DestinationRules(v) => snap.destination_rules = stamp(v, &cluster),
        SlotData::Gateways(v) => snap.gateways = stamp(v, &cluster),
        SlotData::ServiceEntries(v) => snap.service_entries = stamp(v, &cluster),
        SlotData::Sidecars(v) => snap.sidecars = stamp(v, &cluster),
        SlotData::WorkloadEntries(v) => snap.workload_entries = stamp(v, &cluster),
        SlotData::AuthorizationPolicies(v) => snap.authorization_policies = stamp(v, &cluster),
        SlotData::PeerAuthentications(v) => snap.peer_authentications = stamp(v, &cluster),
        SlotData::RequestAuthentications(v) => snap.request_authentications = stamp(v, &cluster),
        SlotData::K8sGateways(v) => snap.k8s_gateways = stamp(v, &cluster),
        SlotData::K8sHttpRoutes(v) => snap.k8s_http_routes = stamp(v, &cluster),
        SlotData::K8sReferenceGrants(v) => snap.k8s_reference_grants = stamp(v, &cluster),
        SlotData::Services(v) => snap.services = v,
        SlotData::Workloads(v) => snap.workloads = v,
        SlotData::RegistryServices(v) => snap.registry_services = v,
        SlotData::Principals(v) => snap.principal_suffixes = v.into_iter().collect(),
        SlotData::AutoMtls(v) => snap.mtls.enabled_auto_mtls = v,
    }
}

/// Exclude control-plane-generated objects, carve out the mTLS and RBAC
/// slices, and freeze iteration order.
fn finalize(snap: &mut ClusterSnapshot, config: &CoreConfig, criteria: &FetchCriteria) {
    snap.virtual_services
        .retain(|vs| !is_autogenerated(&vs.metadata.name));
    snap.gateways
        .retain(|gw| !is_autogenerated(&gw.metadata.name));

    let scope = criteria.namespace.as_deref();
    snap.mtls.mesh_peer_authentications = snap
        .peer_authentications
        .iter()
        .filter(|pa| pa.metadata.namespace == config.root_namespace)
        .cloned()
        .collect();
    snap.mtls.peer_authentications = snap
        .peer_authentications
        .iter()
        .filter(|pa| scope.is_none() || scope == Some(pa.metadata.namespace.as_str()))
        .cloned()
        .collect();
    snap.rbac.authorization_policies = snap
        .authorization_policies
        .iter()
        .filter(|ap| scope.is_none() || scope == Some(ap.metadata.namespace.as_str()))
        .cloned()
        .collect();

    snap.normalize();
}

trait HasMeta {
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

macro_rules! impl_has_meta {
    ($($type:ty),* $(,)?) => {
        $(impl HasMeta for $type {
            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        })*
    };
}

impl_has_meta!(
    VirtualService,
    DestinationRule,
    Gateway,
    ServiceEntry,
    Sidecar,
    WorkloadEntry,
    AuthorizationPolicy,
    PeerAuthentication,
    RequestAuthentication,
    K8sGateway,
    K8sHttpRoute,
    K8sReferenceGrant,
);

fn stamp<T: HasMeta>(mut objects: Vec<T>, cluster: &str) -> Vec<T> {
    for obj in &mut objects {
        obj.meta_mut().cluster = cluster.to_string();
    }
    objects
}

/// [`ClusterSource`] backed by one kube client.
///
/// Registry services come from the istiod-facing layer of the console, not
/// from the Kubernetes API; this source leaves the slot empty.
pub struct KubeSource {
    cluster: String,
    client: Client,
}

impl KubeSource {
    /// Wrap a kube client for one cluster
    pub fn new(cluster: impl Into<String>, client: Client) -> Self {
        Self {
            cluster: cluster.into(),
            client,
        }
    }
}

#[async_trait]
impl ClusterSource for KubeSource {
    async fn virtual_services(&self) -> Result<Vec<VirtualService>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn destination_rules(&self) -> Result<Vec<DestinationRule>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn gateways(&self) -> Result<Vec<Gateway>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn service_entries(&self) -> Result<Vec<ServiceEntry>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn sidecars(&self) -> Result<Vec<Sidecar>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn workload_entries(&self) -> Result<Vec<WorkloadEntry>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn authorization_policies(&self) -> Result<Vec<AuthorizationPolicy>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn peer_authentications(&self) -> Result<Vec<PeerAuthentication>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn request_authentications(&self) -> Result<Vec<RequestAuthentication>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn k8s_gateways(&self) -> Result<Vec<K8sGateway>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn k8s_http_routes(&self) -> Result<Vec<K8sHttpRoute>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn k8s_reference_grants(&self) -> Result<Vec<K8sReferenceGrant>> {
        kube_utils::list_dynamic(&self.client, None).await
    }
    async fn namespaces(&self) -> Result<Vec<NamespaceInfo>> {
        kube_utils::list_namespaces(&self.client).await
    }
    async fn services(&self) -> Result<Vec<ServiceSummary>> {
        kube_utils::list_services(&self.client, &self.cluster).await
    }
    async fn workloads(&self, namespace: &str) -> Result<Vec<WorkloadSummary>> {
        kube_utils::list_workloads(&self.client, namespace).await
    }
    async fn registry_services(&self) -> Result<Vec<RegistryService>> {
        Ok(Vec::new())
    }
    async fn principal_suffixes(&self) -> Result<Vec<String>> {
        kube_utils::list_principal_suffixes(&self.client).await
    }
}
