//! Validation orchestrator
//!
//! Drives fetch → visibility trim → checkers → reference builders for
//! full-mesh and single-object requests, merges the partial results, strips
//! ignored checks, and writes the outcome into the cache.
//!
//! Checkers and reference builders run as parallel tasks over a shared
//! `Arc<ClusterSnapshot>`. Their merge is commutative and associative, so
//! two runs over the same snapshot produce byte-identical maps regardless
//! of completion order. A panicking checker is recovered: the pass logs the
//! panic and marks every object of that checker's kind with an
//! `internal.checker.failed` error instead of going down.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use meshlens_common::mesh::{ObjectKind, ObjectRef};
use meshlens_common::{Error, Result};

use crate::checkers::{self, CheckContext, ObjectChecker};
use crate::config::CoreContext;
use crate::fetcher::SnapshotFetcher;
use crate::models::{IstioCheck, ValidationSummary, Validations};
use crate::references::{self, ReferenceChecker, ReferencesMap};
use crate::snapshot::{ClusterSnapshot, FetchCriteria};
use crate::visibility;

/// The validation engine's public face.
///
/// Read paths (`validations*`, `summary`) serve from the cache; the two
/// pass entry points ([`Self::create_validations`] and
/// [`Self::object_validations`]) fetch fresh snapshots.
pub struct ValidationsService {
    ctx: CoreContext,
    fetcher: SnapshotFetcher,
}

impl ValidationsService {
    /// Create the service over an injected context
    pub fn new(ctx: CoreContext) -> Self {
        let fetcher = SnapshotFetcher::new(Arc::clone(&ctx.config));
        Self { ctx, fetcher }
    }

    /// The whole cached validation map
    pub fn validations(&self) -> Validations {
        self.ctx.cache.items()
    }

    /// Cached validations of one (cluster, namespace), after verifying the
    /// namespace is visible in that cluster
    pub async fn validations_for_namespace(
        &self,
        cluster: &str,
        namespace: &str,
    ) -> Result<Validations> {
        self.ensure_namespace_visible(cluster, namespace).await?;
        Ok(self.ctx.cache.items().filter_by_namespace(cluster, namespace))
    }

    /// Aggregate error/warning counts for one namespace, from the cache
    pub fn summary(&self, namespace: &str) -> ValidationSummary {
        self.ctx.cache.items().summary(namespace)
    }

    /// Cached validations of every object related to one service: objects
    /// carrying the service's own name plus objects referencing it.
    pub async fn validations_for_service_scope(
        &self,
        cluster: &str,
        namespace: &str,
        service: &str,
    ) -> Result<Validations> {
        self.ensure_namespace_visible(cluster, namespace).await?;
        let items = self.ctx.cache.items();
        Ok(items
            .0
            .into_iter()
            .filter(|(key, validation)| {
                key.cluster == cluster
                    && ((key.name == service && key.namespace == namespace)
                        || validation
                            .references
                            .services
                            .iter()
                            .any(|s| s.name == service && s.namespace == namespace))
            })
            .collect())
    }

    /// Full refresh of one cluster: run every checker and reference
    /// builder over a fresh snapshot and swap the cluster's cache entries.
    pub async fn create_validations(
        &self,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<Validations> {
        let deadline = self.ctx.config.pass_timeout;
        match tokio::time::timeout(deadline, self.run_full_pass(cluster, cancel)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(cluster = %cluster, "validation pass exceeded its deadline; cache left untouched");
                Err(Error::canceled("pass"))
            }
        }
    }

    /// Filtered refresh of one object: run the kind's checkers over a
    /// namespace-scoped snapshot, filter by (kind, name), update the cache
    /// per key, and return the matching validations plus the kind's
    /// reference map.
    pub async fn object_validations(
        &self,
        cluster: &str,
        namespace: &str,
        kind: ObjectKind,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(Validations, ReferencesMap)> {
        let deadline = self.ctx.config.pass_timeout;
        match tokio::time::timeout(
            deadline,
            self.run_object_pass(cluster, namespace, kind, name, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(cluster = %cluster, namespace = %namespace, "object validation exceeded its deadline");
                Err(Error::canceled("pass"))
            }
        }
    }

    async fn run_full_pass(
        &self,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<Validations> {
        let snap = self.fetch_cluster(cluster, FetchCriteria::all(), cancel).await?;

        let mut validations = self
            .run_checkers(Arc::clone(&snap), checkers::all_checkers(), cancel)
            .await;
        let references = self
            .run_reference_checkers(Arc::clone(&snap), references::all_reference_checkers())
            .await;
        attach_references(&mut validations, references);

        validations.strip_ignored(&self.ctx.config.ignore_checks);

        // Swap this cluster's entries in one exclusive critical section,
        // leaving other clusters' results untouched
        let mut merged = self.ctx.cache.items();
        merged.0.retain(|key, _| key.cluster != cluster);
        for (key, validation) in validations.clone() {
            merged.0.insert(key, validation);
        }
        self.ctx.cache.replace(merged);

        debug!(
            cluster = %cluster,
            objects = validations.len(),
            cache_version = self.ctx.cache.version(),
            "full validation pass complete"
        );
        Ok(validations)
    }

    async fn run_object_pass(
        &self,
        cluster: &str,
        namespace: &str,
        kind: ObjectKind,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(Validations, ReferencesMap)> {
        let snap = self
            .fetch_cluster(cluster, FetchCriteria::all_for_namespace(namespace), cancel)
            .await?;
        if !snap.namespace_names.contains(namespace) {
            return Err(Error::forbidden(cluster, namespace));
        }

        let mut snap = (*snap).clone();
        visibility::trim_to_namespace(
            &mut snap,
            namespace,
            self.ctx.config.is_ambient_cluster(cluster),
        );
        let snap = Arc::new(snap);

        let mut validations = self
            .run_checkers(Arc::clone(&snap), checkers::checkers_for(kind), cancel)
            .await;
        let references = match references::reference_checker_for(kind) {
            Some(builder) => {
                self.run_reference_checkers(Arc::clone(&snap), vec![builder])
                    .await
            }
            None => ReferencesMap::new(),
        };
        attach_references(&mut validations, references.clone());

        validations.strip_ignored(&self.ctx.config.ignore_checks);
        let filtered = validations.filter_by_kind_name(kind, name);
        for (key, validation) in filtered.clone() {
            self.ctx.cache.set(key, validation);
        }

        let filtered_references: ReferencesMap = references
            .into_iter()
            .filter(|(key, _)| key.kind == kind && key.name == name)
            .collect();
        Ok((filtered, filtered_references))
    }

    async fn fetch_cluster(
        &self,
        cluster: &str,
        criteria: FetchCriteria,
        cancel: &CancellationToken,
    ) -> Result<Arc<ClusterSnapshot>> {
        let mut sources = self.ctx.sources.clone();
        sources.retain(|name, _| name == cluster);
        if sources.is_empty() {
            return Err(Error::internal_with_context(
                "orchestrator",
                format!("no source registered for cluster {}", cluster),
            ));
        }

        let (snapshot, fatal) = self.fetcher.fetch(&sources, &criteria, cancel).await;
        if let Some(err) = fatal {
            return Err(err);
        }
        snapshot
            .clusters
            .get(cluster)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| {
                Error::internal_with_context("orchestrator", "fetched snapshot lost its cluster")
            })
    }

    /// Fan the checkers out as parallel tasks and merge their outputs.
    ///
    /// A task that panics is converted into `internal.checker.failed` on
    /// every object of that checker's kind.
    async fn run_checkers(
        &self,
        snap: Arc<ClusterSnapshot>,
        checker_set: Vec<Arc<dyn ObjectChecker>>,
        _cancel: &CancellationToken,
    ) -> Validations {
        let tasks: Vec<_> = checker_set
            .into_iter()
            .map(|checker| {
                let snap = Arc::clone(&snap);
                let config = Arc::clone(&self.ctx.config);
                let kind = checker.kind();
                let handle = tokio::spawn(async move {
                    let resolver = config.resolver();
                    let ctx = CheckContext {
                        config: &config,
                        resolver: &resolver,
                    };
                    checker.check(&snap, &ctx)
                });
                (kind, handle)
            })
            .collect();

        let mut validations = Validations::new();
        for (kind, handle) in tasks {
            match handle.await {
                Ok(result) => validations.merge(result),
                Err(join_err) if join_err.is_panic() => {
                    error!(kind = %kind, "checker panicked; marking its objects failed");
                    validations.merge(checker_failure(&snap, kind));
                }
                Err(join_err) => {
                    warn!(kind = %kind, error = %join_err, "checker task aborted");
                }
            }
        }
        validations
    }

    async fn run_reference_checkers(
        &self,
        snap: Arc<ClusterSnapshot>,
        builders: Vec<Arc<dyn ReferenceChecker>>,
    ) -> ReferencesMap {
        let tasks: Vec<_> = builders
            .into_iter()
            .map(|builder| {
                let snap = Arc::clone(&snap);
                let config = Arc::clone(&self.ctx.config);
                let kind = builder.kind();
                let handle = tokio::spawn(async move {
                    let resolver = config.resolver();
                    let ctx = CheckContext {
                        config: &config,
                        resolver: &resolver,
                    };
                    builder.references(&snap, &ctx)
                });
                (kind, handle)
            })
            .collect();

        let mut references = ReferencesMap::new();
        for (kind, handle) in join_all(tasks.into_iter().map(|(kind, handle)| async move {
            (kind, handle.await)
        }))
        .await
        {
            match handle {
                Ok(map) => {
                    for (key, refs) in map {
                        references.entry(key).or_default().merge(refs);
                    }
                }
                Err(join_err) => {
                    // References are best-effort; a failed builder only
                    // costs edges, never correctness
                    error!(kind = %kind, error = %join_err, "reference builder failed");
                }
            }
        }
        references
    }

    async fn ensure_namespace_visible(&self, cluster: &str, namespace: &str) -> Result<()> {
        let Some(source) = self.ctx.sources.get(cluster) else {
            return Err(Error::forbidden(cluster, namespace));
        };
        let namespaces = source.namespaces().await?;
        if namespaces.iter().any(|ns| ns.name == namespace) {
            Ok(())
        } else {
            Err(Error::forbidden(cluster, namespace))
        }
    }
}

/// Mark every object of one kind as failed by an internal checker bug
fn checker_failure(snap: &ClusterSnapshot, kind: ObjectKind) -> Validations {
    let mut validations = Validations::new();
    for key in object_refs_of_kind(snap, kind) {
        validations
            .ensure(key)
            .add_check(IstioCheck::build("internal.checker.failed", ""));
    }
    validations
}

fn object_refs_of_kind(snap: &ClusterSnapshot, kind: ObjectKind) -> Vec<ObjectRef> {
    macro_rules! refs {
        ($field:ident) => {
            snap.$field
                .iter()
                .map(|o| ObjectRef::from_meta(&o.metadata, kind))
                .collect()
        };
    }
    match kind {
        ObjectKind::VirtualService => refs!(virtual_services),
        ObjectKind::DestinationRule => refs!(destination_rules),
        ObjectKind::Gateway => refs!(gateways),
        ObjectKind::ServiceEntry => refs!(service_entries),
        ObjectKind::Sidecar => refs!(sidecars),
        ObjectKind::WorkloadEntry => refs!(workload_entries),
        ObjectKind::AuthorizationPolicy => refs!(authorization_policies),
        ObjectKind::PeerAuthentication => refs!(peer_authentications),
        ObjectKind::RequestAuthentication => refs!(request_authentications),
        ObjectKind::K8sGateway => refs!(k8s_gateways),
        ObjectKind::K8sHTTPRoute => refs!(k8s_http_routes),
        ObjectKind::K8sReferenceGrant => refs!(k8s_reference_grants),
        ObjectKind::Service | ObjectKind::Workload => Vec::new(),
    }
}

fn attach_references(validations: &mut Validations, references: ReferencesMap) {
    for (key, refs) in references {
        if refs.is_empty() {
            continue;
        }
        validations.ensure(key).references.merge(refs);
    }
}
