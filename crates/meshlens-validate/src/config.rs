//! Core configuration and context
//!
//! No process-wide singletons: a [`CoreContext`] value carries the config,
//! cache, and per-cluster sources, and is passed through constructors.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use meshlens_common::{
    HostResolver, MulticlusterPolicy, DEFAULT_CLUSTER_DOMAIN, DEFAULT_MULTICLUSTER_SUFFIX,
    DEFAULT_ROOT_NAMESPACE,
};

use crate::cache::ValidationCache;
use crate::snapshot::ClusterSource;

/// Engine-wide configuration, injected through constructors
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Control-plane namespace; PeerAuthentications here are mesh-wide
    pub root_namespace: String,
    /// DNS zone for in-cluster FQDNs (`cluster.local`)
    pub cluster_domain: String,
    /// Suffix marking multi-cluster service hosts (`global`)
    pub multicluster_suffix: String,
    /// Check codes stripped from every result
    pub ignore_checks: BTreeSet<String>,
    /// Clusters running in ambient mode (changes exportTo semantics)
    pub ambient_clusters: BTreeSet<String>,
    /// Mesh outbound traffic policy is ALLOW_ANY; unresolved hosts degrade
    /// from Error to Warning because traffic still flows
    pub policy_allow_any: bool,
    /// Gateway selectors only match workloads in the gateway's namespace
    pub gateway_to_namespace: bool,
    /// GatewayClass names the control plane implements
    pub gateway_classes: BTreeSet<String>,
    /// Per fetch-task deadline
    pub fetch_timeout: Duration,
    /// Outer deadline for a whole validation pass
    pub pass_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            root_namespace: DEFAULT_ROOT_NAMESPACE.to_string(),
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            multicluster_suffix: DEFAULT_MULTICLUSTER_SUFFIX.to_string(),
            ignore_checks: BTreeSet::new(),
            ambient_clusters: BTreeSet::new(),
            policy_allow_any: false,
            gateway_to_namespace: false,
            gateway_classes: ["istio", "istio-waypoint", "istio-remote"]
                .into_iter()
                .map(String::from)
                .collect(),
            fetch_timeout: Duration::from_secs(15),
            pass_timeout: Duration::from_secs(60),
        }
    }
}

impl CoreConfig {
    /// Build the host resolver configured for this mesh
    pub fn resolver(&self) -> HostResolver {
        HostResolver::new(
            self.cluster_domain.clone(),
            MulticlusterPolicy {
                enabled: true,
                suffix: self.multicluster_suffix.clone(),
            },
        )
    }

    /// Whether a cluster runs in ambient mode
    pub fn is_ambient_cluster(&self, cluster: &str) -> bool {
        self.ambient_clusters.contains(cluster)
    }
}

/// Everything a validation pass needs, bundled for injection
#[derive(Clone)]
pub struct CoreContext {
    /// Engine configuration
    pub config: Arc<CoreConfig>,
    /// The shared validation cache
    pub cache: Arc<ValidationCache>,
    /// One config source per cluster, keyed by cluster name
    pub sources: BTreeMap<String, Arc<dyn ClusterSource>>,
}

impl CoreContext {
    /// Create a context over the given cluster sources
    pub fn new(config: CoreConfig, sources: BTreeMap<String, Arc<dyn ClusterSource>>) -> Self {
        Self {
            config: Arc::new(config),
            cache: Arc::new(ValidationCache::new()),
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_istio_defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.root_namespace, "istio-system");
        assert_eq!(cfg.cluster_domain, "cluster.local");
        assert!(cfg.gateway_classes.contains("istio"));
        assert!(!cfg.policy_allow_any);
    }

    #[test]
    fn resolver_uses_configured_domain() {
        let cfg = CoreConfig {
            cluster_domain: "cluster.remote".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.resolver().identity_domain(), "svc.cluster.remote");
    }

    #[test]
    fn ambient_cluster_lookup() {
        let cfg = CoreConfig {
            ambient_clusters: BTreeSet::from(["east".to_string()]),
            ..Default::default()
        };
        assert!(cfg.is_ambient_cluster("east"));
        assert!(!cfg.is_ambient_cluster("west"));
    }
}
