//! Host parsing and service matching
//!
//! Every host string in mesh configuration (route destinations, gateway
//! references, egress hosts, operation hosts) resolves through here. The
//! resolution rules must stay stable: validations key off them, and a rule
//! drift shows up as flapping validation results across releases.
//!
//! Resolution never fails. Ambiguous input produces a best-effort [`Host`]
//! and the matching helpers answer with a plain boolean.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::mesh::{RegistryService, ServiceEntry, ServiceSummary, VirtualService, WorkloadSummary};
use crate::{DEFAULT_CLUSTER_DOMAIN, DEFAULT_MULTICLUSTER_SUFFIX, UNKNOWN};

/// Canonical label identifying the application a workload belongs to
pub const APP_LABEL: &str = "app";

/// A parsed host reference.
///
/// `cluster` carries the DNS zone of the FQDN form
/// (`svc.cluster.local`), not a mesh cluster name; it is empty for short
/// forms. `complete_input` records that the input was already qualified,
/// which drives [`fmt::Display`] so that parse/render round-trips.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Host {
    /// Service part (or the full external DNS name, or `*`)
    pub service: String,
    /// Resolved namespace
    pub namespace: String,
    /// DNS zone for FQDN inputs, empty otherwise
    pub cluster: String,
    /// Whether the input carried its own qualification
    pub complete_input: bool,
}

impl Host {
    /// Whether the host is a wildcard (`*` or `*.suffix`)
    pub fn is_wildcard(&self) -> bool {
        self.service.starts_with('*')
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.complete_input {
            if self.cluster.is_empty() {
                write!(f, "{}.{}", self.service, self.namespace)
            } else {
                write!(f, "{}.{}.{}", self.service, self.namespace, self.cluster)
            }
        } else {
            f.write_str(&self.service)
        }
    }
}

/// Multi-cluster host rewrite policy.
///
/// When telemetry reports an unresolved (`unknown/unknown`) source and the
/// destination host has exactly three dot-separated parts ending in the
/// configured suffix (`svc.ns.global`), the host is folded back into its
/// `(service, namespace)` pair before matching. The rewrite applies only
/// when namespace AND workload are both unknown.
#[derive(Clone, Debug)]
pub struct MulticlusterPolicy {
    /// Whether the rewrite is active for this cluster
    pub enabled: bool,
    /// Host suffix marking a multi-cluster service
    pub suffix: String,
}

impl Default for MulticlusterPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            suffix: DEFAULT_MULTICLUSTER_SUFFIX.to_string(),
        }
    }
}

/// Stateless host resolver carrying the cluster-wide naming policies
#[derive(Clone, Debug)]
pub struct HostResolver {
    /// DNS zone appended to `<service>.<namespace>.svc` FQDNs
    identity_domain: String,
    multicluster: MulticlusterPolicy,
}

impl Default for HostResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER_DOMAIN, MulticlusterPolicy::default())
    }
}

impl HostResolver {
    /// Create a resolver for a cluster DNS domain (e.g. `cluster.local`)
    pub fn new(cluster_domain: impl Into<String>, multicluster: MulticlusterPolicy) -> Self {
        Self {
            identity_domain: format!("svc.{}", cluster_domain.into()),
            multicluster,
        }
    }

    /// The identity domain FQDNs are checked against (`svc.cluster.local`)
    pub fn identity_domain(&self) -> &str {
        &self.identity_domain
    }

    /// Parse a host string with full namespace knowledge.
    ///
    /// Handles all input forms: bare name, `name.namespace`, FQDN, wildcard,
    /// and external DNS names. A two-part host only resolves to
    /// `(service, namespace)` when the second part is a known namespace;
    /// otherwise the whole string is an external DNS name.
    pub fn host(
        &self,
        host: &str,
        default_namespace: &str,
        known_namespaces: &BTreeSet<String>,
    ) -> Host {
        let parts: Vec<&str> = host.split('.').collect();
        match parts.len() {
            0 | 1 => Host {
                service: host.to_string(),
                namespace: default_namespace.to_string(),
                cluster: String::new(),
                complete_input: false,
            },
            2 if known_namespaces.contains(parts[1]) => Host {
                service: parts[0].to_string(),
                namespace: parts[1].to_string(),
                cluster: String::new(),
                complete_input: true,
            },
            _ if parts.len() > 2 && host_suffix(&parts) == self.identity_domain => Host {
                service: parts[0].to_string(),
                namespace: parts[1].to_string(),
                cluster: self.identity_domain.clone(),
                complete_input: true,
            },
            // External DNS name; only ServiceEntries or the registry can match it
            _ => Host {
                service: host.to_string(),
                namespace: default_namespace.to_string(),
                cluster: String::new(),
                complete_input: false,
            },
        }
    }

    /// Parse a host string without a namespace list.
    ///
    /// Only the `<service>.<namespace>.svc...` FQDN form is split; anything
    /// else keeps the input as the service with the default namespace.
    pub fn parse(&self, host: &str, default_namespace: &str) -> Host {
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() > 2 && parts[2] == "svc" {
            return Host {
                service: parts[0].to_string(),
                namespace: parts[1].to_string(),
                cluster: self.identity_domain.clone(),
                complete_input: true,
            };
        }
        Host {
            service: host.to_string(),
            namespace: default_namespace.to_string(),
            cluster: String::new(),
            complete_input: false,
        }
    }

    /// Parse a gateway reference (`name`, `namespace/name`, or FQDN)
    pub fn gateway_as_host(&self, gateway: &str, default_namespace: &str) -> Host {
        if let Some((ns, name)) = gateway.split_once('/') {
            return Host {
                service: name.to_string(),
                namespace: ns.to_string(),
                cluster: String::new(),
                complete_input: true,
            };
        }
        if gateway.contains('.') {
            let parts: Vec<&str> = gateway.split('.').collect();
            return Host {
                service: parts[0].to_string(),
                namespace: parts[1].to_string(),
                cluster: String::new(),
                complete_input: true,
            };
        }
        Host {
            service: gateway.to_string(),
            namespace: default_namespace.to_string(),
            cluster: String::new(),
            complete_input: false,
        }
    }

    /// Canonical host equality used for DR↔VS coupling.
    ///
    /// True when `host` names `(service, namespace)` in any accepted form:
    /// short name, `service.namespace`, partial FQDN, or full FQDN.
    pub fn filter_by_host(&self, host: &str, service: &str, namespace: &str) -> bool {
        host == service
            || host == format!("{}.{}", service, namespace)
            || host == format!("{}.{}.svc", service, namespace)
            || host == format!("{}.{}.{}", service, namespace, self.identity_domain)
    }

    /// Namespace-aware variant of [`Self::filter_by_host`].
    ///
    /// The short-name form only matches when the host's own namespace equals
    /// the target namespace; the qualified forms are namespace-explicit
    /// already. Equivalent to the 3-arg form whenever `host_namespace ==
    /// namespace`.
    pub fn filter_by_host_in_ns(
        &self,
        host: &str,
        host_namespace: &str,
        service: &str,
        namespace: &str,
    ) -> bool {
        (host == service && host_namespace == namespace)
            || host == format!("{}.{}", service, namespace)
            || host == format!("{}.{}.svc", service, namespace)
            || host == format!("{}.{}.{}", service, namespace, self.identity_domain)
    }

    /// Fold a multi-cluster host back into its `(service, namespace)` pair.
    ///
    /// Applies only when the telemetry source is fully unresolved
    /// (`unknown` namespace AND `unknown` workload); partially resolved
    /// sources keep the host untouched.
    pub fn resolve_destination(
        &self,
        source_namespace: &str,
        source_workload: &str,
        service: &str,
        namespace: &str,
    ) -> (String, String) {
        if self.multicluster.enabled && source_namespace == UNKNOWN && source_workload == UNKNOWN {
            let parts: Vec<&str> = service.split('.').collect();
            if parts.len() == 3 && parts[2] == self.multicluster.suffix {
                return (parts[0].to_string(), parts[1].to_string());
            }
        }
        (service.to_string(), namespace.to_string())
    }

    /// Resolve a host against everything that can claim it: in-cluster
    /// Services, ServiceEntry hosts, VirtualService hosts, and finally the
    /// control-plane registry.
    pub fn has_matching_service(
        &self,
        host: &Host,
        item_namespace: &str,
        services: &[ServiceSummary],
        service_entry_hosts: &BTreeSet<String>,
        virtual_services: &[VirtualService],
        registry: &[RegistryService],
    ) -> bool {
        let (local_svc, local_ns) = parse_two_part_host(host);

        if host.is_wildcard() && local_ns == item_namespace {
            return true;
        }

        // Services match on (name, namespace) wherever they live
        if services
            .iter()
            .any(|s| s.name == local_svc && s.namespace == local_ns)
        {
            return true;
        }

        if has_matching_service_entries(&host.to_string(), service_entry_hosts) {
            return true;
        }

        if self.has_matching_virtual_services(host, virtual_services) {
            return true;
        }

        has_matching_registry_service(&host.to_string(), registry)
    }

    /// Whether any VirtualService declares this host
    pub fn has_matching_virtual_services(
        &self,
        host: &Host,
        virtual_services: &[VirtualService],
    ) -> bool {
        for vs in virtual_services {
            for vs_host in &vs.spec.hosts {
                let parsed = self.parse(vs_host, &vs.metadata.namespace);
                if parsed.service == host.service && parsed.namespace == host.namespace {
                    return true;
                }
                if parsed.is_wildcard()
                    && host_matches_pattern(&host.to_string(), &parsed.service)
                {
                    return true;
                }
            }
        }
        false
    }
}

fn host_suffix(parts: &[&str]) -> String {
    parts[2..].join(".")
}

/// Break a host into `(service, namespace)`, splitting an unqualified
/// dotted service name if needed
pub fn parse_two_part_host(host: &Host) -> (String, String) {
    if !host.complete_input {
        if let Some((svc, ns)) = host.service.split_once('.') {
            return (svc.to_string(), ns.split('.').next().unwrap_or(ns).to_string());
        }
    }
    (host.service.clone(), host.namespace.clone())
}

/// Whether `host` matches a possibly-wildcard `pattern`
pub fn host_matches_pattern(host: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return host.ends_with(suffix);
    }
    host == pattern
}

/// Whether any Service carries this short name
pub fn has_matching_services(service: &str, services: &[ServiceSummary]) -> bool {
    services.iter().any(|s| s.name == service)
}

/// Whether any workload's `app` label carries this service name
pub fn has_matching_workloads(service: &str, workloads: &[WorkloadSummary]) -> bool {
    workloads
        .iter()
        .any(|wl| wl.labels.get(APP_LABEL).map(String::as_str) == Some(service))
}

/// Collect every host declared by a ServiceEntry list
pub fn service_entry_hosts(entries: &[ServiceEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .flat_map(|se| se.spec.hosts.iter().cloned())
        .collect()
}

/// Whether a host is claimed by any ServiceEntry host (wildcards included)
pub fn has_matching_service_entries(host: &str, entry_hosts: &BTreeSet<String>) -> bool {
    entry_hosts
        .iter()
        .any(|pattern| host_matches_pattern(host, pattern))
}

/// Whether the control-plane registry knows this hostname
pub fn has_matching_registry_service(host: &str, registry: &[RegistryService]) -> bool {
    registry
        .iter()
        .any(|rs| host_matches_pattern(host, &rs.hostname))
}

/// Whether every selector entry is satisfied by the label set
pub fn labels_match(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

/// Whether a Service with a matching selector exists and at least one
/// workload satisfies both the service selector and the subset labels
pub fn has_matching_workload(
    service: &str,
    subset_labels: &BTreeMap<String, String>,
    services: &[ServiceSummary],
    workloads: &[WorkloadSummary],
) -> bool {
    // Wildcard hosts always pass; there is nothing concrete to check
    if service.starts_with('*') {
        return true;
    }

    // Covering the 'servicename.namespace' host form
    let svc = service.split('.').next().unwrap_or(service);

    let Some(selector) = services
        .iter()
        .find(|s| s.name == svc)
        .map(|s| &s.selector)
    else {
        return false;
    };
    if selector.is_empty() {
        return false;
    }

    workloads
        .iter()
        .any(|wl| labels_match(selector, &wl.labels) && labels_match(subset_labels, &wl.labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ObjectMeta, ServiceEntrySpec, VirtualServiceSpec};

    fn namespaces(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn resolver() -> HostResolver {
        HostResolver::default()
    }

    #[test]
    fn bare_name_takes_default_namespace() {
        let h = resolver().host("reviews", "bookinfo", &namespaces(&["bookinfo"]));
        assert_eq!(h.service, "reviews");
        assert_eq!(h.namespace, "bookinfo");
        assert!(!h.complete_input);
        assert_eq!(h.to_string(), "reviews");
    }

    #[test]
    fn two_part_host_splits_on_known_namespace() {
        let nss = namespaces(&["bookinfo", "default"]);
        let h = resolver().host("reviews.bookinfo", "default", &nss);
        assert_eq!((h.service.as_str(), h.namespace.as_str()), ("reviews", "bookinfo"));
        assert!(h.complete_input);
        assert_eq!(h.to_string(), "reviews.bookinfo");
    }

    #[test]
    fn two_part_host_with_unknown_namespace_is_external() {
        let nss = namespaces(&["bookinfo"]);
        let h = resolver().host("api.example", "bookinfo", &nss);
        assert_eq!(h.service, "api.example");
        assert_eq!(h.namespace, "bookinfo");
        assert!(!h.complete_input);
    }

    #[test]
    fn fqdn_parses_service_and_namespace() {
        let h = resolver().host(
            "reviews.bookinfo.svc.cluster.local",
            "default",
            &namespaces(&["bookinfo"]),
        );
        assert_eq!((h.service.as_str(), h.namespace.as_str()), ("reviews", "bookinfo"));
        assert_eq!(h.cluster, "svc.cluster.local");
        assert_eq!(h.to_string(), "reviews.bookinfo.svc.cluster.local");
    }

    #[test]
    fn non_cluster_fqdn_is_external() {
        let h = resolver().host("api.example.com", "bookinfo", &namespaces(&["bookinfo"]));
        assert_eq!(h.service, "api.example.com");
        assert!(!h.complete_input);
        assert_eq!(h.to_string(), "api.example.com");
    }

    #[test]
    fn wildcard_hosts() {
        let nss = namespaces(&["bookinfo"]);
        let r = resolver();
        assert!(r.host("*", "bookinfo", &nss).is_wildcard());

        let h = r.host("*.bookinfo", "default", &nss);
        assert!(h.is_wildcard());
        assert_eq!(h.namespace, "bookinfo");

        let h = r.host("*.example.com", "bookinfo", &nss);
        assert!(h.is_wildcard());
    }

    /// parse(render(h)) == h for every host the resolver produces
    #[test]
    fn parse_render_round_trips() {
        let nss = namespaces(&["bookinfo", "istio-system"]);
        let r = resolver();
        for input in [
            "reviews",
            "reviews.bookinfo",
            "reviews.bookinfo.svc.cluster.local",
            "*",
            "*.bookinfo",
            "api.example.com",
        ] {
            let h = r.host(input, "bookinfo", &nss);
            let reparsed = r.host(&h.to_string(), "bookinfo", &nss);
            assert_eq!(h, reparsed, "round trip failed for {input}");
        }
    }

    #[test]
    fn parse_without_namespace_list_only_splits_fqdn() {
        let r = resolver();
        let h = r.parse("reviews.bookinfo.svc.cluster.local", "default");
        assert_eq!((h.service.as_str(), h.namespace.as_str()), ("reviews", "bookinfo"));

        // Two-part form stays whole without a namespace list
        let h = r.parse("reviews.bookinfo", "default");
        assert_eq!(h.service, "reviews.bookinfo");
        assert_eq!(h.namespace, "default");
    }

    #[test]
    fn gateway_reference_forms() {
        let r = resolver();
        let h = r.gateway_as_host("my-gateway", "test");
        assert_eq!((h.service.as_str(), h.namespace.as_str()), ("my-gateway", "test"));

        let h = r.gateway_as_host("istio-system/my-gateway", "test");
        assert_eq!(
            (h.service.as_str(), h.namespace.as_str()),
            ("my-gateway", "istio-system")
        );

        let h = r.gateway_as_host("my-gateway.istio-system.svc.cluster.local", "test");
        assert_eq!(
            (h.service.as_str(), h.namespace.as_str()),
            ("my-gateway", "istio-system")
        );
    }

    #[test]
    fn filter_by_host_accepts_all_qualification_levels() {
        let r = resolver();
        assert!(r.filter_by_host("reviews", "reviews", "bookinfo"));
        assert!(r.filter_by_host("reviews.bookinfo", "reviews", "bookinfo"));
        assert!(r.filter_by_host("reviews.bookinfo.svc", "reviews", "bookinfo"));
        assert!(r.filter_by_host("reviews.bookinfo.svc.cluster.local", "reviews", "bookinfo"));
        assert!(!r.filter_by_host("ratings", "reviews", "bookinfo"));
        assert!(!r.filter_by_host("reviews.default", "reviews", "bookinfo"));
    }

    #[test]
    fn namespace_aware_filter_matches_short_names_only_locally() {
        let r = resolver();
        assert!(r.filter_by_host_in_ns("reviews", "bookinfo", "reviews", "bookinfo"));
        assert!(!r.filter_by_host_in_ns("reviews", "default", "reviews", "bookinfo"));
        // Qualified forms carry their namespace explicitly
        assert!(r.filter_by_host_in_ns("reviews.bookinfo", "default", "reviews", "bookinfo"));
    }

    #[test]
    fn multicluster_rewrite_requires_fully_unknown_source() {
        let r = resolver();
        let (svc, ns) = r.resolve_destination("unknown", "unknown", "reviews.bookinfo.global", "x");
        assert_eq!((svc.as_str(), ns.as_str()), ("reviews", "bookinfo"));

        // Partially unknown sources keep the host untouched
        let (svc, ns) =
            r.resolve_destination("bookinfo", "unknown", "reviews.bookinfo.global", "x");
        assert_eq!((svc.as_str(), ns.as_str()), ("reviews.bookinfo.global", "x"));

        // Wrong suffix or part count keeps the host untouched
        let (svc, _) = r.resolve_destination("unknown", "unknown", "reviews.bookinfo.remote", "x");
        assert_eq!(svc, "reviews.bookinfo.remote");
        let (svc, _) = r.resolve_destination("unknown", "unknown", "reviews.global", "x");
        assert_eq!(svc, "reviews.global");
    }

    #[test]
    fn wildcard_pattern_matching() {
        assert!(host_matches_pattern("anything", "*"));
        assert!(host_matches_pattern("api.example.com", "*.example.com"));
        assert!(!host_matches_pattern("api.example.org", "*.example.com"));
        assert!(host_matches_pattern("reviews", "reviews"));
    }

    #[test]
    fn service_entry_host_matching() {
        let entries = vec![ServiceEntry {
            metadata: ObjectMeta::new("external-api", "bookinfo"),
            spec: ServiceEntrySpec {
                hosts: vec!["api.example.com".into(), "*.wildcard.dev".into()],
                ..Default::default()
            },
        }];
        let hosts = service_entry_hosts(&entries);
        assert!(has_matching_service_entries("api.example.com", &hosts));
        assert!(has_matching_service_entries("x.wildcard.dev", &hosts));
        assert!(!has_matching_service_entries("api.example.org", &hosts));
    }

    #[test]
    fn virtual_service_host_matching() {
        let r = resolver();
        let vs = VirtualService {
            metadata: ObjectMeta::new("reviews-vs", "bookinfo"),
            spec: VirtualServiceSpec {
                hosts: vec!["reviews".into()],
                ..Default::default()
            },
        };
        let target = r.host("reviews", "bookinfo", &namespaces(&["bookinfo"]));
        assert!(r.has_matching_virtual_services(&target, std::slice::from_ref(&vs)));

        let other = r.host("ratings", "bookinfo", &namespaces(&["bookinfo"]));
        assert!(!r.has_matching_virtual_services(&other, std::slice::from_ref(&vs)));
    }

    #[test]
    fn subset_workload_matching_requires_both_selectors() {
        let services = vec![ServiceSummary {
            name: "product".into(),
            namespace: "test".into(),
            selector: BTreeMap::from([("app".to_string(), "product".to_string())]),
            ..Default::default()
        }];
        let workloads = vec![WorkloadSummary {
            name: "product-v1".into(),
            labels: BTreeMap::from([
                ("app".to_string(), "product".to_string()),
                ("version".to_string(), "v1".to_string()),
            ]),
        }];

        let v1 = BTreeMap::from([("version".to_string(), "v1".to_string())]);
        assert!(has_matching_workload("product", &v1, &services, &workloads));

        let v2 = BTreeMap::from([("version".to_string(), "v2".to_string())]);
        assert!(!has_matching_workload("product", &v2, &services, &workloads));

        // No service with that name at all
        assert!(!has_matching_workload("customer", &v1, &services, &workloads));

        // Wildcard hosts are not checkable
        assert!(has_matching_workload("*.anything", &v2, &services, &workloads));
    }

    #[test]
    fn two_part_split_of_unqualified_hosts() {
        let h = Host {
            service: "reviews.bookinfo".into(),
            namespace: "default".into(),
            cluster: String::new(),
            complete_input: false,
        };
        let (svc, ns) = parse_two_part_host(&h);
        assert_eq!((svc.as_str(), ns.as_str()), ("reviews", "bookinfo"));

        let h = Host {
            service: "reviews".into(),
            namespace: "bookinfo".into(),
            cluster: String::new(),
            complete_input: false,
        };
        let (svc, ns) = parse_two_part_host(&h);
        assert_eq!((svc.as_str(), ns.as_str()), ("reviews", "bookinfo"));
    }
}
