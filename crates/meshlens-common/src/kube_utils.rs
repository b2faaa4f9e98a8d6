//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction and dynamic-API listing for the Istio and Gateway API
//! CRDs, plus the reductions from core Kubernetes objects to the summaries
//! the checkers consume.

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Service, ServiceAccount};
use kube::api::{Api, DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::mesh::{HasApiResource, NamespaceInfo, ServicePort, ServiceSummary, WorkloadSummary};
use crate::{Error, Result};

/// Create a kube client from optional kubeconfig path
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context("client", format!("failed to read kubeconfig: {}", e))
            })?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?;
            Ok(Client::try_from(config)?)
        }
        None => Ok(Client::try_default().await?),
    }
}

/// Build the dynamic `ApiResource` for a modeled CRD kind
pub fn api_resource<T: HasApiResource>() -> ApiResource {
    let (group, version) = match T::API_VERSION.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), T::API_VERSION.to_string()),
    };
    ApiResource {
        group,
        version,
        api_version: T::API_VERSION.to_string(),
        kind: T::KIND.to_string(),
        plural: T::PLURAL.to_string(),
    }
}

/// List a CRD kind and decode each object into its modeled shape.
///
/// Objects that fail to decode are logged and skipped: a malformed object
/// must not take down the snapshot it belongs to.
pub async fn list_dynamic<T>(client: &Client, namespace: Option<&str>) -> Result<Vec<T>>
where
    T: HasApiResource + DeserializeOwned,
{
    let ar = api_resource::<T>();
    let api: Api<DynamicObject> = match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    };
    let list = api.list(&ListParams::default()).await?;

    let mut out = Vec::with_capacity(list.items.len());
    for obj in list.items {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let mut value = serde_json::Map::new();
        value.insert(
            "metadata".to_string(),
            serde_json::json!({
                "name": obj.metadata.name,
                "namespace": obj.metadata.namespace,
                "labels": obj.metadata.labels.unwrap_or_default(),
            }),
        );
        if let Some(spec) = obj.data.get("spec") {
            value.insert("spec".to_string(), spec.clone());
        }
        match serde_json::from_value::<T>(serde_json::Value::Object(value)) {
            Ok(item) => out.push(item),
            Err(e) => {
                warn!(kind = T::KIND, name = %name, error = %e, "skipping undecodable object");
            }
        }
    }
    Ok(out)
}

/// List namespaces with their labels
pub async fn list_namespaces(client: &Client) -> Result<Vec<NamespaceInfo>> {
    let api: Api<Namespace> = Api::all(client.clone());
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|ns| {
            let name = ns.metadata.name?;
            Some(NamespaceInfo {
                name,
                labels: ns.metadata.labels.unwrap_or_default().into_iter().collect(),
            })
        })
        .collect())
}

/// List Services across the cluster reduced to [`ServiceSummary`]
pub async fn list_services(client: &Client, cluster: &str) -> Result<Vec<ServiceSummary>> {
    let api: Api<Service> = Api::all(client.clone());
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .iter()
        .filter_map(|svc| service_summary(svc, cluster))
        .collect())
}

/// Reduce a Kubernetes Service to the fields the checkers read
pub fn service_summary(svc: &Service, cluster: &str) -> Option<ServiceSummary> {
    let name = svc.metadata.name.clone()?;
    let namespace = svc.metadata.namespace.clone()?;
    let spec = svc.spec.as_ref();
    Some(ServiceSummary {
        name,
        namespace,
        cluster: cluster.to_string(),
        selector: spec
            .and_then(|s| s.selector.clone())
            .unwrap_or_default()
            .into_iter()
            .collect(),
        ports: spec
            .map(|s| {
                s.ports
                    .iter()
                    .flatten()
                    .map(|p| ServicePort {
                        name: p.name.clone().unwrap_or_default(),
                        port: p.port as u16,
                    })
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// List the workloads of one namespace.
///
/// Deployments are the deployment-level owners validations reason about;
/// the pod template labels are what subset selectors match against.
pub async fn list_workloads(client: &Client, namespace: &str) -> Result<Vec<WorkloadSummary>> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|d| {
            let name = d.metadata.name?;
            let labels: BTreeMap<String, String> = d
                .spec
                .as_ref()
                .and_then(|s| s.template.metadata.as_ref())
                .and_then(|m| m.labels.clone())
                .unwrap_or_default()
                .into_iter()
                .collect();
            Some(WorkloadSummary { name, labels })
        })
        .collect())
}

/// The trust-domain-agnostic suffix of a service account principal
pub fn principal_suffix(namespace: &str, account: &str) -> String {
    format!("ns/{}/sa/{}", namespace, account)
}

/// List every service account as a principal suffix (`ns/<ns>/sa/<name>`)
pub async fn list_principal_suffixes(client: &Client) -> Result<Vec<String>> {
    let api: Api<ServiceAccount> = Api::all(client.clone());
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|sa| {
            let name = sa.metadata.name?;
            let namespace = sa.metadata.namespace?;
            Some(principal_suffix(&namespace, &name))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::VirtualService;

    #[test]
    fn api_resource_splits_group_and_version() {
        let ar = api_resource::<VirtualService>();
        assert_eq!(ar.group, "networking.istio.io");
        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.kind, "VirtualService");
        assert_eq!(ar.plural, "virtualservices");
    }

    #[test]
    fn service_summary_reduces_selector_and_ports() {
        let svc: Service = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "reviews", "namespace": "bookinfo"},
            "spec": {
                "selector": {"app": "reviews"},
                "ports": [{"name": "http", "port": 9080}]
            }
        }))
        .unwrap();
        let summary = service_summary(&svc, "east").unwrap();
        assert_eq!(summary.name, "reviews");
        assert_eq!(summary.cluster, "east");
        assert_eq!(summary.selector.get("app"), Some(&"reviews".to_string()));
        assert_eq!(summary.ports[0].port, 9080);
    }

    #[test]
    fn service_without_name_is_dropped() {
        let svc = Service::default();
        assert!(service_summary(&svc, "east").is_none());
    }

    #[test]
    fn principal_suffix_form() {
        assert_eq!(principal_suffix("default", "sleep"), "ns/default/sa/sleep");
    }
}
