//! Istio security resource shapes (`security.istio.io/v1beta1`)
//!
//! AuthorizationPolicy, PeerAuthentication, and RequestAuthentication.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{HasApiResource, ObjectMeta};

/// Istio AuthorizationPolicy
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorizationPolicy {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: AuthorizationPolicySpec,
}

impl HasApiResource for AuthorizationPolicy {
    const API_VERSION: &'static str = "security.istio.io/v1beta1";
    const KIND: &'static str = "AuthorizationPolicy";
    const PLURAL: &'static str = "authorizationpolicies";
}

/// AuthorizationPolicy spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorizationPolicySpec {
    /// Selector for the workloads the policy applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<MatchLabelsSelector>,
    /// Action: ALLOW, DENY, AUDIT, CUSTOM (empty = implicit deny-all)
    #[serde(default)]
    pub action: String,
    /// Access rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
}

/// Selector matching workloads by label equality
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchLabelsSelector {
    /// Labels the target workloads must carry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

/// One authorization rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Caller conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<RuleFrom>,
    /// Operation conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<RuleTo>,
}

/// Caller condition wrapper
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleFrom {
    /// Source specification
    #[serde(default)]
    pub source: Source,
}

/// Caller identity specification
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// SPIFFE principals (`{trust-domain}/ns/{ns}/sa/{account}`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principals: Vec<String>,
    /// Caller namespaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
}

/// Operation condition wrapper
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleTo {
    /// Operation specification
    #[serde(default)]
    pub operation: RuleToOperation,
}

/// Operation being accessed
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleToOperation {
    /// Target hosts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    /// Target ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// HTTP methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

/// Istio PeerAuthentication
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PeerAuthentication {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: PeerAuthenticationSpec,
}

impl HasApiResource for PeerAuthentication {
    const API_VERSION: &'static str = "security.istio.io/v1beta1";
    const KIND: &'static str = "PeerAuthentication";
    const PLURAL: &'static str = "peerauthentications";
}

/// PeerAuthentication spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerAuthenticationSpec {
    /// Selector for the workloads the policy applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<MatchLabelsSelector>,
    /// Workload-wide mTLS mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtls: Option<PeerMtls>,
    /// Per-port mTLS overrides, keyed by port number
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_level_mtls: BTreeMap<String, PeerMtls>,
}

/// mTLS mode wrapper
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PeerMtls {
    /// Mode: UNSET, DISABLE, PERMISSIVE, STRICT
    #[serde(default)]
    pub mode: String,
}

/// Recognized mTLS modes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MtlsMode {
    /// Inherit from parent scope
    Unset,
    /// Plaintext only
    Disable,
    /// Accept both plaintext and mTLS
    Permissive,
    /// mTLS required
    Strict,
}

impl MtlsMode {
    /// Parse the wire string; None for unrecognized values
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "" | "UNSET" => MtlsMode::Unset,
            "DISABLE" => MtlsMode::Disable,
            "PERMISSIVE" => MtlsMode::Permissive,
            "STRICT" => MtlsMode::Strict,
            _ => return None,
        })
    }
}

impl PeerAuthentication {
    /// Effective workload-wide mode, or None when absent/unrecognized
    pub fn mtls_mode(&self) -> Option<MtlsMode> {
        self.spec.mtls.as_ref().and_then(|m| MtlsMode::parse(&m.mode))
    }
}

/// Istio RequestAuthentication
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestAuthentication {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: RequestAuthenticationSpec,
}

impl HasApiResource for RequestAuthentication {
    const API_VERSION: &'static str = "security.istio.io/v1beta1";
    const KIND: &'static str = "RequestAuthentication";
    const PLURAL: &'static str = "requestauthentications";
}

/// RequestAuthentication spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestAuthenticationSpec {
    /// Selector for the workloads the policy applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<MatchLabelsSelector>,
    /// JWT validation rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jwt_rules: Vec<JwtRule>,
}

/// One JWT validation rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JwtRule {
    /// Token issuer
    #[serde(default)]
    pub issuer: String,
    /// JWKS endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
}
