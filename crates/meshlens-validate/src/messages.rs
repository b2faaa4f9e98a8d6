//! Message catalog
//!
//! Every check code emitted anywhere in the engine resolves here to its
//! default severity and localized message. Codes are stable identifiers:
//! downstream consoles key ignore-lists and documentation links off them,
//! so a code is never renamed, only deprecated.

use crate::models::Severity;

/// One catalog entry
#[derive(Clone, Copy, Debug)]
pub struct CheckDescriptor {
    /// Stable check code
    pub code: &'static str,
    /// Default severity; checkers may override per finding
    pub severity: Severity,
    /// Human-readable message
    pub message: &'static str,
}

/// The full catalog, grouped by checker
pub const CATALOG: &[CheckDescriptor] = &[
    // VirtualService
    CheckDescriptor {
        code: "vs.nohost.hostnotfound",
        severity: Severity::Error,
        message: "DestinationWeight on route doesn't have a valid service (host not found)",
    },
    CheckDescriptor {
        code: "vs.nogateway",
        severity: Severity::Error,
        message: "VirtualService is pointing to a non-existent gateway",
    },
    CheckDescriptor {
        code: "vs.subsetpresent",
        severity: Severity::Warning,
        message: "VirtualService references a subset not defined in any DestinationRule",
    },
    CheckDescriptor {
        code: "vs.singlehost",
        severity: Severity::Warning,
        message: "More than one Virtual Service for the same host",
    },
    // Common exportTo
    CheckDescriptor {
        code: "generic.exportto.namespacenotfound",
        severity: Severity::Error,
        message: "Namespace in exportTo is not found",
    },
    // DestinationRule
    CheckDescriptor {
        code: "dr.nodest.matchingregistry",
        severity: Severity::Error,
        message: "This host has no matching entry in the service registry",
    },
    CheckDescriptor {
        code: "dr.nodest.subsetlabels",
        severity: Severity::Error,
        message: "This subset's labels are not found in any matching host",
    },
    CheckDescriptor {
        code: "dr.nodest.subsetnolabels",
        severity: Severity::Warning,
        message: "This subset has no labels",
    },
    CheckDescriptor {
        code: "dr.noserviceport",
        severity: Severity::Error,
        message: "This port is not found on the destination service",
    },
    CheckDescriptor {
        code: "dr.trafficpolicy.notlssettings",
        severity: Severity::Warning,
        message: "mTLS settings of a non-local Destination Rule are overridden",
    },
    CheckDescriptor {
        code: "dr.mtls.meshpolicymtlsenabled",
        severity: Severity::Error,
        message: "PeerAuthentication enables mesh-wide mTLS, but this DestinationRule disables it",
    },
    CheckDescriptor {
        code: "dr.mtls.policymtlsenabled",
        severity: Severity::Error,
        message: "PeerAuthentication enables namespace-wide mTLS, but this DestinationRule disables it",
    },
    // Gateway (Istio)
    CheckDescriptor {
        code: "gateway.multimatch",
        severity: Severity::Warning,
        message: "More than one Gateway for the same host port combination",
    },
    CheckDescriptor {
        code: "gateway.selector.workloadnotfound",
        severity: Severity::Warning,
        message: "No matching workload found for gateway selector in this namespace",
    },
    CheckDescriptor {
        code: "gateway.port.invalidprotocol",
        severity: Severity::Error,
        message: "Gateway server protocol is not recognized",
    },
    // ServiceEntry
    CheckDescriptor {
        code: "serviceentry.workloadentry.addressmatch",
        severity: Severity::Warning,
        message: "Missing one or more addresses from matching WorkloadEntries",
    },
    // Sidecar
    CheckDescriptor {
        code: "sidecar.egress.invalidhostformat",
        severity: Severity::Error,
        message: "Invalid host format. 'namespace/dnsName' format expected",
    },
    CheckDescriptor {
        code: "sidecar.egress.servicenotfound",
        severity: Severity::Warning,
        message: "Unable to find service denoted by this egress host",
    },
    // AuthorizationPolicy
    CheckDescriptor {
        code: "authorizationpolicy.nodest.matchingregistry",
        severity: Severity::Error,
        message: "This host has no matching entry in the service registry",
    },
    CheckDescriptor {
        code: "authorizationpolicy.source.principalnotfound",
        severity: Severity::Error,
        message: "This principal's service account is not found",
    },
    // PeerAuthentication
    CheckDescriptor {
        code: "peerauth.mtls.meshconflict",
        severity: Severity::Error,
        message: "Namespace-level mTLS mode conflicts with the mesh-wide PeerAuthentication",
    },
    CheckDescriptor {
        code: "peerauth.portmode.invalid",
        severity: Severity::Error,
        message: "Port-level mTLS configuration is invalid",
    },
    // RequestAuthentication
    CheckDescriptor {
        code: "requestauth.selector.workloadnotfound",
        severity: Severity::Warning,
        message: "No matching workload found for this selector",
    },
    CheckDescriptor {
        code: "requestauth.jwks.invaliduri",
        severity: Severity::Error,
        message: "JWKS URI is not well-formed",
    },
    // Gateway API
    CheckDescriptor {
        code: "k8sgateway.gatewayclassnotfound",
        severity: Severity::Error,
        message: "Gateway API Class not found in Istio Gateway API Classes",
    },
    CheckDescriptor {
        code: "k8sgateway.multimatch.listener",
        severity: Severity::Warning,
        message: "More than one Listener for the same host port combination",
    },
    CheckDescriptor {
        code: "k8sgateway.multimatch.address",
        severity: Severity::Warning,
        message: "More than one Gateway for the same address and type combination",
    },
    CheckDescriptor {
        code: "k8shttproute.nogateway",
        severity: Severity::Error,
        message: "Route is pointing to a non-existent K8s Gateway",
    },
    CheckDescriptor {
        code: "k8shttproute.nohost.namenotfound",
        severity: Severity::Error,
        message: "BackendRef on rule doesn't have a valid service (host not found)",
    },
    CheckDescriptor {
        code: "k8shttproute.nogrant",
        severity: Severity::Error,
        message: "Cross-namespace BackendRef has no covering ReferenceGrant",
    },
    // Internal
    CheckDescriptor {
        code: "internal.checker.failed",
        severity: Severity::Error,
        message: "An internal checker failed while validating this object",
    },
];

/// Resolve a code to its default severity and message.
///
/// Unregistered codes resolve to Unknown severity with the code itself as
/// the message; the catalog test keeps that path unreachable in practice.
pub fn lookup(code: &str) -> (Severity, &str) {
    CATALOG
        .iter()
        .find(|d| d.code == code)
        .map(|d| (d.severity, d.message))
        .unwrap_or((Severity::Unknown, code))
}
