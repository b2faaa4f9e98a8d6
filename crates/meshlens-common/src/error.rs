//! Error types for the meshlens core
//!
//! Errors are structured with fields to aid debugging in production.
//! Each error variant includes contextual information like cluster names,
//! resource kinds, and underlying causes.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for meshlens operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A fetch task failed while loading one kind from one cluster
    #[error("fetch error [{cluster}/{kind}]: {message}")]
    Fetch {
        /// Cluster the task was fetching from
        cluster: String,
        /// Resource kind being fetched (e.g. "virtualservice")
        kind: String,
        /// Description of what failed
        message: String,
        /// Whether the kind was declared required by the caller's include set
        required: bool,
    },

    /// Caller requested a namespace it cannot see
    #[error("namespace {namespace} is not accessible in cluster {cluster}")]
    Forbidden {
        /// Cluster that was queried
        cluster: String,
        /// The inaccessible namespace
        namespace: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being decoded (if known)
        kind: Option<String>,
    },

    /// A validation pass was canceled or exceeded its outer deadline
    #[error("pass canceled [{context}]")]
    Canceled {
        /// Where the cancellation was observed (e.g. "fetch", "checkers")
        context: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "orchestrator", "cache")
        context: String,
    },
}

impl Error {
    /// Create a fetch error for a specific (cluster, kind) slot
    pub fn fetch_for(
        cluster: impl Into<String>,
        kind: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Fetch {
            cluster: cluster.into(),
            kind: kind.into(),
            message: msg.into(),
            required: false,
        }
    }

    /// Create a fetch error for a kind the caller declared required
    pub fn fetch_required(
        cluster: impl Into<String>,
        kind: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Fetch {
            cluster: cluster.into(),
            kind: kind.into(),
            message: msg.into(),
            required: true,
        }
    }

    /// Create a visibility error for a namespace the caller cannot see
    pub fn forbidden(cluster: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::Forbidden {
            cluster: cluster.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a cancellation error observed in the given context
    pub fn canceled(context: impl Into<String>) -> Self {
        Self::Canceled {
            context: context.into(),
        }
    }

    /// Create an internal error with the given message
    ///
    /// For simple internal errors without specific context.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Fetch errors are transient (network, apiserver load) and retryable.
    /// Kubernetes errors depend on the status code: 4xx responses mean the
    /// request itself is wrong and will not succeed on retry.
    /// Visibility and serialization errors require caller/config fixes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Fetch { .. } => true,
            Error::Forbidden { .. } => false,
            Error::Serialization { .. } => false,
            Error::Canceled { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the cluster name if this error is associated with a specific cluster
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::Fetch { cluster, .. } => Some(cluster),
            Error::Forbidden { cluster, .. } => Some(cluster),
            _ => None,
        }
    }

    /// Whether this error must abort the validation pass.
    ///
    /// Only fetch failures of required kinds and visibility errors are fatal;
    /// everything else degrades to a partial result.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Fetch { required, .. } => *required,
            Error::Forbidden { .. } => true,
            Error::Canceled { .. } => true,
            _ => false,
        }
    }
}
