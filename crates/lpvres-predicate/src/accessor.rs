// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use lpvres_core::{Node, PersistentVolume, PersistentVolumeClaim, Pod};
use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by the data-access layer
#[derive(Error, Debug, Diagnostic)]
pub enum AccessError {
    /// The requested object does not exist
    #[error("{kind} {name} not found")]
    #[diagnostic(
        code(access::not_found),
        help("The object may have been deleted or not yet synced into the cache")
    )]
    NotFound { kind: &'static str, name: String },

    /// The backing store failed
    #[error("Backend error: {message}")]
    #[diagnostic(
        code(access::backend_error),
        help("Check connectivity to the Kubernetes API server")
    )]
    Backend { message: String },
}

/// Result type for data-access operations
pub type AccessResult<T> = std::result::Result<T, AccessError>;

impl AccessError {
    /// Create a NotFound error
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Whether this error only reports an absent object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Turn "not found" into `None`, keeping every other error
pub trait OptionalExt<T> {
    fn optional(self) -> AccessResult<Option<T>>;
}

impl<T> OptionalExt<T> for AccessResult<T> {
    fn optional(self) -> AccessResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Read-only view of cluster state consumed by the predicate
///
/// Reads are synchronous and expected to be served from memory. Returned
/// objects are shared immutable snapshots.
pub trait ResourceAccessor: Send + Sync {
    /// List every pod in the cluster
    fn list_pods(&self) -> AccessResult<Vec<Arc<Pod>>>;

    /// List the pods of one namespace
    fn list_pods_in_namespace(&self, namespace: &str) -> AccessResult<Vec<Arc<Pod>>>;

    /// Get a persistent volume by name
    fn get_persistent_volume(&self, name: &str) -> AccessResult<Arc<PersistentVolume>>;

    /// List every persistent volume
    fn list_persistent_volumes(&self) -> AccessResult<Vec<Arc<PersistentVolume>>>;

    /// Get a persistent volume claim by namespace and name
    fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> AccessResult<Arc<PersistentVolumeClaim>>;

    /// Get a node by name
    fn get_node(&self, name: &str) -> AccessResult<Arc<Node>>;
}

impl<A: ResourceAccessor + ?Sized> ResourceAccessor for Arc<A> {
    fn list_pods(&self) -> AccessResult<Vec<Arc<Pod>>> {
        (**self).list_pods()
    }

    fn list_pods_in_namespace(&self, namespace: &str) -> AccessResult<Vec<Arc<Pod>>> {
        (**self).list_pods_in_namespace(namespace)
    }

    fn get_persistent_volume(&self, name: &str) -> AccessResult<Arc<PersistentVolume>> {
        (**self).get_persistent_volume(name)
    }

    fn list_persistent_volumes(&self) -> AccessResult<Vec<Arc<PersistentVolume>>> {
        (**self).list_persistent_volumes()
    }

    fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> AccessResult<Arc<PersistentVolumeClaim>> {
        (**self).get_persistent_volume_claim(namespace, name)
    }

    fn get_node(&self, name: &str) -> AccessResult<Arc<Node>> {
        (**self).get_node(name)
    }
}
