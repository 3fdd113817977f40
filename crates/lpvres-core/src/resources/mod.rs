pub mod quantity;
pub mod selector;

pub use quantity::{Quantity, QuantityFormat, Subtraction};
pub use selector::{node_matches_selector_terms, CompiledLabelSelector};

use k8s_openapi::api::core::v1::Pod;

/// Namespace assumed for objects that do not carry one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Summed cpu and memory requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceTotals {
    pub cpu: Quantity,
    pub memory: Quantity,
}

/// Total cpu and memory requested by a pod's containers
///
/// Missing or malformed requests count as zero.
pub fn pod_requests(pod: &Pod) -> ResourceTotals {
    let containers = pod.spec.iter().flat_map(|spec| spec.containers.iter());

    containers.fold(ResourceTotals::default(), |totals, container| {
        let requests = container
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref());
        ResourceTotals {
            cpu: totals.cpu + Quantity::from_resource_map(requests, "cpu"),
            memory: totals.memory + Quantity::from_resource_map(requests, "memory"),
        }
    })
}

/// Namespace of a pod, falling back to `default`
pub fn pod_namespace(pod: &Pod) -> &str {
    pod.metadata
        .namespace
        .as_deref()
        .unwrap_or(DEFAULT_NAMESPACE)
}

/// Names of the persistent volume claims a pod mounts, in volume order
pub fn claim_names(pod: &Pod) -> impl Iterator<Item = &str> {
    pod.spec
        .iter()
        .flat_map(|spec| spec.volumes.iter().flatten())
        .filter_map(|volume| volume.persistent_volume_claim.as_ref())
        .map(|source| source.claim_name.as_str())
}
