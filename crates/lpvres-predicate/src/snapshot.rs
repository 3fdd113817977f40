use crate::accessor::{AccessError, AccessResult, ResourceAccessor};
use lpvres_core::resources::DEFAULT_NAMESPACE;
use lpvres_core::{Node, PersistentVolume, PersistentVolumeClaim, Pod};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Immutable, indexed copy of the cluster objects the predicate reads
///
/// Every object is held behind an `Arc`, so handing one to a caller never
/// copies it and never lets the caller change what another request sees.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    nodes: BTreeMap<String, Arc<Node>>,
    pods_by_namespace: BTreeMap<String, Vec<Arc<Pod>>>,
    volumes: BTreeMap<String, Arc<PersistentVolume>>,
    claims: BTreeMap<(String, String), Arc<PersistentVolumeClaim>>,
}

impl ClusterSnapshot {
    /// Index the given objects. Objects without a name are dropped.
    pub fn new(
        nodes: Vec<Node>,
        pods: Vec<Pod>,
        volumes: Vec<PersistentVolume>,
        claims: Vec<PersistentVolumeClaim>,
    ) -> Self {
        let mut snapshot = Self::default();

        for node in nodes {
            match node.metadata.name.clone() {
                Some(name) => {
                    snapshot.nodes.insert(name, Arc::new(node));
                }
                None => warn!("Skipping node without a name"),
            }
        }

        for pod in pods {
            if pod.metadata.name.is_none() {
                warn!("Skipping pod without a name");
                continue;
            }
            let namespace = namespace_of(pod.metadata.namespace.as_deref());
            snapshot
                .pods_by_namespace
                .entry(namespace)
                .or_default()
                .push(Arc::new(pod));
        }

        for volume in volumes {
            match volume.metadata.name.clone() {
                Some(name) => {
                    snapshot.volumes.insert(name, Arc::new(volume));
                }
                None => warn!("Skipping persistent volume without a name"),
            }
        }

        for claim in claims {
            let Some(name) = claim.metadata.name.clone() else {
                warn!("Skipping persistent volume claim without a name");
                continue;
            };
            let namespace = namespace_of(claim.metadata.namespace.as_deref());
            snapshot.claims.insert((namespace, name), Arc::new(claim));
        }

        snapshot
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn pod_count(&self) -> usize {
        self.pods_by_namespace.values().map(Vec::len).sum()
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }
}

fn namespace_of(namespace: Option<&str>) -> String {
    namespace.unwrap_or(DEFAULT_NAMESPACE).to_string()
}

impl ResourceAccessor for ClusterSnapshot {
    fn list_pods(&self) -> AccessResult<Vec<Arc<Pod>>> {
        Ok(self.pods_by_namespace.values().flatten().cloned().collect())
    }

    fn list_pods_in_namespace(&self, namespace: &str) -> AccessResult<Vec<Arc<Pod>>> {
        Ok(self
            .pods_by_namespace
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    fn get_persistent_volume(&self, name: &str) -> AccessResult<Arc<PersistentVolume>> {
        self.volumes
            .get(name)
            .cloned()
            .ok_or_else(|| AccessError::not_found("PersistentVolume", name))
    }

    fn list_persistent_volumes(&self) -> AccessResult<Vec<Arc<PersistentVolume>>> {
        Ok(self.volumes.values().cloned().collect())
    }

    fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> AccessResult<Arc<PersistentVolumeClaim>> {
        self.claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                AccessError::not_found("PersistentVolumeClaim", format!("{}/{}", namespace, name))
            })
    }

    fn get_node(&self, name: &str) -> AccessResult<Arc<Node>> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| AccessError::not_found("Node", name))
    }
}
