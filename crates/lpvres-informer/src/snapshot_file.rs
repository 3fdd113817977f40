use crate::error::{InformerError, Result};
use lpvres_core::{Node, PersistentVolume, PersistentVolumeClaim, Pod};
use lpvres_predicate::ClusterSnapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk description of cluster state
///
/// Any of the lists may be omitted. JSON documents are accepted as well,
/// since they are valid YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub persistent_volumes: Vec<PersistentVolume>,
    #[serde(default)]
    pub persistent_volume_claims: Vec<PersistentVolumeClaim>,
}

impl SnapshotDocument {
    pub fn parse(data: &str) -> Result<Self> {
        Ok(lpvres_core::from_yaml(data)?)
    }

    pub fn into_snapshot(self) -> ClusterSnapshot {
        ClusterSnapshot::new(
            self.nodes,
            self.pods,
            self.persistent_volumes,
            self.persistent_volume_claims,
        )
    }
}

/// Cluster state loaded from a file, re-read on every fetch
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file
    pub async fn load(&self) -> Result<ClusterSnapshot> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| InformerError::io(&self.path, e))?;
        let document = SnapshotDocument::parse(&data)?;
        debug!(
            "Loaded {} node(s), {} pod(s), {} volume(s), {} claim(s) from {}",
            document.nodes.len(),
            document.pods.len(),
            document.persistent_volumes.len(),
            document.persistent_volume_claims.len(),
            self.path.display()
        );
        Ok(document.into_snapshot())
    }
}
