use crate::api_client::ApiClient;
use crate::error::Result;
use crate::snapshot_file::SnapshotFile;
use async_trait::async_trait;
use lpvres_predicate::ClusterSnapshot;

/// Somewhere a complete, consistent view of the cluster can be read from
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Read the current cluster state
    async fn fetch_snapshot(&self) -> Result<ClusterSnapshot>;

    /// Human readable origin, for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl ClusterSource for ApiClient {
    async fn fetch_snapshot(&self) -> Result<ClusterSnapshot> {
        let (nodes, pods, volumes, claims) = tokio::try_join!(
            self.list_nodes(),
            self.list_pods(),
            self.list_persistent_volumes(),
            self.list_persistent_volume_claims(),
        )?;
        Ok(ClusterSnapshot::new(nodes, pods, volumes, claims))
    }

    fn describe(&self) -> String {
        format!("API server {}", self.base_url())
    }
}

#[async_trait]
impl ClusterSource for SnapshotFile {
    async fn fetch_snapshot(&self) -> Result<ClusterSnapshot> {
        self.load().await
    }

    fn describe(&self) -> String {
        format!("snapshot file {}", self.path().display())
    }
}
