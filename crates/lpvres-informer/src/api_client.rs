use crate::error::{InformerError, Result};
use lpvres_core::{Node, PersistentVolume, PersistentVolumeClaim, Pod};
use reqwest::{Certificate, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Service account mount used when running inside a pod
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how to reach the Kubernetes API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConnection {
    /// API server base URL, e.g. `https://10.0.0.1:6443`
    pub base_url: String,
    /// File holding a bearer token
    pub token_file: Option<PathBuf>,
    /// PEM bundle used to verify the API server certificate
    pub ca_file: Option<PathBuf>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ClusterConnection {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token_file: None,
            ca_file: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Connection settings of the pod this process runs in, if any
    ///
    /// Reads `KUBERNETES_SERVICE_HOST` and `KUBERNETES_SERVICE_PORT`, and uses
    /// the service account token and CA bundle when they are mounted.
    pub fn in_cluster() -> Option<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").ok()?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").ok()?;
        if host.is_empty() || port.is_empty() {
            return None;
        }

        let account = Path::new(SERVICE_ACCOUNT_DIR);
        let existing = |name: &str| Some(account.join(name)).filter(|p| p.exists());

        Some(Self {
            token_file: existing("token"),
            ca_file: existing("ca.crt"),
            ..Self::new(in_cluster_url(&host, &port))
        })
    }
}

fn in_cluster_url(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("https://[{}]:{}", host, port)
    } else {
        format!("https://{}:{}", host, port)
    }
}

/// Envelope of a Kubernetes list response
#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Read-only HTTP client listing the objects the predicate needs
pub struct ApiClient {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl ApiClient {
    /// Client without authentication, using the system trust roots
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            token: None,
        }
    }

    /// Build a client from connection settings, reading token and CA files
    pub fn connect(connection: &ClusterConnection) -> Result<Self> {
        if connection.base_url.is_empty() {
            return Err(InformerError::invalid_config(
                "API server URL is empty",
                "Pass --master or run inside a cluster",
            ));
        }

        let mut builder = Client::builder().timeout(connection.timeout);

        if let Some(ca_file) = &connection.ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| InformerError::io(ca_file, e))?;
            let certificate = Certificate::from_pem(&pem).map_err(|e| {
                InformerError::invalid_config(
                    format!("{} is not a PEM certificate: {}", ca_file.display(), e),
                    "Point --ca-file at the cluster CA bundle",
                )
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let token = match &connection.token_file {
            Some(token_file) => {
                let raw = std::fs::read_to_string(token_file)
                    .map_err(|e| InformerError::io(token_file, e))?;
                Some(raw.trim().to_string()).filter(|t| !t.is_empty())
            }
            None => None,
        };

        let client = builder
            .build()
            .map_err(|e| InformerError::http(&connection.base_url, e.to_string()))?;

        Ok(Self {
            base_url: connection.base_url.trim_end_matches('/').to_string(),
            client,
            token,
        })
    }

    /// GET /api/v1/nodes
    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list("/api/v1/nodes").await
    }

    /// GET /api/v1/pods
    pub async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.list("/api/v1/pods").await
    }

    /// GET /api/v1/persistentvolumes
    pub async fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>> {
        self.list("/api/v1/persistentvolumes").await
    }

    /// GET /api/v1/persistentvolumeclaims
    pub async fn list_persistent_volume_claims(&self) -> Result<Vec<PersistentVolumeClaim>> {
        self.list("/api/v1/persistentvolumeclaims").await
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| InformerError::http(&url, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(InformerError::unexpected_status(url, status.as_u16(), body));
        }

        let list = resp
            .json::<ObjectList<T>>()
            .await
            .map_err(|e| InformerError::decode(format!("list from {}", url), e.to_string()))?;
        Ok(list.items)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
