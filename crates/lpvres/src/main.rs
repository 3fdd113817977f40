use clap::{Args, Parser, Subcommand, ValueEnum};
use lpvres_informer::{
    ApiClient, CacheSyncer, CacheSyncerConfig, ClusterCache, ClusterConnection, ClusterSource,
    SnapshotFile,
};
use lpvres_predicate::config::{DEFAULT_RESERVED_CPU_ANNOTATION, DEFAULT_RESERVED_MEMORY_ANNOTATION};
use lpvres_predicate::{ExtenderArgs, ExtenderFilterResult, PredicateConfig, PredicateEngine};
use lpvres_server::{AppState, Config as ServerConfig, PredicateServer};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "lpvres",
    about = "Scheduler extender that honours cpu and memory reserved by local persistent volumes"
)]
struct Cli {
    /// Log output format
    #[arg(long, env = "LPVRES_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the extender filter endpoint
    Serve {
        /// Address to listen on
        #[arg(long, env = "LPVRES_LISTEN_ADDR", default_value = "0.0.0.0:8089")]
        listen_addr: SocketAddr,
        /// Seconds between full refreshes of the cluster cache
        #[arg(
            long,
            env = "LPVRES_RESYNC_INTERVAL",
            default_value_t = 30,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        resync_interval: u64,
        #[command(flatten)]
        cluster: ClusterArgs,
        #[command(flatten)]
        predicate: PredicateArgs,
    },
    /// Evaluate one filter request against a snapshot file and print the result
    Filter {
        /// JSON file holding the extender request
        #[arg(long)]
        request: PathBuf,
        /// YAML or JSON snapshot of the cluster objects
        #[arg(long, env = "LPVRES_SNAPSHOT_FILE")]
        snapshot_file: PathBuf,
        #[command(flatten)]
        predicate: PredicateArgs,
    },
}

/// Where cluster objects come from
#[derive(Args, Debug, Clone, Default)]
struct ClusterArgs {
    /// Kubernetes API server URL; defaults to the in-cluster service
    #[arg(long, env = "LPVRES_MASTER")]
    master: Option<String>,
    /// File holding the bearer token for the API server
    #[arg(long, env = "LPVRES_TOKEN_FILE")]
    token_file: Option<PathBuf>,
    /// PEM bundle used to verify the API server certificate
    #[arg(long, env = "LPVRES_CA_FILE")]
    ca_file: Option<PathBuf>,
    /// Read cluster objects from a YAML or JSON file instead of the API server
    #[arg(long, env = "LPVRES_SNAPSHOT_FILE", conflicts_with = "master")]
    snapshot_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct PredicateArgs {
    /// Annotation declaring the cpu reserved by a local volume
    #[arg(long, env = "LPVRES_RESERVED_CPU_ANNOTATION", default_value = DEFAULT_RESERVED_CPU_ANNOTATION)]
    reserved_cpu_annotation: String,
    /// Annotation declaring the memory reserved by a local volume
    #[arg(long, env = "LPVRES_RESERVED_MEMORY_ANNOTATION", default_value = DEFAULT_RESERVED_MEMORY_ANNOTATION)]
    reserved_memory_annotation: String,
    /// Count reservations of local volumes that are not bound yet
    #[arg(
        long,
        env = "LPVRES_CONSIDER_UNBOUND_LOCAL_PV",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    consider_unbound_local_pv: bool,
}

impl PredicateArgs {
    fn into_config(self) -> PredicateConfig {
        PredicateConfig {
            reserved_cpu_annotation: self.reserved_cpu_annotation,
            reserved_memory_annotation: self.reserved_memory_annotation,
            consider_unbound_local_pv: self.consider_unbound_local_pv,
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    match cli.command {
        Commands::Serve {
            listen_addr,
            resync_interval,
            cluster,
            predicate,
        } => {
            run_serve(
                listen_addr,
                Duration::from_secs(resync_interval),
                &cluster,
                predicate.into_config(),
            )
            .await
        }
        Commands::Filter {
            request,
            snapshot_file,
            predicate,
        } => run_filter(&request, &snapshot_file, predicate.into_config()).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Pick the source the cache is filled from
///
/// A snapshot file wins, then an explicit master, then the in-cluster
/// service. Token and CA files given on the command line override the
/// service account defaults.
fn resolve_source(
    cluster: &ClusterArgs,
    in_cluster: Option<ClusterConnection>,
) -> miette::Result<Arc<dyn ClusterSource>> {
    if let Some(path) = &cluster.snapshot_file {
        return Ok(Arc::new(SnapshotFile::new(path)));
    }

    let connection = match (&cluster.master, in_cluster) {
        (Some(master), _) => ClusterConnection {
            token_file: cluster.token_file.clone(),
            ca_file: cluster.ca_file.clone(),
            ..ClusterConnection::new(master.as_str())
        },
        (None, Some(detected)) => ClusterConnection {
            token_file: cluster.token_file.clone().or(detected.token_file),
            ca_file: cluster.ca_file.clone().or(detected.ca_file),
            ..detected
        },
        (None, None) => {
            return Err(miette::miette!(
                help = "pass --master, --snapshot-file, or run inside a pod",
                "No cluster source configured"
            ))
        }
    };

    Ok(Arc::new(ApiClient::connect(&connection)?))
}

/// Run the cache syncer and the extender server until ctrl-c
async fn run_serve(
    listen_addr: SocketAddr,
    resync_interval: Duration,
    cluster: &ClusterArgs,
    config: PredicateConfig,
) -> miette::Result<()> {
    let source = resolve_source(cluster, ClusterConnection::in_cluster())?;
    info!("Starting lpvres with cluster source {}", source.describe());
    info!(
        "Reservation annotations: cpu={}, memory={}, consider unbound local pv: {}",
        config.reserved_cpu_annotation,
        config.reserved_memory_annotation,
        config.consider_unbound_local_pv
    );

    let engine = Arc::new(PredicateEngine::new(config));
    let cache = Arc::new(ClusterCache::new());
    let token = CancellationToken::new();

    // 1. Spawn cache syncer
    let syncer = CacheSyncer::new(source, cache.clone(), CacheSyncerConfig { resync_interval });
    let syncer_token = token.clone();
    let syncer_handle = tokio::spawn(async move {
        if let Err(e) = syncer.run(syncer_token).await {
            error!("Cache syncer error: {}", e);
        }
    });

    // 2. Spawn extender server
    let server = PredicateServer::new(
        ServerConfig { listen_addr },
        Arc::new(AppState::new(engine, cache)),
    );
    let server_token = token.clone();
    let mut server_handle = tokio::spawn(async move { server.run(server_token).await });

    info!("All components started. Extender on {}", listen_addr);

    // Wait for shutdown signal, or the server giving up on its own
    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;
            None
        }
        result = &mut server_handle => Some(result),
    };

    info!("Shutting down gracefully...");
    token.cancel();

    if let Some(result) = server_result {
        let _ = tokio::time::timeout(Duration::from_secs(5), syncer_handle).await;
        return match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(miette::miette!("Predicate server error: {}", e)),
            Err(e) => Err(miette::miette!("Predicate server task failed: {}", e)),
        };
    }

    // Wait for all tasks to finish with a timeout
    let shutdown_timeout = Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(server_handle, syncer_handle);
    })
    .await;

    info!("Shutdown complete");

    Ok(())
}

/// Evaluate the request in `request` against the objects in `snapshot_file`
async fn evaluate_request(
    request: &Path,
    snapshot_file: &Path,
    config: PredicateConfig,
) -> miette::Result<ExtenderFilterResult> {
    let data = tokio::fs::read_to_string(request)
        .await
        .map_err(|e| miette::miette!("Failed to read request {}: {}", request.display(), e))?;
    let args: ExtenderArgs = lpvres_core::from_json(&data)?;
    let snapshot = SnapshotFile::new(snapshot_file).load().await?;

    Ok(PredicateEngine::new(config).filter(&snapshot, &args))
}

async fn run_filter(
    request: &Path,
    snapshot_file: &Path,
    config: PredicateConfig,
) -> miette::Result<()> {
    let result = evaluate_request(request, snapshot_file, config).await?;
    println!("{}", lpvres_core::to_json(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    const SNAPSHOT: &str = r#"
nodes:
  - metadata:
      name: node1
      labels:
        nodeName: node1
    status:
      allocatable:
        cpu: "8"
        memory: 10G
persistentVolumes:
  - metadata:
      name: pv1
      annotations:
        reserved-cpu: "4"
        reserved-mem: 1G
    spec:
      local:
        path: /mnt/disk1
      nodeAffinity:
        required:
          nodeSelectorTerms:
            - matchExpressions:
                - key: nodeName
                  operator: In
                  values: [node1]
    status:
      phase: Available
"#;

    fn request(cpu: &str) -> String {
        format!(
            r#"{{
  "pod": {{
    "metadata": {{"name": "pod1", "namespace": "test"}},
    "spec": {{"containers": [{{"name": "app", "resources": {{"requests": {{"cpu": "{}", "memory": "1G"}}}}}}]}}
  }},
  "nodenames": ["node1", "node2"]
}}"#,
            cpu
        )
    }

    fn temp_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("lpvres").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let cli = parse(&["serve", "--master", "http://127.0.0.1:8080"]);
        assert_eq!(cli.log_format, LogFormat::Text);
        let Commands::Serve {
            listen_addr,
            resync_interval,
            cluster,
            predicate,
        } = cli.command
        else {
            panic!("expected serve");
        };

        assert_eq!(listen_addr.to_string(), "0.0.0.0:8089");
        assert_eq!(resync_interval, 30);
        assert_eq!(cluster.master.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(predicate.into_config(), PredicateConfig::default());
    }

    #[test]
    fn test_serve_overrides() {
        let cli = parse(&[
            "serve",
            "--listen-addr",
            "127.0.0.1:9000",
            "--resync-interval",
            "5",
            "--reserved-cpu-annotation",
            "example.com/cpu",
            "--consider-unbound-local-pv",
            "false",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Serve {
            listen_addr,
            resync_interval,
            predicate,
            ..
        } = cli.command
        else {
            panic!("expected serve");
        };

        assert_eq!(listen_addr.port(), 9000);
        assert_eq!(resync_interval, 5);
        let config = predicate.into_config();
        assert_eq!(config.reserved_cpu_annotation, "example.com/cpu");
        assert_eq!(config.reserved_memory_annotation, "reserved-mem");
        assert!(!config.consider_unbound_local_pv);
    }

    #[test]
    fn test_serve_rejects_zero_interval() {
        let result = Cli::try_parse_from(["lpvres", "serve", "--resync-interval", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_master_conflicts_with_snapshot_file() {
        let result = Cli::try_parse_from([
            "lpvres",
            "serve",
            "--master",
            "http://127.0.0.1:8080",
            "--snapshot-file",
            "cluster.yaml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_snapshot_file() {
        let cluster = ClusterArgs {
            snapshot_file: Some(PathBuf::from("/tmp/cluster.yaml")),
            ..Default::default()
        };
        let source = resolve_source(&cluster, None).unwrap();
        assert_eq!(source.describe(), "snapshot file /tmp/cluster.yaml");
    }

    #[test]
    fn test_resolve_master_over_in_cluster() {
        let cluster = ClusterArgs {
            master: Some("http://127.0.0.1:8080".to_string()),
            ..Default::default()
        };
        let detected = ClusterConnection::new("https://10.0.0.1:443");
        let source = resolve_source(&cluster, Some(detected)).unwrap();
        assert!(source.describe().contains("http://127.0.0.1:8080"));
    }

    #[test]
    fn test_resolve_in_cluster() {
        let detected = ClusterConnection::new("https://10.0.0.1:443");
        let source = resolve_source(&ClusterArgs::default(), Some(detected)).unwrap();
        assert!(source.describe().contains("https://10.0.0.1:443"));
    }

    #[test]
    fn test_resolve_without_source_fails() {
        let result = resolve_source(&ClusterArgs::default(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_missing_token_file_fails() {
        let cluster = ClusterArgs {
            master: Some("http://127.0.0.1:8080".to_string()),
            token_file: Some(PathBuf::from("/nonexistent/lpvres/token")),
            ..Default::default()
        };
        assert!(resolve_source(&cluster, None).is_err());
    }

    #[tokio::test]
    async fn test_evaluate_request() {
        let snapshot = temp_file(SNAPSHOT);

        // 8 cpu minus the 4 reserved by the unbound volume
        let fits = temp_file(&request("2"));
        let result = evaluate_request(fits.path(), snapshot.path(), PredicateConfig::default())
            .await
            .unwrap();
        assert_eq!(result.node_names, Some(vec!["node1".to_string()]));
        assert_eq!(result.failed_nodes.get("node2").unwrap(), "node node2 not found");

        let too_big = temp_file(&request("5"));
        let result = evaluate_request(too_big.path(), snapshot.path(), PredicateConfig::default())
            .await
            .unwrap();
        assert_eq!(
            result.failed_nodes.get("node1").unwrap(),
            "cpu not enough after reserving for local persistent volume"
        );

        let config = PredicateConfig {
            consider_unbound_local_pv: false,
            ..Default::default()
        };
        let result = evaluate_request(too_big.path(), snapshot.path(), config)
            .await
            .unwrap();
        assert_eq!(result.node_names, Some(vec!["node1".to_string()]));
    }

    #[tokio::test]
    async fn test_evaluate_rejects_bad_request() {
        let snapshot = temp_file(SNAPSHOT);
        let request = temp_file("{not json");
        let result =
            evaluate_request(request.path(), snapshot.path(), PredicateConfig::default()).await;
        assert!(result.is_err());
    }
}
