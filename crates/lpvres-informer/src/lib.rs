//! lpvres Informer - Keeps an in-memory copy of the cluster objects
//!
//! This crate provides:
//! - A read-only API server client and a snapshot-file source
//! - A shared cache holding the latest immutable snapshot
//! - A syncer task refreshing the cache on an interval

pub mod api_client;
pub mod cache;
pub mod error;
pub mod snapshot_file;
pub mod source;
pub mod syncer;

// Re-export commonly used types
pub use api_client::{ApiClient, ClusterConnection};
pub use cache::ClusterCache;
pub use error::{InformerError, Result};
pub use snapshot_file::{SnapshotDocument, SnapshotFile};
pub use source::ClusterSource;
pub use syncer::{CacheSyncer, CacheSyncerConfig};
