//! Partitioned export of large search indexes
//!
//! Indexes backed by a search service can only return a bounded number of
//! results per query (the result window). This library exports such an index
//! completely by splitting the range of an ordering field into partitions
//! whose document counts stay under a limit, then fetching the partitions
//! concurrently.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `client`: The index client seam, with MongoDB and in-memory backends
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management
//! - `domain`: Ordering domains of partition fields
//! - `error`: Error types and handling
//! - `export`: Concurrent partition export and writers
//! - `filter`: Range filter expressions
//! - `partition`: Bound finder, partition generator and manifest
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use partition_export::client::{IndexSchema, MongoIndexClient};
//! use partition_export::domain::TimestampDomain;
//! use partition_export::export::{ExportOptions, FilePartitionWriter, PartitionExporter};
//! use partition_export::partition::plan_partitions;
//! use partition_export::{Config, ConnectionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.source.database = "search".into();
//!     config.source.index_name = "articles".into();
//!
//!     let mut manager = ConnectionManager::new(config.source.clone());
//!     manager.connect().await?;
//!
//!     let client = Arc::new(MongoIndexClient::new(
//!         manager.index_collection()?,
//!         manager.redacted_endpoint(),
//!         config.source.max_result_window,
//!     ));
//!     let manifest = plan_partitions(client.as_ref(), "published", &TimestampDomain, 50_000).await?;
//!
//!     let writer = Arc::new(FilePartitionWriter::new("export", "articles"));
//!     PartitionExporter::new(client, writer, IndexSchema::default())
//!         .export(&manifest, &ExportOptions::default())
//!         .await?;
//!
//!     manager.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod export;
pub mod filter;
pub mod partition;

// Re-export commonly used types
pub use client::{IndexClient, MemoryIndexClient, MongoIndexClient, RetryingClient};
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{ExportError, Result};
pub use export::{ExportOptions, PartitionExporter, PartitionWriter};
pub use partition::{Partition, PartitionManifest, plan_partitions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
