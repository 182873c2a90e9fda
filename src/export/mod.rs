//! Partitioned export
//!
//! This module executes a partition manifest:
//! - Concurrent workers draining a shared queue of partitions
//! - Cooperative cancellation on the first unrecoverable failure
//! - Progress tracking with real-time feedback
//! - Pluggable partition writers (JSON Lines files, in-memory)
//!
//! # Architecture
//!
//! The export system is built on three main components:
//!
//! 1. **PartitionExporter**: selects partitions and runs the worker pool
//! 2. **ProgressTracker**: counts exported documents across workers
//! 3. **PartitionWriter**: persists the pages of one partition
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mongodb::bson::doc;
//! use partition_export::client::{IndexSchema, MemoryIndexClient};
//! use partition_export::domain::IntegerDomain;
//! use partition_export::export::{ExportOptions, MemoryPartitionWriter, PartitionExporter};
//! use partition_export::partition::plan_partitions;
//!
//! # tokio_test::block_on(async {
//! let docs = (0..40_i64).map(|n| doc! { "id": n, "n": n }).collect();
//! let client = Arc::new(MemoryIndexClient::new("numbers", docs));
//! let manifest = plan_partitions(client.as_ref(), "n", &IntegerDomain, 10).await.unwrap();
//!
//! let writer = Arc::new(MemoryPartitionWriter::new("id"));
//! let exporter = PartitionExporter::new(client, writer.clone(), IndexSchema::default());
//! let summary = exporter.export(&manifest, &ExportOptions::default()).await.unwrap();
//!
//! assert_eq!(summary.documents_exported, 40);
//! assert_eq!(writer.document_count(), 40);
//! # });
//! ```

pub mod exporter;
pub mod progress;
pub mod writers;

pub use exporter::{ExportOptions, ExportSummary, PartitionExporter, PartitionToExport};
pub use progress::{ProgressTracker, TrackedPages};
pub use writers::{FilePartitionWriter, MemoryPartitionWriter, PartitionWriter};
