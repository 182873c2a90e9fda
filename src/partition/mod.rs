//! Partition planning
//!
//! This module turns an index into a partition manifest:
//! - [`bounds`]: binary search for the smallest and largest ordering values
//! - [`generator`]: adaptive subdivision of that range by document count
//! - [`manifest`]: the serialized partition list consumed by the exporter
//!
//! # Example
//!
//! ```rust
//! use mongodb::bson::doc;
//! use partition_export::client::MemoryIndexClient;
//! use partition_export::domain::IntegerDomain;
//! use partition_export::partition::plan_partitions;
//!
//! # tokio_test::block_on(async {
//! let docs = (0..100_i64).map(|n| doc! { "n": n }).collect();
//! let client = MemoryIndexClient::new("numbers", docs);
//!
//! let manifest = plan_partitions(&client, "n", &IntegerDomain, 30).await.unwrap();
//! assert_eq!(manifest.total_document_count, 100);
//! assert!(manifest.partitions.iter().all(|p| p.document_count <= 30));
//! # });
//! ```

use tracing::{info, warn};

use crate::client::IndexClient;
use crate::domain::OrderingDomain;
use crate::error::Result;

pub mod bounds;
pub mod generator;
pub mod manifest;

pub use bounds::{Bounds, find_bounds, find_lower_bound, find_upper_bound};
pub use generator::generate_partitions;
pub use manifest::{Partition, PartitionManifest};

/// Find the bounds of `field` and partition the index
///
/// An empty index yields a manifest without partitions.
///
/// # Arguments
/// * `client` - Index to plan
/// * `field` - Ordering field
/// * `domain` - Ordering strategy of the field's kind
/// * `max_partition_size` - Largest document count per partition
///
/// # Returns
/// * `Result<PartitionManifest>` - Manifest ready to be saved
pub async fn plan_partitions(
    client: &dyn IndexClient,
    field: &str,
    domain: &dyn OrderingDomain,
    max_partition_size: u64,
) -> Result<PartitionManifest> {
    let endpoint = client.endpoint();
    let index_name = client.index_name();

    let Some(bounds) = find_bounds(client, field, domain).await? else {
        info!("Index '{}' has nothing to export", index_name);
        return Ok(PartitionManifest::new(endpoint, index_name, field, Vec::new()));
    };
    info!(
        "Ordering field '{}' spans [{}, {}]",
        field, bounds.lower, bounds.upper
    );

    let partitions = generate_partitions(
        client,
        field,
        domain,
        &bounds.lower,
        &bounds.upper,
        max_partition_size,
    )
    .await?;
    let manifest = PartitionManifest::new(endpoint, index_name, field, partitions);

    let total = client.count(None).await?;
    if total != manifest.total_document_count {
        warn!(
            "Partitions hold {} documents but the index holds {}; documents without a {} value in '{}' are not exported",
            manifest.total_document_count,
            total,
            domain.kind(),
            field
        );
    }

    let oversized = manifest.oversized_count();
    if oversized > 0 {
        warn!(
            "{} partition(s) exceed {} documents and may not be retrievable in full",
            oversized, max_partition_size
        );
    }

    info!(
        "Generated {} partitions holding {} documents",
        manifest.partitions.len(),
        manifest.total_document_count
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryIndexClient;
    use crate::domain::{Bound, IntegerDomain};
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_plan_empty_index() {
        let client = MemoryIndexClient::new("empty", vec![]);
        let manifest = plan_partitions(&client, "n", &IntegerDomain, 10).await.unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.total_document_count, 0);
        assert_eq!(manifest.index_name, "empty");
    }

    #[tokio::test]
    async fn test_plan_ignores_documents_without_field() {
        let mut docs: Vec<_> = (0..20_i64).map(|n| doc! { "n": n }).collect();
        docs.push(doc! { "other": true });
        let client = MemoryIndexClient::new("mixed", docs);

        let manifest = plan_partitions(&client, "n", &IntegerDomain, 5).await.unwrap();
        assert_eq!(manifest.total_document_count, 20);
        assert!(manifest.validate().is_ok());
        assert!(manifest.partitions[0].filter.contains(&Bound::Integer(0)));
    }
}
