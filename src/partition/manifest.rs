//! Partition manifest
//!
//! The manifest is the hand-off between partition generation and export. It
//! is written once as JSON and then only read; a partition's position in the
//! list is its id.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ManifestError, Result};
use crate::filter::RangeFilter;

/// A range of the ordering field and the number of documents in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub filter: RangeFilter,
    pub document_count: u64,
    /// The range could not be split below the size limit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub oversized: bool,
}

impl Partition {
    pub fn new(filter: RangeFilter, document_count: u64) -> Self {
        Self {
            filter,
            document_count,
            oversized: false,
        }
    }

    pub fn oversized(filter: RangeFilter, document_count: u64) -> Self {
        Self {
            filter,
            document_count,
            oversized: true,
        }
    }
}

/// Index identity and its ordered partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionManifest {
    pub endpoint: String,
    pub index_name: String,
    pub field_name: String,
    pub total_document_count: u64,
    pub partitions: Vec<Partition>,
}

impl PartitionManifest {
    /// Create a manifest; the total is the sum of the partition counts.
    pub fn new(
        endpoint: impl Into<String>,
        index_name: impl Into<String>,
        field_name: impl Into<String>,
        partitions: Vec<Partition>,
    ) -> Self {
        let total_document_count = partitions.iter().map(|p| p.document_count).sum();
        Self {
            endpoint: endpoint.into(),
            index_name: index_name.into(),
            field_name: field_name.into(),
            total_document_count,
            partitions,
        }
    }

    /// Manifest file name for an index.
    pub fn file_name(index_name: &str) -> String {
        format!("{index_name}-partitions.json")
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Look up a partition by id
    pub fn partition(&self, id: usize) -> Result<&Partition> {
        self.partitions.get(id).ok_or_else(|| {
            ManifestError::UnknownPartition {
                id,
                partitions: self.partitions.len(),
            }
            .into()
        })
    }

    /// Number of partitions flagged as oversized.
    pub fn oversized_count(&self) -> usize {
        self.partitions.iter().filter(|p| p.oversized).count()
    }

    /// Check internal consistency
    ///
    /// The stored total must equal the partition sum and every filter must
    /// restrict the manifest's ordering field.
    pub fn validate(&self) -> Result<()> {
        if self.index_name.is_empty() {
            return Err(ManifestError::Invalid("indexName is empty".to_string()).into());
        }
        if self.field_name.is_empty() {
            return Err(ManifestError::Invalid("fieldName is empty".to_string()).into());
        }

        let actual: u64 = self.partitions.iter().map(|p| p.document_count).sum();
        if actual != self.total_document_count {
            return Err(ManifestError::CountMismatch {
                expected: self.total_document_count,
                actual,
            }
            .into());
        }

        for (id, partition) in self.partitions.iter().enumerate() {
            partition.filter.ensure_field(&self.field_name).map_err(|e| {
                ManifestError::Invalid(format!("partition {id}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Check that the manifest was generated for this index and field
    ///
    /// A manifest's filters only make sense against the index and ordering
    /// field it was planned on.
    pub fn ensure_matches(&self, index_name: &str, field_name: &str) -> Result<()> {
        if self.index_name != index_name {
            return Err(ManifestError::Invalid(format!(
                "manifest was generated for index '{}', not '{}'",
                self.index_name, index_name
            ))
            .into());
        }
        if self.field_name != field_name {
            return Err(ManifestError::Invalid(format!(
                "manifest partitions field '{}', not '{}'",
                self.field_name, field_name
            ))
            .into());
        }
        Ok(())
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a manifest
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write the manifest, creating the parent directory if needed
    ///
    /// # Arguments
    /// * `path` - Destination file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.to_json()?).await?;
        debug!(
            "Saved manifest with {} partitions to {}",
            self.partitions.len(),
            path.display()
        );
        Ok(())
    }

    /// Read and validate a manifest file
    ///
    /// # Arguments
    /// * `path` - Manifest file
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let manifest = Self::from_json(&text)?;
        debug!(
            "Loaded manifest for '{}' with {} partitions",
            manifest.index_name,
            manifest.partitions.len()
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bound;
    use crate::error::ExportError;

    fn manifest() -> PartitionManifest {
        PartitionManifest::new(
            "mongodb://localhost:27017",
            "docs",
            "n",
            vec![
                Partition::new(
                    RangeFilter::half_open("n", Bound::Integer(0), Bound::Integer(50)),
                    50,
                ),
                Partition::oversized(RangeFilter::between("n", Bound::Integer(50), Bound::Integer(50)), 70),
            ],
        )
    }

    #[test]
    fn test_total_is_partition_sum() {
        let manifest = manifest();
        assert_eq!(manifest.total_document_count, 120);
        assert_eq!(manifest.oversized_count(), 1);
        assert!(manifest.validate().is_ok());
        assert!(manifest.partition(2).is_err());
    }

    #[test]
    fn test_json_layout() {
        let json = manifest().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["indexName"], "docs");
        assert_eq!(value["fieldName"], "n");
        assert_eq!(value["totalDocumentCount"], 120);
        assert_eq!(value["partitions"][0]["filter"], "n ge 0 and n lt 50");
        assert_eq!(value["partitions"][0]["documentCount"], 50);
        assert!(value["partitions"][0].get("oversized").is_none());
        assert_eq!(value["partitions"][1]["filter"], "n eq 50");
        assert_eq!(value["partitions"][1]["oversized"], true);

        assert_eq!(PartitionManifest::from_json(&json).unwrap(), manifest());
    }

    #[test]
    fn test_validate_rejects_tampered_manifest() {
        let mut wrong_total = manifest();
        wrong_total.total_document_count = 1;
        assert!(wrong_total.validate().is_err());

        let mut wrong_field = manifest();
        wrong_field.partitions[0].filter =
            RangeFilter::at_least("m", Bound::Integer(0));
        assert!(wrong_field.validate().is_err());

        let json = r#"{"endpoint":"e","indexName":"i","fieldName":"n","totalDocumentCount":1,
            "partitions":[{"filter":"n ge","documentCount":1}]}"#;
        assert!(PartitionManifest::from_json(json).is_err());
    }

    #[test]
    fn test_ensure_matches_index_and_field() {
        let manifest = manifest();
        assert!(manifest.ensure_matches("docs", "n").is_ok());

        let err = manifest.ensure_matches("other", "n").unwrap_err();
        assert!(matches!(err, ExportError::Manifest(ManifestError::Invalid(_))));
        assert!(err.to_string().contains("'docs'"));

        let err = manifest.ensure_matches("docs", "timestamp").unwrap_err();
        assert!(matches!(err, ExportError::Manifest(ManifestError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("manifest-test-{}", std::process::id()));
        let path = dir.join(PartitionManifest::file_name("docs"));

        manifest().save(&path).await.unwrap();
        let loaded = PartitionManifest::load(&path).await.unwrap();
        assert_eq!(loaded, manifest());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
