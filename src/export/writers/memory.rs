//! In-memory partition writer
//!
//! Keeps every exported document, per partition in arrival order and by the
//! value of a chosen key field, so exports can be verified exactly.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tokio_util::sync::CancellationToken;

use crate::client::DocumentPages;
use crate::error::{ExecutionError, Result};

use super::{AsyncPageSink, PartitionWriter, drain_pages};

/// Collects exported documents in memory.
pub struct MemoryPartitionWriter {
    key_field: String,
    partitions: Mutex<BTreeMap<usize, Vec<Document>>>,
}

impl MemoryPartitionWriter {
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            partitions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Documents of one partition, in the order written.
    pub fn partition(&self, partition_id: usize) -> Option<Vec<Document>> {
        self.partitions
            .lock()
            .ok()
            .and_then(|p| p.get(&partition_id).cloned())
    }

    /// Ids of the partitions written so far.
    pub fn partition_ids(&self) -> Vec<usize> {
        self.partitions
            .lock()
            .map(|p| p.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of documents across all partitions.
    pub fn document_count(&self) -> usize {
        self.partitions
            .lock()
            .map(|p| p.values().map(Vec::len).sum())
            .unwrap_or_default()
    }

    /// Documents keyed by the key field.
    ///
    /// A key seen more than once maps to every document that carried it.
    pub fn documents_by_key(&self) -> HashMap<String, Vec<Document>> {
        let mut by_key: HashMap<String, Vec<Document>> = HashMap::new();
        if let Ok(partitions) = self.partitions.lock() {
            for doc in partitions.values().flatten() {
                if let Some(key) = doc.get(&self.key_field).map(key_string) {
                    by_key.entry(key).or_default().push(doc.clone());
                }
            }
        }
        by_key
    }
}

fn key_string(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Collect(Vec<Document>);

#[async_trait]
impl AsyncPageSink for Collect {
    async fn accept(&mut self, page: Vec<Document>) -> Result<u64> {
        let count = page.len() as u64;
        self.0.extend(page);
        Ok(count)
    }
}

#[async_trait]
impl PartitionWriter for MemoryPartitionWriter {
    async fn write_partition(
        &self,
        partition_id: usize,
        pages: Box<dyn DocumentPages>,
        cancel: &CancellationToken,
        page_size_hint: Option<u32>,
    ) -> Result<u64> {
        let mut collected = Collect(Vec::with_capacity(page_size_hint.unwrap_or(0) as usize));
        let written = drain_pages(pages, cancel, &mut collected).await?;

        // replace any earlier attempt of this partition
        self.partitions
            .lock()
            .map_err(|_| ExecutionError::WriterFailed("memory writer lock poisoned".into()))?
            .insert(partition_id, collected.0);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::VecPages;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_keeps_order_and_keys() {
        let writer = MemoryPartitionWriter::new("id");
        let docs = vec![doc! { "id": "b" }, doc! { "id": "a" }, doc! { "id": 7 }];
        let written = writer
            .write_partition(2, Box::new(VecPages::new(docs, 2)), &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(written, 3);
        assert_eq!(writer.partition_ids(), vec![2]);
        assert_eq!(writer.partition(2).unwrap()[0], doc! { "id": "b" });

        let by_key = writer.documents_by_key();
        assert_eq!(by_key.len(), 3);
        assert!(by_key.contains_key("a"));
        assert!(by_key.contains_key("7"));
    }

    #[tokio::test]
    async fn test_cancelled_partition_not_kept() {
        let writer = MemoryPartitionWriter::new("id");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pages = Box::new(VecPages::new(vec![doc! { "id": 1 }], 1));
        assert!(writer.write_partition(0, pages, &cancel, None).await.is_err());
        assert!(writer.partition(0).is_none());
        assert_eq!(writer.document_count(), 0);
    }
}
