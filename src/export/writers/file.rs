//! Newline-delimited JSON partition files
//!
//! Each partition is written to `{directory}/{index}-{id}-documents.json`,
//! one relaxed extended JSON document per line, in the order received. The
//! data goes to a `.partial` file first and is renamed once complete, so a
//! re-run of the same partition id replaces the previous result.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bson::{Bson, Document};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::DocumentPages;
use crate::error::{ExecutionError, Result};

use super::{AsyncPageSink, PartitionWriter, drain_pages};

/// Buffer size when no page size is known
const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

/// Assumed serialized size of one document when sizing buffers
const ESTIMATED_DOCUMENT_BYTES: usize = 1024;

/// Writer producing one JSON Lines file per partition.
pub struct FilePartitionWriter {
    directory: PathBuf,
    index_name: String,
}

impl FilePartitionWriter {
    /// Create a new file writer
    ///
    /// # Arguments
    /// * `directory` - Output directory, created on first write
    /// * `index_name` - Index name used in file names
    pub fn new(directory: impl Into<PathBuf>, index_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            index_name: index_name.into(),
        }
    }

    /// Final path of a partition's file.
    pub fn partition_path(&self, partition_id: usize) -> PathBuf {
        self.directory
            .join(format!("{}-{}-documents.json", self.index_name, partition_id))
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".partial");
        PathBuf::from(name)
    }

    fn buffer_capacity(page_size_hint: Option<u32>) -> usize {
        match page_size_hint {
            Some(n) => (n as usize)
                .saturating_mul(ESTIMATED_DOCUMENT_BYTES)
                .clamp(64 * 1024, DEFAULT_BUFFER_CAPACITY),
            None => DEFAULT_BUFFER_CAPACITY,
        }
    }

    async fn write_file(
        path: &Path,
        pages: Box<dyn DocumentPages>,
        cancel: &CancellationToken,
        page_size_hint: Option<u32>,
    ) -> Result<u64> {
        let file = File::create(path).await.map_err(|e| {
            ExecutionError::WriterFailed(format!("cannot create {}: {}", path.display(), e))
        })?;
        let mut sink = JsonLinesSink {
            writer: BufWriter::with_capacity(Self::buffer_capacity(page_size_hint), file),
            line: Vec::new(),
        };

        let written = drain_pages(pages, cancel, &mut sink).await?;

        sink.writer.flush().await.map_err(|e| {
            ExecutionError::WriterFailed(format!("cannot flush {}: {}", path.display(), e))
        })?;
        Ok(written)
    }
}

struct JsonLinesSink {
    writer: BufWriter<File>,
    line: Vec<u8>,
}

#[async_trait]
impl AsyncPageSink for JsonLinesSink {
    async fn accept(&mut self, page: Vec<Document>) -> Result<u64> {
        let count = page.len() as u64;
        for doc in page {
            self.line.clear();
            serde_json::to_writer(&mut self.line, &Bson::Document(doc).into_relaxed_extjson())?;
            self.line.push(b'\n');
            self.writer.write_all(&self.line).await.map_err(|e| {
                ExecutionError::WriterFailed(format!("failed to write document: {e}"))
            })?;
        }
        Ok(count)
    }
}

#[async_trait]
impl PartitionWriter for FilePartitionWriter {
    async fn write_partition(
        &self,
        partition_id: usize,
        pages: Box<dyn DocumentPages>,
        cancel: &CancellationToken,
        page_size_hint: Option<u32>,
    ) -> Result<u64> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let path = self.partition_path(partition_id);
        let partial = Self::partial_path(&path);

        match Self::write_file(&partial, pages, cancel, page_size_hint).await {
            Ok(written) => {
                tokio::fs::rename(&partial, &path).await?;
                debug!("Wrote {} documents to {}", written, path.display());
                Ok(written)
            }
            Err(e) => {
                if tokio::fs::remove_file(&partial).await.is_ok() {
                    debug!("Removed incomplete {}", partial.display());
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::VecPages;
    use bson::doc;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("file-writer-{}-{}", name, std::process::id()))
    }

    fn pages(docs: Vec<Document>) -> Box<dyn DocumentPages> {
        Box::new(VecPages::new(docs, 2))
    }

    #[tokio::test]
    async fn test_writes_one_line_per_document() {
        let dir = temp_dir("lines");
        let writer = FilePartitionWriter::new(&dir, "docs");
        let docs = vec![
            doc! { "id": "a", "n": 1_i64 },
            doc! { "id": "b", "n": 2_i64 },
            doc! { "id": "c", "n": 3_i64 },
        ];

        let written = writer
            .write_partition(4, pages(docs), &CancellationToken::new(), Some(2))
            .await
            .unwrap();
        assert_eq!(written, 3);

        let path = dir.join("docs-4-documents.json");
        assert_eq!(writer.partition_path(4), path);
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], "a");
        assert_eq!(lines[2]["n"], 3);
        assert!(!FilePartitionWriter::partial_path(&path).exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn test_rerun_replaces_file() {
        let dir = temp_dir("rerun");
        let writer = FilePartitionWriter::new(&dir, "docs");
        let cancel = CancellationToken::new();

        writer
            .write_partition(0, pages(vec![doc! { "v": 1 }, doc! { "v": 2 }]), &cancel, None)
            .await
            .unwrap();
        writer
            .write_partition(0, pages(vec![doc! { "v": 3 }]), &cancel, None)
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(writer.partition_path(0))
            .await
            .unwrap();
        assert_eq!(content.lines().count(), 1);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn test_cancelled_write_leaves_nothing() {
        let dir = temp_dir("cancel");
        let writer = FilePartitionWriter::new(&dir, "docs");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = writer
            .write_partition(1, pages(vec![doc! { "v": 1 }]), &cancel, None)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        let path = writer.partition_path(1);
        assert!(!path.exists());
        assert!(!FilePartitionWriter::partial_path(&path).exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[test]
    fn test_buffer_capacity_follows_page_size() {
        assert_eq!(FilePartitionWriter::buffer_capacity(None), DEFAULT_BUFFER_CAPACITY);
        assert_eq!(FilePartitionWriter::buffer_capacity(Some(1)), 64 * 1024);
        assert_eq!(
            FilePartitionWriter::buffer_capacity(Some(1000)),
            1000 * ESTIMATED_DOCUMENT_BYTES
        );
    }
}
