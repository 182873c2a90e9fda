//! Partition writers
//!
//! A writer consumes the paged documents of one partition and persists them.
//! Writers are shared by all export workers, so implementations take `&self`
//! and keep any shared state behind their own synchronization.

use async_trait::async_trait;
use mongodb::bson::Document;
use tokio_util::sync::CancellationToken;

use crate::client::DocumentPages;
use crate::error::Result;

pub mod file;
pub mod memory;

pub use file::FilePartitionWriter;
pub use memory::MemoryPartitionWriter;

/// Persists the documents of one partition.
#[async_trait]
pub trait PartitionWriter: Send + Sync {
    /// Write every page of a partition
    ///
    /// Consumes `pages` until it is exhausted or `cancel` is observed between
    /// pages. A failed or cancelled write must leave nothing behind that would
    /// corrupt a later write of the same partition id.
    ///
    /// # Arguments
    /// * `partition_id` - Position of the partition in the manifest
    /// * `pages` - Lazy, single-pass page sequence of the partition
    /// * `cancel` - Job abort signal
    /// * `page_size_hint` - Expected documents per page, if known
    ///
    /// # Returns
    /// * `Result<u64>` - Number of documents written
    async fn write_partition(
        &self,
        partition_id: usize,
        pages: Box<dyn DocumentPages>,
        cancel: &CancellationToken,
        page_size_hint: Option<u32>,
    ) -> Result<u64>;
}

/// Pull pages until exhausted, handing each to `sink`
///
/// Checks `cancel` before every page and closes the sequence on every exit
/// path.
pub(crate) async fn drain_pages<S>(
    mut pages: Box<dyn DocumentPages>,
    cancel: &CancellationToken,
    sink: &mut S,
) -> Result<u64>
where
    S: AsyncPageSink + ?Sized,
{
    let mut written = 0u64;
    let result: Result<u64> = loop {
        if cancel.is_cancelled() {
            break Err(crate::error::ExecutionError::Cancelled.into());
        }
        match pages.next_page().await {
            Ok(Some(page)) => match sink.accept(page).await {
                Ok(n) => written += n,
                Err(e) => break Err(e),
            },
            Ok(None) => break Ok(written),
            Err(e) => break Err(e),
        }
    };

    let closed = pages.close().await;
    let written = result?;
    closed?;
    Ok(written)
}

/// Receiver of pages in [`drain_pages`].
#[async_trait]
pub(crate) trait AsyncPageSink: Send {
    /// Persist one page, returning the number of documents taken.
    async fn accept(&mut self, page: Vec<Document>) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::VecPages;
    use crate::error::ExportError;
    use mongodb::bson::doc;

    struct Collect(Vec<Document>);

    #[async_trait]
    impl AsyncPageSink for Collect {
        async fn accept(&mut self, page: Vec<Document>) -> Result<u64> {
            let n = page.len() as u64;
            self.0.extend(page);
            Ok(n)
        }
    }

    #[tokio::test]
    async fn test_drain_pages_counts_documents() {
        let pages = Box::new(VecPages::new((0..7).map(|i| doc! { "i": i }).collect(), 3));
        let mut sink = Collect(Vec::new());
        let written = drain_pages(pages, &CancellationToken::new(), &mut sink)
            .await
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(sink.0.len(), 7);
    }

    #[tokio::test]
    async fn test_drain_pages_stops_when_cancelled() {
        let pages = Box::new(VecPages::new(vec![doc! { "i": 1 }], 1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = drain_pages(pages, &cancel, &mut Collect(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Execution(_)));
        assert!(err.is_cancelled());
    }
}
