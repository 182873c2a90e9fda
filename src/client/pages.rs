//! Paged result sequences
//!
//! A fetch hands back its matches one page at a time without loading the
//! whole result into memory. Sequences are single-pass: once exhausted or
//! closed they stay exhausted.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Cursor;
use mongodb::bson::Document;
use tracing::debug;

use crate::error::Result;

/// Lazy, finite, single-pass sequence of result pages.
#[async_trait]
pub trait DocumentPages: Send {
    /// Fetch the next page of documents
    ///
    /// # Returns
    /// * `Result<Option<Vec<Document>>>` - Next page, or None if exhausted
    async fn next_page(&mut self) -> Result<Option<Vec<Document>>>;

    /// Release the underlying resources
    async fn close(&mut self) -> Result<()>;
}

/// Pages over a MongoDB cursor.
pub struct CursorPages {
    cursor: Option<Cursor<Document>>,
    page_size: u32,
    remaining: u64,
    total_fetched: u64,
}

impl CursorPages {
    /// Create a new cursor page sequence
    ///
    /// # Arguments
    /// * `cursor` - Cursor from a find operation
    /// * `page_size` - Documents per page
    /// * `max_results` - Stop after this many documents
    pub fn new(cursor: Cursor<Document>, page_size: u32, max_results: u64) -> Self {
        Self {
            cursor: Some(cursor),
            page_size: page_size.max(1),
            remaining: max_results,
            total_fetched: 0,
        }
    }
}

#[async_trait]
impl DocumentPages for CursorPages {
    async fn next_page(&mut self) -> Result<Option<Vec<Document>>> {
        if self.remaining == 0 {
            self.cursor = None;
            return Ok(None);
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let wanted = self.remaining.min(u64::from(self.page_size)) as usize;
        let mut page = Vec::with_capacity(wanted);

        while page.len() < wanted {
            match cursor.try_next().await {
                Ok(Some(doc)) => page.push(doc),
                Ok(None) => break,
                Err(e) => {
                    // release the server cursor before reporting
                    self.cursor = None;
                    return Err(e.into());
                }
            }
        }

        if page.is_empty() {
            debug!("Cursor exhausted after {} documents", self.total_fetched);
            self.cursor = None;
            return Ok(None);
        }

        self.remaining -= page.len() as u64;
        self.total_fetched += page.len() as u64;
        debug!(
            "Fetched page of {} documents (total: {})",
            page.len(),
            self.total_fetched
        );
        Ok(Some(page))
    }

    async fn close(&mut self) -> Result<()> {
        if self.cursor.take().is_some() {
            debug!("Closed cursor after {} documents", self.total_fetched);
        }
        Ok(())
    }
}

/// Pages over documents already in memory.
pub struct VecPages {
    documents: VecDeque<Document>,
    page_size: usize,
}

impl VecPages {
    pub fn new(documents: Vec<Document>, page_size: u32) -> Self {
        Self {
            documents: documents.into(),
            page_size: page_size.max(1) as usize,
        }
    }
}

#[async_trait]
impl DocumentPages for VecPages {
    async fn next_page(&mut self) -> Result<Option<Vec<Document>>> {
        if self.documents.is_empty() {
            return Ok(None);
        }
        let take = self.page_size.min(self.documents.len());
        Ok(Some(self.documents.drain(..take).collect()))
    }

    async fn close(&mut self) -> Result<()> {
        self.documents.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_vec_pages_split_and_exhaust() {
        let docs = (0..5).map(|i| doc! { "i": i }).collect();
        let mut pages = VecPages::new(docs, 2);

        let mut sizes = Vec::new();
        while let Some(page) = pages.next_page().await.unwrap() {
            sizes.push(page.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(pages.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vec_pages_close_discards() {
        let mut pages = VecPages::new(vec![doc! { "i": 1 }], 10);
        pages.close().await.unwrap();
        assert!(pages.next_page().await.unwrap().is_none());
    }

    #[test]
    fn test_document_pages_trait_object() {
        fn _accepts_pages(_pages: Box<dyn DocumentPages>) {}
    }
}
