//! In-process index
//!
//! Holds documents in memory and answers count and paged-fetch requests the
//! way a search service would, including its result-window limit. Used by
//! tests and local dry runs; failures and latency can be injected.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::debug;

use crate::domain::Bound;
use crate::error::{Result, TransportError};
use crate::filter::RangeFilter;

use super::{DocumentPages, FetchRequest, IndexClient, VecPages};

/// Default result window, matching common search services.
pub const DEFAULT_RESULT_WINDOW: u64 = 100_000;

/// In-memory [`IndexClient`].
pub struct MemoryIndexClient {
    endpoint: String,
    index_name: String,
    max_result_window: u64,
    documents: RwLock<Vec<Document>>,
    count_queries: AtomicU64,
    failing_counts: AtomicU32,
    failing_fetch_values: Mutex<Vec<Bound>>,
    fetch_delay: Option<Duration>,
    fetch_log: Mutex<Vec<RangeFilter>>,
}

impl MemoryIndexClient {
    pub fn new(index_name: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            endpoint: "memory://localhost/".to_string(),
            index_name: index_name.into(),
            max_result_window: DEFAULT_RESULT_WINDOW,
            documents: RwLock::new(documents),
            count_queries: AtomicU64::new(0),
            failing_counts: AtomicU32::new(0),
            failing_fetch_values: Mutex::new(Vec::new()),
            fetch_delay: None,
            fetch_log: Mutex::new(Vec::new()),
        }
    }

    /// Set the result window.
    pub fn with_result_window(mut self, window: u64) -> Self {
        self.max_result_window = window;
        self
    }

    /// Delay every fetch, simulating network latency.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Fail the next `n` count requests with a transient error.
    pub fn fail_next_counts(&self, n: u32) {
        self.failing_counts.store(n, AtomicOrdering::SeqCst);
    }

    /// Fail every fetch whose filter covers `value`.
    pub fn fail_fetches_covering(&self, value: Bound) {
        if let Ok(mut values) = self.failing_fetch_values.lock() {
            values.push(value);
        }
    }

    /// Replace the stored documents.
    pub fn replace_documents(&self, documents: Vec<Document>) {
        if let Ok(mut stored) = self.documents.write() {
            *stored = documents;
        }
    }

    /// Number of count requests served.
    pub fn count_queries(&self) -> u64 {
        self.count_queries.load(AtomicOrdering::SeqCst)
    }

    /// Filters of every fetch started, in start order.
    pub fn fetch_log(&self) -> Vec<RangeFilter> {
        self.fetch_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn poisoned() -> crate::error::ExportError {
        TransportError::RequestFailed("in-memory index lock poisoned".to_string()).into()
    }

    fn take_count_failure(&self) -> bool {
        self.failing_counts
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    let a = a.get(field).and_then(Bound::from_bson);
    let b = b.get(field).and_then(Bound::from_bson);
    match (a, b) {
        (Some(a), Some(b)) => a.compare(&b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl IndexClient for MemoryIndexClient {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn index_name(&self) -> String {
        self.index_name.clone()
    }

    fn max_result_window(&self) -> u64 {
        self.max_result_window
    }

    async fn count(&self, filter: Option<&RangeFilter>) -> Result<u64> {
        self.count_queries.fetch_add(1, AtomicOrdering::SeqCst);
        if self.take_count_failure() {
            return Err(TransportError::RequestFailed("injected count failure".into()).into());
        }

        let documents = self.documents.read().map_err(|_| Self::poisoned())?;
        let count = match filter {
            None => documents.len(),
            Some(f) => documents.iter().filter(|d| f.matches(d)).count(),
        };
        Ok(count as u64)
    }

    async fn paged_fetch(&self, request: FetchRequest) -> Result<Box<dyn DocumentPages>> {
        if request.max_results > self.max_result_window {
            return Err(TransportError::ResultWindowExceeded {
                requested: request.max_results,
                limit: self.max_result_window,
            }
            .into());
        }

        if let Ok(mut log) = self.fetch_log.lock() {
            log.push(request.filter.clone());
        }

        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        let fails = self
            .failing_fetch_values
            .lock()
            .map_err(|_| Self::poisoned())?
            .iter()
            .any(|v| request.filter.contains(v));
        if fails {
            return Err(TransportError::RequestFailed(format!(
                "injected fetch failure for '{}'",
                request.filter
            ))
            .into());
        }

        let mut matched: Vec<Document> = {
            let documents = self.documents.read().map_err(|_| Self::poisoned())?;
            documents
                .iter()
                .filter(|d| request.filter.matches(d))
                .cloned()
                .collect()
        };
        matched.sort_by(|a, b| compare_field(a, b, &request.sort_field));
        matched.truncate(usize::try_from(request.max_results).unwrap_or(usize::MAX));

        let projected: Vec<Document> = matched
            .iter()
            .map(|d| request.projection.apply(d))
            .collect();
        debug!(
            "Memory fetch '{}' matched {} documents",
            request.filter,
            projected.len()
        );

        Ok(Box::new(VecPages::new(projected, request.page_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Projection;
    use mongodb::bson::doc;

    fn client() -> MemoryIndexClient {
        let docs = [5, 1, 4, 2, 3]
            .iter()
            .map(|i| doc! { "id": i.to_string(), "n": *i as i64 })
            .collect();
        MemoryIndexClient::new("numbers", docs).with_result_window(3)
    }

    fn request(filter: RangeFilter, max_results: u64) -> FetchRequest {
        FetchRequest {
            filter,
            sort_field: "n".to_string(),
            projection: Projection::All,
            max_results,
            page_size: 2,
        }
    }

    #[tokio::test]
    async fn test_count_with_and_without_filter() {
        let client = client();
        assert_eq!(client.count(None).await.unwrap(), 5);
        let filter = RangeFilter::at_most("n", Bound::Integer(2));
        assert_eq!(client.count(Some(&filter)).await.unwrap(), 2);
        assert_eq!(client.count_queries(), 2);
    }

    #[tokio::test]
    async fn test_fetch_sorted_and_paged() {
        let client = client();
        let filter = RangeFilter::at_least("n", Bound::Integer(2));
        let mut pages = client.paged_fetch(request(filter, 3)).await.unwrap();

        let mut values = Vec::new();
        while let Some(page) = pages.next_page().await.unwrap() {
            assert!(page.len() <= 2);
            values.extend(page.iter().map(|d| d.get_i64("n").unwrap()));
        }
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_result_window_enforced() {
        let client = client();
        let filter = RangeFilter::at_least("n", Bound::Integer(0));
        let err = client.paged_fetch(request(filter, 4)).await.err().unwrap();
        assert!(err.to_string().contains("result window"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let client = client();
        client.fail_next_counts(1);
        assert!(client.count(None).await.is_err());
        assert!(client.count(None).await.is_ok());

        client.fail_fetches_covering(Bound::Integer(4));
        let ok = RangeFilter::at_most("n", Bound::Integer(3));
        assert!(client.paged_fetch(request(ok, 3)).await.is_ok());
        let bad = RangeFilter::at_least("n", Bound::Integer(4));
        assert!(client.paged_fetch(request(bad, 3)).await.is_err());
        assert_eq!(client.fetch_log().len(), 2);
    }
}
