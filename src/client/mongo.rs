//! MongoDB collection as a searchable index

use async_trait::async_trait;
use mongodb::Collection;
use mongodb::bson::{Document, doc};
use mongodb::options::FindOptions;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::filter::RangeFilter;

use super::{CursorPages, DocumentPages, FetchRequest, IndexClient};

/// [`IndexClient`] over one MongoDB collection.
///
/// The server has no result window of its own; the configured window is
/// enforced client-side so exports behave the same against any backend.
pub struct MongoIndexClient {
    collection: Collection<Document>,
    endpoint: String,
    max_result_window: u64,
}

impl MongoIndexClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `collection` - Collection holding the index documents
    /// * `endpoint` - Endpoint recorded in manifests (credentials redacted)
    /// * `max_result_window` - Largest result a single fetch may request
    pub fn new(
        collection: Collection<Document>,
        endpoint: impl Into<String>,
        max_result_window: u64,
    ) -> Self {
        Self {
            collection,
            endpoint: endpoint.into(),
            max_result_window,
        }
    }

    fn find_options(request: &FetchRequest) -> Result<FindOptions> {
        let limit = i64::try_from(request.max_results).map_err(|_| {
            TransportError::ResultWindowExceeded {
                requested: request.max_results,
                limit: i64::MAX as u64,
            }
        })?;

        let mut sort = Document::new();
        sort.insert(request.sort_field.clone(), 1);

        let mut options = FindOptions::default();
        options.sort = Some(sort);
        options.limit = Some(limit);
        options.batch_size = Some(request.page_size.max(1));
        options.projection = request.projection.to_document();
        Ok(options)
    }
}

#[async_trait]
impl IndexClient for MongoIndexClient {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn index_name(&self) -> String {
        self.collection.name().to_string()
    }

    fn max_result_window(&self) -> u64 {
        self.max_result_window
    }

    async fn count(&self, filter: Option<&RangeFilter>) -> Result<u64> {
        let query = filter.map_or_else(|| doc! {}, RangeFilter::to_document);
        let count = self.collection.count_documents(query).await?;
        Ok(count)
    }

    async fn paged_fetch(&self, request: FetchRequest) -> Result<Box<dyn DocumentPages>> {
        if request.max_results > self.max_result_window {
            return Err(TransportError::ResultWindowExceeded {
                requested: request.max_results,
                limit: self.max_result_window,
            }
            .into());
        }

        let options = Self::find_options(&request)?;
        let query = request.filter.to_document();
        debug!(
            "find on '{}': {} (limit {})",
            self.collection.name(),
            query,
            request.max_results
        );

        let cursor = self.collection.find(query).with_options(options).await?;
        Ok(Box::new(CursorPages::new(
            cursor,
            request.page_size,
            request.max_results,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Projection;
    use crate::domain::Bound;

    #[test]
    fn test_find_options_from_request() {
        let request = FetchRequest {
            filter: RangeFilter::half_open("n", Bound::Integer(0), Bound::Integer(10)),
            sort_field: "n".to_string(),
            projection: Projection::Include(vec!["n".to_string()]),
            max_results: 10,
            page_size: 4,
        };
        let options = MongoIndexClient::find_options(&request).unwrap();
        assert_eq!(options.sort, Some(doc! { "n": 1 }));
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.batch_size, Some(4));
        assert_eq!(options.projection, Some(doc! { "n": 1, "_id": 0 }));
    }
}
