//! Continuation-based query feed.
//!
//! A [`DocumentQuery`] walks a query result one page at a time: check
//! [`DocumentQuery::has_more_results`], then call
//! [`DocumentQuery::execute_next`] for the next batch. The continuation token
//! is private to the query value and never shared between queries.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::Stream;
use futures::stream;

use crate::clients::store::DocumentStore;
use crate::core::links::CollectionLink;
use crate::core::models::StoreDocument;
use crate::errors::StoreError;
use crate::query::filter::Filter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FeedState {
    /// `None` before the first page has been requested.
    Pending(Option<String>),
    Exhausted,
}

pub struct DocumentQuery<T, S: ?Sized> {
    store: Arc<S>,
    collection: CollectionLink,
    filter: Filter,
    state: FeedState,
    pages_fetched: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> DocumentQuery<T, S>
where
    T: StoreDocument,
    S: DocumentStore + ?Sized,
{
    pub(crate) fn new(store: Arc<S>, collection: CollectionLink, filter: Filter) -> Self {
        Self {
            store,
            collection,
            filter,
            state: FeedState::Pending(None),
            pages_fetched: 0,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn has_more_results(&self) -> bool {
        matches!(self.state, FeedState::Pending(_))
    }

    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetches the next page. Returns an empty batch once the feed is exhausted.
    ///
    /// A failed fetch leaves the continuation untouched, so the same page can
    /// be requested again.
    ///
    /// # Errors
    ///
    /// Propagates store failures and documents that do not deserialize into `T`.
    pub async fn execute_next(&mut self) -> Result<Vec<T>, StoreError> {
        let continuation = match &self.state {
            FeedState::Exhausted => return Ok(Vec::new()),
            FeedState::Pending(token) => token.clone(),
        };

        let page = self
            .store
            .query_documents(&self.collection, &self.filter, continuation.as_deref())
            .await?;

        self.pages_fetched += 1;
        self.state = match page.continuation {
            Some(token) => FeedState::Pending(Some(token)),
            None => FeedState::Exhausted,
        };

        page.documents
            .into_iter()
            .map(|document| serde_json::from_value(document).map_err(StoreError::from))
            .collect()
    }

    /// Drains the feed, concatenating pages in feed order.
    ///
    /// # Errors
    ///
    /// Fails on the first page that fails.
    pub async fn collect_all(mut self) -> Result<Vec<T>, StoreError> {
        let mut results = Vec::new();
        while self.has_more_results() {
            results.extend(self.execute_next().await?);
        }
        Ok(results)
    }

    /// Yields one item per page until the feed is exhausted.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>, StoreError>> {
        stream::try_unfold(self, |mut query| async move {
            if !query.has_more_results() {
                return Ok::<_, StoreError>(None);
            }
            let batch = query.execute_next().await?;
            Ok(Some((batch, query)))
        })
    }
}
