//! Lazily paged result sets

use futures::stream::{self, Stream};
use std::sync::Arc;
use tracing::debug;

use super::Record;
use crate::config::SearchSettings;
use crate::context::SearchContext;
use crate::metrics;
use crate::models::{docs, hit_count, RawRecord, SearchError, SearchResult};

/// Records requested per page unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Options for [`SearchContext::search_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Records requested per page
    pub batch_size: usize,
    /// Fetch the first page when the result set is created
    pub eager: bool,
    /// Skip the count refresh and size the result set from the first page
    pub ignore_facet_check: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            eager: true,
            ignore_facet_check: false,
        }
    }
}

impl SearchOptions {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn ignore_facet_check(mut self, ignore: bool) -> Self {
        self.ignore_facet_check = ignore;
        self
    }
}

impl From<&SearchSettings> for SearchOptions {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            eager: settings.eager,
            ignore_facet_check: false,
        }
    }
}

/// Index-addressable view over the results of a frozen context.
///
/// Pages are fetched on first access and kept for the life of the set; the
/// length is fixed when the set is created.
#[derive(Debug)]
pub struct ResultSet {
    context: Arc<SearchContext>,
    batch_size: usize,
    len: usize,
    pages: Vec<Option<Vec<RawRecord>>>,
}

impl ResultSet {
    pub(crate) async fn new(context: Arc<SearchContext>, options: SearchOptions) -> SearchResult<Self> {
        if options.batch_size == 0 {
            return Err(SearchError::config("batch_size must be at least 1"));
        }

        let mut set = Self {
            context,
            batch_size: options.batch_size,
            len: 0,
            pages: Vec::new(),
        };

        let mut first_page = None;
        if options.ignore_facet_check {
            let (total, records) = set.fetch_page(0).await?;
            set.len = to_len(total)?;
            first_page = Some(records);
        } else {
            let total = set
                .context
                .cached_hit_count()
                .ok_or_else(|| SearchError::config("context counts are not resolved"))?;
            set.len = to_len(total)?;
        }

        set.pages = vec![None; set.len.div_ceil(set.batch_size)];
        if set.len > 0 {
            match first_page {
                Some(records) => set.pages[0] = Some(records),
                None if options.eager => {
                    let (_, records) = set.fetch_page(0).await?;
                    set.pages[0] = Some(records);
                }
                None => {}
            }
        }

        debug!(
            "Created result set of {} records in {} pages of {}",
            set.len,
            set.pages.len(),
            set.batch_size
        );
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The context this set was created from
    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    /// Number of pages fetched so far
    pub fn cached_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }

    /// The record at `index`, fetching its page if needed
    pub async fn get(&mut self, index: usize) -> SearchResult<Record> {
        if index >= self.len {
            return Err(SearchError::IndexOutOfRange { index, len: self.len });
        }

        let page_index = index / self.batch_size;
        let offset = index % self.batch_size;

        if self.pages[page_index].is_none() {
            let (_, records) = self.fetch_page(page_index).await?;
            self.pages[page_index] = Some(records);
        }

        let raw = self.pages[page_index]
            .as_ref()
            .and_then(|page| page.get(offset))
            .cloned()
            .ok_or_else(|| {
                SearchError::protocol(format!(
                    "page {} holds fewer than {} records",
                    page_index,
                    offset + 1
                ))
            })?;

        Ok(Record::new(self.context.search_type(), raw, Arc::clone(&self.context)))
    }

    /// Records in order, fetching pages as the stream advances
    pub fn stream(&mut self) -> impl Stream<Item = SearchResult<Record>> + '_ {
        stream::unfold((self, 0usize), |(set, index)| async move {
            if index >= set.len {
                return None;
            }
            let item = set.get(index).await;
            Some((item, (set, index + 1)))
        })
    }

    /// Every record of the set
    pub async fn collect_all(&mut self) -> SearchResult<Vec<Record>> {
        let mut records = Vec::with_capacity(self.len);
        for index in 0..self.len {
            records.push(self.get(index).await?);
        }
        Ok(records)
    }

    async fn fetch_page(&self, page_index: usize) -> SearchResult<(u64, Vec<RawRecord>)> {
        let offset = page_index * self.batch_size;
        debug!("Fetching page {} (offset {})", page_index, offset);

        let response = self
            .context
            .connection()
            .send_search(
                self.context.build_query(),
                Some(self.batch_size as u64),
                Some(offset as u64),
                self.context.shards(),
            )
            .await?;

        metrics::record_result_page();
        Ok((hit_count(&response)?, docs(&response)?))
    }
}

fn to_len(total: u64) -> SearchResult<usize> {
    usize::try_from(total).map_err(|_| SearchError::protocol(format!("hit count {} does not fit in memory", total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SearchConnection;
    use crate::models::Constraints;
    use crate::results::ResultRecord;
    use crate::transport::stub::StubTransport;
    use crate::transport::{HttpReply, Transport};
    use futures::StreamExt;
    use serde_json::json;

    fn connect(stub: &Arc<StubTransport>) -> SearchConnection {
        SearchConnection::builder("https://esgf.ceda.ac.uk/esg-search")
            .distrib(false)
            .transport(Arc::clone(stub) as Arc<dyn Transport>)
            .build()
            .unwrap()
    }

    /// Serves `total` records `r0..` honouring limit and offset
    fn paging_stub(total: usize) -> Arc<StubTransport> {
        Arc::new(StubTransport::new(move |_, params| {
            let limit: usize = params["limit"][0].parse().unwrap();
            let offset: usize = params.get("offset").map(|o| o[0].parse().unwrap()).unwrap_or(0);
            let docs: Vec<_> = (offset..total.min(offset + limit))
                .map(|i| json!({"id": format!("r{}", i)}))
                .collect();
            let body = json!({
                "response": {"numFound": total, "docs": docs},
                "facet_counts": {"facet_fields": {"project": ["CMIP5", total]}}
            });
            HttpReply::ok(body.to_string())
        }))
    }

    async fn ids(set: &mut ResultSet) -> Vec<String> {
        set.collect_all()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let stub = Arc::new(StubTransport::json(json!({
            "response": {"numFound": 2, "docs": [{"id": "x"}, {"id": "y"}]},
            "facet_counts": {"facet_fields": {"project": ["CMIP5", 2]}}
        })));
        let conn = connect(&stub);
        let mut ctx = conn.new_context(Constraints::new()).unwrap();

        assert_eq!(ctx.hit_count().await.unwrap(), 2);
        let counts = ctx.facet_counts().await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["project"]["CMIP5"], 2);

        let mut set = ctx.search().await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(ids(&mut set).await, vec!["x", "y"]);
        assert!(matches!(set.get(0).await.unwrap(), Record::Dataset(_)));
    }

    #[tokio::test]
    async fn test_pagination_independent_of_batch_size() {
        let stub = paging_stub(237);
        let conn = connect(&stub);
        let mut ctx = conn.new_context(Constraints::new()).unwrap();

        let mut small = ctx.search_with(SearchOptions::default().batch_size(50)).await.unwrap();
        let mut large = ctx.search_with(SearchOptions::default().batch_size(100)).await.unwrap();

        let expected: Vec<String> = (0..237).map(|i| format!("r{}", i)).collect();
        assert_eq!(ids(&mut small).await, expected);
        assert_eq!(ids(&mut large).await, expected);
    }

    #[tokio::test]
    async fn test_pages_fetched_once() {
        let stub = paging_stub(120);
        let conn = connect(&stub);
        let mut ctx = conn.new_context(Constraints::new()).unwrap();

        let mut set = ctx.search_with(SearchOptions::default().batch_size(50)).await.unwrap();
        // count refresh plus eager first page
        assert_eq!(stub.calls(), 2);
        assert_eq!(set.cached_pages(), 1);

        set.get(75).await.unwrap();
        set.get(60).await.unwrap();
        assert_eq!(stub.calls(), 3);

        let params = stub.last_params();
        assert_eq!(params["limit"], vec!["50"]);
        assert_eq!(params["offset"], vec!["50"]);

        let err = set.get(120).await.unwrap_err();
        assert!(matches!(err, SearchError::IndexOutOfRange { index: 120, len: 120 }));
    }

    #[tokio::test]
    async fn test_lazy_and_stream() {
        let stub = paging_stub(5);
        let conn = connect(&stub);
        let mut ctx = conn.new_context(Constraints::new()).unwrap();

        let mut set = ctx
            .search_with(SearchOptions::default().batch_size(2).eager(false))
            .await
            .unwrap();
        assert_eq!(set.cached_pages(), 0);

        let streamed: Vec<String> = set
            .stream()
            .map(|r| r.unwrap().id().unwrap())
            .collect()
            .await;
        assert_eq!(streamed, vec!["r0", "r1", "r2", "r3", "r4"]);
        assert_eq!(set.cached_pages(), 3);
    }

    #[tokio::test]
    async fn test_ignore_facet_check() {
        let stub = paging_stub(3);
        let conn = connect(&stub);
        let mut ctx = conn.new_context(Constraints::new()).unwrap();

        let mut set = ctx
            .search_with(SearchOptions::default().ignore_facet_check(true))
            .await
            .unwrap();
        assert_eq!(stub.calls(), 1);
        assert!(!ctx.is_resolved());
        assert_eq!(set.len(), 3);
        assert_eq!(ids(&mut set).await, vec!["r0", "r1", "r2"]);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_set() {
        let stub = paging_stub(0);
        let conn = connect(&stub);
        let mut ctx = conn.new_context(Constraints::new()).unwrap();

        let mut set = ctx.search().await.unwrap();
        assert!(set.is_empty());
        assert_eq!(stub.calls(), 1);
        assert!(set.collect_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let stub = paging_stub(3);
        let conn = connect(&stub);
        let mut ctx = conn.new_context(Constraints::new()).unwrap();

        let err = ctx
            .search_with(SearchOptions::default().batch_size(0))
            .await
            .unwrap_err();
        assert!(err.is_config());
    }
}
