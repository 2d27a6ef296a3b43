//! Typed wrappers around raw result records

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::{ContextOptions, SearchContext};
use crate::models::{first_string, first_u64, Constraints, RawRecord, SearchError, SearchResult, SearchType};

/// One access endpoint of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrl {
    pub url: String,
    pub mime_type: String,
}

/// Accessors shared by every record type
pub trait ResultRecord {
    /// The record as returned by the service
    fn json(&self) -> &RawRecord;

    /// The context that produced this record
    fn context(&self) -> &SearchContext;

    fn id(&self) -> Option<String> {
        first_string(self.json(), "id")
    }

    /// Index node holding the record's metadata
    fn index_node(&self) -> Option<String> {
        first_string(self.json(), "index_node")
    }

    fn data_node(&self) -> Option<String> {
        first_string(self.json(), "data_node")
    }

    /// `url|mime|service` entries grouped by service name
    fn urls(&self) -> IndexMap<String, Vec<ServiceUrl>> {
        let mut urls: IndexMap<String, Vec<ServiceUrl>> = IndexMap::new();
        let entries = match self.json().get("url").and_then(|v| v.as_array()) {
            Some(entries) => entries,
            None => return urls,
        };

        for entry in entries.iter().filter_map(|v| v.as_str()) {
            let parts: Vec<&str> = entry.split('|').collect();
            match parts.as_slice() {
                [url, mime_type, service] => urls.entry(service.to_string()).or_default().push(ServiceUrl {
                    url: url.to_string(),
                    mime_type: mime_type.to_string(),
                }),
                _ => warn!("Skipping malformed url entry: {}", entry),
            }
        }
        urls
    }

    /// OPeNDAP endpoint without the `.html` suffix
    fn opendap_url(&self) -> Option<String> {
        self.service_url("OPENDAP")
            .map(|url| url.strip_suffix(".html").map(str::to_string).unwrap_or(url))
    }

    fn las_url(&self) -> Option<String> {
        self.service_url("LAS")
    }

    /// Plain HTTP download URL
    fn download_url(&self) -> Option<String> {
        self.service_url("HTTPServer")
    }

    fn gridftp_url(&self) -> Option<String> {
        self.service_url("GridFTP")
    }

    fn globus_url(&self) -> Option<String> {
        self.service_url("Globus")
    }

    /// First URL published for a service
    fn service_url(&self, service: &str) -> Option<String> {
        self.urls()
            .get(service)
            .and_then(|entries| entries.first())
            .map(|entry| entry.url.clone())
    }
}

macro_rules! impl_result_record {
    ($ty:ty) => {
        impl ResultRecord for $ty {
            fn json(&self) -> &RawRecord {
                &self.json
            }

            fn context(&self) -> &SearchContext {
                &self.context
            }
        }
    };
}

/// A dataset record
#[derive(Debug, Clone)]
pub struct DatasetResult {
    json: RawRecord,
    context: Arc<SearchContext>,
}

impl_result_record!(DatasetResult);

impl DatasetResult {
    pub fn new(json: RawRecord, context: Arc<SearchContext>) -> Self {
        Self { json, context }
    }

    /// Identifier unique across the federation
    pub fn dataset_id(&self) -> Option<String> {
        self.id()
    }

    /// DRS identifier, the dataset id without its `|data_node` suffix
    pub fn drs_id(&self) -> Option<String> {
        self.id()
            .map(|id| id.split('|').next().unwrap_or_default().to_string())
    }

    /// File count reported by the dataset record
    pub fn number_of_files(&self) -> Option<u64> {
        first_u64(&self.json, "number_of_files")
    }

    /// Context searching the files of this dataset
    pub async fn file_context(&self) -> SearchResult<SearchContext> {
        self.child_context(SearchType::File).await
    }

    /// Context searching the aggregations of this dataset
    pub async fn aggregation_context(&self) -> SearchResult<SearchContext> {
        self.child_context(SearchType::Aggregation).await
    }

    async fn child_context(&self, search_type: SearchType) -> SearchResult<SearchContext> {
        let dataset_id = self
            .dataset_id()
            .ok_or_else(|| SearchError::protocol(format!("dataset record has no id: {:?}", self.json)))?;

        let connection = self.context.connection();
        let mut shards = self.context.shards().map(<[String]>::to_vec);

        if connection.distrib() {
            if let Some(node) = self.index_node() {
                let available = connection.get_shard_list().await?;
                if available.contains_host(&node) {
                    debug!("Restricting {} search of {} to {}", search_type, dataset_id, node);
                    shards = Some(vec![node]);
                }
            }
        }

        let mut options = ContextOptions::new().search_type(search_type);
        options.shards = shards;
        connection.new_context_with(options, Constraints::new().with("dataset_id", dataset_id))
    }
}

/// A file record
#[derive(Debug, Clone)]
pub struct FileResult {
    json: RawRecord,
    context: Arc<SearchContext>,
}

impl_result_record!(FileResult);

impl FileResult {
    pub fn new(json: RawRecord, context: Arc<SearchContext>) -> Self {
        Self { json, context }
    }

    pub fn file_id(&self) -> Option<String> {
        self.id()
    }

    pub fn filename(&self) -> Option<String> {
        first_string(&self.json, "title")
    }

    /// File size in bytes
    pub fn size(&self) -> Option<u64> {
        first_u64(&self.json, "size")
    }

    pub fn checksum(&self) -> Option<String> {
        first_string(&self.json, "checksum")
    }

    pub fn checksum_type(&self) -> Option<String> {
        first_string(&self.json, "checksum_type")
    }

    pub fn tracking_id(&self) -> Option<String> {
        first_string(&self.json, "tracking_id")
    }

    /// Check downloaded content against the published checksum
    pub fn verify_checksum(&self, content: &[u8]) -> SearchResult<bool> {
        use sha2::{Digest, Sha256};

        let expected = self
            .checksum()
            .ok_or_else(|| SearchError::protocol(format!("file record has no checksum: {:?}", self.id())))?;

        match self.checksum_type() {
            Some(kind) if kind.eq_ignore_ascii_case("SHA256") => {
                let mut hasher = Sha256::new();
                hasher.update(content);
                let actual = format!("{:x}", hasher.finalize());
                Ok(actual.eq_ignore_ascii_case(expected.trim()))
            }
            Some(kind) => Err(SearchError::UnsupportedChecksum(kind)),
            None => Err(SearchError::UnsupportedChecksum("unspecified".to_string())),
        }
    }
}

/// An aggregation record
#[derive(Debug, Clone)]
pub struct AggregationResult {
    json: RawRecord,
    context: Arc<SearchContext>,
}

impl_result_record!(AggregationResult);

impl AggregationResult {
    pub fn new(json: RawRecord, context: Arc<SearchContext>) -> Self {
        Self { json, context }
    }

    pub fn aggregation_id(&self) -> Option<String> {
        self.id()
    }
}

/// A result record of any search type
#[derive(Debug, Clone)]
pub enum Record {
    Dataset(DatasetResult),
    File(FileResult),
    Aggregation(AggregationResult),
}

impl Record {
    /// Wrap a raw record in the variant for `search_type`
    pub fn new(search_type: SearchType, json: RawRecord, context: Arc<SearchContext>) -> Self {
        match search_type {
            SearchType::Dataset => Record::Dataset(DatasetResult::new(json, context)),
            SearchType::File => Record::File(FileResult::new(json, context)),
            SearchType::Aggregation => Record::Aggregation(AggregationResult::new(json, context)),
        }
    }

    pub fn search_type(&self) -> SearchType {
        match self {
            Record::Dataset(_) => SearchType::Dataset,
            Record::File(_) => SearchType::File,
            Record::Aggregation(_) => SearchType::Aggregation,
        }
    }

    pub fn as_dataset(&self) -> Option<&DatasetResult> {
        match self {
            Record::Dataset(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileResult> {
        match self {
            Record::File(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_aggregation(&self) -> Option<&AggregationResult> {
        match self {
            Record::Aggregation(r) => Some(r),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn ResultRecord {
        match self {
            Record::Dataset(r) => r as &dyn ResultRecord,
            Record::File(r) => r,
            Record::Aggregation(r) => r,
        }
    }
}

impl ResultRecord for Record {
    fn json(&self) -> &RawRecord {
        self.inner().json()
    }

    fn context(&self) -> &SearchContext {
        self.inner().context()
    }
}
