//! Connection to an ESGF search service

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ConnectionSettings;
use crate::context::{ContextOptions, SearchContext};
use crate::discovery::ShardMap;
use crate::metrics;
use crate::models::{any_of, shard_list, Constraints, SearchError, SearchResult, SearchType, RESPONSE_FORMAT};
use crate::query::{encode_query, QueryParams};
use crate::transport::{HttpSession, Transport};

/// Default timeout for every outbound request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

static INVALID_PARAMETER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Invalid HTTP query parameter=([^\s<&]+)").expect("invalid parameter pattern is valid")
});

/// Builder for [`SearchConnection`]
pub struct SearchConnectionBuilder {
    url: String,
    distrib: bool,
    timeout: Duration,
    search_type: SearchType,
    default_limit: Option<u64>,
    facets_star_warning: bool,
    transport: Option<Arc<dyn Transport>>,
    shard_specs: Option<Vec<String>>,
}

impl SearchConnectionBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            distrib: true,
            timeout: DEFAULT_TIMEOUT,
            search_type: SearchType::Dataset,
            default_limit: None,
            facets_star_warning: true,
            transport: None,
            shard_specs: None,
        }
    }

    /// Whether the service should fan queries out to its peers
    pub fn distrib(mut self, distrib: bool) -> Self {
        self.distrib = distrib;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Search type of contexts created by [`SearchConnection::new_context`]
    pub fn search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    /// Limit used when a search call passes none
    pub fn default_limit(mut self, limit: u64) -> Self {
        self.default_limit = Some(limit);
        self
    }

    pub fn facets_star_warning(mut self, enabled: bool) -> Self {
        self.facets_star_warning = enabled;
        self
    }

    /// Use a caller-supplied HTTP client. The connection never closes it.
    pub fn session(mut self, client: reqwest::Client) -> Self {
        self.transport = Some(Arc::new(HttpSession::borrowed(client)));
        self
    }

    /// Use a custom transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Declare the available shards up front instead of probing the service
    pub fn shard_specs<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shard_specs = Some(specs.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> SearchResult<SearchConnection> {
        let (url, legacy) = normalize_url(&self.url);
        if legacy {
            warn!(
                "Setting the connection URL to the search endpoint is deprecated, use the base URL ({}) instead",
                url
            );
        }

        let parsed = Url::parse(&url)?;
        let host = parsed.host_str().map(str::to_string);

        let shards = match &self.shard_specs {
            Some(specs) => Some(ShardMap::from_specs(specs, host.as_deref())?),
            None => None,
        };

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpSession::owned()));

        debug!("Created connection to {} (distrib={})", url, self.distrib);

        Ok(SearchConnection {
            inner: Arc::new(ConnectionInner {
                url,
                host,
                distrib: self.distrib,
                timeout: self.timeout,
                search_type: self.search_type,
                default_limit: self.default_limit,
                facets_star_warning: self.facets_star_warning,
                transport,
                shards: RwLock::new(shards),
            }),
        })
    }
}

struct ConnectionInner {
    url: String,
    host: Option<String>,
    distrib: bool,
    timeout: Duration,
    search_type: SearchType,
    default_limit: Option<u64>,
    facets_star_warning: bool,
    transport: Arc<dyn Transport>,
    shards: RwLock<Option<ShardMap>>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.transport.close();
    }
}

/// Connection to the search API of one index node.
///
/// Cloning is cheap and clones share the session and the shard map.
#[derive(Clone)]
pub struct SearchConnection {
    inner: Arc<ConnectionInner>,
}

impl SearchConnection {
    /// Connect with default settings
    pub fn new(url: impl Into<String>, distrib: bool) -> SearchResult<Self> {
        Self::builder(url).distrib(distrib).build()
    }

    pub fn builder(url: impl Into<String>) -> SearchConnectionBuilder {
        SearchConnectionBuilder::new(url)
    }

    pub fn from_settings(settings: &ConnectionSettings) -> SearchResult<Self> {
        Self::builder(settings.url.clone())
            .distrib(settings.distrib)
            .timeout(Duration::from_secs(settings.timeout_sec))
            .search_type(settings.search_type)
            .facets_star_warning(settings.facets_star_warning)
            .build()
    }

    /// Base URL of the search service, without the endpoint segment
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Host name of the service
    pub fn host(&self) -> Option<&str> {
        self.inner.host.as_deref()
    }

    pub fn distrib(&self) -> bool {
        self.inner.distrib
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn search_type(&self) -> SearchType {
        self.inner.search_type
    }

    pub(crate) fn facets_star_warning(&self) -> bool {
        self.inner.facets_star_warning
    }

    /// Create a context of the connection's default type
    pub fn new_context(&self, constraints: Constraints) -> SearchResult<SearchContext> {
        self.new_context_with(ContextOptions::default(), constraints)
    }

    /// Create a context with explicit options
    pub fn new_context_with(&self, options: ContextOptions, constraints: Constraints) -> SearchResult<SearchContext> {
        SearchContext::new(self.clone(), options, constraints)
    }

    /// Run a search query and return the decoded JSON body.
    ///
    /// `shards` must be hosts from [`get_shard_list`](Self::get_shard_list).
    pub async fn send_search(
        &self,
        query: QueryParams,
        limit: Option<u64>,
        offset: Option<u64>,
        shards: Option<&[String]>,
    ) -> SearchResult<Value> {
        let shard_str = self.resolve_shards(shards).await?;
        let full_query = self.full_query(query, limit, offset, shard_str);
        self.execute_search(full_query).await
    }

    /// Request a download script for the query from the wget endpoint
    pub async fn send_script(&self, query: QueryParams, shards: Option<&[String]>) -> SearchResult<String> {
        let shard_str = self.resolve_shards(shards).await?;
        let mut full_query = self.full_query(query, None, None, shard_str);
        full_query.remove("format");
        full_query.remove("type");

        let url = format!("{}/wget?{}", self.inner.url, encode_query(&full_query)?);
        debug!("Script request is {}", url);

        metrics::record_script_request();
        self.fetch(&url).await
    }

    /// All available shards, probing the service on first use
    pub async fn get_shard_list(&self) -> SearchResult<ShardMap> {
        if !self.inner.distrib {
            return Err(SearchError::config(
                "Shard list not available for non-distributed queries",
            ));
        }

        let cached = self.inner.shards.read().clone();
        if let Some(map) = cached {
            return Ok(map);
        }

        let map = self.load_shards().await?;
        *self.inner.shards.write() = Some(map.clone());
        Ok(map)
    }

    /// Forget the memoized shard map
    pub fn invalidate_shards(&self) {
        *self.inner.shards.write() = None;
    }

    /// Release the session. Safe to call repeatedly; a caller-supplied
    /// client is left open.
    pub fn close(&self) {
        self.inner.transport.close();
    }

    /// Run `f` with this connection and close the session afterwards
    pub async fn scoped<F, Fut, T>(self, f: F) -> T
    where
        F: FnOnce(SearchConnection) -> Fut,
        Fut: Future<Output = T>,
    {
        let output = f(self.clone()).await;
        self.close();
        output
    }

    async fn load_shards(&self) -> SearchResult<ShardMap> {
        let mut probe = QueryParams::new();
        probe.push("facets", any_of(Vec::<String>::new()));
        probe.push("fields", any_of(Vec::<String>::new()));

        metrics::record_shard_probe();
        let response = self.execute_search(self.full_query(probe, Some(0), None, None)).await?;
        let specs = shard_list(&response)?;
        let map = ShardMap::from_specs(&specs, self.host())?;

        info!("Resolved {} shard hosts from {}", map.len(), self.inner.url);
        debug!("Shard map: {:?}", map);
        Ok(map)
    }

    async fn resolve_shards(&self, shards: Option<&[String]>) -> SearchResult<Option<String>> {
        match shards {
            Some(hosts) if !hosts.is_empty() => {
                let map = self.get_shard_list().await?;
                Ok(Some(map.query_specs(hosts)?.join(",")))
            }
            _ => Ok(None),
        }
    }

    fn full_query(
        &self,
        query: QueryParams,
        limit: Option<u64>,
        offset: Option<u64>,
        shards: Option<String>,
    ) -> QueryParams {
        let mut full_query = QueryParams::new();
        full_query.push("format", RESPONSE_FORMAT);
        full_query.push_opt("limit", limit.or(self.inner.default_limit));
        full_query.push("distrib", self.inner.distrib);
        full_query.push_opt("offset", offset);
        full_query.push_opt("shards", shards);
        full_query.extend(query);
        full_query
    }

    async fn execute_search(&self, full_query: QueryParams) -> SearchResult<Value> {
        debug!("Query dict is {:?}", full_query);
        let url = format!("{}/search?{}", self.inner.url, encode_query(&full_query)?);
        debug!("Query request is {}", url);

        metrics::record_search_request();
        let body = self.fetch(&url).await?;
        serde_json::from_str(&body).map_err(|e| {
            metrics::record_request_error();
            SearchError::SerializationError(format!("Invalid JSON from {}: {}", url, e))
        })
    }

    async fn fetch(&self, url: &str) -> SearchResult<String> {
        let started = Instant::now();
        let result = self.inner.transport.get(url, self.inner.timeout).await;
        metrics::record_request_duration(started.elapsed().as_secs_f64());

        let reply = result.inspect_err(|_| metrics::record_request_error())?;

        if reply.status == 400 {
            metrics::record_request_error();
            let names = invalid_parameters(&reply.body);
            if !names.is_empty() {
                return Err(SearchError::InvalidParameters(names));
            }
        }

        if !reply.is_success() {
            if reply.status != 400 {
                metrics::record_request_error();
            }
            return Err(SearchError::transport(format!("HTTP {} from {}", reply.status, url)));
        }

        Ok(reply.body)
    }
}

impl std::fmt::Debug for SearchConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConnection")
            .field("url", &self.inner.url)
            .field("distrib", &self.inner.distrib)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

/// Strip trailing slashes and a legacy `/search` segment.
/// Returns the base URL and whether the legacy form was used.
fn normalize_url(url: &str) -> (String, bool) {
    let trimmed = url.trim().trim_end_matches('/');
    match trimmed.strip_suffix("/search") {
        Some(base) => (base.trim_end_matches('/').to_string(), true),
        None => (trimmed.to_string(), false),
    }
}

/// Distinct parameter names from `Invalid HTTP query parameter=<name>` messages
fn invalid_parameters(body: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in INVALID_PARAMETER.captures_iter(body) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
