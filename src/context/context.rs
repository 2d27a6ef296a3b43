//! Search contexts: accumulated constraints plus lazily resolved counts

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::connection::SearchConnection;
use crate::models::{
    facet_counts, format_timestamp, hit_count, Constraints, FacetConstraints, FacetCounts, KeywordKind, Operator,
    QueryValue, SearchError, SearchResult, SearchType, TemporalRange,
};
use crate::query::QueryParams;
use crate::results::{ResultSet, SearchOptions};

/// Environment variable that silences the `facets=*` advisory
pub const NO_FACETS_STAR_WARNING_ENV: &str = "ESGF_SEARCH_NO_FACETS_STAR_WARNING";

/// Options fixed when a context is created
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Overrides the connection's default search type
    pub search_type: Option<SearchType>,
    /// Facets for which counts are retrieved; `None` requests all facets
    pub facets: Option<String>,
    /// Fields returned in search responses
    pub fields: Option<String>,
    pub latest: Option<bool>,
    pub replica: Option<bool>,
    /// Hosts from [`SearchConnection::get_shard_list`] to restrict searches to
    pub shards: Option<Vec<String>>,
    pub from_timestamp: Option<String>,
    pub to_timestamp: Option<String>,
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = Some(search_type);
        self
    }

    pub fn facets(mut self, facets: impl Into<String>) -> Self {
        self.facets = Some(facets.into());
        self
    }

    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn latest(mut self, latest: bool) -> Self {
        self.latest = Some(latest);
        self
    }

    pub fn replica(mut self, replica: bool) -> Self {
        self.replica = Some(replica);
        self
    }

    pub fn shards<I, S>(mut self, shards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shards = Some(shards.into_iter().map(Into::into).collect());
        self
    }

    /// Start of the search range, e.g. `2000-01-01T00:00:00Z`. A value
    /// without an offset, or a bare date, is read as UTC.
    pub fn from_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.from_timestamp = Some(timestamp.into());
        self
    }

    /// End of the search range
    pub fn to_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.to_timestamp = Some(timestamp.into());
        self
    }

    pub fn from_datetime(self, dt: DateTime<Utc>) -> Self {
        self.from_timestamp(format_timestamp(dt))
    }

    pub fn to_datetime(self, dt: DateTime<Utc>) -> Self {
        self.to_timestamp(format_timestamp(dt))
    }
}

/// Hit and facet counts from one refresh query
#[derive(Debug, Clone, PartialEq)]
pub struct Counts {
    pub hit_count: u64,
    pub facet_counts: FacetCounts,
}

/// A set of search constraints against one connection.
///
/// Refinement never mutates a context: [`constrain`](Self::constrain) and the
/// `with_*` methods return a new context whose counts are unresolved. Counts
/// are fetched on first access and cached on the context that fetched them.
#[derive(Debug, Clone)]
pub struct SearchContext {
    connection: SearchConnection,
    search_type: SearchType,
    facets: Option<String>,
    fields: Option<String>,
    latest: Option<bool>,
    replica: Option<bool>,
    shards: Option<Vec<String>>,
    facet_constraints: FacetConstraints,
    freetext: Option<String>,
    temporal: TemporalRange,
    counts: Option<Counts>,
    // shared by every context derived from the same root
    facets_star_warned: Arc<AtomicBool>,
}

impl SearchContext {
    pub fn new(connection: SearchConnection, options: ContextOptions, constraints: Constraints) -> SearchResult<Self> {
        let search_type = options.search_type.unwrap_or_else(|| connection.search_type());
        let temporal = TemporalRange::new(options.from_timestamp, options.to_timestamp)?;

        let mut context = Self {
            connection,
            search_type,
            facets: options.facets,
            fields: options.fields,
            latest: options.latest,
            replica: options.replica,
            shards: options.shards,
            facet_constraints: FacetConstraints::new(),
            freetext: None,
            temporal,
            counts: None,
            facets_star_warned: Arc::new(AtomicBool::new(false)),
        };
        context.update_constraints(constraints)?;
        Ok(context)
    }

    pub fn connection(&self) -> &SearchConnection {
        &self.connection
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn facets(&self) -> Option<&str> {
        self.facets.as_deref()
    }

    pub fn fields(&self) -> Option<&str> {
        self.fields.as_deref()
    }

    pub fn latest(&self) -> Option<bool> {
        self.latest
    }

    pub fn replica(&self) -> Option<bool> {
        self.replica
    }

    pub fn shards(&self) -> Option<&[String]> {
        self.shards.as_deref()
    }

    pub fn facet_constraints(&self) -> &FacetConstraints {
        &self.facet_constraints
    }

    pub fn freetext_constraint(&self) -> Option<&str> {
        self.freetext.as_deref()
    }

    pub fn temporal_constraint(&self) -> &TemporalRange {
        &self.temporal
    }

    /// Whether counts are cached
    pub fn is_resolved(&self) -> bool {
        self.counts.is_some()
    }

    pub(crate) fn cached_hit_count(&self) -> Option<u64> {
        self.counts.as_ref().map(|c| c.hit_count)
    }

    /// Return a new context with additional constraints
    pub fn constrain(&self, constraints: Constraints) -> SearchResult<SearchContext> {
        let mut context = self.clone();
        context.update_constraints(constraints)?;
        Ok(context)
    }

    pub fn with_facets(&self, facets: impl Into<String>) -> SearchContext {
        self.refined(|c| c.facets = Some(facets.into()))
    }

    pub fn with_fields(&self, fields: impl Into<String>) -> SearchContext {
        self.refined(|c| c.fields = Some(fields.into()))
    }

    pub fn with_shards(&self, shards: Vec<String>) -> SearchContext {
        self.refined(|c| c.shards = Some(shards))
    }

    pub fn with_latest(&self, latest: Option<bool>) -> SearchContext {
        self.refined(|c| c.latest = latest)
    }

    pub fn with_replica(&self, replica: Option<bool>) -> SearchContext {
        self.refined(|c| c.replica = replica)
    }

    pub fn with_search_type(&self, search_type: SearchType) -> SearchContext {
        self.refined(|c| c.search_type = search_type)
    }

    /// Total number of records matching the constraints
    pub async fn hit_count(&mut self) -> SearchResult<u64> {
        Ok(self.resolve().await?.hit_count)
    }

    /// Facet value counts, in the order the service reported them
    pub async fn facet_counts(&mut self) -> SearchResult<FacetCounts> {
        Ok(self.resolve().await?.facet_counts.clone())
    }

    /// Facet counts reduced to the values that would still narrow the search.
    ///
    /// Values matching every hit are dropped, then facets with at most one
    /// value left.
    pub async fn get_facet_options(&mut self) -> SearchResult<FacetCounts> {
        let counts = self.resolve().await?;
        let hits = counts.hit_count;

        let mut options = FacetCounts::new();
        for (facet, values) in &counts.facet_counts {
            let discriminating: indexmap::IndexMap<String, u64> = values
                .iter()
                .filter(|(_, count)| **count < hits)
                .map(|(value, count)| (value.clone(), *count))
                .collect();
            if discriminating.len() > 1 {
                options.insert(facet.clone(), discriminating);
            }
        }
        Ok(options)
    }

    /// Search with default result set options
    pub async fn search(&mut self) -> SearchResult<ResultSet> {
        self.search_with(SearchOptions::default()).await
    }

    pub async fn search_with(&mut self, options: SearchOptions) -> SearchResult<ResultSet> {
        if !options.ignore_facet_check {
            self.resolve().await?;
        }
        ResultSet::new(Arc::new(self.clone()), options).await
    }

    /// Download script for every file matching the constraints
    pub async fn get_download_script(&mut self) -> SearchResult<String> {
        self.resolve().await?;
        let query = self.build_query();
        self.connection.send_script(query, self.shards.as_deref()).await
    }

    /// Search a refinement of this context without keeping it.
    /// The refinement's counts are not cached on `self`.
    pub async fn search_constrained(
        &self,
        constraints: Constraints,
        options: SearchOptions,
    ) -> SearchResult<ResultSet> {
        let mut refined = self.constrain(constraints)?;
        refined.search_with(options).await
    }

    /// Download script for a refinement of this context without keeping it
    pub async fn download_script_constrained(&self, constraints: Constraints) -> SearchResult<String> {
        let mut refined = self.constrain(constraints)?;
        refined.get_download_script().await
    }

    /// Query parameters describing this context
    pub fn build_query(&self) -> QueryParams {
        let mut query = QueryParams::new();
        query.push_opt("query", self.freetext.clone());
        query.push("type", self.search_type.as_str());
        query.push_opt("latest", self.latest);
        query.push_opt("facets", self.facets.clone());
        query.push_opt("fields", self.fields.clone());
        query.push_opt("replica", self.replica);

        for (key, value) in self.facet_constraints.iter() {
            let scalar = QueryValue::Scalar(value.value.clone());
            match value.operator {
                Operator::Equals => query.push(key, scalar),
                op => query.push(key, QueryValue::Tagged(op, Box::new(scalar))),
            }
        }

        query.push_opt("start", self.temporal.from.clone());
        query.push_opt("end", self.temporal.to.clone());
        query
    }

    fn refined(&self, update: impl FnOnce(&mut SearchContext)) -> SearchContext {
        let mut context = self.clone();
        update(&mut context);
        context.counts = None;
        context
    }

    fn update_constraints(&mut self, constraints: Constraints) -> SearchResult<()> {
        self.counts = None;

        for (key, value) in constraints {
            match KeywordKind::classify(&key) {
                KeywordKind::Facet => self.facet_constraints.merge(&key, &value)?,
                KeywordKind::Freetext => self.freetext = Some(scalar_constraint(&key, &value)?),
                KeywordKind::Temporal => {
                    let timestamp = scalar_constraint(&key, &value)?;
                    match key.as_str() {
                        "start" | "from_timestamp" => self.temporal.set_from(timestamp)?,
                        _ => self.temporal.set_to(timestamp)?,
                    }
                }
                KeywordKind::Geospatial => {
                    return Err(SearchError::NotImplemented(format!(
                        "geospatial constraint '{}'",
                        key
                    )))
                }
                KeywordKind::System => {
                    return Err(SearchError::config(format!(
                        "'{}' is a search option, not a constraint",
                        key
                    )))
                }
            }
        }
        Ok(())
    }

    async fn resolve(&mut self) -> SearchResult<&Counts> {
        let counts = match self.counts.take() {
            Some(counts) => counts,
            None => self.fetch_counts().await?,
        };
        Ok(self.counts.insert(counts))
    }

    async fn fetch_counts(&self) -> SearchResult<Counts> {
        let mut query = self.build_query();
        match &self.facets {
            Some(facets) => query.set("facets", facets.as_str()),
            None => {
                query.set("facets", "*");
                if self.connection.distrib() {
                    self.facets_star_warning();
                }
            }
        }

        debug!("Refreshing counts for {:?} context", self.search_type);
        let response = self
            .connection
            .send_search(query, Some(0), None, self.shards.as_deref())
            .await?;

        Ok(Counts {
            hit_count: hit_count(&response)?,
            facet_counts: facet_counts(&response)?,
        })
    }

    fn facets_star_warning(&self) {
        if !facets_star_warning_enabled(
            self.connection.facets_star_warning(),
            std::env::var_os(NO_FACETS_STAR_WARNING_ENV),
        ) {
            return;
        }
        if self.facets_star_warned.swap(true, Ordering::Relaxed) {
            return;
        }
        warn!(
            "Searching with facets=*: distributed searches may miss results with this setting. \
             Pass the facets of interest, e.g. ContextOptions::new().facets(\"project,experiment_id\"). \
             Set {} to silence this warning.",
            NO_FACETS_STAR_WARNING_ENV
        );
    }

    #[cfg(test)]
    pub(crate) fn facets_star_warned(&self) -> bool {
        self.facets_star_warned.load(Ordering::Relaxed)
    }
}

/// The advisory is on unless the connection disables it or the
/// environment override is present (with any value)
fn facets_star_warning_enabled(configured: bool, env_override: Option<std::ffi::OsString>) -> bool {
    configured && env_override.is_none()
}

fn scalar_constraint(key: &str, value: &QueryValue) -> SearchResult<String> {
    value
        .as_scalar()
        .map(str::to_string)
        .ok_or_else(|| SearchError::config(format!("'{}' takes a single value", key)))
}
