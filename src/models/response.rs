//! Decoding of search service responses
//!
//! The service answers with Solr-style JSON:
//! `responseHeader.params.shards`, `response.numFound`, `response.docs` and
//! `facet_counts.facet_fields`.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{SearchError, SearchResult};

/// Facet name to ordered `value -> hit count` map
pub type FacetCounts = IndexMap<String, IndexMap<String, u64>>;

/// A raw result record
pub type RawRecord = Map<String, Value>;

/// Content type requested from the search endpoint
pub const RESPONSE_FORMAT: &str = "application/solr+json";

/// Total hit count reported by the service
pub fn hit_count(response: &Value) -> SearchResult<u64> {
    let value = response
        .pointer("/response/numFound")
        .ok_or_else(|| SearchError::protocol("response is missing response.numFound"))?;

    value
        .as_u64()
        .ok_or_else(|| SearchError::protocol(format!("response.numFound is not a count: {}", value)))
}

/// Result records of one page
pub fn docs(response: &Value) -> SearchResult<Vec<RawRecord>> {
    let value = response
        .pointer("/response/docs")
        .ok_or_else(|| SearchError::protocol("response is missing response.docs"))?;

    let array = value
        .as_array()
        .ok_or_else(|| SearchError::protocol(format!("response.docs is not an array: {}", value)))?;

    array
        .iter()
        .map(|doc| {
            doc.as_object()
                .cloned()
                .ok_or_else(|| SearchError::protocol(format!("result record is not an object: {}", doc)))
        })
        .collect()
}

/// Decode `facet_counts.facet_fields`, pairing the flat
/// `[v1, c1, v2, c2, ...]` arrays in their original order
pub fn facet_counts(response: &Value) -> SearchResult<FacetCounts> {
    let fields = response
        .pointer("/facet_counts/facet_fields")
        .ok_or_else(|| SearchError::protocol("response is missing facet_counts.facet_fields"))?;

    let fields = fields.as_object().ok_or_else(|| {
        SearchError::protocol(format!("facet_counts.facet_fields is not an object: {}", fields))
    })?;

    let mut counts = FacetCounts::new();
    for (facet, flat) in fields {
        let flat = flat
            .as_array()
            .ok_or_else(|| SearchError::protocol(format!("facet {} counts are not an array: {}", facet, flat)))?;

        if flat.len() % 2 != 0 {
            return Err(SearchError::protocol(format!(
                "facet {} has an odd number of value/count entries: {}",
                facet,
                Value::Array(flat.clone())
            )));
        }

        let mut values = IndexMap::with_capacity(flat.len() / 2);
        for pair in flat.chunks(2) {
            let value = match &pair[0] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let count = pair[1].as_u64().ok_or_else(|| {
                SearchError::protocol(format!("facet {} count is not an integer: {}", facet, pair[1]))
            })?;
            values.insert(value, count);
        }
        counts.insert(facet.clone(), values);
    }

    Ok(counts)
}

/// Comma separated shard list echoed back in the response header
pub fn shard_list(response: &Value) -> SearchResult<Vec<String>> {
    let value = response
        .pointer("/responseHeader/params/shards")
        .ok_or_else(|| SearchError::protocol("response is missing responseHeader.params.shards"))?;

    let raw = value
        .as_str()
        .ok_or_else(|| SearchError::protocol(format!("shard list is not a string: {}", value)))?;

    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// First string of a field that may be a scalar or an array
pub fn first_string(record: &RawRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Integer field that may be encoded as a number, a string or a one-element array
pub fn first_u64(record: &RawRecord, field: &str) -> Option<u64> {
    let value = match record.get(field)? {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
