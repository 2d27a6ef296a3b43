//! Query string encoding

use super::QueryParams;
use crate::models::SearchResult;

/// Encode parameters into a `&`-joined query string, preserving order.
///
/// OR-lists become repeated `key=value` segments. Negated values render as
/// `key!=value`; the `!=` is emitted literally, only key and value are
/// percent-encoded.
pub fn encode_query(params: &QueryParams) -> SearchResult<String> {
    let mut segments = Vec::with_capacity(params.len());

    for (key, value) in params.iter() {
        let key = urlencoding::encode(key);
        for (op, v) in value.flatten()? {
            segments.push(format!("{}{}{}", key, op.separator(), urlencoding::encode(v)));
        }
    }

    Ok(segments.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{any_of, not_equals, Operator, QueryValue};

    #[test]
    fn test_multi_value_expands() {
        let params: QueryParams = [("model", any_of(["A", "B"]))].into_iter().collect();
        assert_eq!(encode_query(&params).unwrap(), "model=A&model=B");
    }

    #[test]
    fn test_not_equals_literal() {
        let params: QueryParams = [("experiment", not_equals("historical"))].into_iter().collect();
        assert_eq!(encode_query(&params).unwrap(), "experiment!=historical");
    }

    #[test]
    fn test_tagged_list_shares_operator() {
        let params: QueryParams = [("model", not_equals(vec!["A", "B"]))].into_iter().collect();
        assert_eq!(encode_query(&params).unwrap(), "model!=A&model!=B");
    }

    #[test]
    fn test_order_and_escaping() {
        let mut params = QueryParams::new();
        params.push("query", "sea ice&snow");
        params.push("project", "CMIP5");
        params.push("facets", any_of(Vec::<String>::new()));
        params.push("start", "2000-01-01T00:00:00Z");

        assert_eq!(
            encode_query(&params).unwrap(),
            "query=sea%20ice%26snow&project=CMIP5&start=2000-01-01T00%3A00%3A00Z"
        );
    }

    #[test]
    fn test_nested_tag_fails() {
        let nested = QueryValue::Tagged(Operator::NotEquals, Box::new(not_equals("x")));
        let params: QueryParams = [("experiment", nested)].into_iter().collect();
        assert!(encode_query(&params).unwrap_err().is_config());
    }
}
