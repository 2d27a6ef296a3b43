//! Ordered query parameter list

use crate::models::QueryValue;

/// Ordered `(key, value)` pairs sent as a query string.
///
/// Keys may repeat; absent (`None`) values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    items: Vec<(String, QueryValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.items.push((key.into(), value.into()));
    }

    /// Append a pair only if the value is present
    pub fn push_opt<V: Into<QueryValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.push(key, value);
        }
    }

    /// Replace every pair for `key` with a single pair, keeping the position
    /// of the first occurrence
    pub fn set(&mut self, key: &str, value: impl Into<QueryValue>) {
        let value = value.into();
        match self.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.items[pos].1 = value;
                let mut index = 0;
                self.items.retain(|(k, _)| {
                    let keep = k != key || index == pos;
                    index += 1;
                    keep
                });
            }
            None => self.items.push((key.to_string(), value)),
        }
    }

    /// Remove every pair for `key`
    pub fn remove(&mut self, key: &str) {
        self.items.retain(|(k, _)| k != key);
    }

    pub fn extend(&mut self, other: QueryParams) {
        self.items.extend(other.items);
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_keeps_first_position() {
        let mut params: QueryParams = [("a", "1"), ("facets", "x"), ("b", "2"), ("facets", "y")]
            .into_iter()
            .collect();
        params.set("facets", "*");

        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "facets", "b"]);
        assert_eq!(params.get("facets"), Some(&QueryValue::from("*")));
    }

    #[test]
    fn test_push_opt_skips_none() {
        let mut params = QueryParams::new();
        params.push_opt("latest", None::<bool>);
        params.push_opt("replica", Some(false));
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("replica"), Some(&QueryValue::from("false")));
    }
}
