//! Constraint values, keyword classification and the facet multimap

use std::fmt;
use std::str::FromStr;

use super::{SearchError, SearchResult};

/// Comparison operator attached to a constraint value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    #[default]
    Equals,
    NotEquals,
}

impl Operator {
    /// Separator placed between key and value in the query string
    pub fn separator(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
        }
    }
}

impl FromStr for Operator {
    type Err = SearchError;

    fn from_str(s: &str) -> SearchResult<Self> {
        match s {
            "=" | "eq" | "EQUALS" => Ok(Operator::Equals),
            "!=" | "ne" | "NOT_EQUALS" => Ok(Operator::NotEquals),
            other => Err(SearchError::config(format!("Unknown operator tag: {}", other))),
        }
    }
}

/// A query parameter value
///
/// `OrList` expands to one `key=value` segment per element. `Tagged` applies
/// an operator to a scalar or list; tags do not nest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Scalar(String),
    OrList(Vec<String>),
    Tagged(Operator, Box<QueryValue>),
}

impl QueryValue {
    /// Flatten into `(operator, value)` pairs, rejecting nested operator tags
    pub fn flatten(&self) -> SearchResult<Vec<(Operator, &str)>> {
        match self {
            QueryValue::Scalar(v) => Ok(vec![(Operator::Equals, v.as_str())]),
            QueryValue::OrList(vs) => Ok(vs.iter().map(|v| (Operator::Equals, v.as_str())).collect()),
            QueryValue::Tagged(op, inner) => match inner.as_ref() {
                QueryValue::Scalar(v) => Ok(vec![(*op, v.as_str())]),
                QueryValue::OrList(vs) => Ok(vs.iter().map(|v| (*op, v.as_str())).collect()),
                QueryValue::Tagged(..) => Err(SearchError::config(
                    "Unencodable value: operator tags cannot be nested",
                )),
            },
        }
    }

    /// The single scalar value, if this is one
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            QueryValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Scalar(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        QueryValue::Scalar(v)
    }
}

impl From<&String> for QueryValue {
    fn from(v: &String) -> Self {
        QueryValue::Scalar(v.clone())
    }
}

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        QueryValue::Scalar(if v { "true" } else { "false" }.to_string())
    }
}

impl From<u64> for QueryValue {
    fn from(v: u64) -> Self {
        QueryValue::Scalar(v.to_string())
    }
}

impl<S: Into<String>> From<Vec<S>> for QueryValue {
    fn from(vs: Vec<S>) -> Self {
        QueryValue::OrList(vs.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for QueryValue {
    fn from(vs: [S; N]) -> Self {
        QueryValue::OrList(vs.into_iter().map(Into::into).collect())
    }
}

/// Constrain to any of the given values
pub fn any_of<I, S>(values: I) -> QueryValue
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    QueryValue::OrList(values.into_iter().map(Into::into).collect())
}

/// Constrain to exclude the given value(s)
pub fn not_equals(value: impl Into<QueryValue>) -> QueryValue {
    QueryValue::Tagged(Operator::NotEquals, Box::new(value.into()))
}

/// Category of a search keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordKind {
    System,
    Facet,
    Freetext,
    Temporal,
    Geospatial,
}

impl KeywordKind {
    /// Classify a keyword. Unknown keywords are facets.
    pub fn classify(keyword: &str) -> Self {
        match keyword {
            "query" => KeywordKind::Freetext,
            "start" | "end" | "from_timestamp" | "to_timestamp" => KeywordKind::Temporal,
            "lat" | "lon" | "bbox" | "location" | "radius" | "polygon" => KeywordKind::Geospatial,
            "limit" | "offset" | "from" | "to" | "fields" | "facets" | "format" | "type"
            | "distrib" | "replica" | "id" | "shards" => KeywordKind::System,
            _ => KeywordKind::Facet,
        }
    }
}

/// Ordered list of caller-supplied constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    items: Vec<(String, QueryValue)>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.items.push((key.into(), value.into()));
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.items.push((key.into(), value.into()));
    }

    /// Parse a command-line style constraint: `key=value`, `key!=value`,
    /// or `key=a,b` for an OR-list
    pub fn parse_arg(arg: &str) -> SearchResult<(String, QueryValue)> {
        let (key, op, raw) = if let Some((k, v)) = arg.split_once("!=") {
            (k, Operator::NotEquals, v)
        } else if let Some((k, v)) = arg.split_once('=') {
            (k, Operator::Equals, v)
        } else {
            return Err(SearchError::config(format!(
                "Constraint '{}' is not of the form key=value",
                arg
            )));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(SearchError::config(format!("Constraint '{}' has an empty key", arg)));
        }

        let value = if raw.contains(',') {
            any_of(raw.split(',').map(str::trim))
        } else {
            QueryValue::Scalar(raw.to_string())
        };

        let value = match op {
            Operator::Equals => value,
            op => QueryValue::Tagged(op, Box::new(value)),
        };

        Ok((key.to_string(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for Constraints {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for Constraints {
    type Item = (String, QueryValue);
    type IntoIter = std::vec::IntoIter<(String, QueryValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// A single facet constraint value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FacetValue {
    pub operator: Operator,
    pub value: String,
}

impl fmt::Display for FacetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Equals => f.write_str(&self.value),
            Operator::NotEquals => write!(f, "!{}", self.value),
        }
    }
}

/// Ordered multimap of facet name to constraint values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetConstraints {
    items: Vec<(String, FacetValue)>,
}

impl FacetConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value unless the exact same `(operator, value)` is already present.
    /// Returns whether it was added.
    pub fn add(&mut self, key: &str, operator: Operator, value: &str) -> bool {
        let exists = self
            .items
            .iter()
            .any(|(k, v)| k == key && v.operator == operator && v.value == value);
        if exists {
            return false;
        }
        self.items.push((
            key.to_string(),
            FacetValue {
                operator,
                value: value.to_string(),
            },
        ));
        true
    }

    /// Merge a constraint value into the multimap, skipping duplicates
    pub fn merge(&mut self, key: &str, value: &QueryValue) -> SearchResult<()> {
        for (op, v) in value.flatten()? {
            self.add(key, op, v);
        }
        Ok(())
    }

    /// All values for a key, in insertion order
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.items
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.value.as_str())
            .collect()
    }

    /// All tagged values for a key, in insertion order
    pub fn get_tagged(&self, key: &str) -> Vec<&FacetValue> {
        self.items.iter().filter(|(k, _)| k == key).map(|(_, v)| v).collect()
    }

    /// The value for a key, if exactly one is present
    pub fn get_one(&self, key: &str) -> Option<&str> {
        match self.get_all(key).as_slice() {
            [one] => Some(*one),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.iter().any(|(k, _)| k == key)
    }

    /// Distinct keys in first-seen order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (k, _) in &self.items {
            if !keys.contains(&k.as_str()) {
                keys.push(k);
            }
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FacetValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }
}
