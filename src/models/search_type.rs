//! Record types served by the search index

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{SearchError, SearchResult};

/// The document type a context searches for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchType {
    Dataset,
    File,
    Aggregation,
}

impl SearchType {
    pub const ALL: [SearchType; 3] = [SearchType::Dataset, SearchType::File, SearchType::Aggregation];

    /// Value of the `type` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Dataset => "Dataset",
            SearchType::File => "File",
            SearchType::Aggregation => "Aggregation",
        }
    }
}

impl Default for SearchType {
    fn default() -> Self {
        SearchType::Dataset
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = SearchError;

    fn from_str(s: &str) -> SearchResult<Self> {
        SearchType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                SearchError::config(format!(
                    "search_type must be one of Dataset,File,Aggregation (got {})",
                    s
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("file".parse::<SearchType>().unwrap(), SearchType::File);
        assert_eq!("Aggregation".parse::<SearchType>().unwrap(), SearchType::Aggregation);
        assert!("Experiment".parse::<SearchType>().is_err());
    }
}
