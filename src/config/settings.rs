//! Client configuration settings

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::models::SearchType;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

/// Search service connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    /// Base URL of the search service
    #[serde(default = "default_url")]
    pub url: String,
    /// Fan queries out across the federation
    #[serde(default = "default_true")]
    pub distrib: bool,
    /// Timeout of every request in seconds
    #[serde(default = "default_timeout")]
    pub timeout_sec: u64,
    /// Search type of new contexts
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default = "default_true")]
    pub facets_star_warning: bool,
}

fn default_url() -> String {
    "https://esgf.ceda.ac.uk/esg-search".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    120
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            url: default_url(),
            distrib: true,
            timeout_sec: default_timeout(),
            search_type: SearchType::default(),
            facets_star_warning: true,
        }
    }
}

/// Result set settings
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// Records requested per page
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fetch the first page when a result set is created
    #[serde(default = "default_true")]
    pub eager: bool,
    /// Default facet selector; empty means all facets
    #[serde(default)]
    pub facets: String,
}

fn default_batch_size() -> usize {
    50
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            batch_size: default_batch_size(),
            eager: true,
            facets: String::new(),
        }
    }
}

impl SearchSettings {
    /// The facet selector, if one is configured
    pub fn facets(&self) -> Option<&str> {
        let facets = self.facets.trim();
        (!facets.is_empty()).then_some(facets)
    }
}

impl Settings {
    /// Load settings from file and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("esgf-search")
    }

    /// Load settings from a specific config file path (without extension)
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref();

        let builder = Config::builder()
            .set_default("connection.url", default_url())?
            .set_default("connection.distrib", true)?
            .set_default("connection.timeout_sec", default_timeout())?
            .set_default("connection.search_type", SearchType::default().as_str())?
            .set_default("connection.facets_star_warning", true)?
            .set_default("search.batch_size", default_batch_size() as u64)?
            .set_default("search.eager", true)?
            .set_default("search.facets", "")?
            .add_source(File::with_name(config_path.to_str().unwrap_or("esgf-search")).required(false))
            // e.g. ESGF_SEARCH__CONNECTION__DISTRIB=false
            .add_source(Environment::with_prefix("ESGF_SEARCH").separator("__"));

        builder.build()?.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::load().unwrap_or_else(|_| Settings {
            connection: ConnectionSettings::default(),
            search: SearchSettings::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::load_from("/nonexistent/esgf-search").unwrap();
        assert!(settings.connection.url.starts_with("https://"));
        assert_eq!(settings.connection.timeout_sec, 120);
        assert_eq!(settings.connection.search_type, SearchType::Dataset);
        assert_eq!(settings.search.batch_size, 50);
        assert!(settings.search.facets().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[connection]\nurl = \"https://esgf-node.llnl.gov/esg-search\"\ndistrib = false\n\
             search_type = \"File\"\n\n[search]\nbatch_size = 200\nfacets = \"project,model\""
        )
        .unwrap();

        let settings = Settings::load_from(dir.path().join("client")).unwrap();
        assert_eq!(settings.connection.url, "https://esgf-node.llnl.gov/esg-search");
        assert!(!settings.connection.distrib);
        assert_eq!(settings.connection.search_type, SearchType::File);
        assert_eq!(settings.search.batch_size, 200);
        assert!(settings.search.eager);
        assert_eq!(settings.search.facets(), Some("project,model"));
    }
}
