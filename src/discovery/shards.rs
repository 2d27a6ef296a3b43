//! Shard specs and the shard map of a distributed connection

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::models::{SearchError, SearchResult};

/// `(scheme://)?host(:port)?/suffix`
static SHARD_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>https?://)?(?P<host>[^:/]+)(?::(?P<port>\d+))?/(?P<suffix>.+)$")
        .expect("shard spec pattern is valid")
});

/// Host names that refer to the node serving the connection itself
const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// A parsed shard spec as reported by the search service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSpec {
    pub prefix: Option<String>,
    pub host: String,
    pub port: Option<String>,
    pub suffix: String,
}

impl ShardSpec {
    /// Parse a shard spec such as `https://esgf.a.c/solr` or `esgf.a.c:80/solr/files`
    pub fn parse(spec: &str) -> SearchResult<Self> {
        let caps = SHARD_SPEC
            .captures(spec.trim())
            .ok_or_else(|| SearchError::protocol(format!("Shard spec {} not recognised", spec)))?;

        Ok(Self {
            prefix: caps.name("prefix").map(|m| m.as_str().to_string()),
            host: caps["host"].to_string(),
            port: caps.name("port").map(|m| m.as_str().to_string()),
            suffix: caps["suffix"].to_string(),
        })
    }

    pub fn is_loopback(&self) -> bool {
        LOOPBACK_HOSTS.contains(&self.host.as_str())
    }
}

/// One physical shard on a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLocation {
    pub port: Option<String>,
    pub suffix: String,
}

/// Host name to the physical shards it serves
#[derive(Debug, Clone, Default)]
pub struct ShardMap {
    hosts: BTreeMap<String, Vec<ShardLocation>>,
    resolved_at: Option<DateTime<Utc>>,
}

impl ShardMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map from the shard specs a service reported.
    ///
    /// Loopback hosts are replaced by `connection_host` so they can be used as
    /// shard targets from other contexts.
    pub fn from_specs<I, S>(specs: I, connection_host: Option<&str>) -> SearchResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for raw in specs {
            let mut spec = ShardSpec::parse(raw.as_ref())?;
            if spec.is_loopback() {
                if let Some(host) = connection_host {
                    spec.host = host.to_string();
                }
            }
            map.insert(spec.host, spec.port, spec.suffix);
        }
        map.resolved_at = Some(Utc::now());
        Ok(map)
    }

    /// Add a location, ignoring exact duplicates
    pub fn insert(&mut self, host: impl Into<String>, port: Option<String>, suffix: impl Into<String>) {
        let location = ShardLocation {
            port,
            suffix: suffix.into(),
        };
        let locations = self.hosts.entry(host.into()).or_default();
        if !locations.contains(&location) {
            locations.push(location);
        }
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.hosts.contains_key(host)
    }

    pub fn locations(&self, host: &str) -> Option<&[ShardLocation]> {
        self.hosts.get(host).map(Vec::as_slice)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Query-time shard specs (`host[:port]/solr`) for the given hosts
    pub fn query_specs(&self, hosts: &[String]) -> SearchResult<Vec<String>> {
        let mut specs = Vec::new();
        for host in hosts {
            let locations = self
                .hosts
                .get(host)
                .ok_or_else(|| SearchError::UnknownShard(host.clone()))?;
            for location in locations {
                let spec = match &location.port {
                    Some(port) => format!("{}:{}/solr", host, port),
                    None => format!("{}/solr", host),
                };
                if !specs.contains(&spec) {
                    specs.push(spec);
                }
            }
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(spec: &str) -> (Option<String>, String, Option<String>, String) {
        let s = ShardSpec::parse(spec).unwrap();
        (s.prefix, s.host, s.port, s.suffix)
    }

    #[test]
    fn test_shard_grammar() {
        let cases = [
            ("https://esgf-test.a.b.c/solr", (Some("https://"), "esgf-test.a.b.c", None, "solr")),
            ("http://esgf.a.c/solr/data", (Some("http://"), "esgf.a.c", None, "solr/data")),
            ("http://esgs.a.d:80/data/solr", (Some("http://"), "esgs.a.d", Some("80"), "data/solr")),
            ("esgf.a.c:80/solr", (None, "esgf.a.c", Some("80"), "solr")),
            ("esgf.a.c/solr", (None, "esgf.a.c", None, "solr")),
        ];

        for (spec, (prefix, host, port, suffix)) in cases {
            assert_eq!(
                parts(spec),
                (
                    prefix.map(String::from),
                    host.to_string(),
                    port.map(String::from),
                    suffix.to_string()
                ),
                "spec {}",
                spec
            );
        }
    }

    #[test]
    fn test_host_ending_in_digits() {
        assert_eq!(parts("esgf-node1/solr").1, "esgf-node1");
    }

    #[test]
    fn test_malformed_spec() {
        let err = ShardSpec::parse("no-suffix-here").unwrap_err();
        assert!(matches!(err, SearchError::ProtocolError(_)));
        assert!(err.to_string().contains("no-suffix-here"));
    }

    #[test]
    fn test_map_groups_hosts_and_rewrites_loopback() {
        let map = ShardMap::from_specs(
            [
                "localhost:8983/solr/datasets",
                "localhost:8983/solr/files",
                "esgf-index2.ceda.ac.uk:8983/solr/datasets",
                "esgf-index2.ceda.ac.uk:8983/solr/datasets",
            ],
            Some("esgf.ceda.ac.uk"),
        )
        .unwrap();

        assert!(!map.contains_host("localhost"));
        assert_eq!(map.locations("esgf.ceda.ac.uk").unwrap().len(), 2);
        assert_eq!(map.locations("esgf-index2.ceda.ac.uk").unwrap().len(), 1);
        assert!(map.resolved_at().is_some());

        let specs = map.query_specs(&["esgf.ceda.ac.uk".to_string()]).unwrap();
        assert_eq!(specs, vec!["esgf.ceda.ac.uk:8983/solr"]);
    }

    #[test]
    fn test_query_specs_unknown_host() {
        let map = ShardMap::new();
        let err = map.query_specs(&["nowhere".to_string()]).unwrap_err();
        assert!(matches!(err, SearchError::UnknownShard(_)));
    }
}
