//! ESGF Search - client for the ESGF faceted search federation
//!
//! A Rust client for the search API of ESGF index nodes, providing:
//! - Connections with lazy shard discovery and scoped HTTP sessions
//! - Immutable search contexts with cached hit and facet counts
//! - Lazily paged result sets of dataset, file and aggregation records
//! - Download scripts and dataset file manifests

pub mod config;
pub mod connection;
pub mod context;
pub mod discovery;
pub mod metrics;
pub mod models;
pub mod query;
pub mod results;
pub mod transport;
pub mod util;

// Re-export commonly used types
pub use config::Settings;
pub use connection::{SearchConnection, SearchConnectionBuilder};
pub use context::{ContextOptions, SearchContext};
pub use discovery::ShardMap;
pub use models::{any_of, not_equals, Constraints, Operator, QueryValue, SearchError, SearchResult, SearchType};
pub use results::{Record, ResultRecord, ResultSet, SearchOptions};
pub use transport::{HttpSession, Transport};
pub use util::get_manifest;

/// Version of the esgf-search client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
