//! Configuration for the search client
//!
//! Supports loading configuration from TOML files and environment variables.

mod settings;

pub use settings::*;
