//! Shard discovery
//!
//! Parses the shard list a distributed search service reports and groups the
//! physical shards by host.

mod shards;

pub use shards::*;
