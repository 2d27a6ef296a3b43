//! Metrics for the search client

mod prometheus;

pub use self::prometheus::*;
