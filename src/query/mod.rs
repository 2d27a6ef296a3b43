//! Query construction and encoding
//!
//! Turns ordered, multi-valued parameters into the query strings sent to the
//! search service.

mod encoder;
mod params;

pub use encoder::*;
pub use params::*;
