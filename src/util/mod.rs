//! Utilities built on the search API

mod manifest;

pub use manifest::*;
