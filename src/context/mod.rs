//! Search contexts

mod context;

pub use context::*;
