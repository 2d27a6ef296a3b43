//! Data models for the search client
//!
//! Constraint values, record types, response decoding and errors.

mod constraint;
mod error;
mod response;
mod search_type;
mod temporal;

pub use constraint::*;
pub use error::*;
pub use response::*;
pub use search_type::*;
pub use temporal::*;
