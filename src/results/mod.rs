//! Search results

mod records;
mod result_set;

pub use records::*;
pub use result_set::*;
