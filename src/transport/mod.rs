//! Transport layer
//!
//! The search core only needs to send a GET and read the reply body; the
//! `Transport` trait is that boundary.

mod session;
#[cfg(test)]
pub(crate) mod stub;

pub use session::*;
