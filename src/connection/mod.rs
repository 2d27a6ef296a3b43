//! Search service connection

mod connection;

pub use connection::*;
