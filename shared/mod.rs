//! Table types shared across the crate, file loading and result writing.

pub mod data;
pub mod output;
pub mod table;
