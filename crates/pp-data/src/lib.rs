//! # pp-data
//!
//! Reads probe-count and dataset-weight tables and writes selected parameter
//! values. All tables are tab-separated with a header row.

pub mod loaders;
pub mod writers;

pub use loaders::*;
pub use writers::*;
