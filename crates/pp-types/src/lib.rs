pub mod table;
pub mod config;
pub mod results;
pub mod errors;

pub use table::*;
pub use config::*;
pub use results::*;
pub use errors::*;
