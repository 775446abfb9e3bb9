pub mod config;
pub mod error;
pub mod schema;
pub mod types;

pub use config::*;
pub use error::*;
pub use schema::*;
pub use types::*;
