pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod value;

pub use config::Config;
pub use error::*;
pub use record::*;
pub use schema::*;
pub use value::*;
