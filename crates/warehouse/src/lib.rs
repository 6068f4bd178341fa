pub mod athena;
pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod result;
pub mod sql;
pub mod statement;
pub mod table;
pub mod traits;

pub use athena::AthenaWarehouse;
pub use client::AthenaClient;
pub use config::{WarehouseBackend, WarehouseConfig};
pub use error::WarehouseError;
pub use memory::{MemoryWarehouse, Operation, WarehouseCall};
pub use result::{QueryColumn, QueryMetadata, QueryResult};
pub use statement::{MergeOutcome, MergeStatement};
pub use table::{TableCreation, TableRef, WriteMode};
pub use traits::Warehouse;
