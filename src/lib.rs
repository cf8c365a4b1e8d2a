pub mod config;
pub mod constants;
pub mod error;
pub mod mock_api;
pub mod observability;
pub mod pipeline;
pub mod types;

pub use config::Config;
pub use error::{EtlError, Result, StageError};
pub use types::{ColumnKind, Extractor, Record, RecordSet, Value};
