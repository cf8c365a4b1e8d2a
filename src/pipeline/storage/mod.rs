// Pipeline storage: SQLite loading and CSV export

pub mod csv_export;
pub mod sqlite;

pub use csv_export::{export_query_to_csv, export_to_csv, ExportTarget};
pub use sqlite::{default_table_definitions, IfExists, SqliteLoader, TableDefinition};
