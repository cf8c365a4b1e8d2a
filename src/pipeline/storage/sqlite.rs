use crate::config::DatabaseConfig;
use crate::error::{EtlError, Result};
use crate::types::{Record, RecordSet, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid table name regex"));

/// What `load` does when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfExists {
    Fail,
    #[default]
    Replace,
    Append,
}

impl fmt::Display for IfExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IfExists::Fail => "fail",
            IfExists::Replace => "replace",
            IfExists::Append => "append",
        })
    }
}

impl FromStr for IfExists {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "fail" => Ok(IfExists::Fail),
            "replace" => Ok(IfExists::Replace),
            "append" => Ok(IfExists::Append),
            other => Err(format!("unknown if_exists mode '{}'", other)),
        }
    }
}

/// A table created up front by `create_database_schema`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    /// Column definitions, e.g. `"date TEXT"`
    pub columns: Vec<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Starting schemas for the case, hospital and vaccination tables.
pub fn default_table_definitions(db: &DatabaseConfig) -> Vec<TableDefinition> {
    vec![
        TableDefinition::new(
            &db.cases_table,
            &[
                "id INTEGER PRIMARY KEY AUTOINCREMENT",
                "date TEXT",
                "region TEXT",
                "confirmed_cases INTEGER",
                "deaths INTEGER",
                "recovered INTEGER",
                "active_cases INTEGER",
                "total_tests INTEGER",
                "positivity_rate REAL",
                "case_fatality_rate REAL",
            ],
        ),
        TableDefinition::new(
            &db.hospitals_table,
            &[
                "id INTEGER PRIMARY KEY AUTOINCREMENT",
                "date TEXT",
                "hospital_name TEXT",
                "location TEXT",
                "total_beds INTEGER",
                "occupied_beds INTEGER",
                "available_beds INTEGER",
                "icu_beds INTEGER",
                "ventilators INTEGER",
                "hospital_utilization_rate REAL",
            ],
        ),
        TableDefinition::new(
            &db.vaccinations_table,
            &[
                "id INTEGER PRIMARY KEY AUTOINCREMENT",
                "date TEXT",
                "region TEXT",
                "total_vaccinations INTEGER",
                "people_vaccinated INTEGER",
                "people_fully_vaccinated INTEGER",
                "vaccination_rate REAL",
            ],
        ),
    ]
}

pub fn validate_table_name(name: &str) -> Result<()> {
    if TABLE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(EtlError::Load(format!("invalid table name '{}'", name)))
    }
}

/// Column names come from source headers, so they are quoted rather than
/// restricted.
fn quote_column(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(EtlError::Load(format!("invalid column name {:?}", name)));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(ToSqlOutput::Owned(match self {
            v if v.is_null() => Sql::Null,
            Value::Int(i) => Sql::Integer(*i),
            Value::Float(f) => Sql::Real(*f),
            Value::Text(s) => Sql::Text(s.clone()),
            other => Sql::Text(other.to_string()),
        }))
    }
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

/// SQLite-backed store for transformed datasets.
pub struct SqliteLoader {
    conn: Connection,
}

impl SqliteLoader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!("Opened SQLite database at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    #[instrument(skip(self, tables))]
    pub fn create_database_schema(&self, tables: &[TableDefinition]) -> Result<()> {
        info!("Creating database schema");
        for table in tables {
            validate_table_name(&table.name)?;
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                table.name,
                table.columns.join(", ")
            );
            self.conn.execute_batch(&sql)?;
            info!("Created table: {}", table.name);
        }
        info!("Database schema created successfully");
        Ok(())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        let mut rows = stmt.query([table])?;
        Ok(rows.next()?.is_some())
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        validate_table_name(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn create_table_for(&self, records: &RecordSet, table: &str) -> Result<()> {
        let kinds = records.kinds();
        let columns = kinds
            .iter()
            .map(|(name, kind)| Ok(format!("{} {}", quote_column(name)?, kind.sql_type())))
            .collect::<Result<Vec<_>>>()?;
        self.conn
            .execute_batch(&format!("CREATE TABLE {} ({})", table, columns.join(", ")))?;
        Ok(())
    }

    /// Write `records` into `table` in one transaction and return the table's
    /// row count afterwards.
    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub fn load(&mut self, records: &RecordSet, table: &str, if_exists: IfExists) -> Result<usize> {
        info!("Loading data to SQLite table: {}", table);
        validate_table_name(table)?;
        if records.is_empty() {
            return Err(EtlError::Load("Cannot load empty record set to database".into()));
        }

        let exists = self.table_exists(table)?;
        match (exists, if_exists) {
            (true, IfExists::Fail) => {
                return Err(EtlError::Load(format!("Table '{}' already exists", table)));
            }
            (true, IfExists::Replace) => {
                debug!("Dropping existing table {}", table);
                self.conn.execute_batch(&format!("DROP TABLE {}", table))?;
                self.create_table_for(records, table)?;
            }
            (true, IfExists::Append) => {}
            (false, _) => self.create_table_for(records, table)?,
        }

        let columns = records
            .columns()
            .iter()
            .map(|c| quote_column(c))
            .collect::<Result<Vec<_>>>()?;
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in records.rows() {
                let values = records.columns().iter().map(|c| cell(row, c));
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;

        let row_count = self.row_count(table)?;
        info!("Successfully loaded {} rows to table '{}'", row_count, table);
        Ok(row_count)
    }

    /// Run a read query and collect the result as a record set.
    pub fn query_records(&self, sql: &str) -> Result<RecordSet> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut records = RecordSet::with_columns(names.iter().cloned());

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, name) in names.iter().enumerate() {
                record.insert(name.clone(), value_from_sql(row.get_ref(i)?));
            }
            records.push_row(record);
        }
        Ok(records)
    }
}

fn cell<'r>(row: &'r Record, column: &str) -> &'r Value {
    static NULL: Value = Value::Null;
    row.get(column).unwrap_or(&NULL)
}
