use crate::error::{Result, StageError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single cell. Extractors produce `Null`, `Int`, `Float` and `Text`;
/// the date stage turns parsed cells into `Date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

static NULL: Value = Value::Null;

impl Value {
    /// NaN counts as missing, the same way an empty numeric cell does.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "temporal",
        }
    }

    /// Type a raw flat-file cell: empty is null, then integer, then float,
    /// otherwise the trimmed text.
    pub fn parse_cell(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        Value::Text(trimmed.to_string())
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// Text form used by loaders and exporters. `None` for missing values.
    pub fn render(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.to_string())
        }
    }

    /// Key used when comparing values for duplicates.
    pub(crate) fn identity_key(&self) -> String {
        match self {
            Value::Null => "null:".to_string(),
            Value::Float(f) if f.is_nan() => "null:".to_string(),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("num:{}", *f as i64),
            Value::Int(i) => format!("num:{}", i),
            Value::Float(f) => format!("num:{}", f),
            Value::Text(s) => format!("text:{}", s),
            Value::Date(d) => format!("date:{}", d),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

pub type Record = BTreeMap<String, Value>;

/// Inferred type of a column within one record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
    Temporal,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Text => "text",
            ColumnKind::Temporal => "temporal",
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Float => "REAL",
            ColumnKind::Text | ColumnKind::Temporal => "TEXT",
        }
    }

    /// A column with no non-null values is typed as float, which is how a
    /// flat-file reader types an all-empty column.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnKind {
        Self::infer_present(values).unwrap_or(ColumnKind::Float)
    }

    /// Kind of the non-null values, `None` when every value is null.
    pub fn infer_present<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<ColumnKind> {
        let mut kind: Option<ColumnKind> = None;
        for value in values {
            let cell = match value {
                v if v.is_null() => continue,
                Value::Int(_) => ColumnKind::Integer,
                Value::Float(_) => ColumnKind::Float,
                Value::Date(_) => ColumnKind::Temporal,
                _ => ColumnKind::Text,
            };
            kind = Some(match (kind, cell) {
                (None, c) => c,
                (Some(k), c) if k == c => k,
                (Some(ColumnKind::Integer), ColumnKind::Float)
                | (Some(ColumnKind::Float), ColumnKind::Integer) => ColumnKind::Float,
                _ => return Some(ColumnKind::Text),
            });
        }
        kind
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "integer" | "int" => Ok(ColumnKind::Integer),
            "float" => Ok(ColumnKind::Float),
            "text" | "str" | "string" => Ok(ColumnKind::Text),
            "temporal" | "date" | "datetime" => Ok(ColumnKind::Temporal),
            other => Err(format!("unknown column kind '{}'", other)),
        }
    }
}

/// One inferred kind per column, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnKinds(Vec<(String, ColumnKind)>);

impl ColumnKinds {
    pub fn get(&self, column: &str) -> Option<ColumnKind> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, k)| *k)
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, k)| k.is_numeric())
            .map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
        self.0.iter().map(|(name, k)| (name.as_str(), *k))
    }
}

/// Ordered rows sharing an ordered column list. A column missing from a
/// row reads as null.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Record>,
    /// Kinds declared by a stage, used when a column has no values to infer from
    #[serde(skip)]
    kind_hints: BTreeMap<String, ColumnKind>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for column in columns {
            set.add_column(column);
        }
        set
    }

    /// Builds a set from rows, taking columns in first-seen order.
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let mut set = Self::new();
        for row in rows {
            set.push_row(row);
        }
        set
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(column);
        }
    }

    /// Appends a row, registering any column it introduces.
    pub fn push_row(&mut self, row: Record) {
        for key in row.keys() {
            self.add_column(key.clone());
        }
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, column: &str) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&NULL)
    }

    pub fn set(&mut self, row: usize, column: &str, value: Value) {
        if let Some(r) = self.rows.get_mut(row) {
            r.insert(column.to_string(), value);
        }
    }

    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows
            .iter()
            .map(move |r| r.get(column).unwrap_or(&NULL))
    }

    /// Declare the kind a column holds, e.g. after the date stage nulled
    /// every cell it could not parse.
    pub fn hint_kind(&mut self, column: &str, kind: ColumnKind) {
        self.kind_hints.insert(column.to_string(), kind);
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if from == to || !self.has_column(from) || self.has_column(to) {
            return;
        }
        if let Some(kind) = self.kind_hints.remove(from) {
            self.kind_hints.insert(to.to_string(), kind);
        }
        for c in self.columns.iter_mut().filter(|c| c.as_str() == from) {
            *c = to.to_string();
        }
        for row in &mut self.rows {
            if let Some(v) = row.remove(from) {
                row.insert(to.to_string(), v);
            }
        }
    }

    pub fn drop_columns(&mut self, columns: &[String]) {
        self.columns.retain(|c| !columns.contains(c));
        self.kind_hints.retain(|c, _| !columns.contains(c));
        for row in &mut self.rows {
            row.retain(|k, _| !columns.contains(k));
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Record) -> bool,
    {
        self.rows.retain(|r| keep(r));
    }

    pub fn row_has_missing(&self, row: &Record) -> bool {
        self.columns
            .iter()
            .any(|c| row.get(c).map(Value::is_null).unwrap_or(true))
    }

    pub fn null_count(&self, column: &str) -> usize {
        self.column_values(column).filter(|v| v.is_null()).count()
    }

    /// Missing-value counts for every column, in column order.
    pub fn null_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .map(|c| (c.clone(), self.null_count(c)))
            .collect()
    }

    pub fn total_missing(&self) -> usize {
        self.null_counts().iter().map(|(_, n)| n).sum()
    }

    pub fn kinds(&self) -> ColumnKinds {
        ColumnKinds(
            self.columns
                .iter()
                .map(|c| {
                    let kind = ColumnKind::infer_present(self.column_values(c))
                        .or_else(|| self.kind_hints.get(c).copied())
                        .unwrap_or(ColumnKind::Float);
                    (c.clone(), kind)
                })
                .collect(),
        )
    }

    /// Every key of every row must be a declared column.
    pub fn check_shape(&self) -> std::result::Result<(), StageError> {
        for (i, row) in self.rows.iter().enumerate() {
            if let Some(key) = row.keys().find(|k| !self.has_column(k)) {
                return Err(StageError::Shape {
                    row: i,
                    column: key.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Builds a record from `(column, value)` pairs.
#[macro_export]
macro_rules! record {
    ($($col:expr => $val:expr),* $(,)?) => {{
        let mut r = $crate::types::Record::new();
        $( r.insert($col.to_string(), $crate::types::Value::from($val)); )*
        r
    }};
}

/// Core trait that every data source implements.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    /// Short name used in logs and metrics
    fn source_name(&self) -> &str;

    /// Read the source into a record set
    async fn extract(&self) -> Result<RecordSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_types() {
        assert_eq!(Value::parse_cell(""), Value::Null);
        assert_eq!(Value::parse_cell(" 42 "), Value::Int(42));
        assert_eq!(Value::parse_cell("4.5"), Value::Float(4.5));
        assert_eq!(Value::parse_cell("Texas"), Value::Text("Texas".into()));
        assert_eq!(Value::parse_cell("nan"), Value::Text("nan".into()));
    }

    #[test]
    fn test_kind_inference() {
        let ints = [Value::Int(1), Value::Null, Value::Int(3)];
        assert_eq!(ColumnKind::infer(&ints), ColumnKind::Integer);

        let mixed = [Value::Int(1), Value::Float(2.5)];
        assert_eq!(ColumnKind::infer(&mixed), ColumnKind::Float);

        let text = [Value::Int(1), Value::Text("x".into())];
        assert_eq!(ColumnKind::infer(&text), ColumnKind::Text);

        let dates = [Value::Date(NaiveDate::from_ymd_opt(2021, 1, 5).unwrap()), Value::Null];
        assert_eq!(ColumnKind::infer(&dates), ColumnKind::Temporal);

        assert_eq!(ColumnKind::infer(&[Value::Null]), ColumnKind::Float);
    }

    #[test]
    fn test_from_rows_tracks_columns_and_missing() {
        let set = RecordSet::from_rows(vec![
            crate::record! { "region" => "ny", "deaths" => 3i64 },
            crate::record! { "region" => "ca", "cases" => 10i64 },
        ]);
        assert_eq!(set.columns(), &["deaths", "region", "cases"]);
        assert_eq!(set.null_count("cases"), 1);
        assert_eq!(set.null_count("deaths"), 1);
        assert_eq!(set.total_missing(), 2);
        assert!(set.get(1, "deaths").is_null());
    }

    #[test]
    fn test_kind_hint_applies_only_to_all_null_columns() {
        let mut set = RecordSet::from_rows(vec![
            crate::record! { "date" => Value::Null, "cases" => 3i64 },
        ]);
        assert_eq!(set.kinds().get("date"), Some(ColumnKind::Float));

        set.hint_kind("date", ColumnKind::Temporal);
        set.hint_kind("cases", ColumnKind::Text);
        assert_eq!(set.kinds().get("date"), Some(ColumnKind::Temporal));
        assert_eq!(set.kinds().get("cases"), Some(ColumnKind::Integer));

        set.rename_column("date", "report_date");
        assert_eq!(set.kinds().get("report_date"), Some(ColumnKind::Temporal));
    }

    #[test]
    fn test_date_renders_canonically() {
        let v = Value::Date(NaiveDate::from_ymd_opt(2021, 3, 7).unwrap());
        assert_eq!(v.render().as_deref(), Some("2021-03-07"));
        assert_eq!(Value::Null.render(), None);
    }

    #[test]
    fn test_check_shape_rejects_undeclared_keys() {
        let mut set = RecordSet::with_columns(["a"]);
        set.rows.push(crate::record! { "b" => 1i64 });
        assert!(matches!(set.check_shape(), Err(StageError::Shape { row: 0, .. })));
    }
}
