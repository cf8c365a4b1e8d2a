use crate::constants::UNKNOWN_TEXT;
use crate::error::StageError;
use crate::pipeline::processing::{run_stage, Stage, StageOutcome};
use crate::types::{ColumnKind, RecordSet, Value};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValueStrategy {
    /// Fill by column kind: numbers get 0, text gets "Unknown", dates stay null
    #[default]
    Default,
    DropRows,
    DropColumns,
}

impl fmt::Display for MissingValueStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingValueStrategy::Default => "default",
            MissingValueStrategy::DropRows => "drop_rows",
            MissingValueStrategy::DropColumns => "drop_columns",
        })
    }
}

impl FromStr for MissingValueStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "default" => Ok(MissingValueStrategy::Default),
            "drop_rows" => Ok(MissingValueStrategy::DropRows),
            "drop_columns" => Ok(MissingValueStrategy::DropColumns),
            other => Err(format!("unknown missing-value strategy '{}'", other)),
        }
    }
}

pub struct MissingValueResolver {
    strategy: MissingValueStrategy,
}

impl MissingValueResolver {
    pub fn new(strategy: MissingValueStrategy) -> Self {
        Self { strategy }
    }

    fn fill_by_kind(&self, records: &RecordSet, counts: &[(String, usize)]) -> RecordSet {
        let kinds = records.kinds();
        let mut out = records.clone();

        for (column, missing) in counts.iter().filter(|(_, n)| *n > 0) {
            let fill = match kinds.get(column) {
                Some(ColumnKind::Integer) => Value::Int(0),
                Some(ColumnKind::Float) => Value::Float(0.0),
                Some(ColumnKind::Temporal) => {
                    info!("Left {} missing values in date column '{}' as null", missing, column);
                    continue;
                }
                _ => Value::Text(UNKNOWN_TEXT.to_string()),
            };
            info!("Filled {} missing values in column '{}' with {:?}", missing, column, fill);

            for i in 0..out.len() {
                if out.get(i, column).is_null() {
                    out.set(i, column, fill.clone());
                }
            }
        }
        out
    }
}

impl Stage for MissingValueResolver {
    fn name(&self) -> &'static str {
        "handle_missing_values"
    }

    fn apply(&self, records: &RecordSet) -> Result<StageOutcome, StageError> {
        info!("Handling missing values using strategy: {}", self.strategy);
        records.check_shape()?;

        let counts = records.null_counts();
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        if total == 0 {
            info!("No missing values found in record set");
            return Ok(StageOutcome::Unchanged);
        }
        let affected = counts.iter().filter(|(_, n)| *n > 0).count();
        info!("Found {} missing values across {} columns", total, affected);

        let out = match self.strategy {
            MissingValueStrategy::DropRows => {
                let mut out = records.clone();
                let before = out.len();
                out.retain_rows(|row| !records.row_has_missing(row));
                info!("Dropped {} rows with missing values", before - out.len());
                out
            }
            MissingValueStrategy::DropColumns => {
                let doomed: Vec<String> = counts
                    .iter()
                    .filter(|(_, n)| *n > 0)
                    .map(|(c, _)| c.clone())
                    .collect();
                let mut out = records.clone();
                out.drop_columns(&doomed);
                info!("Dropped {} columns with missing values: {:?}", doomed.len(), doomed);
                out
            }
            MissingValueStrategy::Default => self.fill_by_kind(records, &counts),
        };
        Ok(StageOutcome::Transformed(out))
    }
}

/// Convenience entry point applying the fail-open policy.
pub fn handle_missing_values(records: &RecordSet, strategy: MissingValueStrategy) -> RecordSet {
    run_stage(&MissingValueResolver::new(strategy), records.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use chrono::NaiveDate;

    fn sample() -> RecordSet {
        let day = NaiveDate::from_ymd_opt(2021, 1, 5).unwrap();
        RecordSet::from_rows(vec![
            record! { "date" => day, "region" => "ny", "cases" => 10i64, "rate" => 1.5 },
            record! { "date" => Value::Null, "region" => Value::Null, "cases" => Value::Null, "rate" => Value::Null },
            record! { "date" => day, "region" => "ca", "cases" => 7i64, "rate" => 2.0 },
        ])
    }

    #[test]
    fn test_default_fills_by_kind() {
        let out = handle_missing_values(&sample(), MissingValueStrategy::Default);
        assert_eq!(out.len(), 3);
        assert_eq!(out.get(1, "cases"), &Value::Int(0));
        assert_eq!(out.get(1, "rate"), &Value::Float(0.0));
        assert_eq!(out.get(1, "region"), &Value::from("Unknown"));
        assert!(out.get(1, "date").is_null());
    }

    #[test]
    fn test_default_is_idempotent() {
        let once = handle_missing_values(&sample(), MissingValueStrategy::Default);
        let twice = handle_missing_values(&once, MissingValueStrategy::Default);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_drop_rows_removes_incomplete_records() {
        let out = handle_missing_values(&sample(), MissingValueStrategy::DropRows);
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(1, "region"), &Value::from("ca"));
        assert_eq!(out.columns(), sample().columns());
    }

    #[test]
    fn test_drop_columns_removes_incomplete_columns() {
        let mut records = sample();
        records.set(1, "region", Value::from("tx"));
        let out = handle_missing_values(&records, MissingValueStrategy::DropColumns);
        assert_eq!(out.columns(), &["region"]);
        assert_eq!(out.len(), 3);
        assert!(out.rows().iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_complete_record_set_is_unchanged() {
        let records = RecordSet::from_rows(vec![record! { "region" => "ny", "cases" => 1i64 }]);
        let stage = MissingValueResolver::new(MissingValueStrategy::Default);
        assert!(stage.apply(&records).unwrap().is_unchanged());
    }

    #[test]
    fn test_empty_record_set_stays_empty() {
        let records = RecordSet::with_columns(["cases"]);
        for strategy in [
            MissingValueStrategy::Default,
            MissingValueStrategy::DropRows,
            MissingValueStrategy::DropColumns,
        ] {
            assert!(handle_missing_values(&records, strategy).is_empty());
        }
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("drop_rows".parse(), Ok(MissingValueStrategy::DropRows));
        assert!("guess".parse::<MissingValueStrategy>().is_err());
    }
}
