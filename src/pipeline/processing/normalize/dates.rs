use super::present_columns;
use crate::constants::CANONICAL_DATE_FORMAT;
use crate::error::StageError;
use crate::pipeline::processing::{run_stage, Stage, StageOutcome};
use crate::types::{ColumnKind, RecordSet, Value};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid ordinal regex"));
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/](\d{1,2})$").expect("valid year-month regex"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

// Two-digit-year forms come before their four-digit twins: `%Y` happily
// reads "21" as year 21, while `%y` rejects a four-digit year.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%m-%d-%y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y%m%d",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%A, %B %d, %Y",
    "%a, %b %d, %Y",
    "%a %b %d %Y",
];

// `%Y` accepts one to four digits, so "1/5/21" would otherwise read as
// 0001-05-21 through the year-first formats.
fn plausible_year(year: i32) -> bool {
    year >= 100
}

/// Best-effort, locale-agnostic date/datetime parse. Empty and
/// unparseable input yields `None`.
pub fn parse_date_string(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.naive_local());
    }

    for fmt in DATETIME_FORMATS {
        match NaiveDateTime::parse_from_str(trimmed, fmt) {
            Ok(dt) if plausible_year(dt.year()) => return Some(dt),
            _ => continue,
        }
    }

    let cleaned = ORDINAL_SUFFIX.replace_all(trimmed, "$1");
    for fmt in DATE_FORMATS {
        match NaiveDate::parse_from_str(&cleaned, fmt) {
            Ok(d) if plausible_year(d.year()) => return d.and_hms_opt(0, 0, 0),
            _ => continue,
        }
    }

    if let Some(caps) = YEAR_MONTH.captures(trimmed) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    }

    debug!("Could not parse date '{}'", raw);
    None
}

/// Format a parsed datetime, e.g. with `%Y-%m-%d`.
pub fn standardize_date_format(date: Option<NaiveDateTime>, format: &str) -> Option<String> {
    date.map(|d| d.format(format).to_string())
}

/// Parse one cell into a calendar date.
pub fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    match value {
        v if v.is_null() => None,
        Value::Date(d) => Some(*d),
        Value::Text(s) => parse_date_string(s).map(|dt| dt.date()),
        Value::Int(i) => parse_date_string(&i.to_string()).map(|dt| dt.date()),
        other => parse_date_string(&other.to_string()).map(|dt| dt.date()),
    }
}

/// Rewrites the configured date columns to calendar dates. Cells that do
/// not parse become null.
pub struct DateStandardizer<'a, S: AsRef<str>> {
    date_columns: &'a [S],
}

impl<'a, S: AsRef<str>> DateStandardizer<'a, S> {
    pub fn new(date_columns: &'a [S]) -> Self {
        Self { date_columns }
    }
}

impl<'a, S: AsRef<str>> Stage for DateStandardizer<'a, S> {
    fn name(&self) -> &'static str {
        "standardize_dates"
    }

    fn apply(&self, records: &RecordSet) -> Result<StageOutcome, StageError> {
        let existing = present_columns(records, self.date_columns);
        if existing.is_empty() {
            warn!("No date columns found in record set");
            return Ok(StageOutcome::Unchanged);
        }
        records.check_shape()?;

        let mut out = records.clone();
        for col in existing {
            info!("Standardizing date column: {}", col);
            for i in 0..out.len() {
                let parsed = parse_date_value(out.get(i, col));
                out.set(i, col, Value::from(parsed));
            }
            out.hint_kind(col, ColumnKind::Temporal);

            let null_count = out.null_count(col);
            if null_count > 0 {
                warn!(
                    "Column '{}' has {} null values after date standardization",
                    col, null_count
                );
            }
        }
        debug!("Date standardization completed with format {}", CANONICAL_DATE_FORMAT);
        Ok(StageOutcome::Transformed(out))
    }
}

/// Convenience entry point applying the fail-open policy.
pub fn standardize_dates<S: AsRef<str>>(records: &RecordSet, date_columns: &[S]) -> RecordSet {
    run_stage(&DateStandardizer::new(date_columns), records.clone())
}
