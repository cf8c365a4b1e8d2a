// Normalization of free-form date and location cells

pub mod dates;
pub mod locations;

pub use dates::{parse_date_string, standardize_date_format, standardize_dates, DateStandardizer};
pub use locations::{clean_location, normalize_locations, AliasTable, LocationNormalizer};

use crate::types::{RecordSet, Value};

/// Trim and lowercase a cell. Missing values stay missing; other scalars
/// are stringified first.
pub fn clean_string(value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }
    Some(value.to_string().trim().to_lowercase())
}

/// The candidate columns that actually exist in `records`, in candidate order.
pub(crate) fn present_columns<'a, S: AsRef<str>>(records: &RecordSet, candidates: &'a [S]) -> Vec<&'a str> {
    candidates
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| records.has_column(c))
        .collect()
}
