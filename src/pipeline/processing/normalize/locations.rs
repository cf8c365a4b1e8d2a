use super::{clean_string, present_columns};
use crate::constants::DEFAULT_LOCATION_ALIASES;
use crate::error::StageError;
use crate::pipeline::processing::{run_stage, Stage, StageOutcome};
use crate::types::{RecordSet, Value};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Lowercase, trimmed location token → canonical location name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct AliasTable {
    aliases: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            aliases: pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.into()))
                .collect(),
        }
    }

    pub fn lookup(&self, token: &str) -> Option<&str> {
        self.aliases.get(token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_LOCATION_ALIASES.iter().copied())
    }
}

impl From<BTreeMap<String, String>> for AliasTable {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::from_pairs(map)
    }
}

/// Trim, lowercase, then map through the alias table. Unmapped tokens pass
/// through in their cleaned form.
pub fn clean_location(location: Option<&str>, aliases: &AliasTable) -> Option<String> {
    let cleaned = location?.trim().to_lowercase();
    match aliases.lookup(&cleaned) {
        Some(canonical) => Some(canonical.to_string()),
        None => Some(cleaned),
    }
}

fn clean_location_value(value: &Value, aliases: &AliasTable) -> Value {
    match clean_string(value) {
        Some(cleaned) => Value::Text(
            aliases
                .lookup(&cleaned)
                .map(str::to_string)
                .unwrap_or(cleaned),
        ),
        None => Value::Null,
    }
}

pub struct LocationNormalizer<'a, S: AsRef<str>> {
    location_columns: &'a [S],
    aliases: &'a AliasTable,
}

impl<'a, S: AsRef<str>> LocationNormalizer<'a, S> {
    pub fn new(location_columns: &'a [S], aliases: &'a AliasTable) -> Self {
        Self {
            location_columns,
            aliases,
        }
    }
}

impl<'a, S: AsRef<str>> Stage for LocationNormalizer<'a, S> {
    fn name(&self) -> &'static str {
        "normalize_locations"
    }

    fn apply(&self, records: &RecordSet) -> Result<StageOutcome, StageError> {
        let existing = present_columns(records, self.location_columns);
        if existing.is_empty() {
            warn!("No location columns found in record set");
            return Ok(StageOutcome::Unchanged);
        }
        records.check_shape()?;

        let mut out = records.clone();
        for col in existing {
            info!("Normalizing location column: {}", col);
            for i in 0..out.len() {
                let cleaned = clean_location_value(out.get(i, col), self.aliases);
                out.set(i, col, cleaned);
            }

            let null_count = out.null_count(col);
            if null_count > 0 {
                warn!(
                    "Column '{}' has {} null values after location normalization",
                    col, null_count
                );
            }
        }
        Ok(StageOutcome::Transformed(out))
    }
}

/// Convenience entry point applying the fail-open policy.
pub fn normalize_locations<S: AsRef<str>>(
    records: &RecordSet,
    location_columns: &[S],
    aliases: &AliasTable,
) -> RecordSet {
    run_stage(&LocationNormalizer::new(location_columns, aliases), records.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn test_clean_location_examples() {
        let aliases = AliasTable::default();
        assert_eq!(clean_location(Some("  NY "), &aliases).as_deref(), Some("new york"));
        assert_eq!(clean_location(None, &aliases), None);
        assert_eq!(clean_location(Some("California"), &aliases).as_deref(), Some("california"));
        assert_eq!(clean_location(Some("D.C."), &aliases).as_deref(), Some("district of columbia"));
    }

    #[test]
    fn test_alias_keys_are_normalized() {
        let aliases = AliasTable::from_pairs([(" BC ", "british columbia")]);
        assert_eq!(aliases.lookup("bc"), Some("british columbia"));
        assert_eq!(aliases.len(), 1);
    }

    #[test]
    fn test_normalize_locations_maps_every_present_column() {
        let aliases = AliasTable::default();
        let records = RecordSet::from_rows(vec![
            record! { "region" => " TX", "county" => "Harris ", "cases" => 3i64 },
            record! { "region" => Value::Null, "county" => 42i64, "cases" => 4i64 },
        ]);

        let out = normalize_locations(&records, &["region", "state", "county"], &aliases);

        assert_eq!(out.get(0, "region"), &Value::from("texas"));
        assert!(out.get(1, "region").is_null());
        assert_eq!(out.get(0, "county"), &Value::from("harris"));
        assert_eq!(out.get(1, "county"), &Value::from("42"));
        assert_eq!(out.get(0, "cases"), &Value::Int(3));
    }

    #[test]
    fn test_no_location_columns_is_identity() {
        let aliases = AliasTable::default();
        let records = RecordSet::from_rows(vec![record! { "deaths" => 1i64 }]);
        let stage = LocationNormalizer::new(&["region"], &aliases);
        assert!(stage.apply(&records).unwrap().is_unchanged());
        assert_eq!(normalize_locations(&records, &["region"], &aliases), records);
    }

    #[test]
    fn test_empty_record_set_stays_empty() {
        let aliases = AliasTable::default();
        let records = RecordSet::with_columns(["region"]);
        assert!(normalize_locations(&records, &["region"], &aliases).is_empty());
    }
}
