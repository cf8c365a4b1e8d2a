use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::constants::{COUNT_KEYWORDS, DATE_COLUMN_HINTS, LOCATION_COLUMN_HINTS, RATE_KEYWORDS};
use crate::types::{ColumnKind, ColumnKinds, RecordSet};

/// Outcome of a single expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationResult {
    /// Human-readable statement of what was expected
    pub description: String,
    pub passed: bool,
    /// Why the expectation failed; empty when it passed
    pub detail: String,
}

/// Ordered expectation results for one dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: Vec<ExpectationResult>,
}

impl ValidationReport {
    pub fn all_pass(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExpectationResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A validation rule expressed as data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expect", rename_all = "snake_case")]
pub enum Expectation {
    ColumnExists {
        column: String,
    },
    NotNull {
        column: String,
    },
    InRange {
        column: String,
        min: f64,
        #[serde(default)]
        max: Option<f64>,
    },
    IsType {
        column: String,
        kind: ColumnKind,
    },
    Unique {
        column: String,
    },
}

/// Evaluates expectations against a borrowed record set, accumulating results.
pub struct ExpectationValidator<'a> {
    records: &'a RecordSet,
    kinds: ColumnKinds,
    results: Vec<ExpectationResult>,
}

impl<'a> ExpectationValidator<'a> {
    pub fn new(records: &'a RecordSet) -> Self {
        Self {
            records,
            kinds: records.kinds(),
            results: Vec::new(),
        }
    }

    fn record(&mut self, description: String, passed: bool, detail: String) -> bool {
        self.results.push(ExpectationResult {
            description,
            passed,
            detail: if passed { String::new() } else { detail },
        });
        passed
    }

    pub fn column_exists(&mut self, column: &str) -> bool {
        let passed = self.records.has_column(column);
        self.record(
            format!("Column '{}' exists", column),
            passed,
            format!("Column '{}' not found in record set", column),
        )
    }

    pub fn column_not_null(&mut self, column: &str) -> bool {
        if !self.column_exists(column) {
            return false;
        }
        let nulls = self.records.null_count(column);
        self.record(
            format!("Column '{}' has no null values", column),
            nulls == 0,
            format!("{} null values found", nulls),
        )
    }

    /// Inclusive bounds; `max = None` means unbounded above.
    pub fn column_in_range(&mut self, column: &str, min: f64, max: Option<f64>) -> bool {
        if !self.column_exists(column) {
            return false;
        }
        let upper = max.unwrap_or(f64::INFINITY);
        let description = format!("Column '{}' values between {} and {}", column, min, fmt_bound(upper));

        let records = self.records;
        let mut observed: Option<(f64, f64)> = None;
        for value in records.column_values(column) {
            if value.is_null() {
                continue;
            }
            let Some(n) = value.as_f64() else {
                return self.record(
                    description,
                    false,
                    format!("Found {} value '{}' in numeric range check", value.kind_name(), value),
                );
            };
            observed = Some(match observed {
                None => (n, n),
                Some((lo, hi)) => (lo.min(n), hi.max(n)),
            });
        }

        match observed {
            None => self.record(description, false, "Column has no non-null values".to_string()),
            Some((lo, hi)) => self.record(
                description,
                lo >= min && hi <= upper,
                format!("Range is {} to {}", lo, hi),
            ),
        }
    }

    pub fn column_is_type(&mut self, column: &str, kind: ColumnKind) -> bool {
        if !self.column_exists(column) {
            return false;
        }
        let actual = self.kinds.get(column).unwrap_or(ColumnKind::Float);
        self.record(
            format!("Column '{}' values are of type {}", column, kind),
            actual == kind,
            format!("Inferred type is {}", actual),
        )
    }

    pub fn column_is_unique(&mut self, column: &str) -> bool {
        if !self.column_exists(column) {
            return false;
        }
        let mut seen = HashSet::new();
        let duplicates = self
            .records
            .column_values(column)
            .filter(|v| !seen.insert(v.identity_key()))
            .count();
        self.record(
            format!("Column '{}' values are unique", column),
            duplicates == 0,
            format!("{} duplicates found", duplicates),
        )
    }

    pub fn expect(&mut self, expectation: &Expectation) -> bool {
        match expectation {
            Expectation::ColumnExists { column } => self.column_exists(column),
            Expectation::NotNull { column } => self.column_not_null(column),
            Expectation::InRange { column, min, max } => self.column_in_range(column, *min, *max),
            Expectation::IsType { column, kind } => self.column_is_type(column, *kind),
            Expectation::Unique { column } => self.column_is_unique(column),
        }
    }

    pub fn overall_result(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn results(&self) -> &[ExpectationResult] {
        &self.results
    }

    pub fn into_report(self) -> ValidationReport {
        ValidationReport {
            results: self.results,
        }
    }

    /// Logs the pass count and every failure, then returns the overall result.
    pub fn summarize(&self) -> bool {
        let passed = self.results.iter().filter(|r| r.passed).count();
        info!(
            "Validation complete: {}/{} expectations passed",
            passed,
            self.results.len()
        );
        for failure in self.results.iter().filter(|r| !r.passed) {
            if failure.detail.is_empty() {
                warn!("Failed: {}", failure.description);
            } else {
                warn!("Failed: {} - {}", failure.description, failure.detail);
            }
        }
        self.overall_result()
    }
}

fn fmt_bound(bound: f64) -> String {
    if bound.is_infinite() {
        "inf".to_string()
    } else {
        bound.to_string()
    }
}

/// Column-name keywords that select a numeric range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRange {
    pub keywords: Vec<String>,
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
}

impl KeywordRange {
    fn matches(&self, lowercase_name: &str) -> bool {
        self.keywords.iter().any(|k| lowercase_name.contains(k.as_str()))
    }
}

/// Validation configuration, loaded once from the `[validation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Quarantine failing datasets instead of loading them
    pub blocking: bool,
    /// First matching keyword set wins
    pub numeric_keyword_sets: Vec<KeywordRange>,
    /// Columns that must exist in every dataset
    pub required_columns: Vec<String>,
    pub extra_expectations: Vec<Expectation>,
}

fn words(ws: &[&str]) -> Vec<String> {
    ws.iter().map(|w| w.to_string()).collect()
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            blocking: false,
            numeric_keyword_sets: vec![
                KeywordRange {
                    keywords: words(RATE_KEYWORDS),
                    min: 0.0,
                    max: Some(100.0),
                },
                KeywordRange {
                    keywords: words(COUNT_KEYWORDS),
                    min: 0.0,
                    max: None,
                },
            ],
            required_columns: Vec::new(),
            extra_expectations: Vec::new(),
        }
    }
}

fn first_column_matching<'r>(records: &'r RecordSet, hints: &[&str]) -> Option<&'r str> {
    records
        .columns()
        .iter()
        .map(String::as_str)
        .find(|c| {
            let lower = c.to_lowercase();
            hints.iter().any(|h| lower.contains(h))
        })
}

/// Run the standard COVID dataset checks and return the overall result
/// together with the report.
pub fn validate_dataset(records: &RecordSet, rules: &ValidationRules) -> (bool, ValidationReport) {
    info!("Starting data validation");
    let mut validator = ExpectationValidator::new(records);

    for column in &rules.required_columns {
        validator.column_exists(column);
    }

    if let Some(date_column) = first_column_matching(records, DATE_COLUMN_HINTS) {
        validator.column_exists(date_column);
        validator.column_not_null(date_column);
    }
    if let Some(location_column) = first_column_matching(records, LOCATION_COLUMN_HINTS) {
        validator.column_exists(location_column);
        validator.column_not_null(location_column);
    }

    let kinds = records.kinds();
    for column in kinds.numeric_columns() {
        let lower = column.to_lowercase();
        if let Some(range) = rules.numeric_keyword_sets.iter().find(|r| r.matches(&lower)) {
            validator.column_in_range(column, range.min, range.max);
        }
    }

    for expectation in &rules.extra_expectations {
        validator.expect(expectation);
    }

    let passed = validator.summarize();
    (passed, validator.into_report())
}

/// Quality gate decision for a dataset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QualityDecision {
    /// Every expectation passed
    Accept,
    /// Some expectations failed but validation is advisory
    AcceptWithWarnings,
    /// Some expectations failed and validation is blocking
    Quarantine,
}

impl QualityDecision {
    pub fn should_load(self) -> bool {
        !matches!(self, QualityDecision::Quarantine)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub decision: QualityDecision,
    pub report: ValidationReport,
}

impl QualityAssessment {
    pub fn passed(&self) -> bool {
        self.decision == QualityDecision::Accept
    }
}

/// Decides whether a transformed dataset proceeds to load.
pub trait QualityGate {
    fn assess(&self, dataset: &str, records: &RecordSet) -> QualityAssessment;
}

/// Gate backed by `validate_dataset`
pub struct DefaultQualityGate {
    pub rules: ValidationRules,
}

impl DefaultQualityGate {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::default(),
        }
    }

    pub fn with_rules(rules: ValidationRules) -> Self {
        Self { rules }
    }
}

impl Default for DefaultQualityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityGate for DefaultQualityGate {
    fn assess(&self, dataset: &str, records: &RecordSet) -> QualityAssessment {
        let (passed, report) = validate_dataset(records, &self.rules);
        let decision = match (passed, self.rules.blocking) {
            (true, _) => QualityDecision::Accept,
            (false, false) => QualityDecision::AcceptWithWarnings,
            (false, true) => QualityDecision::Quarantine,
        };

        match decision {
            QualityDecision::Accept => info!("{} data validation passed", dataset),
            QualityDecision::AcceptWithWarnings => warn!(
                "{} data validation failed ({} of {} expectations), loading anyway",
                dataset,
                report.len() - report.passed_count(),
                report.len()
            ),
            QualityDecision::Quarantine => warn!(
                "{} data validation failed ({} of {} expectations), quarantining dataset",
                dataset,
                report.len() - report.passed_count(),
                report.len()
            ),
        }
        crate::observability::metrics::validation::dataset_validated(dataset, passed);
        crate::observability::metrics::validation::expectations_evaluated(
            report.len(),
            report.len() - report.passed_count(),
        );

        QualityAssessment { decision, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::types::Value;
    use chrono::NaiveDate;

    fn cases() -> RecordSet {
        let day = |d| NaiveDate::from_ymd_opt(2021, 1, d).unwrap();
        RecordSet::from_rows(vec![
            record! { "date" => day(1), "region" => "new york", "confirmed_cases" => 100i64, "positivity_rate" => 4.5 },
            record! { "date" => day(2), "region" => "texas", "confirmed_cases" => 80i64, "positivity_rate" => 6.0 },
        ])
    }

    #[test]
    fn test_clean_dataset_passes() {
        let (passed, report) = validate_dataset(&cases(), &ValidationRules::default());
        assert!(passed);
        assert!(report.all_pass());
        // date and region: exists + not-null pre-check + not-null; two ranges with pre-checks
        assert_eq!(report.len(), 10);
    }

    #[test]
    fn test_missing_required_date_column_fails() {
        let records = RecordSet::from_rows(vec![record! { "region" => "ohio", "deaths" => 1i64 }]);
        let rules = ValidationRules {
            required_columns: vec!["date".to_string()],
            ..ValidationRules::default()
        };
        let (passed, report) = validate_dataset(&records, &rules);
        assert!(!passed);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.description, "Column 'date' exists");
        assert!(failure.detail.contains("not found"));
    }

    #[test]
    fn test_rate_out_of_range_reports_observed_range() {
        let records = RecordSet::from_rows(vec![record! { "positivity_rate" => 150i64 }]);
        let (passed, report) = validate_dataset(&records, &ValidationRules::default());
        assert!(!passed);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.detail, "Range is 150 to 150");
    }

    #[test]
    fn test_counts_are_unbounded_above() {
        let records = RecordSet::from_rows(vec![
            record! { "deaths" => 1_000_000i64 },
            record! { "deaths" => -1i64 },
        ]);
        let mut validator = ExpectationValidator::new(&records);
        assert!(!validator.column_in_range("deaths", 0.0, None));
        assert_eq!(validator.results()[1].detail, "Range is -1 to 1000000");
    }

    #[test]
    fn test_not_null_counts_nulls() {
        let records = RecordSet::from_rows(vec![
            record! { "region" => "ohio" },
            record! { "region" => Value::Null },
        ]);
        let mut validator = ExpectationValidator::new(&records);
        assert!(!validator.column_not_null("region"));
        assert_eq!(validator.results().len(), 2);
        assert_eq!(validator.results()[1].detail, "1 null values found");
    }

    #[test]
    fn test_range_with_only_nulls_fails() {
        let records = RecordSet::from_rows(vec![record! { "rate" => Value::Null }]);
        let mut validator = ExpectationValidator::new(&records);
        assert!(!validator.column_in_range("rate", 0.0, Some(100.0)));
        assert_eq!(validator.results()[1].detail, "Column has no non-null values");
    }

    #[test]
    fn test_range_rejects_text_values() {
        let records = RecordSet::from_rows(vec![record! { "rate" => "high" }]);
        let mut validator = ExpectationValidator::new(&records);
        assert!(!validator.column_in_range("rate", 0.0, Some(100.0)));
        assert!(validator.results()[1].detail.contains("text"));
    }

    #[test]
    fn test_unique_and_type_checks() {
        let records = RecordSet::from_rows(vec![
            record! { "id" => 1i64, "name" => "a" },
            record! { "id" => 1i64, "name" => "b" },
            record! { "id" => 2i64, "name" => "c" },
        ]);
        let mut validator = ExpectationValidator::new(&records);
        assert!(!validator.column_is_unique("id"));
        assert!(validator.column_is_unique("name"));
        assert!(validator.column_is_type("id", ColumnKind::Integer));
        assert!(!validator.column_is_type("name", ColumnKind::Float));
        assert!(!validator.overall_result());

        let report = validator.into_report();
        let dup = report.failures().next().unwrap();
        assert_eq!(dup.detail, "1 duplicates found");
    }

    #[test]
    fn test_missing_column_fails_composite_checks() {
        let records = RecordSet::from_rows(vec![record! { "x" => 1i64 }]);
        let mut validator = ExpectationValidator::new(&records);
        assert!(!validator.column_is_unique("y"));
        assert_eq!(validator.results().len(), 1);
        assert_eq!(validator.results()[0].description, "Column 'y' exists");
    }

    #[test]
    fn test_expectations_from_toml() {
        let rules: ValidationRules = toml::from_str(
            r#"
            blocking = true
            [[extra_expectations]]
            expect = "unique"
            column = "region"
            [[extra_expectations]]
            expect = "in_range"
            column = "confirmed_cases"
            min = 0.0
            max = 90.0
            "#,
        )
        .unwrap();
        assert!(rules.blocking);
        assert_eq!(rules.numeric_keyword_sets.len(), 2);

        let (passed, report) = validate_dataset(&cases(), &rules);
        assert!(!passed);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.failures().next().unwrap().detail, "Range is 80 to 100");
    }

    #[test]
    fn test_gate_decisions() {
        let bad = RecordSet::from_rows(vec![record! { "positivity_rate" => 150i64 }]);

        let advisory = DefaultQualityGate::new();
        assert_eq!(advisory.assess("cases", &cases()).decision, QualityDecision::Accept);
        let warned = advisory.assess("cases", &bad);
        assert_eq!(warned.decision, QualityDecision::AcceptWithWarnings);
        assert!(warned.decision.should_load());

        let blocking = DefaultQualityGate::with_rules(ValidationRules {
            blocking: true,
            ..ValidationRules::default()
        });
        let quarantined = blocking.assess("cases", &bad);
        assert_eq!(quarantined.decision, QualityDecision::Quarantine);
        assert!(!quarantined.decision.should_load());
    }

    #[test]
    fn test_empty_record_set_validates() {
        let records = RecordSet::with_columns(["date"]);
        let (passed, report) = validate_dataset(&records, &ValidationRules::default());
        assert!(passed);
        assert_eq!(report.len(), 3);
    }
}
