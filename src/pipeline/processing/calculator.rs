use crate::error::StageError;
use crate::pipeline::processing::{run_stage, Stage, StageOutcome};
use crate::types::{RecordSet, Value};
use tracing::{info, warn};

/// A percentage column derived from two existing numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatioRule {
    pub output: &'static str,
    pub numerator: &'static str,
    pub denominator: &'static str,
}

pub const DERIVED_RATES: &[RatioRule] = &[
    RatioRule {
        output: "positivity_rate",
        numerator: "positive_tests",
        denominator: "total_tests",
    },
    RatioRule {
        output: "case_fatality_rate",
        numerator: "deaths",
        denominator: "confirmed_cases",
    },
    RatioRule {
        output: "vaccination_rate",
        numerator: "total_vaccinations",
        denominator: "population",
    },
    RatioRule {
        output: "hospital_utilization_rate",
        numerator: "occupied_beds",
        denominator: "total_beds",
    },
];

/// `num / den * 100`. A zero or missing denominator, or a missing
/// numerator, yields 0.
pub fn percentage(numerator: Option<f64>, denominator: Option<f64>) -> f64 {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => {
            let rate = n / d * 100.0;
            if rate.is_finite() {
                rate
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn numeric_cell(value: &Value, column: &str) -> Result<Option<f64>, StageError> {
    match value {
        v if v.is_null() => Ok(None),
        Value::Int(_) | Value::Float(_) => Ok(value.as_f64()),
        other => Err(StageError::TypeMismatch {
            column: column.to_string(),
            found: other.kind_name(),
        }),
    }
}

pub struct DerivedMetricCalculator {
    rules: &'static [RatioRule],
}

impl DerivedMetricCalculator {
    pub fn new() -> Self {
        Self { rules: DERIVED_RATES }
    }

    pub fn with_rules(rules: &'static [RatioRule]) -> Self {
        Self { rules }
    }
}

impl Default for DerivedMetricCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for DerivedMetricCalculator {
    fn name(&self) -> &'static str {
        "create_calculated_fields"
    }

    fn apply(&self, records: &RecordSet) -> Result<StageOutcome, StageError> {
        info!("Creating calculated fields");
        records.check_shape()?;

        let mut out = records.clone();
        let mut created = Vec::new();

        for rule in self.rules {
            if !records.has_column(rule.numerator) || !records.has_column(rule.denominator) {
                continue;
            }
            info!("Calculating {}", rule.output);

            let mut rates = Vec::with_capacity(records.len());
            for i in 0..records.len() {
                let num = numeric_cell(records.get(i, rule.numerator), rule.numerator)?;
                let den = numeric_cell(records.get(i, rule.denominator), rule.denominator)?;
                rates.push(percentage(num, den));
            }

            out.add_column(rule.output);
            for (i, rate) in rates.into_iter().enumerate() {
                out.set(i, rule.output, Value::Float(rate));
            }
            created.push(rule.output);
        }

        if created.is_empty() {
            warn!("No calculated fields were created - required columns not found");
            return Ok(StageOutcome::Unchanged);
        }
        info!("Created {} new calculated fields: {:?}", created.len(), created);
        Ok(StageOutcome::Transformed(out))
    }
}

/// Convenience entry point applying the fail-open policy.
pub fn create_calculated_fields(records: &RecordSet) -> RecordSet {
    run_stage(&DerivedMetricCalculator::new(), records.clone())
}
