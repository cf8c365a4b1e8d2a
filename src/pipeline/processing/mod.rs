// Pipeline processing: record cleaning stages and validation

pub mod calculator;
pub mod missing;
pub mod normalize;
pub mod quality_gate;

use crate::error::StageError;
use crate::observability::metrics;
use crate::types::RecordSet;
use tracing::{debug, error};

/// Result of a stage that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Nothing to do; the input is already the answer
    Unchanged,
    Transformed(RecordSet),
}

impl StageOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, StageOutcome::Unchanged)
    }

    /// Resolve the outcome against the stage input.
    pub fn into_records(self, input: RecordSet) -> RecordSet {
        match self {
            StageOutcome::Unchanged => input,
            StageOutcome::Transformed(records) => records,
        }
    }
}

/// A pure record-set transform. Stages never mutate their input.
pub trait Stage {
    fn name(&self) -> &'static str;

    fn apply(&self, records: &RecordSet) -> Result<StageOutcome, StageError>;
}

/// Run a stage with fail-open substitution: on error the pre-stage record
/// set continues down the pipeline.
pub fn run_stage(stage: &dyn Stage, records: RecordSet) -> RecordSet {
    match stage.apply(&records) {
        Ok(StageOutcome::Transformed(out)) => {
            metrics::stages::transformed(stage.name());
            out
        }
        Ok(StageOutcome::Unchanged) => {
            debug!("Stage '{}' left {} records unchanged", stage.name(), records.len());
            metrics::stages::unchanged(stage.name());
            records
        }
        Err(e) => {
            error!("Error in stage '{}', keeping untransformed records: {}", stage.name(), e);
            metrics::stages::fallback(stage.name());
            records
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    struct Failing;

    impl Stage for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn apply(&self, _records: &RecordSet) -> Result<StageOutcome, StageError> {
            Err(StageError::Internal("boom".into()))
        }
    }

    struct AddFlag;

    impl Stage for AddFlag {
        fn name(&self) -> &'static str {
            "add_flag"
        }

        fn apply(&self, records: &RecordSet) -> Result<StageOutcome, StageError> {
            let mut out = records.clone();
            out.add_column("flag");
            for i in 0..out.len() {
                out.set(i, "flag", 1i64.into());
            }
            Ok(StageOutcome::Transformed(out))
        }
    }

    #[test]
    fn test_run_stage_falls_back_to_input_on_error() {
        let input = RecordSet::from_rows(vec![record! { "region" => "ny" }]);
        let out = run_stage(&Failing, input.clone());
        assert_eq!(out, input);
    }

    #[test]
    fn test_run_stage_returns_transformed_records() {
        let input = RecordSet::from_rows(vec![record! { "region" => "ny" }]);
        let out = run_stage(&AddFlag, input.clone());
        assert!(out.has_column("flag"));
        assert!(!input.has_column("flag"));
    }
}
