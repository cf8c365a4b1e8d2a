// Data pipeline: ingestion, processing, storage, and orchestration

pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod scheduler;
pub mod storage;
pub mod tasks;

pub use orchestrator::{run_pipeline, Dataset, DatasetOutcome, LoadOutcome, PipelineOptions, PipelineResult};
pub use scheduler::{Scheduler, SchedulerHandle};
