use crate::observability::metrics;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tracing::{error, info};

/// Timing and outcome of one named unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub success: bool,
    pub duration_secs: f64,
}

/// Runs named tasks, logging start, completion or failure, and duration, and
/// keeps a record of each.
#[derive(Debug, Default)]
pub struct TaskRunner {
    records: Vec<TaskRecord>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(&mut self, name: &str, started: Instant, success: bool) {
        let duration_secs = started.elapsed().as_secs_f64();
        info!("Task duration: {} - {:.2} seconds", name, duration_secs);
        metrics::tasks::duration(name, duration_secs);
        if !success {
            metrics::tasks::failed(name);
        }
        self.records.push(TaskRecord {
            name: name.to_string(),
            success,
            duration_secs,
        });
    }

    /// Run a fallible task. The error is logged and passed back unchanged.
    pub fn run<T, E, F>(&mut self, name: &str, task: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        info!("Starting task: {}", name);
        let started = Instant::now();
        let result = task();
        match &result {
            Ok(_) => info!("Task completed successfully: {}", name),
            Err(e) => error!("Task failed: {} - {}", name, e),
        }
        self.finish(name, started, result.is_ok());
        result
    }

    /// Run a task that cannot fail.
    pub fn measure<T, F>(&mut self, name: &str, task: F) -> T
    where
        F: FnOnce() -> T,
    {
        info!("Starting task: {}", name);
        let started = Instant::now();
        let out = task();
        info!("Task completed successfully: {}", name);
        self.finish(name, started, true);
        out
    }

    /// Await a task that cannot fail.
    pub async fn measure_async<T, Fut>(&mut self, name: &str, task: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        info!("Starting task: {}", name);
        let started = Instant::now();
        let out = task.await;
        info!("Task completed successfully: {}", name);
        self.finish(name, started, true);
        out
    }

    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TaskRecord> {
        self.records
    }
}
