use crate::error::Result;
use crate::pipeline::orchestrator::PipelineResult;
use chrono::{DateTime, Local};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

const SLEEP_STEP: Duration = Duration::from_secs(10);

/// Cloneable stop switch for a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        info!("Stopping scheduler");
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Re-runs a job on a fixed wall-clock interval until stopped.
pub struct Scheduler {
    interval: Duration,
    sleep_step: Duration,
    skip_if_running: bool,
    running: Arc<AtomicBool>,
    in_flight: AtomicBool,
    last_run: Mutex<Option<DateTime<Local>>>,
    next_run: Mutex<Option<DateTime<Local>>>,
}

impl Scheduler {
    pub fn new(interval_minutes: u64) -> Self {
        Self::with_interval(Duration::from_secs(interval_minutes * 60))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            sleep_step: SLEEP_STEP.min(interval.max(Duration::from_millis(1))),
            skip_if_running: true,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: AtomicBool::new(false),
            last_run: Mutex::new(None),
            next_run: Mutex::new(None),
        }
    }

    pub fn skip_if_running(mut self, skip: bool) -> Self {
        self.skip_if_running = skip;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_run(&self) -> Option<DateTime<Local>> {
        self.last_run.lock().ok().and_then(|g| *g)
    }

    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.next_run.lock().ok().and_then(|g| *g)
    }

    fn set(slot: &Mutex<Option<DateTime<Local>>>, at: DateTime<Local>) {
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(at);
        }
    }

    /// Run the job once. Returns `None` when another `tick` on this
    /// scheduler is still in flight and overlap is disabled. Only callers
    /// that drive `tick` concurrently can hit that case; `start` awaits each
    /// tick before scheduling the next.
    pub async fn tick<F, Fut>(&self, job: &mut F) -> Option<Result<PipelineResult>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PipelineResult>>,
    {
        let was_in_flight = self.in_flight.swap(true, Ordering::SeqCst);
        if was_in_flight && self.skip_if_running {
            warn!("Previous pipeline run still in progress, skipping this tick");
            return None;
        }

        info!("Running scheduled pipeline");
        Self::set(&self.last_run, Local::now());
        let result = job().await;
        if let Err(e) = &result {
            error!("Scheduled pipeline run failed: {}", e);
        }
        if !was_in_flight {
            self.in_flight.store(false, Ordering::SeqCst);
        }
        Some(result)
    }

    /// Loop until `stop()` is called, running `job` once per interval.
    /// Runs never overlap here: a run longer than the interval delays the
    /// next one instead.
    pub async fn start<F, Fut>(&self, mut job: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PipelineResult>>,
    {
        info!(
            "Starting scheduler with {} minute interval",
            self.interval.as_secs_f64() / 60.0
        );
        self.running.store(true, Ordering::SeqCst);

        while self.running.load(Ordering::SeqCst) {
            let started = tokio::time::Instant::now();
            let started_wall = Local::now();
            self.tick(&mut job).await;

            let next = started_wall
                + chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::zero());
            Self::set(&self.next_run, next);

            let deadline = started + self.interval;
            let now = tokio::time::Instant::now();
            if deadline <= now {
                warn!("Pipeline took longer than interval, running next iteration immediately");
                continue;
            }

            info!("Next run scheduled for: {}", next.format("%Y-%m-%d %H:%M:%S"));
            info!("Sleeping for {:.2} seconds", (deadline - now).as_secs_f64());
            while self.running.load(Ordering::SeqCst) {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    break;
                }
                tokio::time::sleep((deadline - now).min(self.sleep_step)).await;
            }
        }
        info!("Scheduler stopped");
    }
}
