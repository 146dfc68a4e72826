//! Background job scheduler.
//!
//! Named jobs on fixed intervals, each on its own thread: the learning
//! cycle, the decay sweep, and the usage-analytics aggregation. A job runs
//! to completion before its next tick is considered, so ticks never
//! overlap (single-flight per job). Job invocations are retried with
//! exponential backoff on transient failures; exhausting the retry budget
//! is reported, never silently dropped.

use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often a sleeping job thread re-checks the stop flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Exponential backoff policy for job retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base * 2^n`.
    pub base_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry `attempt` (0-based), saturating.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.min(16));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Outcome of one job invocation, including its retries.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// The job's name.
    pub name: String,
    /// Attempts made (1 when the first try succeeded).
    pub attempts: u32,
    /// Whether the job eventually succeeded.
    pub success: bool,
    /// Set when every retry was spent without success.
    pub retries_exhausted: bool,
    /// Total wall-clock time including backoff waits, milliseconds.
    pub duration_ms: u64,
}

/// Runs a job with exponential backoff on transient failures.
///
/// Transient means [`Error::OperationFailed`] (storage or network);
/// anything else fails immediately without retrying.
pub fn run_with_backoff(
    name: &str,
    policy: BackoffPolicy,
    job: impl Fn() -> Result<()>,
) -> JobReport {
    let start = Instant::now();
    let mut attempts = 0;
    let max_attempts = policy.max_retries + 1;

    loop {
        attempts += 1;
        match job() {
            Ok(()) => {
                return JobReport {
                    name: name.to_string(),
                    attempts,
                    success: true,
                    retries_exhausted: false,
                    duration_ms: elapsed_ms(start),
                };
            },
            Err(e) => {
                let transient = matches!(e, Error::OperationFailed { .. });
                if !transient || attempts >= max_attempts {
                    let retries_exhausted = transient && attempts >= max_attempts;
                    if retries_exhausted {
                        warn!(job = name, attempts, error = %e, "Job retries exhausted");
                        metrics::counter!("scheduler_retries_exhausted_total", "job" => name.to_string())
                            .increment(1);
                    } else {
                        warn!(job = name, error = %e, "Job failed without retry");
                    }
                    return JobReport {
                        name: name.to_string(),
                        attempts,
                        success: false,
                        retries_exhausted,
                        duration_ms: elapsed_ms(start),
                    };
                }

                let delay = policy.delay_for(attempts - 1);
                debug!(job = name, attempts, delay_ms = delay.as_millis() as u64, "Retrying job");
                metrics::counter!("scheduler_job_retries_total", "job" => name.to_string())
                    .increment(1);
                std::thread::sleep(delay);
            },
        }
    }
}

struct JobSpec {
    name: String,
    interval: Duration,
    policy: BackoffPolicy,
    run: Arc<dyn Fn() -> Result<()> + Send + Sync>,
}

/// Fixed-interval scheduler for named background jobs.
pub struct Scheduler {
    jobs: Vec<JobSpec>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Adds a named job.
    pub fn add_job(
        &mut self,
        name: impl Into<String>,
        interval: Duration,
        policy: BackoffPolicy,
        run: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) {
        self.jobs.push(JobSpec {
            name: name.into(),
            interval,
            policy,
            run: Arc::new(run),
        });
    }

    /// Starts one thread per job.
    ///
    /// Each thread runs its job, then sleeps out the interval; a run that
    /// overruns the interval simply delays the next tick, so a job never
    /// executes concurrently with itself.
    pub fn start(&mut self) {
        for spec in self.jobs.drain(..) {
            let stop = Arc::clone(&self.stop);
            let handle = std::thread::Builder::new()
                .name(format!("foreman-job-{}", spec.name))
                .spawn(move || {
                    info!(job = %spec.name, interval_secs = spec.interval.as_secs(), "Job thread started");
                    while !stop.load(Ordering::Relaxed) {
                        let report = run_with_backoff(&spec.name, spec.policy, spec.run.as_ref());
                        metrics::counter!(
                            "scheduler_job_runs_total",
                            "job" => report.name.clone(),
                            "success" => report.success.to_string()
                        )
                        .increment(1);

                        // Sleep in slices so shutdown stays prompt.
                        let deadline = Instant::now() + spec.interval;
                        while Instant::now() < deadline {
                            if stop.load(Ordering::Relaxed) {
                                break;
                            }
                            std::thread::sleep(STOP_POLL_INTERVAL.min(
                                deadline.saturating_duration_since(Instant::now()),
                            ));
                        }
                    }
                    info!(job = %spec.name, "Job thread stopped");
                });
            match handle {
                Ok(handle) => self.handles.push(handle),
                Err(e) => warn!(error = %e, "Failed to spawn job thread"),
            }
        }
    }

    /// Signals all job threads to stop and waits for them.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Job thread panicked during shutdown");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
