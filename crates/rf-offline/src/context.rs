//! Progress reporting and cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

#[derive(Debug)]
struct TaskState {
    /// f64 bits; non-negative so integer ordering matches float ordering
    progress: AtomicU64,
    cancelled: AtomicBool,
    iteration: AtomicUsize,
    iterations: AtomicUsize,
}

/// Progress and cancel flag shared between a job and its owner
#[derive(Debug, Clone)]
pub struct JobTask(Arc<TaskState>);

impl Default for JobTask {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTask {
    pub fn new() -> Self {
        Self(Arc::new(TaskState {
            progress: AtomicU64::new(0.0_f64.to_bits()),
            cancelled: AtomicBool::new(false),
            iteration: AtomicUsize::new(0),
            iterations: AtomicUsize::new(1),
        }))
    }

    /// Fraction done in `[0, 1]`, never decreasing
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.0.progress.load(Ordering::Acquire))
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    fn publish(&self, value: f64) {
        // Rejects NaN and zero (including -0.0, whose bits would sort last)
        if value.is_nan() || value <= 0.0 {
            return;
        }
        self.0
            .progress
            .fetch_max(value.min(1.0).to_bits(), Ordering::AcqRel);
    }

    /// Start outer iteration `iteration` of `iterations`
    ///
    /// Returns `false` once cancellation has been requested.
    pub fn iteration_update(&self, iteration: usize, iterations: usize) -> bool {
        let iterations = iterations.max(1);
        self.0.iteration.store(iteration, Ordering::Relaxed);
        self.0.iterations.store(iterations, Ordering::Relaxed);
        self.publish(iteration as f64 / iterations as f64);
        !self.is_cancelled()
    }

    /// Report `done` of `total` units within the current iteration
    ///
    /// Returns `false` once cancellation has been requested.
    pub fn process_update(&self, done: f64, total: f64) -> bool {
        if total > 0.0 {
            let iteration = self.0.iteration.load(Ordering::Relaxed) as f64;
            let iterations = self.0.iterations.load(Ordering::Relaxed).max(1) as f64;
            self.publish((iteration + done / total) / iterations);
        }
        !self.is_cancelled()
    }

    /// Mark the work complete
    pub fn finish(&self) {
        self.publish(1.0);
    }
}

/// What a processing call can report through
///
/// A detached context (no task) accepts every update and is never
/// cancelled.
#[derive(Debug, Clone, Default)]
pub struct ProcessContext {
    task: Option<JobTask>,
}

impl ProcessContext {
    /// Context with nobody listening
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn with_task(task: JobTask) -> Self {
        Self { task: Some(task) }
    }

    pub fn task(&self) -> Option<&JobTask> {
        self.task.as_ref()
    }

    pub fn iteration_update(&self, iteration: usize, iterations: usize) -> bool {
        self.task
            .as_ref()
            .is_none_or(|task| task.iteration_update(iteration, iterations))
    }

    pub fn process_update(&self, done: f64, total: f64) -> bool {
        self.task
            .as_ref()
            .is_none_or(|task| task.process_update(done, total))
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.as_ref().is_some_and(JobTask::is_cancelled)
    }
}
