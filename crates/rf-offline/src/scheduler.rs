//! Job queue and threading facade
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_offline::{JobScheduler, OfflineConfig};
//!
//! let mut scheduler = JobScheduler::new(client, OfflineConfig::queued());
//! let mut params = scheduler.default_params();
//! params.set_buffer("source", Some(source))?;
//! params.set_buffer("harmonic", Some(harmonic))?;
//!
//! scheduler.enqueue(&params)?;
//! scheduler.process();
//! let result = scheduler.wait();
//! ```

use parking_lot::Mutex;
use rf_core::{ParamDescriptorSet, ParamSet};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OfflineConfig;
use crate::error::{OfflineError, OfflineResult};
use crate::job::{Job, JobId, ProcessState};
use crate::result::{ProcessResult, Status};
use crate::wrapper::NrtClient;

/// What one `check_progress` call observed
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub state: ProcessState,
    /// Result of the job reaped by this call
    pub result: Option<ProcessResult>,
    /// Id of the job reaped by this call
    pub job_id: Option<JobId>,
}

/// Serial job runner for one batch client
///
/// At most one job runs at a time. In background mode further snapshots
/// wait in a FIFO queue and start as earlier jobs are reaped by
/// [`JobScheduler::check_progress`].
pub struct JobScheduler<N: NrtClient> {
    config: OfflineConfig,
    client: Arc<Mutex<N>>,
    descriptors: Arc<ParamDescriptorSet>,
    queue: VecDeque<ParamSet>,
    current: Option<Job>,
    reported: ProcessState,
    /// Terminal state not yet returned by `check_progress`
    unreported: bool,
}

impl<N: NrtClient> JobScheduler<N> {
    pub fn new(client: N, config: OfflineConfig) -> Self {
        let descriptors = Arc::new(client.descriptors());
        log::info!(
            "[JobScheduler] {} ready ({} mode, {} parameters)",
            client.name(),
            if config.synchronous { "blocking" } else { "background" },
            descriptors.len()
        );

        Self {
            config,
            client: Arc::new(Mutex::new(client)),
            descriptors,
            queue: VecDeque::new(),
            current: None,
            reported: ProcessState::NoProcess,
            unreported: false,
        }
    }

    /// Fresh parameter set with every value at its default
    pub fn default_params(&self) -> ParamSet {
        ParamSet::new(Arc::clone(&self.descriptors))
    }

    pub fn descriptors(&self) -> &Arc<ParamDescriptorSet> {
        &self.descriptors
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<Mutex<N>> {
        &self.client
    }

    pub fn set_synchronous(&mut self, synchronous: bool) {
        self.config.synchronous = synchronous;
    }

    pub fn set_queue_enabled(&mut self, enabled: bool) {
        self.config.queue_enabled = enabled;
    }

    /// Number of snapshots waiting to run
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether a job is in flight
    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    fn rejects_while_busy(&self) -> bool {
        self.is_busy() && (self.config.synchronous || !self.config.queue_enabled)
    }

    /// Queue a snapshot of `params`
    pub fn enqueue(&mut self, params: &ParamSet) -> OfflineResult<()> {
        if self.rejects_while_busy() {
            return Err(OfflineError::AlreadyProcessing);
        }
        if !Arc::ptr_eq(params.descriptors(), &self.descriptors) && **params.descriptors() != *self.descriptors {
            return Err(OfflineError::InvalidConfig(
                "parameters were built for a different client".into(),
            ));
        }

        self.queue.push_back(params.clone());
        log::debug!("[JobScheduler] enqueued ({} waiting)", self.queue.len());
        Ok(())
    }

    /// Start the next queued job
    ///
    /// Blocking mode runs it here and returns its result. Background mode
    /// returns an empty result straight away; poll with
    /// [`JobScheduler::check_progress`].
    pub fn process(&mut self) -> ProcessResult {
        if self.is_busy() {
            if self.rejects_while_busy() {
                return OfflineError::AlreadyProcessing.into();
            }
            return ProcessResult::ok();
        }

        let Some(params) = self.queue.pop_front() else {
            return ProcessResult::warning("process() called on empty queue");
        };

        if self.config.synchronous {
            self.run_blocking(params)
        } else {
            self.start(params)
        }
    }

    fn run_blocking(&mut self, params: ParamSet) -> ProcessResult {
        let mut job = Job::new(params);
        log::info!("[JobScheduler] running job {} on calling thread", job.id());

        let result = job.run_blocking(&self.client);
        self.reported = if result.is_cancelled() {
            ProcessState::Cancelled
        } else {
            ProcessState::Done
        };
        self.unreported = true;
        result
    }

    fn start(&mut self, params: ParamSet) -> ProcessResult {
        let mut job = Job::new(params);
        match job.spawn(Arc::clone(&self.client), &self.config.worker_name) {
            Ok(()) => {
                log::info!("[JobScheduler] started job {} in background", job.id());
                self.current = Some(job);
                self.reported = ProcessState::Processing;
                ProcessResult::ok()
            }
            Err(e) => {
                log::error!("[JobScheduler] failed to start job {}: {}", job.id(), e);
                e.into()
            }
        }
    }

    /// Poll the running job without blocking
    ///
    /// Reaps a finished job, copying its outputs back unless it failed or
    /// was cancelled, then starts the next queued job if there is one. The
    /// call that does both reports `DoneStillProcessing`. A terminal state
    /// is reported once; later idle calls report `NoProcess`.
    pub fn check_progress(&mut self) -> JobUpdate {
        let Some(job) = self.current.as_mut() else {
            if !std::mem::take(&mut self.unreported) {
                self.reported = ProcessState::NoProcess;
            }
            return JobUpdate {
                state: self.reported,
                result: None,
                job_id: None,
            };
        };

        let Some(result) = job.check_progress() else {
            self.reported = ProcessState::Processing;
            return JobUpdate {
                state: ProcessState::Processing,
                result: None,
                job_id: None,
            };
        };

        let job_id = job.id();
        self.current = None;

        let reaped = if result.is_cancelled() {
            ProcessState::Cancelled
        } else {
            ProcessState::Done
        };

        let state = match self.queue.pop_front() {
            Some(params) => {
                let started = self.start(params);
                handover_state(reaped, &started)
            }
            None => reaped,
        };

        self.reported = state;
        self.unreported = false;
        JobUpdate {
            state,
            result: Some(result),
            job_id: Some(job_id),
        }
    }

    /// Drop queued work and ask the running job to stop
    pub fn cancel(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();

        if let Some(job) = &self.current {
            job.cancel();
            log::info!("[JobScheduler] cancel requested for job {} ({} queued dropped)", job.id(), dropped);
        }
    }

    /// Fraction of the running job completed
    pub fn progress(&self) -> f64 {
        match &self.current {
            Some(job) => job.progress(),
            None if self.reported == ProcessState::Done => 1.0,
            None => 0.0,
        }
    }

    pub fn state(&self) -> ProcessState {
        match &self.current {
            Some(job) if self.reported == ProcessState::Processing && job.state() == ProcessState::Done => {
                ProcessState::Done
            }
            _ => self.reported,
        }
    }

    /// Whether the last job has finished (including by cancellation)
    pub fn done(&self) -> bool {
        matches!(
            self.state(),
            ProcessState::Done | ProcessState::DoneStillProcessing | ProcessState::Cancelled
        )
    }

    /// Poll until no job is in flight, returning the last reaped result
    ///
    /// Queued jobs started along the way are waited for as well.
    pub fn wait(&mut self) -> ProcessResult {
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut last = ProcessResult::ok();

        while self.is_busy() {
            if let Some(result) = self.check_progress().result {
                last = result;
            }
            if self.is_busy() {
                std::thread::sleep(interval);
            }
        }
        last
    }
}

/// State reported when the next queued job was started after a reap
///
/// A failed start leaves the reaped job's outcome as it was.
fn handover_state(reaped: ProcessState, started: &ProcessResult) -> ProcessState {
    if started.status() >= Status::Error {
        log::warn!("[JobScheduler] next queued job not started: {}", started);
        reaped
    } else {
        ProcessState::DoneStillProcessing
    }
}

impl<N: NrtClient> Drop for JobScheduler<N> {
    fn drop(&mut self) {
        if self.current.is_some() {
            log::debug!("[JobScheduler] dropped with a job in flight");
        }
        self.cancel();
    }
}
