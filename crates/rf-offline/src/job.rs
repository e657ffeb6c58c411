//! Offline processing jobs
//!
//! A [`Job`] owns a parameter snapshot whose buffers have been swapped for
//! private copies. It runs either on the calling thread or on a named
//! worker thread, and only touches the caller's buffers again when its
//! result is collected: outputs are copied back if the job neither failed
//! nor was cancelled.

use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use rf_core::{BufferAdaptor, ParamKind, ParamSet, SharedBuffer};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crate::context::{JobTask, ProcessContext};
use crate::error::{OfflineError, OfflineResult};
use crate::result::{ProcessResult, Status};
use crate::wrapper::NrtClient;

/// Unique job identifier
pub type JobId = u64;

static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Scheduler-visible job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProcessState {
    /// No job in flight and no outcome left to report
    NoProcess = 0,
    /// A job is running
    Processing = 1,
    /// The last job finished
    Done = 2,
    /// A job finished and the next queued job started
    DoneStillProcessing = 3,
    /// The last job was cancelled
    Cancelled = 4,
}

impl ProcessState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Processing,
            2 => Self::Done,
            3 => Self::DoneStillProcessing,
            4 => Self::Cancelled,
            _ => Self::NoProcess,
        }
    }
}

/// Private working copy of one caller buffer
#[derive(Debug)]
struct BufferCopy {
    origin: SharedBuffer,
    copy: SharedBuffer,
    kind: ParamKind,
}

/// One unit of batch work
pub struct Job {
    id: JobId,
    task: JobTask,
    state: Arc<AtomicU8>,
    params: Option<ParamSet>,
    copies: Vec<BufferCopy>,
    worker: Option<JoinHandle<()>>,
    result_rx: Option<Receiver<ProcessResult>>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("progress", &self.task.progress())
            .field("copies", &self.copies.len())
            .finish()
    }
}

impl Job {
    /// Take ownership of a snapshot and privatise its buffers
    pub fn new(mut params: ParamSet) -> Self {
        let id = JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut copies = Vec::new();
        params.for_each_buffer_mut(|kind, buffer| {
            let copy = buffer.snapshot().into_shared();
            let origin = std::mem::replace(buffer, copy.clone());
            copies.push(BufferCopy { origin, copy, kind });
        });

        log::debug!("[Job {}] prepared with {} buffer copies", id, copies.len());

        Self {
            id,
            task: JobTask::new(),
            state: Arc::new(AtomicU8::new(ProcessState::NoProcess as u8)),
            params: Some(params),
            copies,
            worker: None,
            result_rx: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn progress(&self) -> f64 {
        self.task.progress()
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    fn take_params(&mut self) -> OfflineResult<ParamSet> {
        self.params
            .take()
            .ok_or_else(|| OfflineError::InvalidConfig(format!("job {} already started", self.id)))
    }

    /// Run to completion on the calling thread and collect the result
    pub fn run_blocking<N: NrtClient>(&mut self, client: &Mutex<N>) -> ProcessResult {
        let params = match self.take_params() {
            Ok(params) => params,
            Err(e) => return e.into(),
        };

        self.state.store(ProcessState::Processing as u8, Ordering::Release);
        let ctx = ProcessContext::with_task(self.task.clone());
        let result = run_guarded(|| client.lock().process(&params, &ctx));
        drop(params);
        self.state.store(ProcessState::Done as u8, Ordering::Release);

        self.finish(result)
    }

    /// Start on a background worker named `<worker_name>-<id>`
    pub fn spawn<N: NrtClient>(&mut self, client: Arc<Mutex<N>>, worker_name: &str) -> OfflineResult<()> {
        let params = self.take_params()?;
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let task = self.task.clone();
        let state = Arc::clone(&self.state);
        let id = self.id;

        state.store(ProcessState::Processing as u8, Ordering::Release);

        let handle = thread::Builder::new()
            .name(format!("{}-{}", worker_name, id))
            .spawn(move || {
                let ctx = ProcessContext::with_task(task);
                let result = run_guarded(|| client.lock().process(&params, &ctx));
                log::debug!("[Job {}] worker finished: {:?}", id, result.status());

                // Nobody listening once the owner detached
                let _ = result_tx.send(result);
                state.store(ProcessState::Done as u8, Ordering::Release);
            })
            .map_err(|e| {
                self.state.store(ProcessState::NoProcess as u8, Ordering::Release);
                OfflineError::Worker(e.to_string())
            })?;

        self.worker = Some(handle);
        self.result_rx = Some(result_rx);
        Ok(())
    }

    /// Collect the result if the worker has finished, without blocking
    pub fn check_progress(&mut self) -> Option<ProcessResult> {
        if self.state() != ProcessState::Done {
            return None;
        }

        let result = match self.result_rx.as_ref().map(Receiver::try_recv) {
            Some(Ok(result)) => result,
            Some(Err(TryRecvError::Empty | TryRecvError::Disconnected)) | None => {
                ProcessResult::failure(OfflineError::Worker(
                    "worker exited without a result".into(),
                ))
            }
        };
        self.result_rx = None;

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("[Job {}] worker thread panicked after reporting", self.id);
            }
        }

        Some(self.finish(result))
    }

    /// Apply cancellation and copy-back rules, releasing the private copies
    fn finish(&mut self, result: ProcessResult) -> ProcessResult {
        let copies = std::mem::take(&mut self.copies);

        if self.task.is_cancelled() {
            log::info!("[Job {}] cancelled, discarding {} buffer copies", self.id, copies.len());
            self.state.store(ProcessState::Cancelled as u8, Ordering::Release);
            return ProcessResult::cancelled();
        }
        if result.status() >= Status::Error {
            log::warn!("[Job {}] {}", self.id, result);
            return result;
        }

        let mut result = result;
        for buffer in copies.iter().filter(|b| b.kind == ParamKind::Buffer) {
            if !buffer.origin.read().exists() {
                log::warn!("[Job {}] output buffer went away before copy-back", self.id);
                continue;
            }

            let snapshot = buffer.copy.snapshot();
            if !snapshot.exists() {
                continue;
            }
            if let Err(e) = snapshot.write_to(&mut *buffer.origin.write()) {
                log::error!("[Job {}] copy-back failed: {}", self.id, e);
                result.merge(ProcessResult::failure(e.into()));
            }
        }

        self.task.finish();
        log::info!("[Job {}] done: {:?}", self.id, result.status());
        result
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            if !handle.is_finished() {
                self.task.cancel();
                log::debug!("[Job {}] detaching running worker", self.id);
            }
            // Dropping the handle detaches; the worker owns its snapshot
        }
    }
}

/// Run `f`, turning a panic into an `Error` result
fn run_guarded<F: FnOnce() -> ProcessResult>(f: F) -> ProcessResult {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ProcessResult::failure(OfflineError::Worker(message))
    })
}
