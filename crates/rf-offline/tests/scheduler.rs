//! Job queue, background workers, cancellation and copy-back

mod common;

use std::time::{Duration, Instant};

use common::*;
use rf_core::{BufferAdaptor, MemoryBuffer, ParamSet, SharedBuffer};
use rf_offline::{JobScheduler, JobUpdate, NrtClient, OfflineConfig, OfflineError, ProcessState, Status};

/// Poll until idle, keeping every update that reaped a job
fn drain<N: NrtClient>(scheduler: &mut JobScheduler<N>) -> Vec<JobUpdate> {
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut updates = Vec::new();

    while scheduler.is_busy() {
        assert!(Instant::now() < deadline, "scheduler did not go idle");
        let update = scheduler.check_progress();
        if update.result.is_some() {
            updates.push(update);
        } else {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    updates
}

fn bind(params: &mut ParamSet, source: &SharedBuffer, dest: &SharedBuffer) {
    params.set_buffer("source", Some(source.clone())).unwrap();
    params.set_buffer("dest", Some(dest.clone())).unwrap();
}

#[test]
fn test_queue_runs_in_fifo_order() {
    let mut scheduler = JobScheduler::new(DelayClient::batch(), OfflineConfig::queued());
    let source = mono(vec![1.0, 2.0, 3.0, 4.0]);
    let dests: Vec<SharedBuffer> = (0..3).map(|_| placeholder()).collect();

    for (gain, dest) in dests.iter().enumerate() {
        let mut params = scheduler.default_params();
        bind(&mut params, &source, dest);
        params.set_float("gain", (gain + 1) as f64).unwrap();
        scheduler.enqueue(&params).unwrap();
    }
    assert_eq!(scheduler.queued(), 3);

    assert!(scheduler.process().is_ok());
    let updates = drain(&mut scheduler);

    let states: Vec<ProcessState> = updates.iter().map(|u| u.state).collect();
    assert_eq!(
        states,
        vec![ProcessState::DoneStillProcessing, ProcessState::DoneStillProcessing, ProcessState::Done]
    );

    let ids: Vec<u64> = updates.iter().filter_map(|u| u.job_id).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "{ids:?}");

    for (gain, dest) in dests.iter().enumerate() {
        let expected: Vec<f64> = [1.0, 2.0, 3.0, 4.0].iter().map(|x| x * (gain + 1) as f64).collect();
        assert_eq!(channel(dest, 0), expected);
    }
    assert_eq!(scheduler.state(), ProcessState::Done);
}

#[test]
fn test_caller_buffers_untouched_until_reaped() {
    let mut scheduler = JobScheduler::new(SlowClient::batch(), OfflineConfig::queued());
    let source = mono(vec![0.5; 8]);
    let dest = placeholder();

    let mut params = scheduler.default_params();
    bind(&mut params, &source, &dest);
    params.set_long("steps", 20).unwrap();
    scheduler.enqueue(&params).unwrap();
    assert!(scheduler.process().is_ok());

    assert!(scheduler.is_busy());
    assert_eq!(dest.read().num_frames(), 1);

    let result = scheduler.wait();

    assert!(result.is_ok(), "{result}");
    assert_eq!(channel(&dest, 0), vec![0.5; 8]);
}

#[test]
fn test_cancel_leaves_outputs_bit_identical() {
    let mut scheduler = JobScheduler::new(SlowClient::batch(), OfflineConfig::queued());
    let source = mono(vec![0.25; 32]);
    let original = MemoryBuffer::from_channels(vec![vec![7.0; 5]], 22050.0);
    let dest = original.clone().into_shared();

    for _ in 0..2 {
        let mut params = scheduler.default_params();
        bind(&mut params, &source, &dest);
        params.set_long("steps", 10_000).unwrap();
        scheduler.enqueue(&params).unwrap();
    }
    assert!(scheduler.process().is_ok());

    scheduler.cancel();
    assert_eq!(scheduler.queued(), 0);
    let result = scheduler.wait();

    assert!(result.is_cancelled(), "{result}");
    assert_eq!(result.status(), Status::Cancelled);
    assert_eq!(scheduler.state(), ProcessState::Cancelled);
    assert!(scheduler.done());
    assert_eq!(MemoryBuffer::copy_of(&*dest.read()), original);
}

#[test]
fn test_done_still_processing_is_one_shot() {
    let mut scheduler = JobScheduler::new(SlowClient::batch(), OfflineConfig::queued());
    let source = mono(vec![1.0; 4]);
    let (first, second) = (placeholder(), placeholder());

    for (steps, dest) in [(0, &first), (5_000, &second)] {
        let mut params = scheduler.default_params();
        bind(&mut params, &source, dest);
        params.set_long("steps", steps).unwrap();
        scheduler.enqueue(&params).unwrap();
    }
    assert!(scheduler.process().is_ok());

    let deadline = Instant::now() + Duration::from_secs(10);
    let update = loop {
        let update = scheduler.check_progress();
        if update.result.is_some() {
            break update;
        }
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(1));
    };

    assert_eq!(update.state, ProcessState::DoneStillProcessing);
    assert_eq!(scheduler.state(), ProcessState::DoneStillProcessing);
    assert!(scheduler.done());
    assert_eq!(channel(&first, 0), vec![1.0; 4]);

    let next = scheduler.check_progress();
    assert_eq!(next.state, ProcessState::Processing);
    assert!(next.result.is_none());
    assert!(!scheduler.done());

    scheduler.cancel();
    assert!(scheduler.wait().is_cancelled());
    assert_eq!(second.read().num_frames(), 1);
}

#[test]
fn test_busy_without_queue_rejects_work() {
    let config = OfflineConfig::queued().with_queue(false);
    let mut scheduler = JobScheduler::new(SlowClient::batch(), config);
    let source = mono(vec![1.0; 4]);
    let dest = placeholder();

    let mut params = scheduler.default_params();
    bind(&mut params, &source, &dest);
    params.set_long("steps", 5_000).unwrap();
    scheduler.enqueue(&params).unwrap();
    assert!(scheduler.process().is_ok());

    assert_eq!(scheduler.enqueue(&params), Err(OfflineError::AlreadyProcessing));
    let rejected = scheduler.process();
    assert_eq!(rejected.status(), Status::Error);
    assert_eq!(rejected.error(), Some(&OfflineError::AlreadyProcessing));

    scheduler.set_queue_enabled(true);
    assert!(scheduler.enqueue(&params).is_ok());
    scheduler.set_synchronous(true);
    assert_eq!(scheduler.enqueue(&params), Err(OfflineError::AlreadyProcessing));

    scheduler.cancel();
    assert!(scheduler.wait().is_cancelled());
}

#[test]
fn test_blocking_mode_runs_inline() {
    let mut scheduler = JobScheduler::new(DelayClient::batch(), OfflineConfig::blocking());
    let source = ramp(32, 2);
    let dest = placeholder();

    let mut params = scheduler.default_params();
    bind(&mut params, &source, &dest);
    params.set_long("delay", 4).unwrap();
    scheduler.enqueue(&params).unwrap();

    let result = scheduler.process();

    assert!(result.is_ok(), "{result}");
    assert!(!scheduler.is_busy());
    assert_eq!(scheduler.state(), ProcessState::Done);
    assert_eq!(channel(&dest, 1), channel(&source, 1));

    let update = scheduler.check_progress();
    assert_eq!(update.state, ProcessState::Done);
    assert!(update.result.is_none());
}

#[test]
fn test_panic_is_reported_and_queue_advances() {
    let mut scheduler = JobScheduler::new(PanicClient::batch(), OfflineConfig::queued());
    let source = mono(vec![3.0; 4]);
    let (broken, intact) = (placeholder(), placeholder());

    for (explode, dest) in [(1, &broken), (0, &intact)] {
        let mut params = scheduler.default_params();
        bind(&mut params, &source, dest);
        params.set_long("explode", explode).unwrap();
        scheduler.enqueue(&params).unwrap();
    }
    assert!(scheduler.process().is_ok());

    let updates = drain(&mut scheduler);
    assert_eq!(updates.len(), 2);

    let failed = updates[0].result.as_ref().unwrap();
    assert_eq!(failed.status(), Status::Error);
    assert!(
        matches!(failed.error(), Some(OfflineError::Worker(message)) if message.contains("client exploded")),
        "{failed}"
    );
    assert_eq!(updates[0].state, ProcessState::DoneStillProcessing);

    assert!(updates[1].result.as_ref().unwrap().is_ok());
    assert_eq!(broken.read().num_frames(), 1);
    assert_eq!(channel(&intact, 0), vec![3.0; 4]);
}

#[test]
fn test_blocking_panic_keeps_scheduler_usable() {
    let mut scheduler = JobScheduler::new(PanicClient::batch(), OfflineConfig::blocking());
    let source = mono(vec![1.0, -1.0]);
    let dest = placeholder();

    let mut params = scheduler.default_params();
    bind(&mut params, &source, &dest);
    params.set_long("explode", 1).unwrap();
    scheduler.enqueue(&params).unwrap();
    assert_eq!(scheduler.process().status(), Status::Error);

    params.set_long("explode", 0).unwrap();
    scheduler.enqueue(&params).unwrap();
    assert!(scheduler.process().is_ok());
    assert_eq!(channel(&dest, 0), vec![1.0, -1.0]);
}

#[test]
fn test_dropping_scheduler_detaches_worker() {
    let source = mono(vec![1.0; 4]);
    let dest = placeholder();

    {
        let mut scheduler = JobScheduler::new(SlowClient::batch(), OfflineConfig::queued());
        let mut params = scheduler.default_params();
        bind(&mut params, &source, &dest);
        params.set_long("steps", 10_000).unwrap();
        scheduler.enqueue(&params).unwrap();
        assert!(scheduler.process().is_ok());
    }

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(dest.read().num_frames(), 1);
}

#[test]
fn test_progress_reported_while_running() {
    let mut scheduler = JobScheduler::new(SlowClient::batch(), OfflineConfig::queued());
    let source = mono(vec![1.0; 4]);
    let dest = placeholder();

    let mut params = scheduler.default_params();
    bind(&mut params, &source, &dest);
    params.set_long("steps", 200).unwrap();
    scheduler.enqueue(&params).unwrap();
    assert!(scheduler.process().is_ok());

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut last = 0.0;
    while scheduler.is_busy() {
        let progress = scheduler.progress();
        assert!(progress >= last, "progress went backwards: {last} -> {progress}");
        assert!((0.0..=1.0).contains(&progress));
        last = progress;
        scheduler.check_progress();
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(2));
    }

    assert_eq!(scheduler.progress(), 1.0);
}
