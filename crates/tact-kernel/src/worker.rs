//! Native worker threads for async tasks.
//!
//! Each process that launches async work owns exactly one worker. The
//! worker holds a single task slot guarded by a mutex/condvar pair, a
//! progress accumulator the task writes and the owning process drains,
//! and a one-deep mailbox for synchronous call-ins.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use tact_core::{FatalError, ProcessId, WorkerId};

use crate::process::panic_message;
use crate::report;

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// A call-in to be executed in kernel context. The closure delivers
/// its own result; see [`crate::bridge::sync_call`].
pub(crate) type SyncCall = Box<dyn FnOnce() + Send>;

struct TaskSlot {
    task: Option<Job>,
    working: bool,
    alive: bool,
}

pub(crate) struct AsyncWorker {
    id: WorkerId,
    process: ProcessId,
    slot: Mutex<TaskSlot>,
    cv: Condvar,
    progress_ps: AtomicU64,
    call_tx: Sender<SyncCall>,
    call_rx: Receiver<SyncCall>,
    panic_note: Mutex<Option<String>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncWorker {
    /// Spawns the worker thread for `process`. Fatal if the caller has
    /// no owning process to bind the worker to.
    pub(crate) fn spawn(id: WorkerId, process: Option<ProcessId>, label: &str) -> Arc<Self> {
        let Some(process) = process else {
            report::fatal(FatalError::WorkerWithoutProcess);
        };
        let (call_tx, call_rx) = bounded(1);
        let worker = Arc::new(Self {
            id,
            process,
            slot: Mutex::new(TaskSlot {
                task: None,
                working: false,
                alive: true,
            }),
            cv: Condvar::new(),
            progress_ps: AtomicU64::new(0),
            call_tx,
            call_rx,
            panic_note: Mutex::new(None),
            thread: Mutex::new(None),
        });
        let runner = Arc::clone(&worker);
        let handle = std::thread::Builder::new()
            .name(format!("tact-async-{label}"))
            .spawn(move || runner.run())
            .expect("failed to spawn async worker thread");
        *worker.thread.lock().unwrap() = Some(handle);
        tracing::debug!(
            worker = worker.id().0,
            process = worker.process().0,
            "spawned async worker"
        );
        worker
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn process(&self) -> ProcessId {
        self.process
    }

    fn run(self: Arc<Self>) {
        loop {
            let job = {
                let mut slot = self.slot.lock().unwrap();
                loop {
                    if let Some(job) = slot.task.take() {
                        break job;
                    }
                    if !slot.alive {
                        return;
                    }
                    slot = self.cv.wait(slot).unwrap();
                }
            };
            crate::bridge::enter_async(Arc::clone(&self));
            let result = catch_unwind(AssertUnwindSafe(job));
            crate::bridge::exit_async();
            if let Err(payload) = result {
                *self.panic_note.lock().unwrap() = Some(panic_message(payload.as_ref()));
            }
            self.slot.lock().unwrap().working = false;
            self.cv.notify_all();
        }
    }

    /// Hands a task to the worker. One task at a time; callers must
    /// observe completion through [`Self::is_working`] first.
    pub(crate) fn submit(&self, job: Job) {
        let mut slot = self.slot.lock().unwrap();
        debug_assert!(!slot.working, "worker already has a task in flight");
        slot.task = Some(job);
        slot.working = true;
        drop(slot);
        self.cv.notify_all();
    }

    pub(crate) fn is_working(&self) -> bool {
        self.slot.lock().unwrap().working
    }

    /// Task side: accumulates simulated time covered so far.
    pub(crate) fn add_progress(&self, ps: u64) {
        self.progress_ps.fetch_add(ps, Ordering::AcqRel);
    }

    /// Process side: drains the accumulator. Progress reported between
    /// two drains is never lost, only deferred to the next drain.
    pub(crate) fn take_progress(&self) -> u64 {
        self.progress_ps.swap(0, Ordering::AcqRel)
    }

    /// Task side: queues a call-in for the owning process to execute.
    pub(crate) fn push_call(&self, call: SyncCall) {
        self.call_tx
            .send(call)
            .expect("async worker mailbox closed");
    }

    /// Process side: picks up a queued call-in, if any.
    pub(crate) fn take_call(&self) -> Option<SyncCall> {
        self.call_rx.try_recv().ok()
    }

    /// Process side: like [`Self::take_call`] but parks briefly for a
    /// call-in to arrive. Used once simulated time has stopped and
    /// delta waits are no longer possible.
    pub(crate) fn recv_call(&self, patience: Duration) -> Option<SyncCall> {
        self.call_rx.recv_timeout(patience).ok()
    }

    pub(crate) fn take_panic(&self) -> Option<String> {
        self.panic_note.lock().unwrap().take()
    }

    /// Joins the worker thread. An in-flight task runs to completion
    /// first.
    pub(crate) fn shutdown_and_join(&self) {
        self.slot.lock().unwrap().alive = false;
        self.cv.notify_all();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        tracing::debug!(worker = self.id.0, "joined async worker");
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<AsyncWorker>();
};

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    fn test_worker() -> Arc<AsyncWorker> {
        AsyncWorker::spawn(WorkerId(0), Some(ProcessId(0)), "test")
    }

    #[test]
    #[should_panic(expected = "async worker requires an owning process")]
    fn spawn_without_process_is_fatal() {
        let _ = AsyncWorker::spawn(WorkerId(0), None, "orphan");
    }

    #[test]
    fn task_runs_on_worker_thread_with_async_marker() {
        let worker = test_worker();
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        worker.submit(Box::new(move || {
            flag.store(crate::bridge::is_async(), Ordering::Release);
        }));
        while worker.is_working() {
            std::thread::yield_now();
        }
        assert!(seen.load(Ordering::Acquire));
        assert!(!crate::bridge::is_async());
        worker.shutdown_and_join();
    }

    #[test]
    fn worker_reports_its_identity() {
        let worker = AsyncWorker::spawn(WorkerId(3), Some(ProcessId(9)), "ident");
        assert_eq!(worker.id(), WorkerId(3));
        assert_eq!(worker.process(), ProcessId(9));
        worker.shutdown_and_join();
    }

    #[test]
    fn progress_drains_to_zero() {
        let worker = test_worker();
        worker.add_progress(30);
        worker.add_progress(12);
        assert_eq!(worker.take_progress(), 42);
        assert_eq!(worker.take_progress(), 0);
        worker.shutdown_and_join();
    }

    #[test]
    fn task_panic_is_captured_as_note() {
        let worker = test_worker();
        worker.submit(Box::new(|| panic!("task exploded")));
        while worker.is_working() {
            std::thread::yield_now();
        }
        assert_eq!(worker.take_panic().as_deref(), Some("task exploded"));
        assert_eq!(worker.take_panic(), None);
        worker.shutdown_and_join();
    }

    #[test]
    fn call_ins_are_picked_up_in_order() {
        let worker = test_worker();
        let log = Arc::new(Mutex::new(Vec::new()));
        for id in 0..2 {
            let log = Arc::clone(&log);
            // One-deep mailbox: drain between pushes like the duty
            // cycle does.
            worker.push_call(Box::new(move || log.lock().unwrap().push(id)));
            worker.take_call().expect("call queued")();
        }
        assert!(worker.take_call().is_none());
        assert_eq!(*log.lock().unwrap(), vec![0, 1]);
        worker.shutdown_and_join();
    }
}
